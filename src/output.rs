//! Result types of an inbox run: per-file state machine and reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a source file is in the pipeline.
///
/// ```text
/// Pending → Converting → Extracting → Summarizing → Assembling → Archived
///    │           │            │             │             │
///    └───────────┴────────────┴─────────────┴─────────────┴──→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Pending,
    Converting,
    Extracting,
    Summarizing,
    Assembling,
    Archived,
    Failed,
}

impl FileState {
    /// The state that follows on success, if any.
    pub fn next(self) -> Option<FileState> {
        match self {
            FileState::Pending => Some(FileState::Converting),
            FileState::Converting => Some(FileState::Extracting),
            FileState::Extracting => Some(FileState::Summarizing),
            FileState::Summarizing => Some(FileState::Assembling),
            FileState::Assembling => Some(FileState::Archived),
            FileState::Archived | FileState::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FileState::Archived | FileState::Failed)
    }

    /// Strictly sequential: the successor, or `Failed` from any live state.
    pub fn can_transition_to(self, to: FileState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == FileState::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for FileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileState::Pending => "pending",
            FileState::Converting => "converting",
            FileState::Extracting => "extracting",
            FileState::Summarizing => "summarizing",
            FileState::Assembling => "assembling",
            FileState::Archived => "archived",
            FileState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Attempted transition that would skip or rewind a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: FileState,
    pub to: FileState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state transition {} → {}", self.from, self.to)
    }
}

/// State history of one file; the only way the pipeline changes state.
#[derive(Debug, Clone)]
pub struct FileLifecycle {
    history: Vec<FileState>,
}

impl Default for FileLifecycle {
    fn default() -> Self {
        Self {
            history: vec![FileState::Pending],
        }
    }
}

impl FileLifecycle {
    pub fn current(&self) -> FileState {
        *self.history.last().unwrap_or(&FileState::Pending)
    }

    pub fn advance(&mut self, to: FileState) -> Result<(), InvalidTransition> {
        let from = self.current();
        if !from.can_transition_to(to) {
            return Err(InvalidTransition { from, to });
        }
        self.history.push(to);
        Ok(())
    }

    pub fn history(&self) -> &[FileState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<FileState> {
        self.history
    }
}

/// How one file ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Source moved to the archive, text written to `output`.
    Archived {
        output: PathBuf,
        artifacts: usize,
        summary_failures: usize,
        warnings: Vec<String>,
    },
    /// Another pipeline instance archived the same file first.
    ClaimedElsewhere,
    /// Processing stopped in `failed_in`; no output was persisted.
    Failed { failed_in: FileState, error: String },
}

/// Report for one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub file_name: String,
    /// Every state the file passed through, starting with `Pending`.
    pub history: Vec<FileState>,
    pub outcome: FileOutcome,
    pub duration_ms: u64,
}

impl FileReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }

    pub fn final_state(&self) -> FileState {
        *self.history.last().unwrap_or(&FileState::Pending)
    }
}

/// Overall result of a run, used for the exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    AllSucceeded,
    SomeFailed,
}

/// Report for a whole pass over the intake directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    pub files: Vec<FileReport>,
    /// Intake files skipped because the archive already holds them.
    pub already_archived: Vec<String>,
    /// Archived sources with no output in the library.
    #[serde(default)]
    pub unfinished: Vec<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn archived(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::Archived { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.files.iter().filter(|f| f.is_failed()).count()
    }

    pub fn claimed_elsewhere(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::ClaimedElsewhere))
            .count()
    }

    pub fn summary_failures(&self) -> usize {
        self.files
            .iter()
            .map(|f| match f.outcome {
                FileOutcome::Archived {
                    summary_failures, ..
                } => summary_failures,
                _ => 0,
            })
            .sum()
    }

    pub fn status(&self) -> RunStatus {
        if self.failed() == 0 {
            RunStatus::AllSucceeded
        } else {
            RunStatus::SomeFailed
        }
    }
}
