//! Pipeline stages for turning one converted paper into plain text.
//!
//! Each submodule implements exactly one step, and the network-facing ones
//! sit behind traits so tests can swap in fakes.
//!
//! ## Data Flow
//!
//! ```text
//! PDF ──▶ converter ──▶ bundle ──▶ extract ──▶ summarize ──▶ assemble ──▶ postprocess
//!         (remote OCR)  (tex.zip)  (spans)     (LLM/VLM)     (splice)     (plain text)
//! ```
//!
//! 1. [`converter`] — submit the PDF and poll with bounded backoff
//! 2. [`bundle`]    — unpack markup and figure files from the payload
//! 3. [`extract`]   — locate tables and figures, in document order
//! 4. [`summarize`] — one model call per artifact via [`llm`], figures
//!    prepared by [`encode`]; failures become placeholders
//! 5. [`assemble`]  — replace each span with its summary
//! 6. [`postprocess`] — LaTeX → plain text over the prose segments

pub mod assemble;
pub mod bundle;
pub mod converter;
pub mod encode;
pub mod extract;
pub mod llm;
pub mod postprocess;
pub mod summarize;
