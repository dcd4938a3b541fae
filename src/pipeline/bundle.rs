//! Conversion payload: the `tex.zip` archive returned by the service.
//!
//! The archive holds one `.tex` file (the markup) and an `images/` folder
//! with the figures it references. Figures are looked up by file stem,
//! since `\includegraphics{name}` omits the extension.

use crate::error::ConversionError;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

/// Markup plus the image files it references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkupBundle {
    /// Name of the `.tex` entry inside the archive.
    pub tex_name: String,
    /// The converted LaTeX markup.
    pub markup: String,
    images: HashMap<String, Vec<u8>>,
}

impl MarkupBundle {
    /// Bundle without images, e.g. for markup obtained some other way.
    pub fn from_markup(markup: impl Into<String>) -> Self {
        Self {
            tex_name: "document.tex".into(),
            markup: markup.into(),
            images: HashMap::new(),
        }
    }

    /// Add an image under `reference` (file stem or full name).
    pub fn with_image(mut self, reference: impl AsRef<str>, bytes: Vec<u8>) -> Self {
        self.images.insert(image_key(reference.as_ref()), bytes);
        self
    }

    /// Unpack a `tex.zip` archive.
    ///
    /// Bytes that are not a zip at all give
    /// [`ConversionError::PayloadNotReady`]; a zip with bad contents gives
    /// [`ConversionError::MalformedPayload`].
    pub fn from_tex_zip(bytes: &[u8]) -> Result<Self, ConversionError> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| {
            ConversionError::PayloadNotReady {
                detail: format!("not a zip archive: {e}"),
            }
        })?;

        let mut tex: Option<(String, String)> = None;
        let mut images = HashMap::new();

        for i in 0..archive.len() {
            let mut file = archive
                .by_index(i)
                .map_err(|e| ConversionError::MalformedPayload {
                    detail: format!("unreadable zip entry {i}: {e}"),
                })?;
            if file.is_dir() {
                continue;
            }
            // Skip path traversal attempts
            let Some(name) = file.enclosed_name().map(|p| p.to_path_buf()) else {
                continue;
            };
            let name_str = name.to_string_lossy().to_string();
            let is_tex = name
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("tex"));
            let in_images = name
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|p| p == "images");

            if is_tex && tex.is_none() {
                let mut source = String::new();
                file.read_to_string(&mut source)
                    .map_err(|e| ConversionError::MalformedPayload {
                        detail: format!("{name_str} is not UTF-8 text: {e}"),
                    })?;
                tex = Some((name_str, source));
            } else if in_images {
                let mut buf = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buf)
                    .map_err(|e| ConversionError::MalformedPayload {
                        detail: format!("failed to extract {name_str}: {e}"),
                    })?;
                images.insert(image_key(&name_str), buf);
            }
        }

        let (tex_name, markup) = tex.ok_or_else(|| ConversionError::MalformedPayload {
            detail: "archive contains no .tex file".into(),
        })?;
        debug!(
            "Unpacked {} ({} bytes markup, {} images)",
            tex_name,
            markup.len(),
            images.len()
        );

        Ok(Self {
            tex_name,
            markup,
            images,
        })
    }

    /// Image bytes for an `\includegraphics` reference.
    pub fn image(&self, reference: &str) -> Option<&[u8]> {
        self.images.get(&image_key(reference)).map(Vec::as_slice)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// File stem of the last path component: `images/fig-1.jpg` → `fig-1`.
fn image_key(reference: &str) -> String {
    let last = reference
        .trim()
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    Path::new(last)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| last.to_string())
}
