use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageFormat;

use crate::errors::{EraserError, Result};

/// Base name used for downloads when the original file name is unknown.
pub const PLACEHOLDER_BASE_NAME: &str = "image";

const UNKNOWN_MIME: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Arc<Vec<u8>>),
}

/// A file offered for processing, before it has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub name: String,
    pub mime: String,
    pub source: FileSource,
}

impl IncomingFile {
    /// Describe the file at `path`; the MIME type is inferred from its extension.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            mime: mime_for_path(&path).to_string(),
            source: FileSource::Path(path),
        }
    }

    pub fn from_bytes(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            source: FileSource::Memory(Arc::new(bytes)),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub async fn read(&self) -> Result<Arc<Vec<u8>>> {
        match &self.source {
            FileSource::Memory(bytes) => Ok(Arc::clone(bytes)),
            FileSource::Path(path) => tokio::fs::read(path)
                .await
                .map(Arc::new)
                .map_err(|e| EraserError::FileSystem {
                    path: path.clone(),
                    operation: "read input".to_string(),
                    source: e,
                }),
        }
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|format| format.to_mime_type())
        .unwrap_or(UNKNOWN_MIME)
}

/// File name without its final extension, or the placeholder when unknown or empty.
pub fn base_filename(name: Option<&str>) -> String {
    let stem = name
        .map(|name| match name.rfind('.') {
            Some(0) | None => name,
            Some(dot) => &name[..dot],
        })
        .map(str::trim)
        .unwrap_or_default();
    if stem.is_empty() {
        PLACEHOLDER_BASE_NAME.to_string()
    } else {
        stem.to_string()
    }
}

/// `{base}-eraser.{extension}`
pub fn download_filename(original: Option<&str>, extension: &str) -> String {
    format!("{}-eraser.{}", base_filename(original), extension)
}
