//! Captured still image handed to the scanner

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// One encoded still image delivered per scan tick
#[derive(Debug, Clone)]
pub struct CapturedImage {
    /// Encoded image bytes (PNG, JPEG, ...)
    pub data: Vec<u8>,
    /// When the image was captured
    pub captured_at: DateTime<Utc>,
    /// File the image was read from, if any
    pub source: Option<PathBuf>,
}

impl CapturedImage {
    /// Wrap encoded bytes captured now
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            captured_at: Utc::now(),
            source: None,
        }
    }

    /// Read an encoded image from disk
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).with_context(|| format!("failed to read image {:?}", path))?;
        Ok(Self {
            data,
            captured_at: Utc::now(),
            source: Some(path.to_path_buf()),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}
