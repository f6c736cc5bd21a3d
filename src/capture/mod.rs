//! Capture Layer
//!
//! Delivers still images of sails to the scanner. Images come from files
//! written by a camera or picked by the operator.

pub mod frame;

pub use frame::CapturedImage;

use anyhow::Result;
use std::path::PathBuf;

/// Source of one still image per scan tick
pub trait ImageSource: Send {
    fn capture(&mut self) -> Result<CapturedImage>;
}

/// Reads the image at a fixed path on every tick, for cameras that
/// overwrite the same file
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ImageSource for FileSource {
    fn capture(&mut self) -> Result<CapturedImage> {
        CapturedImage::from_file(&self.path)
    }
}
