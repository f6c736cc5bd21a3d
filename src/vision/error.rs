//! Scan error taxonomy

use serde::Serialize;
use thiserror::Error;

/// Why a scan (or one variant of it) produced no detections
#[derive(Debug, Error)]
pub enum ScanError {
    /// The OCR service call failed (network, auth, or a `Failed` operation)
    #[error("OCR service error: {0}")]
    Service(String),

    /// Polling budget exhausted, or the scan was cancelled mid-poll
    #[error("OCR operation did not complete after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    /// The OCR call succeeded but recognized no text
    #[error("OCR service returned no text")]
    EmptyResult,

    /// Every variant ran and none produced a qualifying detection
    #[error("no sail number detected")]
    NoTextDetected,

    /// Malformed input image
    #[error("invalid image: {0}")]
    Validation(String),

    /// A scan is already in flight on this session
    #[error("a scan is already running")]
    Busy,

    /// The persistence collaborator failed
    #[error("storage error: {0}")]
    Storage(String),
}

/// Fieldless discriminant of [`ScanError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanErrorKind {
    Service,
    Timeout,
    EmptyResult,
    NoTextDetected,
    Validation,
    Busy,
    Storage,
}

impl ScanError {
    pub fn kind(&self) -> ScanErrorKind {
        match self {
            ScanError::Service(_) => ScanErrorKind::Service,
            ScanError::Timeout { .. } => ScanErrorKind::Timeout,
            ScanError::EmptyResult => ScanErrorKind::EmptyResult,
            ScanError::NoTextDetected => ScanErrorKind::NoTextDetected,
            ScanError::Validation(_) => ScanErrorKind::Validation,
            ScanError::Busy => ScanErrorKind::Busy,
            ScanError::Storage(_) => ScanErrorKind::Storage,
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(e: reqwest::Error) -> Self {
        ScanError::Service(e.to_string())
    }
}

impl From<image::ImageError> for ScanError {
    fn from(e: image::ImageError) -> Self {
        ScanError::Validation(e.to_string())
    }
}
