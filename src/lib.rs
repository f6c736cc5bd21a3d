//! SailScan - sail number detection from photographs
//!
//! Preprocesses a photo into several renderings, reads each through an
//! asynchronous OCR service, and turns the recognized text into ranked
//! sail-number detections.

pub mod capture;
pub mod config;
pub mod session;
pub mod shared;
pub mod storage;
pub mod vision;
