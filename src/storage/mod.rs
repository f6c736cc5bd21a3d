//! Storage Layer
//!
//! Persistence of detections and the competitor registry, using SQLite.

pub mod database;

pub use database::Database;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Number of detections listed when no limit is given
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// A sail number selected by a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub value: u32,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

/// Registered competitor metadata for a sail number
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Competitor {
    pub sail_number: u32,
    pub skipper_name: Option<String>,
    pub boat_name: Option<String>,
    pub club: Option<String>,
}

/// Receives detections selected by a scan
pub trait DetectionSink: Send + Sync {
    /// Store all records of one scan, or none of them on error
    fn record_all(&self, records: &[DetectionRecord]) -> Result<()>;
}

/// Resolves a sail number to competitor metadata
pub trait CompetitorLookup: Send + Sync {
    /// `Ok(None)` when the sail number is not registered
    fn lookup(&self, sail_number: u32) -> Result<Option<Competitor>>;
}

fn project_dirs() -> Result<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "sailscan", "SailScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

/// Get the application data directory
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = project_dirs()?.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)?;

    Ok(data_dir)
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = project_dirs()?.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}
