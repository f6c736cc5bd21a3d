//! Application Configuration
//!
//! Scanner settings stored in TOML format.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::vision::grouping::DEFAULT_ADJACENCY_FACTOR;
use crate::vision::ranking::DEFAULT_MIN_CONFIDENCE;
use crate::vision::{JitterConfig, PipelineConfig, PollPolicy, VariantConfig};

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// OCR service settings
    pub ocr: OcrSettings,
    /// Detection pipeline settings
    pub pipeline: PipelineSettings,
    /// Named image variants, tried in order
    #[serde(default = "VariantConfig::default_set")]
    pub variants: Vec<VariantConfig>,
    /// Seeded threshold exploration
    pub jitter: Option<JitterConfig>,
    /// Storage settings
    pub storage: StorageSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ocr: OcrSettings::default(),
            pipeline: PipelineSettings::default(),
            variants: VariantConfig::default_set(),
            jitter: None,
            storage: StorageSettings::default(),
        }
    }
}

/// OCR service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    /// Service base URL
    pub endpoint: String,
    /// Environment variable holding the subscription key
    pub api_key_env: String,
    /// Delay before each status poll
    pub poll_interval_ms: u64,
    /// Poll attempts before giving up on an operation
    pub max_poll_attempts: u32,
    /// Operations allowed in flight at once
    pub max_outstanding_submissions: usize,
    /// Per-request HTTP timeout
    pub request_timeout_secs: u64,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key_env: "SAILSCAN_OCR_KEY".to_string(),
            poll_interval_ms: 1000,
            max_poll_attempts: 60,
            max_outstanding_submissions: 2,
            request_timeout_secs: 30,
        }
    }
}

impl OcrSettings {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_attempts: self.max_poll_attempts,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Detection pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Minimum confidence for a detection (0.0 - 1.0)
    pub min_confidence: f32,
    /// Run variants concurrently
    pub parallel_variants: bool,
    /// Row adjacency factor for joining split numbers
    pub adjacency_factor: f32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            parallel_variants: false,
            adjacency_factor: DEFAULT_ADJACENCY_FACTOR,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// SQLite database path; the data directory is used when unset
    pub database: Option<PathBuf>,
}

impl AppConfig {
    /// Check settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            bail!("at least one [[variants]] entry is required");
        }
        if !(0.0..=1.0).contains(&self.pipeline.min_confidence) {
            bail!(
                "pipeline.min_confidence must be within 0.0..=1.0, got {}",
                self.pipeline.min_confidence
            );
        }
        if !(self.pipeline.adjacency_factor > 0.0) {
            bail!("pipeline.adjacency_factor must be positive");
        }
        if self.ocr.max_poll_attempts == 0 {
            bail!("ocr.max_poll_attempts must be at least 1");
        }
        if self.ocr.max_outstanding_submissions == 0 {
            bail!("ocr.max_outstanding_submissions must be at least 1");
        }

        let mut names = HashSet::new();
        for variant in &self.variants {
            if !(variant.contrast > 0.0) {
                bail!("variant '{}' has non-positive contrast", variant.name);
            }
            if !names.insert(variant.name.as_str()) {
                bail!("duplicate variant name '{}'", variant.name);
            }
        }

        Ok(())
    }

    /// Pipeline configuration derived from these settings
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            variants: self.variants.clone(),
            jitter: self.jitter.clone(),
            min_confidence: self.pipeline.min_confidence,
            adjacency_factor: self.pipeline.adjacency_factor,
            parallel_variants: self.pipeline.parallel_variants,
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse config {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
