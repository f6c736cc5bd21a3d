//! Detection pipeline
//!
//! Runs every image variant through OCR, extraction, grouping and ranking,
//! then picks the variant with the best mean confidence. A failing variant
//! never aborts the scan; failures are collected and only surface when no
//! variant completed.

use std::io::Cursor;
use std::time::Instant;

use futures_util::future::join_all;
use image::{DynamicImage, GrayImage, ImageFormat};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::extract::extract_candidates;
use super::grouping::{group_fragments, DEFAULT_ADJACENCY_FACTOR};
use super::ocr::OcrGateway;
use super::ocr_preprocess::{generate_variants, ImageVariant, JitterConfig, VariantConfig};
use super::ranking::{rank_candidates, DEFAULT_MIN_CONFIDENCE};
use super::{FragmentGroup, NumericCandidate, RawFragment, RankedResult, ScanError, VariantOutcome};

/// Configuration for the detection pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Variant renderings to try, in order
    pub variants: Vec<VariantConfig>,
    /// Optional seeded threshold exploration
    pub jitter: Option<JitterConfig>,
    /// Minimum confidence for a detection (0.0 - 1.0)
    pub min_confidence: f32,
    /// Row adjacency factor for spatial grouping
    pub adjacency_factor: f32,
    /// Submit all variants concurrently instead of one after another
    pub parallel_variants: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            variants: VariantConfig::default_set(),
            jitter: None,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            adjacency_factor: DEFAULT_ADJACENCY_FACTOR,
            parallel_variants: false,
        }
    }
}

/// Intermediate data of one variant, for diagnosing misdetections
#[derive(Debug, Clone, Default, Serialize)]
pub struct VariantTrace {
    pub name: String,
    pub fragments: Vec<RawFragment>,
    pub groups: Vec<FragmentGroup>,
    /// All candidates before deduplication and filtering
    pub candidates: Vec<NumericCandidate>,
    /// Deduplicated candidates dropped by the confidence threshold
    pub discarded: Vec<NumericCandidate>,
    pub results: Vec<RankedResult>,
    /// Failure recorded for this variant, if any
    pub error: Option<String>,
}

/// Full intermediate trace of a scan
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanTrace {
    /// SHA-256 of the submitted image bytes
    pub image_sha256: String,
    pub variants: Vec<VariantTrace>,
    /// Winning variant name, if any
    pub selected: Option<String>,
}

/// Sail-number detection pipeline
pub struct DetectionPipeline {
    gateway: OcrGateway,
    config: PipelineConfig,
}

impl DetectionPipeline {
    pub fn new(gateway: OcrGateway, config: PipelineConfig) -> Self {
        Self { gateway, config }
    }

    /// Scan an encoded image and return the winning variant's outcome
    pub async fn run(&self, image: &[u8], cancel: &CancellationToken) -> Result<VariantOutcome, ScanError> {
        self.run_traced(image, cancel).await.0
    }

    /// Scan an encoded image, also returning the full intermediate trace
    pub async fn run_traced(
        &self,
        image: &[u8],
        cancel: &CancellationToken,
    ) -> (Result<VariantOutcome, ScanError>, ScanTrace) {
        let mut trace = ScanTrace {
            image_sha256: format!("{:x}", Sha256::digest(image)),
            ..Default::default()
        };

        let decoded = match decode_image(image) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Rejecting scan input: {}", e);
                return (Err(e), trace);
            }
        };

        let start = Instant::now();
        let variants = generate_variants(&decoded, &self.config.variants, self.config.jitter.as_ref());
        info!(
            "Scanning {}x{} image with {} variant(s){}",
            decoded.width(),
            decoded.height(),
            variants.len(),
            if self.config.parallel_variants { " in parallel" } else { "" }
        );

        let runs: Vec<(Result<VariantOutcome, ScanError>, VariantTrace)> = if self.config.parallel_variants {
            join_all(variants.iter().map(|v| self.run_variant(v, cancel))).await
        } else {
            let mut runs = Vec::with_capacity(variants.len());
            for variant in &variants {
                runs.push(self.run_variant(variant, cancel).await);
            }
            runs
        };

        let mut outcomes = Vec::with_capacity(runs.len());
        for (outcome, variant_trace) in runs {
            outcomes.push(outcome);
            trace.variants.push(variant_trace);
        }

        let selected = select_outcome(outcomes);
        match &selected {
            Ok(outcome) => {
                info!(
                    "Selected variant '{}' in {:?}: {:?} (mean confidence {:.2})",
                    outcome.variant_name,
                    start.elapsed(),
                    outcome.results.iter().map(|r| r.value).collect::<Vec<_>>(),
                    outcome.mean_confidence
                );
                trace.selected = Some(outcome.variant_name.clone());
            }
            Err(e) => info!("Scan finished without detection in {:?}: {}", start.elapsed(), e),
        }

        (selected, trace)
    }

    /// OCR one variant and process its fragments
    async fn run_variant(
        &self,
        variant: &ImageVariant,
        cancel: &CancellationToken,
    ) -> (Result<VariantOutcome, ScanError>, VariantTrace) {
        let recognized = match encode_png(&variant.image) {
            Ok(png) => self.gateway.recognize(&png, cancel).await,
            Err(e) => Err(e),
        };

        match recognized {
            Ok(fragments) => {
                let (outcome, trace) = self.process_fragments(&variant.name, fragments);
                (Ok(outcome), trace)
            }
            Err(ScanError::EmptyResult) => {
                debug!("Variant '{}' recognized no text", variant.name);
                let (outcome, mut trace) = self.process_fragments(&variant.name, Vec::new());
                trace.error = Some(ScanError::EmptyResult.to_string());
                (Ok(outcome), trace)
            }
            Err(e) => {
                warn!("Variant '{}' failed: {}", variant.name, e);
                let trace = VariantTrace {
                    name: variant.name.clone(),
                    error: Some(e.to_string()),
                    ..Default::default()
                };
                (Err(e), trace)
            }
        }
    }

    /// Extraction, grouping and ranking over one consistent set of fragments
    pub fn process_fragments(&self, name: &str, fragments: Vec<RawFragment>) -> (VariantOutcome, VariantTrace) {
        let mut candidates: Vec<NumericCandidate> = fragments.iter().flat_map(extract_candidates).collect();

        let groups = group_fragments(&fragments, self.config.adjacency_factor);
        for group in groups.iter().filter(|g| g.members.len() > 1) {
            candidates.extend(extract_candidates(&group.as_fragment()));
        }

        let ranking = rank_candidates(&candidates, self.config.min_confidence);

        debug!(
            "Variant '{}': {} fragment(s), {} group(s), {} candidate(s), {} ranked, {} below threshold",
            name,
            fragments.len(),
            groups.len(),
            candidates.len(),
            ranking.results.len(),
            ranking.discarded.len()
        );

        let outcome = VariantOutcome::new(name, ranking.results.clone());
        let trace = VariantTrace {
            name: name.to_string(),
            fragments,
            groups,
            candidates,
            discarded: ranking.discarded,
            results: ranking.results,
            error: None,
        };

        (outcome, trace)
    }
}

/// Decode and validate the captured image
fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ScanError> {
    if bytes.is_empty() {
        return Err(ScanError::Validation("image payload is empty".to_string()));
    }

    let decoded = image::load_from_memory(bytes)?;
    if decoded.width() == 0 || decoded.height() == 0 {
        return Err(ScanError::Validation(format!(
            "image has zero size ({}x{})",
            decoded.width(),
            decoded.height()
        )));
    }

    Ok(decoded)
}

fn encode_png(image: &GrayImage) -> Result<Vec<u8>, ScanError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Gateway failures ranked by how much they tell the caller
fn specificity(error: &ScanError) -> u8 {
    match error {
        ScanError::Service(_) => 2,
        ScanError::Timeout { .. } => 1,
        _ => 0,
    }
}

/// Pick the winning variant.
///
/// The highest mean confidence among variants with at least one result
/// wins, the earliest variant on ties. Without a winner, the most specific
/// gateway error is returned if no variant completed, else `NoTextDetected`.
pub fn select_outcome(runs: Vec<Result<VariantOutcome, ScanError>>) -> Result<VariantOutcome, ScanError> {
    let mut best: Option<VariantOutcome> = None;
    let mut any_completed = false;
    let mut failure: Option<ScanError> = None;

    for run in runs {
        match run {
            Ok(outcome) => {
                any_completed = true;
                if outcome.results.is_empty() {
                    continue;
                }
                let better = best
                    .as_ref()
                    .map_or(true, |b| outcome.mean_confidence > b.mean_confidence);
                if better {
                    best = Some(outcome);
                }
            }
            Err(e) => {
                failure = match failure {
                    Some(prev) if specificity(&prev) >= specificity(&e) => Some(prev),
                    _ => Some(e),
                };
            }
        }
    }

    if let Some(best) = best {
        return Ok(best);
    }

    match failure {
        Some(e) if !any_completed => Err(e),
        _ => Err(ScanError::NoTextDetected),
    }
}
