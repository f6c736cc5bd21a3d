//! Vision/OCR Layer
//!
//! Turns a captured sail photograph into ranked sail-number detections.
//! Stages, leaves first:
//! - Image variant generation (contrast/threshold/brightness renderings)
//! - OCR gateway over an asynchronous submit/poll recognition service
//! - Candidate extraction, spatial grouping, deduplication and ranking
//! - Orchestration across all variants

pub mod error;
pub mod extract;
pub mod grouping;
pub mod http_ocr;
pub mod ocr;
pub mod ocr_preprocess;
pub mod pipeline;
pub mod ranking;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ScanError, ScanErrorKind};
pub use extract::extract_candidates;
pub use grouping::group_fragments;
pub use http_ocr::HttpOcrService;
pub use ocr::{OcrGateway, OcrService, PollPolicy, PollStatus, PollResponse};
pub use ocr_preprocess::{generate_variants, ImageVariant, JitterConfig, VariantConfig};
pub use pipeline::{DetectionPipeline, PipelineConfig, ScanTrace, VariantTrace};
pub use ranking::{rank_candidates, Ranking};

use serde::{Deserialize, Serialize};

/// A point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Bounding polygon of a recognized line (4 or more points)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub points: Vec<Point>,
}

impl Region {
    /// Create a region from polygon points
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle as a 4-point polygon (clockwise from top-left)
    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(vec![
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ])
    }

    /// Build a region from a flat `[x0, y0, x1, y1, ...]` coordinate list.
    ///
    /// Returns `None` unless the list holds at least 4 complete points.
    pub fn from_flat(coords: &[f32]) -> Option<Self> {
        if coords.len() < 8 || coords.len() % 2 != 0 {
            return None;
        }
        Some(Self::new(
            coords.chunks_exact(2).map(|c| Point::new(c[0], c[1])).collect(),
        ))
    }

    /// Bounding box as (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        if self.points.is_empty() {
            return (0.0, 0.0, 0.0, 0.0);
        }

        let min_x = self.points.iter().map(|p| p.x).fold(f32::INFINITY, f32::min);
        let min_y = self.points.iter().map(|p| p.y).fold(f32::INFINITY, f32::min);
        let max_x = self.points.iter().map(|p| p.x).fold(f32::NEG_INFINITY, f32::max);
        let max_y = self.points.iter().map(|p| p.y).fold(f32::NEG_INFINITY, f32::max);

        (min_x, min_y, max_x, max_y)
    }

    /// Vertical center of the bounding box
    pub fn center_y(&self) -> f32 {
        let (_, min_y, _, max_y) = self.bounds();
        (min_y + max_y) / 2.0
    }

    /// Height of the bounding box
    pub fn height(&self) -> f32 {
        let (_, min_y, _, max_y) = self.bounds();
        max_y - min_y
    }

    /// Smallest axis-aligned rectangle covering every given region
    pub fn union<'a>(regions: impl IntoIterator<Item = &'a Region>) -> Region {
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;

        for region in regions {
            if region.points.is_empty() {
                continue;
            }
            let (x0, y0, x1, y1) = region.bounds();
            min_x = min_x.min(x0);
            min_y = min_y.min(y0);
            max_x = max_x.max(x1);
            max_y = max_y.max(y1);
        }

        if min_x > max_x {
            return Region::rect(0.0, 0.0, 0.0, 0.0);
        }

        Region::rect(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// One line of text as recognized by the OCR service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFragment {
    /// Recognized text content
    pub text: String,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f32,
    /// Bounding polygon
    pub region: Region,
}

impl RawFragment {
    pub fn new(text: impl Into<String>, confidence: f32, region: Region) -> Self {
        Self {
            text: text.into(),
            confidence,
            region,
        }
    }
}

/// Numeric interpretation of a fragment, before deduplication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericCandidate {
    pub value: u32,
    /// Digits the value was parsed from (2 to 6 characters)
    pub digit_string: String,
    pub confidence: f32,
    /// Text of the fragment (or joined group) the digits came from
    pub source_text: String,
    pub region: Region,
    /// True for the back-of-sail (mirrored) reading
    pub is_digit_reversed: bool,
}

/// Fragments judged to belong to the same printed number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentGroup {
    /// Members in original recognition order
    pub members: Vec<RawFragment>,
    /// Union of member regions
    pub region: Region,
}

impl FragmentGroup {
    /// Concatenation of member texts in original order
    pub fn combined_text(&self) -> String {
        self.members.iter().map(|f| f.text.as_str()).collect()
    }

    /// A joined reading is only as trustworthy as its weakest line
    pub fn confidence(&self) -> f32 {
        self.members
            .iter()
            .map(|f| f.confidence)
            .fold(f32::INFINITY, f32::min)
            .min(1.0)
    }

    /// The group as a single synthetic fragment for extraction
    pub fn as_fragment(&self) -> RawFragment {
        RawFragment::new(self.combined_text(), self.confidence(), self.region.clone())
    }
}

/// Deduplicated, threshold-passing sail-number detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub value: u32,
    pub confidence: f32,
    /// Kept for highlighting the number in a UI
    pub origin_region: Region,
}

/// One image variant's full pipeline output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOutcome {
    pub variant_name: String,
    /// Sorted by descending confidence
    pub results: Vec<RankedResult>,
    pub mean_confidence: f32,
}

impl VariantOutcome {
    /// Build an outcome, computing the mean confidence (0 when empty)
    pub fn new(variant_name: impl Into<String>, results: Vec<RankedResult>) -> Self {
        let mean_confidence = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|r| r.confidence).sum::<f32>() / results.len() as f32
        };

        Self {
            variant_name: variant_name.into(),
            results,
            mean_confidence,
        }
    }

    /// Highest-confidence detection, if any
    pub fn best(&self) -> Option<&RankedResult> {
        self.results.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_from_flat() {
        let region = Region::from_flat(&[0.0, 0.0, 10.0, 0.0, 10.0, 5.0, 0.0, 5.0]).unwrap();
        assert_eq!(region.points.len(), 4);
        assert_eq!(region.height(), 5.0);
        assert_eq!(region.center_y(), 2.5);

        assert!(Region::from_flat(&[0.0, 0.0, 1.0, 1.0]).is_none());
        assert!(Region::from_flat(&[0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn test_region_union() {
        let a = Region::rect(10.0, 10.0, 20.0, 10.0);
        let b = Region::rect(5.0, 25.0, 10.0, 10.0);
        let union = Region::union([&a, &b]);
        assert_eq!(union.bounds(), (5.0, 10.0, 30.0, 35.0));
    }

    #[test]
    fn test_region_union_empty() {
        let union = Region::union(std::iter::empty());
        assert_eq!(union.bounds(), (0.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn test_group_combined_text_and_confidence() {
        let group = FragmentGroup {
            members: vec![
                RawFragment::new("12", 0.9, Region::rect(0.0, 0.0, 20.0, 10.0)),
                RawFragment::new("34", 0.7, Region::rect(0.0, 12.0, 20.0, 10.0)),
            ],
            region: Region::rect(0.0, 0.0, 20.0, 22.0),
        };
        assert_eq!(group.combined_text(), "1234");
        assert!((group.confidence() - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_variant_outcome_mean() {
        let empty = VariantOutcome::new("original", vec![]);
        assert_eq!(empty.mean_confidence, 0.0);
        assert!(empty.best().is_none());

        let outcome = VariantOutcome::new(
            "original",
            vec![
                RankedResult { value: 17, confidence: 0.95, origin_region: Region::rect(0.0, 0.0, 1.0, 1.0) },
                RankedResult { value: 203, confidence: 0.7, origin_region: Region::rect(0.0, 0.0, 1.0, 1.0) },
            ],
        );
        assert!((outcome.mean_confidence - 0.825).abs() < 1e-6);
        assert_eq!(outcome.best().map(|r| r.value), Some(17));
    }
}
