//! Image variant generation for OCR
//!
//! Produces named preprocessed renderings of a captured image so that at
//! least one of them reads well under the lighting the photo was taken in.
//! Variants are declared as data (see [`VariantConfig`]) and the transforms
//! are deterministic.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::map::map_colors;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One named preprocessing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    /// Variant name, unique within a configuration
    pub name: String,
    /// Pixels above this become white; `None` disables thresholding
    #[serde(default)]
    pub threshold: Option<u8>,
    /// Pixels below `threshold - margin` become black, those between stay gray
    #[serde(default = "default_margin")]
    pub margin: u8,
    /// Contrast multiplier around the midpoint (1.0 = unchanged)
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    /// Brightness offset added after contrast
    #[serde(default)]
    pub brightness: f32,
}

fn default_margin() -> u8 {
    40
}

fn default_contrast() -> f32 {
    1.0
}

impl VariantConfig {
    /// Plain luminance, no adjustment
    pub fn identity() -> Self {
        Self {
            name: "original".to_string(),
            threshold: None,
            margin: default_margin(),
            contrast: 1.0,
            brightness: 0.0,
        }
    }

    /// Default variants bracketing overcast, bright and backlit sails
    pub fn default_set() -> Vec<Self> {
        vec![
            Self::identity(),
            Self {
                name: "high_contrast".to_string(),
                threshold: Some(160),
                margin: 40,
                contrast: 1.5,
                brightness: 0.0,
            },
            Self {
                name: "brightened".to_string(),
                threshold: Some(140),
                margin: 40,
                contrast: 1.2,
                brightness: 30.0,
            },
            Self {
                name: "darkened".to_string(),
                threshold: Some(190),
                margin: 30,
                contrast: 1.3,
                brightness: -30.0,
            },
        ]
    }
}

/// Reproducible threshold exploration around the configured variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JitterConfig {
    /// RNG seed, same seed gives the same variants
    pub seed: u64,
    /// Maximum threshold offset in either direction
    pub amplitude: u8,
    /// Extra variants per thresholded base variant
    pub samples: usize,
}

/// A named rendering ready to be submitted for OCR
#[derive(Debug, Clone)]
pub struct ImageVariant {
    pub name: String,
    pub image: GrayImage,
}

/// Map one luminance value through contrast, brightness and soft threshold
pub fn transform_luma(value: u8, config: &VariantConfig) -> u8 {
    let adjusted = ((value as f32 - 128.0) * config.contrast + 128.0 + config.brightness)
        .clamp(0.0, 255.0) as u8;

    let Some(threshold) = config.threshold else {
        return adjusted;
    };

    let low = threshold.saturating_sub(config.margin);
    if adjusted > threshold {
        255
    } else if adjusted < low {
        0
    } else {
        adjusted
    }
}

/// Apply a variant configuration to an image
pub fn apply_variant(image: &DynamicImage, config: &VariantConfig) -> GrayImage {
    let luma = image.to_luma8();
    map_colors(&luma, |p: Luma<u8>| Luma([transform_luma(p[0], config)]))
}

/// Expand the configured variants with seeded threshold jitter
pub fn expand_with_jitter(configs: &[VariantConfig], jitter: Option<&JitterConfig>) -> Vec<VariantConfig> {
    let mut expanded = configs.to_vec();

    let Some(jitter) = jitter else {
        return expanded;
    };
    if jitter.amplitude == 0 || jitter.samples == 0 {
        return expanded;
    }

    let mut rng = StdRng::seed_from_u64(jitter.seed);
    let amplitude = jitter.amplitude as i16;

    for base in configs {
        let Some(threshold) = base.threshold else {
            continue;
        };
        for sample in 0..jitter.samples {
            let offset = rng.gen_range(-amplitude..=amplitude);
            let jittered = (threshold as i16 + offset).clamp(0, 255) as u8;
            expanded.push(VariantConfig {
                name: format!("{}~{}", base.name, sample + 1),
                threshold: Some(jittered),
                ..base.clone()
            });
        }
    }

    expanded
}

/// Produce the ordered variant renderings of a source image.
///
/// Falls back to the identity variant when no configuration is given, so
/// the output always holds at least one variant.
pub fn generate_variants(
    image: &DynamicImage,
    configs: &[VariantConfig],
    jitter: Option<&JitterConfig>,
) -> Vec<ImageVariant> {
    let configs = if configs.is_empty() {
        vec![VariantConfig::identity()]
    } else {
        expand_with_jitter(configs, jitter)
    };

    configs
        .iter()
        .map(|config| {
            debug!(
                "Generating variant '{}': threshold={:?}, margin={}, contrast={}, brightness={}",
                config.name, config.threshold, config.margin, config.contrast, config.brightness
            );
            ImageVariant {
                name: config.name.clone(),
                image: apply_variant(image, config),
            }
        })
        .collect()
}
