//! Per-image weights that counteract category imbalance.

use std::collections::BTreeMap;

use crate::error::ManifestError;
use crate::manifest::DatasetManifest;
use crate::stats::CategoryIndex;

#[derive(Clone, Debug)]
pub struct BalancedWeightsConfig {
    /// Square-root the per-tag multipliers to damp extremes.
    pub soft: bool,
    pub weight_lower: f64,
    pub weight_upper: f64,
}

impl Default for BalancedWeightsConfig {
    fn default() -> Self {
        Self {
            soft: true,
            weight_lower: 0.2,
            weight_upper: 5.0,
        }
    }
}

impl BalancedWeightsConfig {
    pub fn validate(&self) -> Result<(), ManifestError> {
        let finite = self.weight_lower.is_finite() && self.weight_upper.is_finite();
        if !finite || self.weight_lower <= 0.0 || self.weight_lower > self.weight_upper {
            return Err(ManifestError::precondition(format!(
                "weight bounds must satisfy 0 < lower <= upper, got [{}, {}]",
                self.weight_lower, self.weight_upper
            )));
        }
        Ok(())
    }

    fn clamp(&self, weight: f64) -> f64 {
        weight.clamp(self.weight_lower, self.weight_upper)
    }
}

/// Computes one weight per image from the frequency of its category tags.
///
/// Every tag gets `mean_count / count` (square-rooted in soft mode), clamped
/// to the bounds; an image's weight is the clamped product of its tags'
/// multipliers. Images without categories share one negative tag, kept apart
/// from every category name.
#[derive(Clone, Debug, Default)]
pub struct BalancedInstanceWeightsGenerator {
    config: BalancedWeightsConfig,
}

impl BalancedInstanceWeightsGenerator {
    pub fn new(config: BalancedWeightsConfig) -> Self {
        Self { config }
    }

    pub fn generate(&self, manifest: &DatasetManifest) -> Result<Vec<f64>, ManifestError> {
        self.config.validate()?;
        let index = CategoryIndex::new(manifest);
        // `None` tags negative images.
        let image_tags: Vec<Vec<Option<&str>>> = manifest
            .images
            .iter()
            .map(|image| {
                let tags = index.image_tags(image);
                if tags.is_empty() {
                    vec![None]
                } else {
                    tags.into_iter().map(Some).collect()
                }
            })
            .collect();

        let mut tag_counts: BTreeMap<Option<&str>, usize> = BTreeMap::new();
        for tags in &image_tags {
            for &tag in tags {
                *tag_counts.entry(tag).or_insert(0) += 1;
            }
        }
        if tag_counts.is_empty() {
            return Ok(Vec::new());
        }

        let mean = tag_counts.values().sum::<usize>() as f64 / tag_counts.len() as f64;
        let multipliers: BTreeMap<Option<&str>, f64> = tag_counts
            .iter()
            .map(|(&tag, &count)| {
                let raw = mean / count as f64;
                let raw = if self.config.soft { raw.sqrt() } else { raw };
                (tag, self.config.clamp(raw))
            })
            .collect();

        let weights: Vec<f64> = image_tags
            .iter()
            .map(|tags| {
                let product: f64 = tags
                    .iter()
                    .map(|tag| multipliers.get(tag).copied().unwrap_or(1.0))
                    .product();
                self.config.clamp(product)
            })
            .collect();

        tracing::info!(
            images = weights.len(),
            tags = tag_counts.len(),
            soft = self.config.soft,
            "generated balanced instance weights"
        );
        Ok(weights)
    }
}
