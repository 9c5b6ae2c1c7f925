//! Oversampling a manifest up to a target size.

use crate::error::ManifestError;
use crate::manifest::DatasetManifest;

use super::merge::merge_manifests;
use super::sample::{sample_by_num_samples, SampleByNumSamplesConfig};
use super::weights::{BalancedInstanceWeightsGenerator, BalancedWeightsConfig};

#[derive(Clone, Debug, Default)]
pub struct SpawnConfig {
    /// Number of images to reach; must exceed the current size.
    pub target_size: usize,
    /// Explicit per-image weights. When set, copies are distributed
    /// proportionally instead of drawn.
    pub instance_weights: Option<Vec<f64>>,
    /// Draw extra images by balanced category weights instead of uniformly.
    pub balanced: Option<BalancedWeightsConfig>,
    pub seed: u64,
}

impl SpawnConfig {
    pub fn validate(&self, current_size: usize) -> Result<(), ManifestError> {
        if current_size == 0 {
            return Err(ManifestError::precondition("cannot spawn from an empty manifest"));
        }
        if self.target_size <= current_size {
            return Err(ManifestError::precondition(format!(
                "target size {} must exceed the current size {}",
                self.target_size, current_size
            )));
        }
        if let Some(weights) = &self.instance_weights {
            if weights.len() != current_size {
                return Err(ManifestError::precondition(format!(
                    "got {} instance weights for {} images",
                    weights.len(),
                    current_size
                )));
            }
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0)
                || weights.iter().sum::<f64>() <= 0.0
            {
                return Err(ManifestError::precondition(
                    "instance weights must be finite, non-negative and not all zero",
                ));
            }
        }
        if let Some(balanced) = &self.balanced {
            balanced.validate()?;
        }
        Ok(())
    }
}

/// Grows `manifest` to roughly `target_size` images, keeping one copy of
/// every original image.
///
/// With explicit weights each image gets `round(w / sum(w) * target) - 1`
/// extra copies, so the result size follows the weights rather than hitting
/// the target exactly. Otherwise `target - N` images are drawn with
/// replacement and the result has exactly `target` images.
pub fn spawn(
    manifest: &DatasetManifest,
    config: &SpawnConfig,
) -> Result<DatasetManifest, ManifestError> {
    let n = manifest.images.len();
    config.validate(n)?;

    let extra = match &config.instance_weights {
        Some(weights) => {
            let total: f64 = weights.iter().sum();
            let images = manifest
                .images
                .iter()
                .zip(weights)
                .flat_map(|(image, w)| {
                    let copies = ((w / total) * config.target_size as f64).round() as i64 - 1;
                    std::iter::repeat(image).take(copies.max(0) as usize)
                })
                .cloned()
                .collect();
            DatasetManifest {
                images,
                ..manifest.clone()
            }
        }
        None => {
            let weights = match &config.balanced {
                Some(balanced) => Some(
                    BalancedInstanceWeightsGenerator::new(balanced.clone()).generate(manifest)?,
                ),
                None => None,
            };
            sample_by_num_samples(
                manifest,
                &SampleByNumSamplesConfig {
                    n_samples: config.target_size - n,
                    with_replacement: true,
                    weights,
                    seed: config.seed,
                },
            )?
        }
    };

    let spawned = merge_manifests(&[manifest, &extra])?;
    tracing::info!(
        source = n,
        target = config.target_size,
        images = spawned.images.len(),
        weighted = config.instance_weights.is_some(),
        "spawned manifest"
    );
    Ok(spawned)
}
