//! Sampling: by target count, few-shot greedy, and by ratio.

use rand::seq::SliceRandom;
use rand::{rngs::StdRng, Rng, RngExt, SeedableRng};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::ManifestError;
use crate::manifest::{
    DatasetManifest, DatasetManifestWithMultiImageLabel, ImageDataManifest, MultiImageLabelManifest,
};
use crate::stats::CategoryIndex;

/// Sampling strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SampleKind {
    NumSamples,
    FewShot,
    Ratio,
}

/// Options for drawing a fixed number of images.
#[derive(Clone, Debug, Default)]
pub struct SampleByNumSamplesConfig {
    pub n_samples: usize,
    pub with_replacement: bool,
    /// Per-image weights; normalized before drawing. Uniform when `None`.
    pub weights: Option<Vec<f64>>,
    pub seed: u64,
}

impl SampleByNumSamplesConfig {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.n_samples == 0 {
            return Err(ManifestError::precondition("n_samples must be greater than 0"));
        }
        if let Some(weights) = &self.weights {
            if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                return Err(ManifestError::precondition(
                    "weights must be finite and non-negative",
                ));
            }
            if weights.iter().sum::<f64>() <= 0.0 {
                return Err(ManifestError::precondition("weights must not all be zero"));
            }
        }
        Ok(())
    }
}

/// Options for few-shot sampling.
#[derive(Clone, Debug)]
pub struct SampleFewShotConfig {
    /// Minimum instances required per category.
    pub n_shots: usize,
    pub seed: u64,
}

impl Default for SampleFewShotConfig {
    fn default() -> Self {
        Self {
            n_shots: 1,
            seed: 0,
        }
    }
}

impl SampleFewShotConfig {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.n_shots == 0 {
            return Err(ManifestError::precondition("n_shots must be greater than 0"));
        }
        Ok(())
    }
}

/// Options for per-category ratio sampling.
#[derive(Clone, Debug)]
pub struct SampleByRatioConfig {
    pub ratio: f64,
    pub seed: u64,
}

impl Default for SampleByRatioConfig {
    fn default() -> Self {
        Self {
            ratio: 0.1,
            seed: 0,
        }
    }
}

impl SampleByRatioConfig {
    pub fn validate(&self) -> Result<(), ManifestError> {
        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return Err(ManifestError::precondition(format!(
                "sample ratio must be in (0, 1], got {}",
                self.ratio
            )));
        }
        Ok(())
    }
}

/// Options for one sampling run, tagged by strategy.
#[derive(Clone, Debug)]
pub enum SampleConfig {
    NumSamples(SampleByNumSamplesConfig),
    FewShot(SampleFewShotConfig),
    Ratio(SampleByRatioConfig),
}

impl SampleConfig {
    pub fn kind(&self) -> SampleKind {
        match self {
            SampleConfig::NumSamples(_) => SampleKind::NumSamples,
            SampleConfig::FewShot(_) => SampleKind::FewShot,
            SampleConfig::Ratio(_) => SampleKind::Ratio,
        }
    }
}

/// A sampling strategy over single-image-label manifests.
pub trait Sampler: Send + Sync {
    fn kind(&self) -> SampleKind;

    fn sample(
        &self,
        manifest: &DatasetManifest,
        config: &SampleConfig,
    ) -> Result<DatasetManifest, ManifestError>;
}

fn wrong_config(expected: SampleKind, config: &SampleConfig) -> ManifestError {
    ManifestError::precondition(format!(
        "{:?} sampler was given {:?} options",
        expected,
        config.kind()
    ))
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SampleByNumSamples;

impl Sampler for SampleByNumSamples {
    fn kind(&self) -> SampleKind {
        SampleKind::NumSamples
    }

    fn sample(
        &self,
        manifest: &DatasetManifest,
        config: &SampleConfig,
    ) -> Result<DatasetManifest, ManifestError> {
        match config {
            SampleConfig::NumSamples(config) => sample_by_num_samples(manifest, config),
            other => Err(wrong_config(self.kind(), other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SampleFewShot;

impl Sampler for SampleFewShot {
    fn kind(&self) -> SampleKind {
        SampleKind::FewShot
    }

    fn sample(
        &self,
        manifest: &DatasetManifest,
        config: &SampleConfig,
    ) -> Result<DatasetManifest, ManifestError> {
        match config {
            SampleConfig::FewShot(config) => sample_few_shots_subset_greedy(manifest, config),
            other => Err(wrong_config(self.kind(), other)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SampleByRatio;

impl Sampler for SampleByRatio {
    fn kind(&self) -> SampleKind {
        SampleKind::Ratio
    }

    fn sample(
        &self,
        manifest: &DatasetManifest,
        config: &SampleConfig,
    ) -> Result<DatasetManifest, ManifestError> {
        match config {
            SampleConfig::Ratio(config) => sample_subset_by_ratio(manifest, config),
            other => Err(wrong_config(self.kind(), other)),
        }
    }
}

// ============================================================================
// Drawing
// ============================================================================

/// Draws `n` indices from `0..len`, each with probability proportional to its
/// weight when weights are given.
fn draw_indices(
    len: usize,
    n: usize,
    with_replacement: bool,
    weights: Option<&[f64]>,
    seed: u64,
) -> Result<Vec<usize>, ManifestError> {
    if let Some(weights) = weights {
        if weights.len() != len {
            return Err(ManifestError::precondition(format!(
                "got {} weights for {} items",
                weights.len(),
                len
            )));
        }
    }
    // Zero-weight images are never drawn.
    let available = weights.map_or(len, |w| w.iter().filter(|&&w| w > 0.0).count());
    if !with_replacement && n > available {
        return Err(ManifestError::InsufficientImages {
            requested: n,
            available,
        });
    }
    if len == 0 {
        return Err(ManifestError::InsufficientImages {
            requested: n,
            available: 0,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let drawn = match (weights, with_replacement) {
        (None, true) => (0..n).map(|_| rng.random_range(0..len)).collect(),
        (None, false) => {
            let mut indices: Vec<usize> = (0..len).collect();
            indices.shuffle(&mut rng);
            indices.truncate(n);
            indices
        }
        (Some(weights), true) => {
            let total: f64 = weights.iter().sum();
            let probabilities: Vec<f64> = weights.iter().map(|w| w / total).collect();
            (0..n)
                .map(|_| weighted_pick(&probabilities, &mut rng))
                .collect()
        }
        (Some(weights), false) => {
            let mut candidates: Vec<(usize, f64)> = weights
                .iter()
                .copied()
                .enumerate()
                .filter(|(_, w)| *w > 0.0)
                .collect();
            let mut selected = Vec::with_capacity(n);
            weighted_sample_without_replacement(&mut candidates, n, &mut selected, &mut rng);
            selected
        }
    };
    Ok(drawn)
}

fn weighted_pick<R: Rng + ?Sized>(probabilities: &[f64], rng: &mut R) -> usize {
    let mut draw = rng.random::<f64>();
    let mut last = 0;
    for (i, &p) in probabilities.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        last = i;
        draw -= p;
        if draw < 0.0 {
            return i;
        }
    }
    last
}

fn weighted_sample_without_replacement<R: Rng + ?Sized>(
    candidates: &mut Vec<(usize, f64)>,
    k: usize,
    selected: &mut Vec<usize>,
    rng: &mut R,
) {
    while selected.len() < k && !candidates.is_empty() {
        let total_weight: f64 = candidates.iter().map(|(_, w)| w).sum();
        let mut draw = rng.random::<f64>() * total_weight;
        let mut pick_index = candidates.len() - 1;
        for (i, (_, weight)) in candidates.iter().enumerate() {
            draw -= weight;
            if draw <= 0.0 {
                pick_index = i;
                break;
            }
        }

        let (item, _) = candidates.swap_remove(pick_index);
        selected.push(item);
    }
}

fn with_images(manifest: &DatasetManifest, images: Vec<ImageDataManifest>) -> DatasetManifest {
    DatasetManifest {
        images,
        categories: manifest.categories.clone(),
        data_type: manifest.data_type.clone(),
        additional_info: manifest.additional_info.clone(),
    }
}

// ============================================================================
// Strategies
// ============================================================================

/// Draws `n_samples` images, keeping their ids. Draws with replacement may
/// repeat an image.
pub fn sample_by_num_samples(
    manifest: &DatasetManifest,
    config: &SampleByNumSamplesConfig,
) -> Result<DatasetManifest, ManifestError> {
    config.validate()?;
    let indices = draw_indices(
        manifest.images.len(),
        config.n_samples,
        config.with_replacement,
        config.weights.as_deref(),
        config.seed,
    )?;
    let images = indices
        .into_iter()
        .map(|i| manifest.images[i].clone())
        .collect();
    let sampled = with_images(manifest, images);
    tracing::info!(
        strategy = "num_samples",
        seed = config.seed,
        with_replacement = config.with_replacement,
        weighted = config.weights.is_some(),
        images = sampled.images.len(),
        "sampled manifest"
    );
    Ok(sampled)
}

/// Draws `n_samples` annotations of a multi-image manifest. Only referenced
/// images are kept; annotations are renumbered from 1.
pub fn sample_multi_image_by_num_samples(
    manifest: &DatasetManifestWithMultiImageLabel,
    config: &SampleByNumSamplesConfig,
) -> Result<DatasetManifestWithMultiImageLabel, ManifestError> {
    config.validate()?;
    let indices = draw_indices(
        manifest.annotations.len(),
        config.n_samples,
        config.with_replacement,
        config.weights.as_deref(),
        config.seed,
    )?;

    let mut image_positions: BTreeMap<usize, usize> = BTreeMap::new();
    let mut images = Vec::new();
    let mut annotations = Vec::with_capacity(indices.len());
    for i in indices {
        let source = &manifest.annotations[i];
        let img_ids = source
            .img_ids
            .iter()
            .map(|&old| {
                *image_positions.entry(old).or_insert_with(|| {
                    images.push(manifest.images[old].clone());
                    images.len() - 1
                })
            })
            .collect();
        annotations.push(MultiImageLabelManifest {
            id: annotations.len() + 1,
            img_ids,
            ..source.clone()
        });
    }

    let sampled = DatasetManifestWithMultiImageLabel::new(
        images,
        annotations,
        manifest.data_type,
        manifest.schema.clone(),
        manifest.additional_info.clone(),
    )?;
    tracing::info!(
        strategy = "num_samples",
        seed = config.seed,
        annotations = sampled.annotations.len(),
        images = sampled.images.len(),
        "sampled multi-image manifest"
    );
    Ok(sampled)
}

/// Entries of `counter` that are still strictly positive.
fn positive_only(counter: &BTreeMap<usize, i64>) -> BTreeMap<usize, i64> {
    counter
        .iter()
        .filter(|(_, &remaining)| remaining > 0)
        .map(|(&slot, &remaining)| (slot, remaining))
        .collect()
}

/// Greedy few-shot sampling.
///
/// Visits images in seeded-shuffle order and keeps an image when it has an
/// instance of a category that still needs some. Detection counts instances,
/// so one image may satisfy several shots. Multitask manifests count over
/// the flattened `(task, category)` slots.
pub fn sample_few_shots_subset_greedy(
    manifest: &DatasetManifest,
    config: &SampleFewShotConfig,
) -> Result<DatasetManifest, ManifestError> {
    config.validate()?;
    let index = CategoryIndex::new(manifest);
    if index.is_empty() {
        return Err(ManifestError::precondition(
            "few-shot sampling needs a manifest with categories",
        ));
    }

    let mut need: BTreeMap<usize, i64> = (0..index.len())
        .map(|slot| (slot, config.n_shots as i64))
        .collect();
    let mut order: Vec<usize> = (0..manifest.images.len()).collect();
    let mut rng = StdRng::seed_from_u64(config.seed);
    order.shuffle(&mut rng);

    let mut images = Vec::new();
    for i in order {
        let pending = positive_only(&need);
        if pending.is_empty() {
            break;
        }
        let image = &manifest.images[i];
        let slots = index.image_slots(image);
        if !slots.iter().any(|slot| pending.contains_key(slot)) {
            continue;
        }
        for slot in slots {
            if let Some(remaining) = need.get_mut(&slot) {
                *remaining -= 1;
            }
        }
        images.push(image.clone());
    }

    let unmet = positive_only(&need);
    if !unmet.is_empty() {
        let unmet: Vec<String> = unmet
            .keys()
            .filter_map(|&slot| index.name(slot).map(str::to_string))
            .collect();
        tracing::warn!(n_shots = config.n_shots, unmet = unmet.len(), "few-shot sampling failed");
        return Err(ManifestError::InsufficientSamples { unmet });
    }

    let sampled = with_images(manifest, images);
    tracing::info!(
        strategy = "few_shot",
        seed = config.seed,
        n_shots = config.n_shots,
        images = sampled.images.len(),
        "sampled manifest"
    );
    Ok(sampled)
}

/// Samples `max(1, round(|bucket| * ratio))` images from every category
/// bucket (plus a bucket of negative images) and keeps the union, in source
/// order.
pub fn sample_subset_by_ratio(
    manifest: &DatasetManifest,
    config: &SampleByRatioConfig,
) -> Result<DatasetManifest, ManifestError> {
    config.validate()?;
    let index = CategoryIndex::new(manifest);

    // `None` is the negative bucket.
    let mut buckets: BTreeMap<Option<usize>, BTreeSet<usize>> = BTreeMap::new();
    for (i, image) in manifest.images.iter().enumerate() {
        let slots = index.image_slots(image);
        if slots.is_empty() {
            buckets.entry(None).or_default().insert(i);
        }
        for slot in slots {
            buckets.entry(Some(slot)).or_default().insert(i);
        }
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut keep: BTreeSet<usize> = BTreeSet::new();
    for members in buckets.values() {
        let mut members: Vec<usize> = members.iter().copied().collect();
        let k = ((members.len() as f64 * config.ratio).round() as usize)
            .max(1)
            .min(members.len());
        members.shuffle(&mut rng);
        keep.extend(members.into_iter().take(k));
    }

    let images = keep
        .into_iter()
        .map(|i| manifest.images[i].clone())
        .collect();
    let sampled = with_images(manifest, images);
    tracing::info!(
        strategy = "ratio",
        seed = config.seed,
        ratio = config.ratio,
        buckets = buckets.len(),
        images = sampled.images.len(),
        "sampled manifest"
    );
    Ok(sampled)
}
