//! Manifest-to-manifest operations.
//!
//! Every operation reads its inputs and returns new manifests; inputs are
//! never modified. Randomized operations take an explicit seed.
//!
//! Strategy dispatch goes through an [`OperationRegistry`], which maps a
//! [`MergeKind`] to a [`MergeStrategy`] and a [`SampleKind`] to a
//! [`Sampler`].

mod filter;
mod merge;
mod sample;
mod spawn;
mod split;
mod weights;

pub use filter::{
    filter_images, filter_negative_annotations, ImageFilter, NoAnnotationFilter, RemoveCategories,
};
pub use merge::{
    merge_additional_info, merge_manifests, IndependentImagesMerge, MergeKind, MergeStrategy,
    MultiImageLabelMerge, MultitaskMerge,
};
pub use sample::{
    sample_by_num_samples, sample_few_shots_subset_greedy, sample_multi_image_by_num_samples,
    sample_subset_by_ratio, SampleByNumSamples, SampleByNumSamplesConfig, SampleByRatio,
    SampleByRatioConfig, SampleConfig, SampleFewShot, SampleFewShotConfig, SampleKind, Sampler,
};
pub use spawn::{spawn, SpawnConfig};
pub use split::{split, SplitConfig};
pub use weights::{BalancedInstanceWeightsGenerator, BalancedWeightsConfig};

use std::collections::BTreeMap;

use crate::error::ManifestError;
use crate::manifest::DatasetManifest;

/// Strategy tables for merging and sampling.
pub struct OperationRegistry {
    mergers: BTreeMap<MergeKind, Box<dyn MergeStrategy>>,
    samplers: BTreeMap<SampleKind, Box<dyn Sampler>>,
}

impl OperationRegistry {
    pub fn empty() -> Self {
        Self {
            mergers: BTreeMap::new(),
            samplers: BTreeMap::new(),
        }
    }

    /// Built-in merge strategies and samplers.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register_merger(Box::new(IndependentImagesMerge));
        registry.register_merger(Box::new(MultitaskMerge));
        registry.register_sampler(Box::new(SampleByNumSamples));
        registry.register_sampler(Box::new(SampleFewShot));
        registry.register_sampler(Box::new(SampleByRatio));
        registry
    }

    pub fn register_merger(&mut self, merger: Box<dyn MergeStrategy>) {
        self.mergers.insert(merger.kind(), merger);
    }

    pub fn register_sampler(&mut self, sampler: Box<dyn Sampler>) {
        self.samplers.insert(sampler.kind(), sampler);
    }

    pub fn merger(&self, kind: MergeKind) -> Result<&dyn MergeStrategy, ManifestError> {
        self.mergers
            .get(&kind)
            .map(|m| m.as_ref())
            .ok_or_else(|| ManifestError::precondition(format!("no merge strategy for {:?}", kind)))
    }

    pub fn sampler(&self, kind: SampleKind) -> Result<&dyn Sampler, ManifestError> {
        self.samplers
            .get(&kind)
            .map(|s| s.as_ref())
            .ok_or_else(|| ManifestError::precondition(format!("no sampler for {:?}", kind)))
    }

    /// Merges with the strategy chosen by the first input's data type.
    pub fn merge(&self, manifests: &[&DatasetManifest]) -> Result<DatasetManifest, ManifestError> {
        let first = manifests
            .first()
            .ok_or_else(|| ManifestError::precondition("nothing to merge"))?;
        self.merger(MergeKind::of(&first.data_type))?.merge(manifests)
    }

    pub fn sample(
        &self,
        manifest: &DatasetManifest,
        config: &SampleConfig,
    ) -> Result<DatasetManifest, ManifestError> {
        self.sampler(config.kind())?.sample(manifest, config)
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{
        AdditionalInfo, Categories, CategoryManifest, ImageDataManifest, LabelManifest, TaskType,
    };

    fn manifest() -> DatasetManifest {
        DatasetManifest::new(
            (0..6usize)
                .map(|i| {
                    ImageDataManifest::new(i, format!("{}.jpg", i))
                        .with_labels(vec![LabelManifest::classification(i % 2)])
                })
                .collect(),
            Categories::Single(vec![CategoryManifest::new(0, "a"), CategoryManifest::new(1, "b")]),
            TaskType::ClassificationMulticlass.into(),
            AdditionalInfo::new(),
        )
        .expect("manifest")
    }

    #[test]
    fn registry_dispatches_samplers_by_kind() {
        let registry = OperationRegistry::standard();
        let source = manifest();
        let sampled = registry
            .sample(
                &source,
                &SampleConfig::FewShot(SampleFewShotConfig {
                    n_shots: 1,
                    seed: 0,
                }),
            )
            .expect("sample");
        assert_eq!(sampled.len(), 2);
    }

    #[test]
    fn registry_merges_by_data_type() {
        let registry = OperationRegistry::standard();
        let source = manifest();
        let merged = registry.merge(&[&source, &source]).expect("merge");
        assert_eq!(merged.len(), 12);
        assert_eq!(merged.categories.single().len(), 2);
    }

    #[test]
    fn empty_registry_has_no_strategies() {
        let registry = OperationRegistry::empty();
        assert!(registry.sampler(SampleKind::Ratio).is_err());
        assert!(registry.merge(&[&manifest()]).is_err());
    }
}
