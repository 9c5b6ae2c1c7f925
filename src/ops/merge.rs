//! Merging manifests.
//!
//! Every merge gives images fresh 0-based ids in input order. Inputs are
//! checked before any output is built.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::ManifestError;
use crate::manifest::{
    AdditionalInfo, Categories, CategoryManifest, DataType, DatasetManifest,
    DatasetManifestWithMultiImageLabel, ImageDataManifest, ImageKey, ImageLabels, LabelManifest,
    MultiImageLabelManifest,
};

/// Which merge family applies to a data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MergeKind {
    IndependentImages,
    Multitask,
}

impl MergeKind {
    pub fn of(data_type: &DataType) -> Self {
        match data_type {
            DataType::Single(_) => MergeKind::IndependentImages,
            DataType::Multitask(_) => MergeKind::Multitask,
        }
    }
}

/// Combines several single-image-label manifests into one.
pub trait MergeStrategy: Send + Sync {
    fn kind(&self) -> MergeKind;

    fn merge(&self, manifests: &[&DatasetManifest]) -> Result<DatasetManifest, ManifestError>;
}

/// Concatenates images and unions categories by name.
#[derive(Clone, Copy, Debug, Default)]
pub struct IndependentImagesMerge;

impl MergeStrategy for IndependentImagesMerge {
    fn kind(&self) -> MergeKind {
        MergeKind::IndependentImages
    }

    fn merge(&self, manifests: &[&DatasetManifest]) -> Result<DatasetManifest, ManifestError> {
        let first = first_of(manifests)?;
        let DataType::Single(task) = first.data_type else {
            return Err(ManifestError::precondition(
                "independent-images merge does not accept multitask manifests",
            ));
        };
        if let Some(other) = manifests.iter().find(|m| m.data_type != first.data_type) {
            return Err(ManifestError::precondition(format!(
                "cannot merge {} with {}",
                first.data_type, other.data_type
            )));
        }

        // Union by name; the first occurrence fixes the position.
        let mut categories: Vec<CategoryManifest> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut remaps: Vec<Vec<usize>> = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            let remap = manifest
                .categories
                .single()
                .iter()
                .map(|category| {
                    *by_name.entry(category.name.clone()).or_insert_with(|| {
                        let position = categories.len();
                        categories.push(CategoryManifest {
                            id: position,
                            ..category.clone()
                        });
                        position
                    })
                })
                .collect();
            remaps.push(remap);
        }

        let mut images = Vec::with_capacity(manifests.iter().map(|m| m.len()).sum());
        for (manifest, remap) in manifests.iter().zip(&remaps) {
            for image in &manifest.images {
                let labels = image
                    .single_labels()
                    .iter()
                    .map(|label| remap_label(label, remap))
                    .collect::<Result<Vec<_>, _>>()?;
                images.push(ImageDataManifest {
                    id: ImageKey::from(images.len()),
                    labels: ImageLabels::Single(labels),
                    ..image.clone()
                });
            }
        }

        let merged = DatasetManifest::new(
            images,
            if task.has_categories() {
                Categories::Single(categories)
            } else {
                Categories::None
            },
            first.data_type.clone(),
            merge_additional_info(manifests.iter().map(|m| &m.additional_info)),
        )?;
        tracing::info!(
            task = %task,
            inputs = manifests.len(),
            images = merged.images.len(),
            categories = merged.categories.single().len(),
            "merged manifests"
        );
        Ok(merged)
    }
}

fn remap_label(label: &LabelManifest, remap: &[usize]) -> Result<LabelManifest, ManifestError> {
    match label.category_id() {
        Some(old) => {
            let new = remap.get(old).copied().ok_or_else(|| {
                ManifestError::precondition(format!("label references missing category {}", old))
            })?;
            label.with_category_id(new)
        }
        None => Ok(label.clone()),
    }
}

/// Concatenates images of multitask manifests that agree on tasks and
/// categories.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultitaskMerge;

impl MergeStrategy for MultitaskMerge {
    fn kind(&self) -> MergeKind {
        MergeKind::Multitask
    }

    fn merge(&self, manifests: &[&DatasetManifest]) -> Result<DatasetManifest, ManifestError> {
        let first = first_of(manifests)?;
        if !first.is_multitask() {
            return Err(ManifestError::precondition(
                "multitask merge needs multitask manifests",
            ));
        }
        for other in &manifests[1..] {
            if other.data_type != first.data_type {
                return Err(ManifestError::precondition(format!(
                    "task sets differ: {} vs {}",
                    first.data_type, other.data_type
                )));
            }
            if other.categories != first.categories {
                return Err(ManifestError::precondition(
                    "multitask manifests disagree on categories",
                ));
            }
        }

        let images = manifests
            .iter()
            .flat_map(|m| m.images.iter())
            .enumerate()
            .map(|(i, image)| ImageDataManifest {
                id: ImageKey::from(i),
                ..image.clone()
            })
            .collect();

        let merged = DatasetManifest::new(
            images,
            first.categories.clone(),
            first.data_type.clone(),
            merge_additional_info(manifests.iter().map(|m| &m.additional_info)),
        )?;
        tracing::info!(
            tasks = %merged.data_type,
            inputs = manifests.len(),
            images = merged.images.len(),
            "merged multitask manifests"
        );
        Ok(merged)
    }
}

/// Merges manifests with the strategy their data type calls for.
pub fn merge_manifests(manifests: &[&DatasetManifest]) -> Result<DatasetManifest, ManifestError> {
    let first = first_of(manifests)?;
    match MergeKind::of(&first.data_type) {
        MergeKind::IndependentImages => IndependentImagesMerge.merge(manifests),
        MergeKind::Multitask => MultitaskMerge.merge(manifests),
    }
}

/// Merges multi-image manifests: images are concatenated, `img_ids` remapped
/// per source, and annotations renumbered from 1.
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiImageLabelMerge;

impl MultiImageLabelMerge {
    pub fn merge(
        &self,
        manifests: &[&DatasetManifestWithMultiImageLabel],
    ) -> Result<DatasetManifestWithMultiImageLabel, ManifestError> {
        let first = manifests
            .first()
            .ok_or_else(|| ManifestError::precondition("nothing to merge"))?;
        for other in &manifests[1..] {
            if other.data_type != first.data_type {
                return Err(ManifestError::precondition(format!(
                    "cannot merge {} with {}",
                    first.data_type, other.data_type
                )));
            }
            if other.schema != first.schema {
                return Err(ManifestError::precondition(
                    "key-value-pair schemas differ between inputs",
                ));
            }
        }

        let mut images = Vec::new();
        let mut annotations = Vec::new();
        for manifest in manifests {
            // Positions shift by the images already taken.
            let offset = images.len();
            for image in &manifest.images {
                images.push(ImageDataManifest {
                    id: ImageKey::from(images.len()),
                    ..image.clone()
                });
            }
            for annotation in &manifest.annotations {
                annotations.push(MultiImageLabelManifest {
                    id: annotations.len() + 1,
                    img_ids: annotation.img_ids.iter().map(|i| i + offset).collect(),
                    ..annotation.clone()
                });
            }
        }

        let merged = DatasetManifestWithMultiImageLabel::new(
            images,
            annotations,
            first.data_type,
            first.schema.clone(),
            merge_additional_info(manifests.iter().map(|m| &m.additional_info)),
        )?;
        tracing::info!(
            inputs = manifests.len(),
            images = merged.images.len(),
            annotations = merged.annotations.len(),
            "merged multi-image manifests"
        );
        Ok(merged)
    }
}

fn first_of<'a>(manifests: &[&'a DatasetManifest]) -> Result<&'a DatasetManifest, ManifestError> {
    manifests
        .first()
        .copied()
        .ok_or_else(|| ManifestError::precondition("nothing to merge"))
}

/// Deep-merges maps in order; later values win, nested objects merge key-wise.
pub fn merge_additional_info<'a>(
    infos: impl IntoIterator<Item = &'a AdditionalInfo>,
) -> AdditionalInfo {
    let mut merged = AdditionalInfo::new();
    for info in infos {
        deep_merge(&mut merged, info);
    }
    merged
}

fn deep_merge(target: &mut AdditionalInfo, source: &AdditionalInfo) {
    for (key, value) in source {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}
