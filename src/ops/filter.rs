//! Dropping images, annotations and categories.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ManifestError;
use crate::manifest::{
    Categories, CategoryManifest, DatasetManifest, DatasetManifestWithMultiImageLabel,
    ImageDataManifest, ImageLabels, LabelManifest, MultiImageLabelManifest,
};

/// Decides whether an image leaves the manifest. The owning manifest is
/// passed for context.
pub trait ImageFilter {
    fn should_drop(&self, image: &ImageDataManifest, manifest: &DatasetManifest) -> bool;
}

/// Drops images without labels.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAnnotationFilter;

impl ImageFilter for NoAnnotationFilter {
    fn should_drop(&self, image: &ImageDataManifest, _manifest: &DatasetManifest) -> bool {
        image.is_negative()
    }
}

impl<F> ImageFilter for F
where
    F: Fn(&ImageDataManifest, &DatasetManifest) -> bool,
{
    fn should_drop(&self, image: &ImageDataManifest, manifest: &DatasetManifest) -> bool {
        self(image, manifest)
    }
}

/// Keeps every image `filter` does not drop.
pub fn filter_images(manifest: &DatasetManifest, filter: &dyn ImageFilter) -> DatasetManifest {
    let images: Vec<ImageDataManifest> = manifest
        .images
        .iter()
        .filter(|image| !filter.should_drop(image, manifest))
        .cloned()
        .collect();
    tracing::info!(
        before = manifest.images.len(),
        after = images.len(),
        "filtered images"
    );
    DatasetManifest {
        images,
        categories: manifest.categories.clone(),
        data_type: manifest.data_type.clone(),
        additional_info: manifest.additional_info.clone(),
    }
}

/// Drops negative annotations and renumbers the rest from 1. Images are kept.
pub fn filter_negative_annotations(
    manifest: &DatasetManifestWithMultiImageLabel,
) -> DatasetManifestWithMultiImageLabel {
    let annotations: Vec<MultiImageLabelManifest> = manifest
        .annotations
        .iter()
        .filter(|annotation| !annotation.is_negative())
        .enumerate()
        .map(|(i, annotation)| MultiImageLabelManifest {
            id: i + 1,
            ..annotation.clone()
        })
        .collect();
    tracing::info!(
        before = manifest.annotations.len(),
        after = annotations.len(),
        "filtered negative annotations"
    );
    DatasetManifestWithMultiImageLabel {
        annotations,
        ..manifest.clone()
    }
}

/// Deletes categories by name, along with the labels that use them.
#[derive(Clone, Debug, Default)]
pub struct RemoveCategories {
    names: BTreeSet<String>,
}

impl RemoveCategories {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Applies the removal. Multitask manifests apply the names to every task.
    pub fn apply(&self, manifest: &DatasetManifest) -> Result<DatasetManifest, ManifestError> {
        if self.names.is_empty() {
            return Ok(manifest.clone());
        }

        let result = match &manifest.categories {
            Categories::None => manifest.clone(),
            Categories::Single(categories) => {
                let (remap, kept) = self.remap(categories);
                let images = manifest
                    .images
                    .iter()
                    .map(|image| {
                        Ok(ImageDataManifest {
                            labels: ImageLabels::Single(relabel(image.single_labels(), &remap)?),
                            ..image.clone()
                        })
                    })
                    .collect::<Result<Vec<_>, ManifestError>>()?;
                DatasetManifest::new(
                    images,
                    Categories::Single(kept),
                    manifest.data_type.clone(),
                    manifest.additional_info.clone(),
                )?
            }
            Categories::Multitask(tasks) => {
                let mut remaps = BTreeMap::new();
                let mut kept_tasks = BTreeMap::new();
                for (task, categories) in tasks {
                    let (remap, kept) = self.remap(categories);
                    remaps.insert(task.as_str(), remap);
                    kept_tasks.insert(task.clone(), kept);
                }
                let mut images = Vec::with_capacity(manifest.images.len());
                for image in &manifest.images {
                    let labels = match &image.labels {
                        ImageLabels::Multitask(per_task) => {
                            let mut relabeled = BTreeMap::new();
                            for (task, labels) in per_task {
                                let remap = remaps
                                    .get(task.as_str())
                                    .map(Vec::as_slice)
                                    .unwrap_or(&[]);
                                relabeled.insert(task.clone(), relabel(labels, remap)?);
                            }
                            ImageLabels::Multitask(relabeled)
                        }
                        ImageLabels::Single(labels) => ImageLabels::Single(labels.clone()),
                    };
                    images.push(ImageDataManifest {
                        labels,
                        ..image.clone()
                    });
                }
                DatasetManifest::new(
                    images,
                    Categories::Multitask(kept_tasks),
                    manifest.data_type.clone(),
                    manifest.additional_info.clone(),
                )?
            }
        };

        tracing::info!(
            removed = ?self.names,
            labels_before = manifest.images.iter().map(|i| i.labels.len()).sum::<usize>(),
            labels_after = result.images.iter().map(|i| i.labels.len()).sum::<usize>(),
            "removed categories"
        );
        Ok(result)
    }

    /// Old position → new position (`None` when removed), plus the kept
    /// categories renumbered in order.
    fn remap(
        &self,
        categories: &[CategoryManifest],
    ) -> (Vec<Option<usize>>, Vec<CategoryManifest>) {
        let mut remap = Vec::with_capacity(categories.len());
        let mut kept = Vec::new();
        for category in categories {
            if self.names.contains(&category.name) {
                remap.push(None);
            } else {
                remap.push(Some(kept.len()));
                kept.push(CategoryManifest {
                    id: kept.len(),
                    ..category.clone()
                });
            }
        }
        (remap, kept)
    }
}

fn relabel(
    labels: &[LabelManifest],
    remap: &[Option<usize>],
) -> Result<Vec<LabelManifest>, ManifestError> {
    let mut out = Vec::with_capacity(labels.len());
    for label in labels {
        match label.category_id() {
            None => out.push(label.clone()),
            Some(old) => {
                if let Some(new) = remap.get(old).copied().flatten() {
                    out.push(label.with_category_id(new)?);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{AdditionalInfo, BBox, DataType, KeyValuePairLabel, TaskType};

    fn detection() -> DatasetManifest {
        let bbox = BBox::from_ltrb(0.0, 0.0, 5.0, 5.0);
        DatasetManifest::new(
            vec![
                ImageDataManifest::new(1u64, "a.jpg").with_labels(vec![
                    LabelManifest::detection(0, bbox),
                    LabelManifest::detection(1, bbox),
                    LabelManifest::detection(2, bbox),
                ]),
                ImageDataManifest::new(2u64, "b.jpg")
                    .with_labels(vec![LabelManifest::detection(1, bbox)]),
                ImageDataManifest::new(3u64, "c.jpg"),
            ],
            Categories::Single(vec![
                CategoryManifest::new(0, "cat"),
                CategoryManifest::new(1, "dog"),
                CategoryManifest::new(2, "bird"),
            ]),
            TaskType::ObjectDetection.into(),
            AdditionalInfo::new(),
        )
        .expect("manifest")
    }

    #[test]
    fn no_annotation_filter_drops_negatives() {
        let filtered = filter_images(&detection(), &NoAnnotationFilter);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn closures_work_as_filters() {
        let drop_busy = |image: &ImageDataManifest, _: &DatasetManifest| image.labels.len() > 2;
        let filtered = filter_images(&detection(), &drop_busy);
        assert_eq!(filtered.len(), 2);
    }

    #[test]
    fn removing_a_category_shifts_later_ones() {
        let result = RemoveCategories::new(["dog"]).apply(&detection()).expect("remove");
        let names: Vec<(usize, &str)> = result
            .categories
            .single()
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();
        assert_eq!(names, vec![(0, "cat"), (1, "bird")]);

        let first: Vec<Option<usize>> = result.images[0]
            .single_labels()
            .iter()
            .map(LabelManifest::category_id)
            .collect();
        assert_eq!(first, vec![Some(0), Some(1)]);
        assert!(result.images[1].is_negative());
    }

    #[test]
    fn empty_removal_is_a_noop() {
        let source = detection();
        let result = RemoveCategories::new(Vec::<String>::new())
            .apply(&source)
            .expect("remove");
        assert_eq!(result, source);
    }

    #[test]
    fn removal_applies_to_every_task() {
        let manifest = DatasetManifest::new(
            vec![ImageDataManifest::new(1u64, "a.jpg").with_task_labels(BTreeMap::from([
                ("a".to_string(), vec![LabelManifest::classification(1)]),
                ("b".to_string(), vec![LabelManifest::classification(0)]),
            ]))],
            Categories::Multitask(BTreeMap::from([
                (
                    "a".to_string(),
                    vec![CategoryManifest::new(0, "x"), CategoryManifest::new(1, "y")],
                ),
                ("b".to_string(), vec![CategoryManifest::new(0, "x")]),
            ])),
            DataType::Multitask(BTreeMap::from([
                ("a".to_string(), TaskType::ClassificationMultilabel),
                ("b".to_string(), TaskType::ClassificationMultilabel),
            ])),
            AdditionalInfo::new(),
        )
        .expect("manifest");
        let result = RemoveCategories::new(["x"]).apply(&manifest).expect("remove");
        assert_eq!(result.categories.task("a").len(), 1);
        assert!(result.categories.task("b").is_empty());
        assert_eq!(result.images[0].task_labels("a")[0].category_id(), Some(0));
        assert!(result.images[0].task_labels("b").is_empty());
    }

    #[test]
    fn negative_annotations_are_dropped_and_renumbered() {
        let manifest = DatasetManifestWithMultiImageLabel::new(
            vec![ImageDataManifest::new(1u64, "a.jpg")],
            vec![
                MultiImageLabelManifest::new(5, vec![0], None),
                MultiImageLabelManifest::new(6, vec![0], Some(KeyValuePairLabel::default())),
            ],
            TaskType::KeyValuePair,
            None,
            AdditionalInfo::new(),
        )
        .expect("manifest");
        let filtered = filter_negative_annotations(&manifest);
        assert_eq!(filtered.annotations.len(), 1);
        assert_eq!(filtered.annotations[0].id, 1);
        assert_eq!(filtered.images.len(), 1);
    }
}
