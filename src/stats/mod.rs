//! Manifest statistics.
//!
//! [`CategoryIndex`] flattens a manifest's categories into one slot space
//! (per-task categories are laid out task by task), which is what the
//! balancing operations count over. [`stats_manifest`] builds the report
//! shown by `visionmanifest inspect`.

mod report;

pub use report::{CategoryCount, StatsReport};

use std::collections::{BTreeMap, BTreeSet};

use crate::manifest::{
    AnyManifest, Categories, DatasetManifest, DatasetManifestWithMultiImageLabel,
    ImageDataManifest, ImageLabels,
};

/// Flat numbering of every category of a manifest.
///
/// Single-task manifests use category positions directly. Multitask manifests
/// give each task a contiguous range, in task-name order, and name slots
/// `"{task}_{category}"`.
#[derive(Clone, Debug, Default)]
pub struct CategoryIndex {
    names: Vec<String>,
    offsets: BTreeMap<String, usize>,
}

impl CategoryIndex {
    pub fn new(manifest: &DatasetManifest) -> Self {
        match &manifest.categories {
            Categories::None => Self::default(),
            Categories::Single(categories) => Self {
                names: categories.iter().map(|c| c.name.clone()).collect(),
                offsets: BTreeMap::new(),
            },
            Categories::Multitask(tasks) => {
                let mut names = Vec::new();
                let mut offsets = BTreeMap::new();
                for (task, categories) in tasks {
                    offsets.insert(task.clone(), names.len());
                    names.extend(categories.iter().map(|c| format!("{}_{}", task, c.name)));
                }
                Self { names, offsets }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, slot: usize) -> Option<&str> {
        self.names.get(slot).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// One slot per category-bearing label of `image`, repeats included.
    pub fn image_slots(&self, image: &ImageDataManifest) -> Vec<usize> {
        match &image.labels {
            ImageLabels::Single(labels) => labels.iter().filter_map(|l| l.category_id()).collect(),
            ImageLabels::Multitask(per_task) => per_task
                .iter()
                .filter_map(|(task, labels)| self.offsets.get(task).map(|&off| (off, labels)))
                .flat_map(|(offset, labels)| {
                    labels
                        .iter()
                        .filter_map(move |l| l.category_id().map(|c| c + offset))
                })
                .collect(),
        }
    }

    /// Distinct category names of `image`; empty for a negative image.
    pub fn image_tags(&self, image: &ImageDataManifest) -> BTreeSet<&str> {
        self.image_slots(image)
            .into_iter()
            .filter_map(|slot| self.name(slot))
            .collect()
    }
}

/// Instances per category slot.
pub fn instance_counts(manifest: &DatasetManifest, index: &CategoryIndex) -> Vec<usize> {
    let mut counts = vec![0usize; index.len()];
    for image in &manifest.images {
        for slot in index.image_slots(image) {
            counts[slot] += 1;
        }
    }
    counts
}

/// Images per category slot.
pub fn image_counts(manifest: &DatasetManifest, index: &CategoryIndex) -> Vec<usize> {
    let mut counts = vec![0usize; index.len()];
    for image in &manifest.images {
        let distinct: BTreeSet<usize> = index.image_slots(image).into_iter().collect();
        for slot in distinct {
            counts[slot] += 1;
        }
    }
    counts
}

/// Compute the report for either manifest flavor.
pub fn stats_manifest(manifest: &AnyManifest) -> StatsReport {
    match manifest {
        AnyManifest::SingleImage(m) => stats_single_image(m),
        AnyManifest::MultiImage(m) => stats_multi_image(m),
    }
}

fn stats_single_image(manifest: &DatasetManifest) -> StatsReport {
    let index = CategoryIndex::new(manifest);
    let instances = instance_counts(manifest, &index);
    let images = image_counts(manifest, &index);

    let mut categories: Vec<CategoryCount> = index
        .names()
        .iter()
        .zip(instances.into_iter().zip(images))
        .map(|(name, (instances, images))| CategoryCount {
            name: name.clone(),
            instances,
            images,
        })
        .collect();
    categories.sort_by(|a, b| b.instances.cmp(&a.instances).then_with(|| a.name.cmp(&b.name)));

    StatsReport {
        data_type: manifest.data_type.to_string(),
        images: manifest.images.len(),
        negative_images: manifest.images.iter().filter(|i| i.is_negative()).count(),
        labels: manifest.images.iter().map(|i| i.labels.len()).sum(),
        annotations: None,
        negative_annotations: None,
        categories,
    }
}

fn stats_multi_image(manifest: &DatasetManifestWithMultiImageLabel) -> StatsReport {
    let mut referenced = vec![false; manifest.images.len()];
    for annotation in &manifest.annotations {
        for &index in &annotation.img_ids {
            if let Some(flag) = referenced.get_mut(index) {
                *flag = true;
            }
        }
    }

    StatsReport {
        data_type: manifest.data_type.to_string(),
        images: manifest.images.len(),
        negative_images: referenced.iter().filter(|r| !**r).count(),
        labels: manifest
            .annotations
            .iter()
            .filter_map(|a| a.label_data.as_ref())
            .map(|l| l.fields.len())
            .sum(),
        annotations: Some(manifest.annotations.len()),
        negative_annotations: Some(
            manifest
                .annotations
                .iter()
                .filter(|a| a.is_negative())
                .count(),
        ),
        categories: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{
        AdditionalInfo, BBox, CategoryManifest, DataType, LabelManifest, TaskType,
    };

    fn detection_manifest() -> DatasetManifest {
        let bbox = BBox::from_ltrb(0.0, 0.0, 10.0, 10.0);
        DatasetManifest::new(
            vec![
                ImageDataManifest::new(1u64, "a.jpg").with_labels(vec![
                    LabelManifest::detection(0, bbox),
                    LabelManifest::detection(0, bbox),
                    LabelManifest::detection(1, bbox),
                ]),
                ImageDataManifest::new(2u64, "b.jpg")
                    .with_labels(vec![LabelManifest::detection(1, bbox)]),
                ImageDataManifest::new(3u64, "c.jpg"),
            ],
            Categories::Single(vec![
                CategoryManifest::new(0, "person"),
                CategoryManifest::new(1, "car"),
            ]),
            TaskType::ObjectDetection.into(),
            AdditionalInfo::new(),
        )
        .expect("manifest")
    }

    #[test]
    fn counts_instances_and_images() {
        let manifest = detection_manifest();
        let index = CategoryIndex::new(&manifest);
        assert_eq!(instance_counts(&manifest, &index), vec![2, 2]);
        assert_eq!(image_counts(&manifest, &index), vec![1, 2]);
    }

    #[test]
    fn negative_images_have_no_tags() {
        let manifest = detection_manifest();
        let index = CategoryIndex::new(&manifest);
        assert!(index.image_tags(&manifest.images[2]).is_empty());
        assert_eq!(
            index.image_tags(&manifest.images[0]),
            BTreeSet::from(["car", "person"])
        );
    }

    #[test]
    fn multitask_slots_are_namespaced() {
        let manifest = DatasetManifest::new(
            vec![ImageDataManifest::new(1u64, "a.jpg").with_task_labels(BTreeMap::from([
                ("color".to_string(), vec![LabelManifest::classification(1)]),
                ("shape".to_string(), vec![LabelManifest::classification(0)]),
            ]))],
            Categories::Multitask(BTreeMap::from([
                (
                    "color".to_string(),
                    vec![CategoryManifest::new(0, "red"), CategoryManifest::new(1, "blue")],
                ),
                ("shape".to_string(), vec![CategoryManifest::new(0, "round")]),
            ])),
            DataType::Multitask(BTreeMap::from([
                ("color".to_string(), TaskType::ClassificationMulticlass),
                ("shape".to_string(), TaskType::ClassificationMulticlass),
            ])),
            AdditionalInfo::new(),
        )
        .expect("manifest");
        let index = CategoryIndex::new(&manifest);
        assert_eq!(index.names(), &["color_red", "color_blue", "shape_round"]);
        assert_eq!(index.image_slots(&manifest.images[0]), vec![1, 2]);
    }

    #[test]
    fn report_sorts_categories_by_instances() {
        let report = stats_manifest(&AnyManifest::SingleImage(detection_manifest()));
        assert_eq!(report.images, 3);
        assert_eq!(report.negative_images, 1);
        assert_eq!(report.labels, 4);
        assert_eq!(report.categories[0].name, "car");
    }
}
