//! The single-image-label dataset manifest.

use std::collections::BTreeMap;

use super::category::{AdditionalInfo, CategoryManifest};
use super::image::{ImageDataManifest, ImageLabels};
use super::label::LabelManifest;
use super::task::{DataType, TaskType};
use crate::error::ManifestError;

/// Category lists of a dataset.
///
/// Tasks without categories (captions, regression, ...) use `None`; in a
/// multitask dataset such tasks map to an empty list.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Categories {
    #[default]
    None,
    Single(Vec<CategoryManifest>),
    Multitask(BTreeMap<String, Vec<CategoryManifest>>),
}

impl Categories {
    /// The flat category list, empty for `None` and multitask.
    pub fn single(&self) -> &[CategoryManifest] {
        match self {
            Categories::Single(categories) => categories,
            _ => &[],
        }
    }

    /// The category list of one task in a multitask dataset.
    pub fn task(&self, task: &str) -> &[CategoryManifest] {
        match self {
            Categories::Multitask(tasks) => tasks.get(task).map(Vec::as_slice).unwrap_or(&[]),
            _ => &[],
        }
    }
}

/// A dataset whose labels each belong to a single image.
#[derive(Clone, Debug, Default)]
pub struct DatasetManifest {
    pub images: Vec<ImageDataManifest>,
    pub categories: Categories,
    pub data_type: DataType,
    pub additional_info: AdditionalInfo,
}

// Structural equality: additional_info is metadata and is not compared.
impl PartialEq for DatasetManifest {
    fn eq(&self, other: &Self) -> bool {
        self.images == other.images
            && self.categories == other.categories
            && self.data_type == other.data_type
    }
}

impl DatasetManifest {
    /// Builds a manifest, checking every cross-reference invariant.
    pub fn new(
        images: Vec<ImageDataManifest>,
        categories: Categories,
        data_type: DataType,
        additional_info: AdditionalInfo,
    ) -> Result<Self, ManifestError> {
        let manifest = Self {
            images,
            categories,
            data_type,
            additional_info,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn is_multitask(&self) -> bool {
        self.data_type.is_multitask()
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Checks data_type/categories agreement and every label reference.
    pub fn validate(&self) -> Result<(), ManifestError> {
        match (&self.data_type, &self.categories) {
            (DataType::Single(task), categories) => {
                check_single_task(*task)?;
                let category_count = match (task.has_categories(), categories) {
                    (true, Categories::Single(list)) => list.len(),
                    (false, Categories::None) => 0,
                    (true, _) => {
                        return Err(ManifestError::precondition(format!(
                            "{} manifests need a category list",
                            task
                        )))
                    }
                    (false, _) => {
                        return Err(ManifestError::precondition(format!(
                            "{} manifests carry no categories",
                            task
                        )))
                    }
                };
                for image in &self.images {
                    let ImageLabels::Single(labels) = &image.labels else {
                        return Err(ManifestError::precondition(format!(
                            "image {} has per-task labels in a single-task manifest",
                            image.id
                        )));
                    };
                    check_labels(labels, *task, category_count, &image.id.to_string())?;
                }
            }
            (DataType::Multitask(tasks), Categories::Multitask(categories)) => {
                if !tasks.keys().eq(categories.keys()) {
                    return Err(ManifestError::precondition(
                        "multitask category keys differ from task keys",
                    ));
                }
                for (name, task) in tasks {
                    check_single_task(*task)?;
                    if !task.has_categories() && !categories[name].is_empty() {
                        return Err(ManifestError::precondition(format!(
                            "task '{}' ({}) carries no categories",
                            name, task
                        )));
                    }
                }
                for image in &self.images {
                    let ImageLabels::Multitask(per_task) = &image.labels else {
                        return Err(ManifestError::precondition(format!(
                            "image {} has flat labels in a multitask manifest",
                            image.id
                        )));
                    };
                    for (name, labels) in per_task {
                        let task = tasks.get(name).ok_or_else(|| {
                            ManifestError::precondition(format!(
                                "image {} has labels for unknown task '{}'",
                                image.id, name
                            ))
                        })?;
                        check_labels(
                            labels,
                            *task,
                            categories[name].len(),
                            &format!("{}/{}", image.id, name),
                        )?;
                    }
                }
            }
            (DataType::Multitask(_), _) => {
                return Err(ManifestError::precondition(
                    "multitask manifests need per-task categories",
                ))
            }
        }
        Ok(())
    }
}

fn check_single_task(task: TaskType) -> Result<(), ManifestError> {
    match task {
        TaskType::Multitask => Err(ManifestError::precondition(
            "multitask data type must name its subtasks",
        )),
        TaskType::KeyValuePair => Err(ManifestError::precondition(
            "key-value-pair data belongs in a multi-image manifest",
        )),
        _ => Ok(()),
    }
}

fn check_labels(
    labels: &[LabelManifest],
    task: TaskType,
    category_count: usize,
    image: &str,
) -> Result<(), ManifestError> {
    if task == TaskType::ClassificationMulticlass && labels.len() > 1 {
        return Err(ManifestError::shape(
            "multiclass image",
            format!("image {} has {} labels", image, labels.len()),
        ));
    }
    for label in labels {
        if !label.data.fits(task) {
            return Err(ManifestError::shape(
                "label",
                format!("image {} carries a label that is not {}", image, task),
            ));
        }
        if let Some(category_id) = label.category_id() {
            if category_id >= category_count {
                return Err(ManifestError::shape(
                    "label",
                    format!(
                        "image {} references category {} of {}",
                        image, category_id, category_count
                    ),
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::BBox;

    fn categories(names: &[&str]) -> Vec<CategoryManifest> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| CategoryManifest::new(i, *name))
            .collect()
    }

    #[test]
    fn valid_detection_manifest() {
        let manifest = DatasetManifest::new(
            vec![ImageDataManifest::new(1u64, "a.jpg").with_labels(vec![
                LabelManifest::detection(1, BBox::from_ltrb(0.0, 0.0, 5.0, 5.0)),
            ])],
            Categories::Single(categories(&["cat", "dog"])),
            TaskType::ObjectDetection.into(),
            AdditionalInfo::new(),
        )
        .expect("valid manifest");
        assert!(!manifest.is_multitask());
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn category_out_of_range_is_rejected() {
        let result = DatasetManifest::new(
            vec![ImageDataManifest::new(1u64, "a.jpg")
                .with_labels(vec![LabelManifest::classification(2)])],
            Categories::Single(categories(&["cat", "dog"])),
            TaskType::ClassificationMultilabel.into(),
            AdditionalInfo::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn multiclass_allows_one_label_per_image() {
        let result = DatasetManifest::new(
            vec![ImageDataManifest::new(1u64, "a.jpg").with_labels(vec![
                LabelManifest::classification(0),
                LabelManifest::classification(1),
            ])],
            Categories::Single(categories(&["cat", "dog"])),
            TaskType::ClassificationMulticlass.into(),
            AdditionalInfo::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn multitask_keys_must_match() {
        let data_type = DataType::Multitask(BTreeMap::from([
            ("a".to_string(), TaskType::ClassificationMulticlass),
            ("b".to_string(), TaskType::ImageCaption),
        ]));
        let mismatched = Categories::Multitask(BTreeMap::from([(
            "a".to_string(),
            categories(&["x"]),
        )]));
        assert!(
            DatasetManifest::new(vec![], mismatched, data_type.clone(), AdditionalInfo::new())
                .is_err()
        );

        let matched = Categories::Multitask(BTreeMap::from([
            ("a".to_string(), categories(&["x"])),
            ("b".to_string(), Vec::new()),
        ]));
        assert!(DatasetManifest::new(vec![], matched, data_type, AdditionalInfo::new()).is_ok());
    }

    #[test]
    fn single_task_rejects_per_task_categories() {
        let result = DatasetManifest::new(
            vec![],
            Categories::Multitask(BTreeMap::new()),
            TaskType::ClassificationMulticlass.into(),
            AdditionalInfo::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn wrong_label_kind_is_rejected() {
        let result = DatasetManifest::new(
            vec![ImageDataManifest::new(1u64, "a.jpg")
                .with_labels(vec![LabelManifest::caption("x")])],
            Categories::None,
            TaskType::VisualQuestionAnswering.into(),
            AdditionalInfo::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn equality_ignores_additional_info() {
        let mut a = DatasetManifest::new(
            vec![],
            Categories::None,
            TaskType::ImageCaption.into(),
            AdditionalInfo::new(),
        )
        .expect("valid");
        let b = a.clone();
        a.additional_info
            .insert("source".into(), serde_json::Value::from("x"));
        assert_eq!(a, b);
    }
}
