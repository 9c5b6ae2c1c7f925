//! The annotation-centric manifest flavor, where one annotation may span
//! several images.

use super::category::AdditionalInfo;
use super::image::ImageDataManifest;
use super::key_value::{KeyValuePairLabel, KeyValuePairSchema};
use super::task::TaskType;
use crate::error::ManifestError;

/// An annotation over one or more images.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiImageLabelManifest {
    pub id: usize,
    /// Positions into the owning manifest's image list.
    pub img_ids: Vec<usize>,
    /// `None` marks a negative annotation.
    pub label_data: Option<KeyValuePairLabel>,
    pub additional_info: AdditionalInfo,
}

impl MultiImageLabelManifest {
    pub fn new(id: usize, img_ids: Vec<usize>, label_data: Option<KeyValuePairLabel>) -> Self {
        Self {
            id,
            img_ids,
            label_data,
            additional_info: AdditionalInfo::new(),
        }
    }

    pub fn is_negative(&self) -> bool {
        self.label_data.is_none()
    }
}

/// A dataset whose annotations reference images by position.
#[derive(Clone, Debug)]
pub struct DatasetManifestWithMultiImageLabel {
    pub images: Vec<ImageDataManifest>,
    pub annotations: Vec<MultiImageLabelManifest>,
    pub data_type: TaskType,
    pub schema: Option<KeyValuePairSchema>,
    pub additional_info: AdditionalInfo,
}

impl PartialEq for DatasetManifestWithMultiImageLabel {
    fn eq(&self, other: &Self) -> bool {
        self.images == other.images
            && self.annotations == other.annotations
            && self.data_type == other.data_type
            && self.schema == other.schema
    }
}

impl DatasetManifestWithMultiImageLabel {
    /// Builds a manifest, checking that images carry no labels and that every
    /// `img_ids` entry is in range.
    pub fn new(
        images: Vec<ImageDataManifest>,
        annotations: Vec<MultiImageLabelManifest>,
        data_type: TaskType,
        schema: Option<KeyValuePairSchema>,
        additional_info: AdditionalInfo,
    ) -> Result<Self, ManifestError> {
        let manifest = Self {
            images,
            annotations,
            data_type,
            schema,
            additional_info,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.data_type == TaskType::Multitask {
            return Err(ManifestError::precondition(
                "multi-image manifests cannot be multitask",
            ));
        }
        if let Some(image) = self.images.iter().find(|img| !img.labels.is_empty()) {
            return Err(ManifestError::precondition(format!(
                "image {} carries labels; multi-image manifests keep labels on annotations",
                image.id
            )));
        }
        for annotation in &self.annotations {
            if annotation.img_ids.is_empty() {
                return Err(ManifestError::shape(
                    "annotation",
                    format!("annotation {} references no images", annotation.id),
                ));
            }
            for &index in &annotation.img_ids {
                if index >= self.images.len() {
                    return Err(ManifestError::ImageIndexOutOfRange {
                        annotation: annotation.id.to_string(),
                        index,
                        len: self.images.len(),
                    });
                }
            }
            if annotation.img_ids.len() > 1
                && annotation
                    .label_data
                    .as_ref()
                    .is_some_and(KeyValuePairLabel::has_groundings)
            {
                return Err(ManifestError::shape(
                    "annotation",
                    format!(
                        "annotation {} spans {} images and cannot carry groundings",
                        annotation.id,
                        annotation.img_ids.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn is_multitask(&self) -> bool {
        false
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
