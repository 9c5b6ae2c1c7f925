//! The manifest data model.
//!
//! A manifest is a structural record of a dataset: images, categories and
//! labels, with no pixel data. Ingestion builds manifests from documents
//! (see [`crate::adaptor`]) and operations (see [`crate::ops`]) turn
//! manifests into new manifests.
//!
//! # Invariants
//!
//! 1. **Dense categories**: category ids are positions `0..K` in their list,
//!    and every label's category reference is a valid position.
//!
//! 2. **One box format**: detection boxes and grounding boxes are stored as
//!    absolute `left, top, right, bottom` pixels.
//!
//! 3. **Multitask agreement**: `categories` is per-task exactly when
//!    `data_type` is, and both name the same tasks.
//!
//! # Example
//!
//! ```
//! use visionmanifest::manifest::{
//!     AdditionalInfo, BBox, Categories, CategoryManifest, DatasetManifest, ImageDataManifest,
//!     LabelManifest, TaskType,
//! };
//!
//! let manifest = DatasetManifest::new(
//!     vec![ImageDataManifest::new(1u64, "image.jpg")
//!         .with_size(640, 480)
//!         .with_labels(vec![LabelManifest::detection(
//!             0,
//!             BBox::from_ltrb(10.0, 20.0, 100.0, 200.0),
//!         )])],
//!     Categories::Single(vec![CategoryManifest::new(0, "person")]),
//!     TaskType::ObjectDetection.into(),
//!     AdditionalInfo::new(),
//! )?;
//! assert_eq!(manifest.len(), 1);
//! # Ok::<(), visionmanifest::ManifestError>(())
//! ```

mod bbox;
mod category;
mod dataset;
mod ids;
mod image;
mod key_value;
mod label;
mod multi_image;
mod payload;
mod task;

pub use bbox::{BBox, BBoxFormat};
pub use category::{AdditionalInfo, CategoryManifest};
pub use dataset::{Categories, DatasetManifest};
pub use ids::ImageKey;
pub use image::{ImageDataManifest, ImageLabels};
pub use key_value::{
    FieldContent, FieldSchema, FieldType, FieldValue, KeyValuePairLabel, KeyValuePairSchema,
};
pub use label::{
    DetectionLabel, Grounding, GroundingLabel, LabelData, LabelManifest, TextMatchingLabel,
    VqaLabel,
};
pub use multi_image::{DatasetManifestWithMultiImageLabel, MultiImageLabelManifest};
pub use payload::{MattingMask, Payload, PayloadLoader};
pub use task::{DataType, TaskType};

/// Either manifest flavor, as produced by ingestion.
#[derive(Clone, Debug, PartialEq)]
pub enum AnyManifest {
    SingleImage(DatasetManifest),
    MultiImage(DatasetManifestWithMultiImageLabel),
}

impl AnyManifest {
    pub fn len(&self) -> usize {
        match self {
            AnyManifest::SingleImage(m) => m.len(),
            AnyManifest::MultiImage(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_single_image(self) -> Result<DatasetManifest, crate::ManifestError> {
        match self {
            AnyManifest::SingleImage(m) => Ok(m),
            AnyManifest::MultiImage(_) => Err(crate::ManifestError::precondition(
                "expected a single-image-label manifest",
            )),
        }
    }

    pub fn into_multi_image(
        self,
    ) -> Result<DatasetManifestWithMultiImageLabel, crate::ManifestError> {
        match self {
            AnyManifest::MultiImage(m) => Ok(m),
            AnyManifest::SingleImage(_) => Err(crate::ManifestError::precondition(
                "expected a multi-image-label manifest",
            )),
        }
    }
}

impl From<DatasetManifest> for AnyManifest {
    fn from(manifest: DatasetManifest) -> Self {
        AnyManifest::SingleImage(manifest)
    }
}

impl From<DatasetManifestWithMultiImageLabel> for AnyManifest {
    fn from(manifest: DatasetManifestWithMultiImageLabel) -> Self {
        AnyManifest::MultiImage(manifest)
    }
}
