//! The adaptor shared by every single-image-label task.

use std::collections::HashMap;

use serde_json::{json, Value};

use super::codec::{
    CaptionCodec, ClassificationCodec, DecodeContext, DetectionCodec, EncodeContext,
    GroundingCodec, LabelCodec, MattingCodec, RegressionCodec, RetrievalCodec, TextMatchingCodec,
    VqaCodec,
};
use super::document::{
    category_to_doc, collect_images, image_to_doc, remap_categories, to_value, DocAnnotation,
    Document, PathResolver,
};
use super::{ExportOptions, IngestOptions, ManifestAdaptor};
use crate::error::ManifestError;
use crate::manifest::{
    AnyManifest, BBoxFormat, Categories, DataType, DatasetManifest, ImageLabels, LabelManifest,
    TaskType,
};

/// Reads and writes documents whose annotations each label one image.
pub struct SingleImageAdaptor {
    task: TaskType,
    codec: Box<dyn LabelCodec>,
}

impl std::fmt::Debug for SingleImageAdaptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleImageAdaptor")
            .field("task", &self.task)
            .finish()
    }
}

impl SingleImageAdaptor {
    /// The adaptor for `task`; fails for key-value-pair and multitask, which
    /// have their own adaptors.
    pub fn for_task(task: TaskType) -> Result<Self, ManifestError> {
        let codec: Box<dyn LabelCodec> = match task {
            TaskType::ClassificationMulticlass | TaskType::ClassificationMultilabel => {
                Box::new(ClassificationCodec)
            }
            TaskType::ObjectDetection => Box::new(DetectionCodec),
            TaskType::ImageCaption => Box::new(CaptionCodec),
            TaskType::ImageMatting => Box::new(MattingCodec),
            TaskType::ImageRegression => Box::new(RegressionCodec),
            TaskType::ImageTextMatching => Box::new(TextMatchingCodec),
            TaskType::TextImageRetrieval => Box::new(RetrievalCodec),
            TaskType::VisualQuestionAnswering => Box::new(VqaCodec),
            TaskType::VisualGrounding => Box::new(GroundingCodec),
            TaskType::KeyValuePair | TaskType::Multitask => {
                return Err(ManifestError::UnsupportedTask(format!(
                    "{} is not a single-image-label task",
                    task
                )))
            }
        };
        Ok(Self { task, codec })
    }

    pub(crate) fn ingest(
        &self,
        document: Value,
        options: &IngestOptions,
    ) -> Result<DatasetManifest, ManifestError> {
        let mut doc = Document::parse(document)?;
        let resolver = PathResolver::new(options.base_dir.as_deref());

        let (mut images, positions) = collect_images(doc.take_images()?, &resolver);
        let (categories, label_id_to_pos) = if self.task.has_categories() {
            let (list, table) = remap_categories(doc.take_categories()?)?;
            (Categories::Single(list), table)
        } else {
            (Categories::None, HashMap::new())
        };
        let bbox_format = doc.bbox_format.unwrap_or_default();
        let annotations = doc.take_annotations()?;

        let mut labels: Vec<Vec<LabelManifest>> = vec![Vec::new(); images.len()];
        for (index, annotation) in annotations.iter().enumerate() {
            let display = annotation.display_id(index);
            let image_id = annotation.image_id.as_ref().ok_or_else(|| {
                ManifestError::shape(
                    "annotation",
                    format!("annotation {} has no image_id", display),
                )
            })?;
            let &position = positions.get(image_id).ok_or_else(|| ManifestError::UnknownImage {
                annotation: display.clone(),
                image_id: image_id.to_string(),
            })?;
            let ctx = DecodeContext {
                bbox_format,
                label_id_to_pos: &label_id_to_pos,
                resolver: &resolver,
                annotation: display,
            };
            labels[position].push(self.codec.decode(&annotation.fields, &ctx)?);
        }
        for (image, image_labels) in images.iter_mut().zip(labels) {
            image.labels = ImageLabels::Single(image_labels);
        }

        let manifest = DatasetManifest::new(
            images,
            categories,
            DataType::Single(self.task),
            doc.extra,
        )?;
        tracing::info!(
            task = %self.task,
            images = manifest.images.len(),
            annotations = annotations.len(),
            categories = manifest.categories.single().len(),
            "ingested dataset manifest"
        );
        Ok(manifest)
    }

    pub(crate) fn export(
        &self,
        manifest: &DatasetManifest,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError> {
        if manifest.data_type != DataType::Single(self.task) {
            return Err(ManifestError::precondition(format!(
                "cannot export a {} manifest as {}",
                manifest.data_type, self.task
            )));
        }
        let resolver = PathResolver::new(options.base_dir.as_deref());
        let ctx = EncodeContext {
            bbox_format: options.bbox_format,
            resolver: &resolver,
        };

        let mut annotations = Vec::new();
        for image in &manifest.images {
            for label in image.single_labels() {
                annotations.push(DocAnnotation {
                    id: Some(json!(annotations.len() + 1)),
                    image_id: Some(image.id.clone()),
                    image_ids: None,
                    fields: self.codec.encode(label, &ctx)?,
                });
            }
        }

        let document = Document {
            images: Some(
                manifest
                    .images
                    .iter()
                    .map(|image| image_to_doc(image, &resolver))
                    .collect(),
            ),
            categories: self
                .task
                .has_categories()
                .then(|| manifest.categories.single().iter().map(category_to_doc).collect()),
            annotations: Some(annotations),
            bbox_format: (options.bbox_format == BBoxFormat::Ltrb).then_some(BBoxFormat::Ltrb),
            extra: manifest.additional_info.clone(),
        };
        tracing::debug!(
            task = %self.task,
            images = manifest.images.len(),
            "exported dataset manifest"
        );
        to_value(&document)
    }
}

impl ManifestAdaptor for SingleImageAdaptor {
    fn task(&self) -> TaskType {
        self.task
    }

    fn ingest_value(
        &self,
        document: Value,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError> {
        self.ingest(document, options).map(AnyManifest::SingleImage)
    }

    fn export_document(
        &self,
        manifest: &AnyManifest,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError> {
        match manifest {
            AnyManifest::SingleImage(m) => self.export(m, options),
            AnyManifest::MultiImage(_) => Err(ManifestError::precondition(format!(
                "{} documents hold single-image labels",
                self.task
            ))),
        }
    }
}
