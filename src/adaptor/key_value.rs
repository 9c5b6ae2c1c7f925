//! Key-value-pair documents: annotations over one or more images, checked
//! against a separately supplied field schema.
//!
//! ```json
//! {
//!   "images": [{"id": 1, "file_name": "before.jpg"}, {"id": 2, "file_name": "after.jpg"}],
//!   "annotations": [{
//!     "id": 1,
//!     "image_ids": [1, 2],
//!     "fields": {"changed": {"value": true}},
//!     "text_input": {"note": "compare the two shots"}
//!   }]
//! }
//! ```
//!
//! An annotation without `fields` is negative.

use serde_json::{json, Map, Value};

use super::document::{
    collect_images, image_to_doc, leftover_fields, to_value, DocAnnotation, Document,
    PathResolver,
};
use super::{ExportOptions, IngestOptions, ManifestAdaptor};
use crate::error::ManifestError;
use crate::manifest::{
    AnyManifest, BBoxFormat, DatasetManifestWithMultiImageLabel, ImageKey, KeyValuePairLabel,
    MultiImageLabelManifest, TaskType,
};

#[derive(Clone, Copy, Debug, Default)]
pub struct KeyValuePairAdaptor;

impl KeyValuePairAdaptor {
    pub(crate) fn ingest(
        &self,
        document: Value,
        options: &IngestOptions,
    ) -> Result<DatasetManifestWithMultiImageLabel, ManifestError> {
        let schema = options.schema.clone().ok_or_else(|| {
            ManifestError::precondition("key-value-pair ingestion needs a field schema")
        })?;
        schema.check()?;

        let mut doc = Document::parse(document)?;
        let resolver = PathResolver::new(options.base_dir.as_deref());
        let (images, positions) = collect_images(doc.take_images()?, &resolver);
        let bbox_format = doc.bbox_format.unwrap_or_default();

        let mut annotations = Vec::new();
        for (index, annotation) in doc.take_annotations()?.into_iter().enumerate() {
            let display = annotation.display_id(index);
            let id = annotation_id(&annotation, &display)?;

            let keys: Vec<&ImageKey> = match (&annotation.image_ids, &annotation.image_id) {
                (Some(ids), _) => ids.iter().collect(),
                (None, Some(id)) => vec![id],
                (None, None) => Vec::new(),
            };
            if keys.is_empty() {
                return Err(ManifestError::shape(
                    "annotation",
                    format!("annotation {} references no images", display),
                ));
            }
            let img_ids = keys
                .into_iter()
                .map(|key| {
                    positions
                        .get(key)
                        .copied()
                        .ok_or_else(|| ManifestError::UnknownImage {
                            annotation: display.clone(),
                            image_id: key.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let (label_data, known) = match annotation.fields.get("fields") {
                None | Some(Value::Null) => (None, &["fields"][..]),
                Some(Value::Object(fields)) => (
                    Some(KeyValuePairLabel::from_document(
                        fields,
                        annotation.fields.get("text_input"),
                        &schema,
                        bbox_format,
                    )?),
                    &["fields", "text_input"][..],
                ),
                Some(_) => {
                    return Err(ManifestError::shape(
                        "annotation",
                        format!("annotation {}: 'fields' must be an object", display),
                    ))
                }
            };

            annotations.push(MultiImageLabelManifest {
                id,
                img_ids,
                label_data,
                additional_info: leftover_fields(&annotation.fields, known),
            });
        }

        let manifest = DatasetManifestWithMultiImageLabel::new(
            images,
            annotations,
            TaskType::KeyValuePair,
            Some(schema),
            doc.extra,
        )?;
        tracing::info!(
            task = %TaskType::KeyValuePair,
            images = manifest.images.len(),
            annotations = manifest.annotations.len(),
            negatives = manifest.annotations.iter().filter(|a| a.is_negative()).count(),
            "ingested multi-image manifest"
        );
        Ok(manifest)
    }

    pub(crate) fn export(
        &self,
        manifest: &DatasetManifestWithMultiImageLabel,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError> {
        let resolver = PathResolver::new(options.base_dir.as_deref());
        let mut annotations = Vec::with_capacity(manifest.annotations.len());
        for annotation in &manifest.annotations {
            let image_ids = annotation
                .img_ids
                .iter()
                .map(|&index| {
                    manifest
                        .images
                        .get(index)
                        .map(|image| image.id.clone())
                        .ok_or_else(|| ManifestError::ImageIndexOutOfRange {
                            annotation: annotation.id.to_string(),
                            index,
                            len: manifest.images.len(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let mut fields: Map<String, Value> = annotation.additional_info.clone();
            if let Some(label) = &annotation.label_data {
                fields.insert(
                    "fields".into(),
                    Value::Object(label.fields_to_document(options.bbox_format)),
                );
                if let Some(text_input) = &label.text_input {
                    fields.insert("text_input".into(), json!(text_input));
                }
            }

            annotations.push(DocAnnotation {
                id: Some(json!(annotation.id)),
                image_id: None,
                image_ids: Some(image_ids),
                fields,
            });
        }

        let document = Document {
            images: Some(
                manifest
                    .images
                    .iter()
                    .map(|image| image_to_doc(image, &resolver))
                    .collect(),
            ),
            categories: None,
            annotations: Some(annotations),
            bbox_format: (options.bbox_format == BBoxFormat::Ltrb).then_some(BBoxFormat::Ltrb),
            extra: manifest.additional_info.clone(),
        };
        to_value(&document)
    }
}

fn annotation_id(annotation: &DocAnnotation, display: &str) -> Result<usize, ManifestError> {
    annotation
        .id
        .as_ref()
        .and_then(Value::as_u64)
        .map(|id| id as usize)
        .ok_or_else(|| {
            ManifestError::shape(
                "annotation",
                format!(
                    "annotation {}: multi-image annotations need a non-negative integer id",
                    display
                ),
            )
        })
}

impl ManifestAdaptor for KeyValuePairAdaptor {
    fn task(&self) -> TaskType {
        TaskType::KeyValuePair
    }

    fn ingest_value(
        &self,
        document: Value,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError> {
        self.ingest(document, options).map(AnyManifest::MultiImage)
    }

    fn export_document(
        &self,
        manifest: &AnyManifest,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError> {
        match manifest {
            AnyManifest::MultiImage(m) => self.export(m, options),
            AnyManifest::SingleImage(_) => Err(ManifestError::precondition(
                "key-value-pair documents hold multi-image annotations",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::KeyValuePairSchema;

    fn schema() -> KeyValuePairSchema {
        KeyValuePairSchema::from_json_str(
            r#"{
                "name": "comparison",
                "fieldSchema": {
                    "changed": {"type": "boolean"},
                    "defect": {"type": "string", "includeGrounding": true}
                }
            }"#,
        )
        .expect("schema")
    }

    fn options() -> IngestOptions {
        IngestOptions::default().with_schema(schema())
    }

    #[test]
    fn schema_is_required() {
        let err = KeyValuePairAdaptor
            .ingest(json!({"images": [], "annotations": []}), &IngestOptions::default())
            .unwrap_err();
        assert!(matches!(err, ManifestError::Precondition { .. }));
    }

    #[test]
    fn image_ids_become_positions() {
        let doc = json!({
            "images": [
                {"id": 10, "file_name": "a.jpg"},
                {"id": 20, "file_name": "b.jpg"}
            ],
            "annotations": [
                {"id": 1, "image_ids": [20, 10], "fields": {"changed": {"value": true}}},
                {"id": 2, "image_id": 20}
            ]
        });
        let manifest = KeyValuePairAdaptor.ingest(doc, &options()).expect("ingest");
        assert_eq!(manifest.annotations[0].img_ids, vec![1, 0]);
        assert_eq!(manifest.annotations[1].img_ids, vec![1]);
        assert!(manifest.annotations[1].is_negative());
    }

    #[test]
    fn unknown_image_fails() {
        let doc = json!({
            "images": [{"id": 1, "file_name": "a.jpg"}],
            "annotations": [{"id": 5, "image_ids": [1, 9]}]
        });
        let err = KeyValuePairAdaptor.ingest(doc, &options()).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownImage { ref image_id, .. } if image_id == "9"));
    }

    #[test]
    fn groundings_across_images_fail() {
        let doc = json!({
            "images": [
                {"id": 1, "file_name": "a.jpg"},
                {"id": 2, "file_name": "b.jpg"}
            ],
            "annotations": [{
                "id": 1,
                "image_ids": [1, 2],
                "fields": {"defect": {"value": "scratch", "groundings": [[0.0, 0.0, 5.0, 5.0]]}}
            }]
        });
        assert!(KeyValuePairAdaptor.ingest(doc, &options()).is_err());
    }

    #[test]
    fn undeclared_field_fails() {
        let doc = json!({
            "images": [{"id": 1, "file_name": "a.jpg"}],
            "annotations": [{"id": 1, "image_id": 1, "fields": {"colour": {"value": "red"}}}]
        });
        let err = KeyValuePairAdaptor.ingest(doc, &options()).unwrap_err();
        assert!(matches!(err, ManifestError::Schema { .. }));
    }
}
