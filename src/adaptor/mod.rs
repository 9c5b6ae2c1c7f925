//! Ingestion and export of annotation documents.
//!
//! Each task type has one adaptor that turns a document (see
//! [`document`] for the shape) into a manifest and writes a manifest back
//! out. Adaptors are looked up through an [`AdaptorRegistry`] built once by
//! the caller; nothing registers itself.
//!
//! # Normalizations
//!
//! Ingestion followed by export is the identity up to these transforms,
//! each of which is idempotent:
//!
//! - category ids are renumbered densely and written back as `position + 1`
//! - single-image annotation ids are written sequentially from 1 in image order
//! - boxes are written in [`ExportOptions::bbox_format`]; `bbox_format` is
//!   only emitted when it is `ltrb`
//! - key-value-pair annotations always list their images under `image_ids`
//!
//! Numbers keep their JSON type: integer coordinates and targets are written
//! back as integers.

pub mod document;

mod codec;
mod key_value;
mod multitask;
mod single;

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::error::ManifestError;
use crate::manifest::{AnyManifest, BBoxFormat, DataType, KeyValuePairSchema, TaskType};

pub use document::{prune_nulls, read_document, write_document};
pub use key_value::KeyValuePairAdaptor;
pub use multitask::MultitaskAdaptor;
pub use single::SingleImageAdaptor;

/// Options that apply to every ingestion.
#[derive(Clone, Debug, Default)]
pub struct IngestOptions {
    /// Root directory or URL prefixed to every image and payload path.
    pub base_dir: Option<String>,
    /// Field schema for key-value-pair documents.
    pub schema: Option<KeyValuePairSchema>,
}

impl IngestOptions {
    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    pub fn with_schema(mut self, schema: KeyValuePairSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if let Some(schema) = &self.schema {
            schema.check()?;
        }
        Ok(())
    }
}

/// Options that apply to every export.
#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    pub bbox_format: BBoxFormat,
    /// Stripped from image and payload paths when present.
    pub base_dir: Option<String>,
}

impl ExportOptions {
    pub fn with_bbox_format(mut self, bbox_format: BBoxFormat) -> Self {
        self.bbox_format = bbox_format;
        self
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }
}

/// Turns documents of one task type into manifests and back.
pub trait ManifestAdaptor: Send + Sync {
    fn task(&self) -> TaskType;

    /// Builds a manifest from an already-parsed document.
    fn ingest_value(
        &self,
        document: Value,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError>;

    /// Writes a manifest in the document shape this adaptor reads.
    fn export_document(
        &self,
        manifest: &AnyManifest,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError>;

    /// Builds a manifest from document text.
    fn create_dataset_manifest(
        &self,
        document: &str,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError> {
        let value: Value = serde_json::from_str(document)?;
        self.ingest_value(value, options)
    }

    /// Builds a manifest from a document file.
    fn create_dataset_manifest_from_path(
        &self,
        path: &Path,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError> {
        self.ingest_value(read_document(path)?, options)
    }
}

/// Task type → adaptor table.
///
/// Multitask documents are handled by a [`MultitaskAdaptor`] borrowing the
/// registry, so the table itself only holds per-task adaptors.
pub struct AdaptorRegistry {
    adaptors: BTreeMap<TaskType, Box<dyn ManifestAdaptor>>,
}

impl AdaptorRegistry {
    /// A registry with no adaptors.
    pub fn empty() -> Self {
        Self {
            adaptors: BTreeMap::new(),
        }
    }

    /// A registry with an adaptor for every built-in task type.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for task in TaskType::ALL {
            if let Ok(adaptor) = SingleImageAdaptor::for_task(task) {
                registry.register(Box::new(adaptor));
            }
        }
        registry.register(Box::new(KeyValuePairAdaptor));
        registry
    }

    /// Adds or replaces the adaptor for `adaptor.task()`.
    pub fn register(&mut self, adaptor: Box<dyn ManifestAdaptor>) {
        self.adaptors.insert(adaptor.task(), adaptor);
    }

    pub fn get(&self, task: TaskType) -> Result<&dyn ManifestAdaptor, ManifestError> {
        self.adaptors
            .get(&task)
            .map(|adaptor| adaptor.as_ref())
            .ok_or_else(|| ManifestError::UnsupportedTask(task.name().to_string()))
    }

    pub fn multitask(&self) -> MultitaskAdaptor<'_> {
        MultitaskAdaptor::new(self)
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskType> + '_ {
        self.adaptors.keys().copied()
    }

    /// Ingests `document` with the adaptor for `task`, multitask included.
    pub fn ingest_value(
        &self,
        task: TaskType,
        document: Value,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError> {
        options.validate()?;
        match task {
            TaskType::Multitask => self.multitask().ingest_value(document, options),
            _ => self.get(task)?.ingest_value(document, options),
        }
    }

    pub fn ingest_path(
        &self,
        task: TaskType,
        path: &Path,
        options: &IngestOptions,
    ) -> Result<AnyManifest, ManifestError> {
        tracing::debug!(task = %task, path = %path.display(), "reading document");
        self.ingest_value(task, read_document(path)?, options)
    }

    /// Exports with the adaptor matching the manifest's own data type.
    pub fn export_document(
        &self,
        manifest: &AnyManifest,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError> {
        match manifest {
            AnyManifest::SingleImage(m) => match &m.data_type {
                DataType::Multitask(_) => self.multitask().export_document(manifest, options),
                DataType::Single(task) => self.get(*task)?.export_document(manifest, options),
            },
            AnyManifest::MultiImage(m) => self.get(m.data_type)?.export_document(manifest, options),
        }
    }
}

impl Default for AdaptorRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_plain_task() {
        let registry = AdaptorRegistry::standard();
        for task in TaskType::ALL {
            let found = registry.get(task).is_ok();
            assert_eq!(found, task != TaskType::Multitask, "task {}", task);
        }
    }

    #[test]
    fn empty_registry_reports_unsupported_task() {
        let registry = AdaptorRegistry::empty();
        let err = registry
            .ingest_value(
                TaskType::ImageCaption,
                serde_json::json!({}),
                &IngestOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ManifestError::UnsupportedTask(_)));
    }
}
