//! Multitask documents: one sub-document per named task, folded into a
//! single manifest keyed by image id.
//!
//! ```json
//! {
//!   "tasks": {
//!     "animals": {
//!       "task": "classification_multiclass",
//!       "document": {"images": [], "categories": [], "annotations": []}
//!     },
//!     "captions": {"task": "image_caption", "document": {"images": [], "annotations": []}}
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::prune_nulls;
use super::{AdaptorRegistry, ExportOptions, IngestOptions, ManifestAdaptor};
use crate::error::ManifestError;
use crate::manifest::{
    AnyManifest, Categories, DataType, DatasetManifest, ImageDataManifest, ImageKey, ImageLabels,
    TaskType,
};

#[derive(Debug, Serialize, Deserialize)]
struct MultitaskDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tasks: Option<BTreeMap<String, TaskDocument>>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TaskDocument {
    task: TaskType,
    document: Value,
}

/// Delegates each task to the registry's adaptor, then merges the per-task
/// images. An image missing from a task's document has no entry for that
/// task.
#[derive(Clone, Copy)]
pub struct MultitaskAdaptor<'a> {
    registry: &'a AdaptorRegistry,
}

impl<'a> MultitaskAdaptor<'a> {
    pub fn new(registry: &'a AdaptorRegistry) -> Self {
        Self { registry }
    }

    fn subtask(
        &self,
        name: &str,
        task: TaskType,
    ) -> Result<&'a dyn ManifestAdaptor, ManifestError> {
        if task == TaskType::Multitask || task.is_multi_image() {
            return Err(ManifestError::UnsupportedTask(format!(
                "task '{}' is {}, which cannot be part of a multitask dataset",
                name, task
            )));
        }
        self.registry.get(task)
    }

    pub(crate) fn ingest(
        &self,
        document: Value,
        options: &IngestOptions,
    ) -> Result<DatasetManifest, ManifestError> {
        let doc: MultitaskDocument = serde_json::from_value(document)?;
        let tasks = doc.tasks.ok_or_else(|| ManifestError::MissingSection {
            section: "tasks".to_string(),
        })?;

        let mut data_types = BTreeMap::new();
        let mut categories = BTreeMap::new();
        let mut images: Vec<ImageDataManifest> = Vec::new();
        let mut positions: HashMap<ImageKey, usize> = HashMap::new();

        for (name, task_doc) in tasks {
            let adaptor = self.subtask(&name, task_doc.task)?;
            let manifest = adaptor
                .ingest_value(task_doc.document, options)?
                .into_single_image()?;

            for image in manifest.images {
                let ImageDataManifest {
                    id,
                    img_path,
                    archive,
                    width,
                    height,
                    labels,
                    additional_info,
                } = image;
                let ImageLabels::Single(labels) = labels else {
                    return Err(ManifestError::precondition(format!(
                        "task '{}' produced per-task labels",
                        name
                    )));
                };
                match positions.get(&id) {
                    Some(&pos) => {
                        if let ImageLabels::Multitask(per_task) = &mut images[pos].labels {
                            per_task.insert(name.clone(), labels);
                        }
                    }
                    None => {
                        positions.insert(id.clone(), images.len());
                        images.push(ImageDataManifest {
                            id,
                            img_path,
                            archive,
                            width,
                            height,
                            labels: ImageLabels::Multitask(BTreeMap::from([(
                                name.clone(),
                                labels,
                            )])),
                            additional_info,
                        });
                    }
                }
            }

            let task_categories = match manifest.categories {
                Categories::Single(list) => list,
                Categories::None | Categories::Multitask(_) => Vec::new(),
            };
            categories.insert(name.clone(), task_categories);
            data_types.insert(name, task_doc.task);
        }

        let manifest = DatasetManifest::new(
            images,
            Categories::Multitask(categories),
            DataType::Multitask(data_types),
            doc.extra,
        )?;
        tracing::info!(
            tasks = %manifest.data_type,
            images = manifest.images.len(),
            "ingested multitask manifest"
        );
        Ok(manifest)
    }

    pub(crate) fn export(
        &self,
        manifest: &DatasetManifest,
        options: &ExportOptions,
    ) -> Result<Value, ManifestError> {
        let DataType::Multitask(data_types) = &manifest.data_type else {
            return Err(ManifestError::precondition(
                "multitask export needs a multitask manifest",
            ));
        };

        let mut tasks = BTreeMap::new();
        for (name, task) in data_types {
            let adaptor = self.subtask(name, *task)?;
            let images = manifest
                .images
                .iter()
                .filter_map(|image| match &image.labels {
                    ImageLabels::Multitask(per_task) => per_task.get(name).map(|labels| {
                        ImageDataManifest {
                            labels: ImageLabels::Single(labels.clone()),
                            ..image.clone()
                        }
                    }),
                    ImageLabels::Single(_) => None,
                })
                .collect();
            let categories = if task.has_categories() {
                Categories::Single(manifest.categories.task(name).to_vec())
            } else {
                Categories::None
            };
            let sub = DatasetManifest {
                images,
                categories,
                data_type: DataType::Single(*task),
                additional_info: Map::new(),
            };
            let document = adaptor.export_document(&AnyManifest::SingleImage(sub), options)?;
            tasks.insert(
                name.clone(),
                TaskDocument {
                    task: *task,
                    document,
                },
            );
        }

        let document = MultitaskDocument {
            tasks: Some(tasks),
            extra: manifest.additional_info.clone(),
        };
        Ok(prune_nulls(serde_json::to_value(&document)?))
    }
}

impl ManifestAdaptor for MultitaskAdaptor<'_> {
    fn task(&self) -> TaskType {
        TaskType::Multitask
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
            AnyManifest::MultiImage(_) => Err(ManifestError::precondition(
                "multi-image manifests cannot be multitask",
            )),
        }
    }
}
