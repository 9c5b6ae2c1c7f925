//! The annotation document shape shared by every task.
//!
//! ```json
//! {
//!   "images": [
//!     {"id": 1, "file_name": "a.jpg", "zip_file": "train.zip", "width": 224, "height": 224}
//!   ],
//!   "categories": [{"id": 1, "name": "cat", "supercategory": "animal"}],
//!   "annotations": [{"id": 1, "image_id": 1, "category_id": 1}],
//!   "bbox_format": "ltwh"
//! }
//! ```
//!
//! Keys a reader does not recognize are kept in the matching entity's
//! `additional_info` and written back on export.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ManifestError;
use crate::manifest::{AdditionalInfo, BBoxFormat, CategoryManifest, ImageDataManifest, ImageKey};

// ============================================================================
// Document schema types
// ============================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<DocImage>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<DocCategory>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<DocAnnotation>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_format: Option<BBoxFormat>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocImage {
    pub id: ImageKey,

    pub file_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocCategory {
    pub id: i64,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DocAnnotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageKey>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ids: Option<Vec<ImageKey>>,

    /// Task-specific keys.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl DocAnnotation {
    /// Printable id for error messages.
    pub fn display_id(&self, position: usize) -> String {
        match &self.id {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => format!("#{}", position),
        }
    }
}

impl Document {
    pub fn parse(document: Value) -> Result<Self, ManifestError> {
        Ok(serde_json::from_value(document)?)
    }

    pub fn take_images(&mut self) -> Result<Vec<DocImage>, ManifestError> {
        self.images.take().ok_or_else(|| missing("images"))
    }

    pub fn take_annotations(&mut self) -> Result<Vec<DocAnnotation>, ManifestError> {
        self.annotations.take().ok_or_else(|| missing("annotations"))
    }

    pub fn take_categories(&mut self) -> Result<Vec<DocCategory>, ManifestError> {
        self.categories.take().ok_or_else(|| missing("categories"))
    }
}

fn missing(section: &str) -> ManifestError {
    ManifestError::MissingSection {
        section: section.to_string(),
    }
}

// ============================================================================
// Path addressing
// ============================================================================

/// Builds and splits `[<base>/][<archive>@]<file>` image paths.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PathResolver<'a> {
    base: Option<&'a str>,
}

impl<'a> PathResolver<'a> {
    pub fn new(base: Option<&'a str>) -> Self {
        Self {
            base: base.filter(|b| !b.is_empty()),
        }
    }

    pub fn resolve(&self, zip_file: Option<&str>, file_name: &str) -> String {
        let relative = match zip_file {
            Some(zip) => format!("{}@{}", zip, file_name),
            None => file_name.to_string(),
        };
        match self.base {
            Some(base) if base.ends_with('/') || base.ends_with('\\') => {
                format!("{}{}", base, relative)
            }
            Some(base) => format!("{}/{}", base, relative),
            None => relative,
        }
    }

    /// Inverse of [`PathResolver::resolve`]: `(zip_file, file_name)`.
    ///
    /// Only a path read from `archive` is split; an `@` in a plain file name
    /// stays part of the name.
    pub fn split(&self, img_path: &str, archive: Option<&str>) -> (Option<String>, String) {
        let relative = self
            .base
            .and_then(|base| {
                img_path
                    .strip_prefix(base)
                    .map(|rest| rest.trim_start_matches(['/', '\\']))
            })
            .unwrap_or(img_path);
        let entry = archive.and_then(|zip| {
            relative
                .strip_prefix(zip)
                .and_then(|rest| rest.strip_prefix('@'))
                .map(|file| (zip, file))
        });
        match entry {
            Some((zip, file)) => (Some(zip.to_string()), file.to_string()),
            None => (None, relative.to_string()),
        }
    }
}

// ============================================================================
// Shared conversions
// ============================================================================

/// Images in document order, plus an id → position table.
///
/// A repeated image id replaces the earlier entry in place.
pub(crate) fn collect_images(
    doc_images: Vec<DocImage>,
    resolver: &PathResolver<'_>,
) -> (Vec<ImageDataManifest>, HashMap<ImageKey, usize>) {
    let mut images: Vec<ImageDataManifest> = Vec::with_capacity(doc_images.len());
    let mut positions: HashMap<ImageKey, usize> = HashMap::with_capacity(doc_images.len());

    for doc_image in doc_images {
        let image = ImageDataManifest {
            id: doc_image.id.clone(),
            img_path: resolver.resolve(doc_image.zip_file.as_deref(), &doc_image.file_name),
            archive: doc_image.zip_file.clone(),
            width: doc_image.width,
            height: doc_image.height,
            labels: Default::default(),
            additional_info: doc_image.extra,
        };
        match positions.get(&doc_image.id) {
            Some(&pos) => {
                tracing::warn!(
                    image_id = %doc_image.id,
                    "duplicate image id; keeping the last entry"
                );
                images[pos] = image;
            }
            None => {
                positions.insert(doc_image.id, images.len());
                images.push(image);
            }
        }
    }

    (images, positions)
}

/// Categories sorted by declared id and renumbered densely from 0, with the
/// declared-id → position table.
pub(crate) fn remap_categories(
    doc_categories: Vec<DocCategory>,
) -> Result<(Vec<CategoryManifest>, HashMap<i64, usize>), ManifestError> {
    let mut doc_categories = doc_categories;
    doc_categories.sort_by_key(|c| c.id);

    let mut label_id_to_pos = HashMap::with_capacity(doc_categories.len());
    let mut categories = Vec::with_capacity(doc_categories.len());
    for (pos, cat) in doc_categories.into_iter().enumerate() {
        if label_id_to_pos.insert(cat.id, pos).is_some() {
            return Err(ManifestError::shape(
                "categories",
                format!("duplicate category id {}", cat.id),
            ));
        }
        categories.push(CategoryManifest {
            id: pos,
            name: cat.name,
            super_category: cat.supercategory,
            additional_info: cat.extra,
        });
    }
    Ok((categories, label_id_to_pos))
}

pub(crate) fn image_to_doc(image: &ImageDataManifest, resolver: &PathResolver<'_>) -> DocImage {
    let (zip_file, file_name) = resolver.split(&image.img_path, image.archive.as_deref());
    DocImage {
        id: image.id.clone(),
        file_name,
        zip_file,
        width: image.width,
        height: image.height,
        extra: image.additional_info.clone(),
    }
}

/// Categories are written with 1-based ids (`position + 1`).
pub(crate) fn category_to_doc(category: &CategoryManifest) -> DocCategory {
    DocCategory {
        id: category.id as i64 + 1,
        name: category.name.clone(),
        supercategory: category.super_category.clone(),
        extra: category.additional_info.clone(),
    }
}

/// Moves every key of `fields` not in `known` into a fresh map.
pub(crate) fn leftover_fields(fields: &Map<String, Value>, known: &[&str]) -> AdditionalInfo {
    fields
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Recursively drops `null` object entries.
pub fn prune_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, prune_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(prune_nulls).collect()),
        other => other,
    }
}

pub(crate) fn to_value(document: &Document) -> Result<Value, ManifestError> {
    Ok(prune_nulls(serde_json::to_value(document)?))
}

// ============================================================================
// File I/O
// ============================================================================

/// Reads a JSON document from disk.
pub fn read_document(path: &Path) -> Result<Value, ManifestError> {
    let file = File::open(path).map_err(ManifestError::Io)?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| ManifestError::DocumentParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a JSON document to disk, pretty-printed.
pub fn write_document(path: &Path, document: &Value) -> Result<(), ManifestError> {
    let file = File::create(path).map_err(ManifestError::Io)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, document).map_err(|source| ManifestError::DocumentWrite {
        path: path.to_path_buf(),
        source,
    })
}
