use std::path::PathBuf;
use thiserror::Error;

/// The main error type for manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse document {path}: {source}")]
    DocumentParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write document {path}: {source}")]
    DocumentWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Document is missing required section '{section}'")]
    MissingSection { section: String },

    /// A label payload or document entry has the wrong shape.
    #[error("Invalid {what}: {message}")]
    Shape { what: String, message: String },

    /// A key-value-pair payload or schema does not match its declaration.
    #[error("Schema violation at '{field}': {message}")]
    Schema { field: String, message: String },

    /// Operation inputs or parameters are not acceptable.
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Not enough images to satisfy categories: {}", unmet.join(", "))]
    InsufficientSamples { unmet: Vec<String> },

    #[error("Cannot draw {requested} samples without replacement from {available} images")]
    InsufficientImages { requested: usize, available: usize },

    #[error("Annotation {annotation} references unknown image id {image_id}")]
    UnknownImage { annotation: String, image_id: String },

    #[error("Annotation {annotation} references image index {index} (only {len} images)")]
    ImageIndexOutOfRange {
        annotation: String,
        index: usize,
        len: usize,
    },

    #[error("Unsupported task type: {0}")]
    UnsupportedTask(String),

    #[error("Failed to load label payload from {path}: {message}")]
    PayloadLoad { path: String, message: String },
}

impl ManifestError {
    pub(crate) fn shape(what: impl Into<String>, message: impl Into<String>) -> Self {
        ManifestError::Shape {
            what: what.into(),
            message: message.into(),
        }
    }

    pub(crate) fn schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        ManifestError::Schema {
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        ManifestError::Precondition {
            message: message.into(),
        }
    }
}
