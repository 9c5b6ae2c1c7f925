use std::collections::BTreeMap;

use super::category::AdditionalInfo;
use super::ids::ImageKey;
use super::label::LabelManifest;

/// Labels of one image: a flat list, or one list per task in a multitask dataset.
#[derive(Clone, Debug, PartialEq)]
pub enum ImageLabels {
    Single(Vec<LabelManifest>),
    Multitask(BTreeMap<String, Vec<LabelManifest>>),
}

impl Default for ImageLabels {
    fn default() -> Self {
        ImageLabels::Single(Vec::new())
    }
}

impl ImageLabels {
    pub fn is_empty(&self) -> bool {
        match self {
            ImageLabels::Single(labels) => labels.is_empty(),
            ImageLabels::Multitask(tasks) => tasks.values().all(Vec::is_empty),
        }
    }

    /// Total number of labels across tasks.
    pub fn len(&self) -> usize {
        match self {
            ImageLabels::Single(labels) => labels.len(),
            ImageLabels::Multitask(tasks) => tasks.values().map(Vec::len).sum(),
        }
    }
}

/// One image: where it lives, its size and its labels.
///
/// `img_path` may be a plain path, a URL, or `<archive>@<entry>`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageDataManifest {
    pub id: ImageKey,
    pub img_path: String,
    /// Archive the image was read from; `img_path` then holds `<archive>@<entry>`.
    pub archive: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub labels: ImageLabels,
    pub additional_info: AdditionalInfo,
}

impl ImageDataManifest {
    pub fn new(id: impl Into<ImageKey>, img_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            img_path: img_path.into(),
            archive: None,
            width: None,
            height: None,
            labels: ImageLabels::default(),
            additional_info: AdditionalInfo::new(),
        }
    }

    /// Places the image inside `archive`; `img_path` becomes `<archive>@<entry>`.
    pub fn with_archive(mut self, archive: impl Into<String>) -> Self {
        let archive = archive.into();
        self.img_path = format!("{}@{}", archive, self.img_path);
        self.archive = Some(archive);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_labels(mut self, labels: Vec<LabelManifest>) -> Self {
        self.labels = ImageLabels::Single(labels);
        self
    }

    pub fn with_task_labels(mut self, labels: BTreeMap<String, Vec<LabelManifest>>) -> Self {
        self.labels = ImageLabels::Multitask(labels);
        self
    }

    /// True when the image carries no labels at all.
    pub fn is_negative(&self) -> bool {
        self.labels.is_empty()
    }

    /// `(width, height)` when both are known.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }

    /// The flat label list; empty for multitask images.
    pub fn single_labels(&self) -> &[LabelManifest] {
        match &self.labels {
            ImageLabels::Single(labels) => labels,
            ImageLabels::Multitask(_) => &[],
        }
    }

    /// Labels of `task` in a multitask image.
    pub fn task_labels(&self, task: &str) -> &[LabelManifest] {
        match &self.labels {
            ImageLabels::Multitask(tasks) => tasks.get(task).map(Vec::as_slice).unwrap_or(&[]),
            ImageLabels::Single(_) => &[],
        }
    }
}
