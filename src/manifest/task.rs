//! Task-type tags.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// The annotation shape a dataset carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    ClassificationMulticlass,
    ClassificationMultilabel,
    ObjectDetection,
    ImageCaption,
    ImageMatting,
    ImageRegression,
    ImageTextMatching,
    TextImageRetrieval,
    VisualQuestionAnswering,
    VisualGrounding,
    KeyValuePair,
    Multitask,
}

impl TaskType {
    /// Every task type, in declaration order.
    pub const ALL: [TaskType; 12] = [
        TaskType::ClassificationMulticlass,
        TaskType::ClassificationMultilabel,
        TaskType::ObjectDetection,
        TaskType::ImageCaption,
        TaskType::ImageMatting,
        TaskType::ImageRegression,
        TaskType::ImageTextMatching,
        TaskType::TextImageRetrieval,
        TaskType::VisualQuestionAnswering,
        TaskType::VisualGrounding,
        TaskType::KeyValuePair,
        TaskType::Multitask,
    ];

    /// Canonical snake_case name.
    pub fn name(&self) -> &'static str {
        match self {
            TaskType::ClassificationMulticlass => "classification_multiclass",
            TaskType::ClassificationMultilabel => "classification_multilabel",
            TaskType::ObjectDetection => "object_detection",
            TaskType::ImageCaption => "image_caption",
            TaskType::ImageMatting => "image_matting",
            TaskType::ImageRegression => "image_regression",
            TaskType::ImageTextMatching => "image_text_matching",
            TaskType::TextImageRetrieval => "text_image_retrieval",
            TaskType::VisualQuestionAnswering => "visual_question_answering",
            TaskType::VisualGrounding => "visual_grounding",
            TaskType::KeyValuePair => "key_value_pair",
            TaskType::Multitask => "multitask",
        }
    }

    /// Whether labels of this task reference a category list.
    pub fn has_categories(&self) -> bool {
        matches!(
            self,
            TaskType::ClassificationMulticlass
                | TaskType::ClassificationMultilabel
                | TaskType::ObjectDetection
        )
    }

    /// Whether annotations of this task span several images.
    pub fn is_multi_image(&self) -> bool {
        matches!(self, TaskType::KeyValuePair)
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskType {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let task = match normalized.as_str() {
            "classification_multiclass" | "multiclass" => TaskType::ClassificationMulticlass,
            "classification_multilabel" | "multilabel" => TaskType::ClassificationMultilabel,
            "object_detection" | "detection" => TaskType::ObjectDetection,
            "image_caption" | "caption" => TaskType::ImageCaption,
            "image_matting" | "matting" => TaskType::ImageMatting,
            "image_regression" | "regression" => TaskType::ImageRegression,
            "image_text_matching" | "text_matching" => TaskType::ImageTextMatching,
            "text_image_retrieval" | "retrieval" => TaskType::TextImageRetrieval,
            "visual_question_answering" | "vqa" => TaskType::VisualQuestionAnswering,
            "visual_grounding" | "grounding" => TaskType::VisualGrounding,
            "key_value_pair" | "kvp" => TaskType::KeyValuePair,
            "multitask" => TaskType::Multitask,
            _ => return Err(ManifestError::UnsupportedTask(s.to_string())),
        };
        Ok(task)
    }
}

/// The task tag of a dataset manifest: one task, or a named set of tasks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataType {
    Single(TaskType),
    Multitask(BTreeMap<String, TaskType>),
}

impl DataType {
    pub fn is_multitask(&self) -> bool {
        matches!(self, DataType::Multitask(_))
    }

    /// The task type when this is not a multitask tag.
    pub fn single(&self) -> Option<TaskType> {
        match self {
            DataType::Single(task) => Some(*task),
            DataType::Multitask(_) => None,
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Single(TaskType::ClassificationMulticlass)
    }
}

impl From<TaskType> for DataType {
    fn from(task: TaskType) -> Self {
        DataType::Single(task)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Single(task) => write!(f, "{}", task),
            DataType::Multitask(tasks) => {
                let parts: Vec<String> = tasks
                    .iter()
                    .map(|(name, task)| format!("{}={}", name, task))
                    .collect();
                write!(f, "multitask({})", parts.join(", "))
            }
        }
    }
}
