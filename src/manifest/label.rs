//! Per-task label payloads.
//!
//! [`LabelManifest`] pairs one [`LabelData`] variant with free-form metadata.
//! Constructors validate the payload shape; nothing is coerced.

use serde_json::Number;

use super::bbox::BBox;
use super::category::AdditionalInfo;
use super::key_value::KeyValuePairLabel;
use super::payload::{MattingMask, Payload, PayloadLoader};
use super::task::TaskType;
use crate::error::ManifestError;

/// A detection label: a category and an absolute pixel box.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectionLabel {
    pub category_id: usize,
    pub bbox: BBox,
}

impl DetectionLabel {
    /// Builds a label from `[category_id, left, top, right, bottom]`.
    pub fn from_label_data(data: &[f64]) -> Result<Self, ManifestError> {
        let [category, left, top, right, bottom] = <[f64; 5]>::try_from(data).map_err(|_| {
            ManifestError::shape(
                "detection label",
                format!("expected 5 values, got {}", data.len()),
            )
        })?;
        let category_id = category_index(category)?;
        let bbox = BBox::from_ltrb(left, top, right, bottom);
        if !bbox.is_finite() {
            return Err(ManifestError::shape(
                "detection label",
                "box coordinates must be finite",
            ));
        }
        Ok(Self { category_id, bbox })
    }

    /// `[category_id, left, top, right, bottom]`.
    pub fn label_data(&self) -> [f64; 5] {
        let [l, t, r, b] = self.bbox.to_ltrb();
        [self.category_id as f64, l, t, r, b]
    }
}

fn category_index(value: f64) -> Result<usize, ManifestError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(ManifestError::shape(
            "category id",
            format!("{} is not a non-negative integer", value),
        ));
    }
    Ok(value as usize)
}

/// A caption paired with whether it matches the image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMatchingLabel {
    pub text: String,
    pub matched: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VqaLabel {
    pub question: String,
    pub answer: String,
}

/// A span of the answer tied to boxes in the image.
#[derive(Clone, Debug, PartialEq)]
pub struct Grounding {
    pub id: Option<u64>,
    pub text: String,
    /// Character offsets into the answer, `start < end <= len(answer)`.
    pub text_span: (usize, usize),
    pub bboxes: Vec<BBox>,
    pub additional_info: AdditionalInfo,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GroundingLabel {
    pub question: String,
    pub answer: String,
    pub groundings: Vec<Grounding>,
}

impl GroundingLabel {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        groundings: Vec<Grounding>,
    ) -> Result<Self, ManifestError> {
        let label = Self {
            question: question.into(),
            answer: answer.into(),
            groundings,
        };
        let answer_len = label.answer.chars().count();
        for grounding in &label.groundings {
            let (start, end) = grounding.text_span;
            if start >= end || end > answer_len {
                return Err(ManifestError::shape(
                    "grounding",
                    format!(
                        "text span [{}, {}) does not fit an answer of length {}",
                        start, end, answer_len
                    ),
                ));
            }
            if grounding.bboxes.iter().any(|b| !b.is_finite()) {
                return Err(ManifestError::shape(
                    "grounding",
                    "box coordinates must be finite",
                ));
            }
        }
        Ok(label)
    }
}

/// Task-specific label payload.
#[derive(Clone, Debug, PartialEq)]
pub enum LabelData {
    Classification { category_id: usize },
    Detection(DetectionLabel),
    Caption(String),
    TextMatching(TextMatchingLabel),
    Matting(Payload<MattingMask>),
    /// Kept as the source number so integer targets stay integers.
    Regression(Number),
    Retrieval(String),
    Vqa(VqaLabel),
    Grounding(GroundingLabel),
    KeyValuePair(KeyValuePairLabel),
}

impl LabelData {
    /// Whether this payload is valid for `task`.
    pub fn fits(&self, task: TaskType) -> bool {
        matches!(
            (self, task),
            (
                LabelData::Classification { .. },
                TaskType::ClassificationMulticlass | TaskType::ClassificationMultilabel
            ) | (LabelData::Detection(_), TaskType::ObjectDetection)
                | (LabelData::Caption(_), TaskType::ImageCaption)
                | (LabelData::TextMatching(_), TaskType::ImageTextMatching)
                | (LabelData::Matting(_), TaskType::ImageMatting)
                | (LabelData::Regression(_), TaskType::ImageRegression)
                | (LabelData::Retrieval(_), TaskType::TextImageRetrieval)
                | (LabelData::Vqa(_), TaskType::VisualQuestionAnswering)
                | (LabelData::Grounding(_), TaskType::VisualGrounding)
                | (LabelData::KeyValuePair(_), TaskType::KeyValuePair)
        )
    }

    fn kind(&self) -> &'static str {
        match self {
            LabelData::Classification { .. } => "classification",
            LabelData::Detection(_) => "detection",
            LabelData::Caption(_) => "caption",
            LabelData::TextMatching(_) => "text matching",
            LabelData::Matting(_) => "matting",
            LabelData::Regression(_) => "regression",
            LabelData::Retrieval(_) => "retrieval",
            LabelData::Vqa(_) => "vqa",
            LabelData::Grounding(_) => "grounding",
            LabelData::KeyValuePair(_) => "key-value-pair",
        }
    }
}

/// One label attached to an image.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelManifest {
    pub data: LabelData,
    pub additional_info: AdditionalInfo,
}

impl LabelManifest {
    pub fn new(data: LabelData) -> Self {
        Self {
            data,
            additional_info: AdditionalInfo::new(),
        }
    }

    pub fn classification(category_id: usize) -> Self {
        Self::new(LabelData::Classification { category_id })
    }

    pub fn detection(category_id: usize, bbox: BBox) -> Self {
        Self::new(LabelData::Detection(DetectionLabel { category_id, bbox }))
    }

    pub fn caption(caption: impl Into<String>) -> Self {
        Self::new(LabelData::Caption(caption.into()))
    }

    /// `match_value` must be 0 or 1.
    pub fn text_matching(text: impl Into<String>, match_value: i64) -> Result<Self, ManifestError> {
        let matched = match match_value {
            0 => false,
            1 => true,
            other => {
                return Err(ManifestError::shape(
                    "text matching label",
                    format!("match must be 0 or 1, got {}", other),
                ))
            }
        };
        Ok(Self::new(LabelData::TextMatching(TextMatchingLabel {
            text: text.into(),
            matched,
        })))
    }

    pub fn matting(payload: Payload<MattingMask>) -> Self {
        Self::new(LabelData::Matting(payload))
    }

    pub fn regression(target: f64) -> Result<Self, ManifestError> {
        let target = Number::from_f64(target).ok_or_else(|| {
            ManifestError::shape("regression label", "target must be finite")
        })?;
        Ok(Self::regression_number(target))
    }

    pub fn regression_number(target: Number) -> Self {
        Self::new(LabelData::Regression(target))
    }

    pub fn retrieval(query: impl Into<String>) -> Self {
        Self::new(LabelData::Retrieval(query.into()))
    }

    pub fn vqa(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(LabelData::Vqa(VqaLabel {
            question: question.into(),
            answer: answer.into(),
        }))
    }

    pub fn grounding(label: GroundingLabel) -> Self {
        Self::new(LabelData::Grounding(label))
    }

    pub fn with_additional_info(mut self, info: AdditionalInfo) -> Self {
        self.additional_info = info;
        self
    }

    /// The referenced category position, for category-bearing labels.
    pub fn category_id(&self) -> Option<usize> {
        match &self.data {
            LabelData::Classification { category_id } => Some(*category_id),
            LabelData::Detection(det) => Some(det.category_id),
            _ => None,
        }
    }

    /// Returns a copy pointing at a different category.
    pub fn with_category_id(&self, category_id: usize) -> Result<Self, ManifestError> {
        let mut label = self.clone();
        match &mut label.data {
            LabelData::Classification { category_id: c } => *c = category_id,
            LabelData::Detection(det) => det.category_id = category_id,
            other => {
                return Err(ManifestError::shape(
                    "label",
                    format!("{} labels have no category", other.kind()),
                ))
            }
        }
        Ok(label)
    }

    /// Resolves a matting mask, checking it against the image size when known.
    pub fn matting_mask<'a>(
        &'a self,
        loader: &dyn PayloadLoader<MattingMask>,
        expected_size: Option<(u32, u32)>,
    ) -> Result<&'a MattingMask, ManifestError> {
        let LabelData::Matting(payload) = &self.data else {
            return Err(ManifestError::shape(
                "label",
                format!("{} labels carry no mask", self.data.kind()),
            ));
        };
        let mask = payload.resolve(loader)?;
        if let Some((width, height)) = expected_size {
            if mask.width() != width || mask.height() != height {
                return Err(ManifestError::shape(
                    "matting mask",
                    format!(
                        "mask is {}x{} but the image is {}x{}",
                        mask.width(),
                        mask.height(),
                        width,
                        height
                    ),
                ));
            }
        }
        Ok(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection_requires_five_values() {
        assert!(DetectionLabel::from_label_data(&[0.0, 1.0, 2.0, 3.0]).is_err());
        let det = DetectionLabel::from_label_data(&[2.0, 10.0, 10.0, 90.0, 90.0]).expect("valid");
        assert_eq!(det.category_id, 2);
        assert_eq!(det.label_data(), [2.0, 10.0, 10.0, 90.0, 90.0]);
    }

    #[test]
    fn detection_rejects_fractional_or_negative_category() {
        assert!(DetectionLabel::from_label_data(&[1.5, 0.0, 0.0, 1.0, 1.0]).is_err());
        assert!(DetectionLabel::from_label_data(&[-1.0, 0.0, 0.0, 1.0, 1.0]).is_err());
    }

    #[test]
    fn text_matching_accepts_only_binary_match() {
        assert!(LabelManifest::text_matching("a dog", 1).is_ok());
        assert!(LabelManifest::text_matching("a dog", 2).is_err());
    }

    #[test]
    fn regression_rejects_nan() {
        assert!(LabelManifest::regression(f64::NAN).is_err());
        assert!(LabelManifest::regression(0.25).is_ok());
    }

    #[test]
    fn grounding_span_must_fit_answer() {
        let grounding = |start, end| Grounding {
            id: None,
            text: "dog".into(),
            text_span: (start, end),
            bboxes: vec![BBox::from_ltrb(0.0, 0.0, 5.0, 5.0)],
            additional_info: AdditionalInfo::new(),
        };
        assert!(GroundingLabel::new("what?", "a dog", vec![grounding(2, 5)]).is_ok());
        assert!(GroundingLabel::new("what?", "a dog", vec![grounding(2, 6)]).is_err());
        assert!(GroundingLabel::new("what?", "a dog", vec![grounding(3, 3)]).is_err());
    }

    #[test]
    fn category_remap_only_applies_to_category_labels() {
        let det = LabelManifest::detection(0, BBox::from_ltrb(0.0, 0.0, 1.0, 1.0));
        assert_eq!(
            det.with_category_id(3).expect("remap").category_id(),
            Some(3)
        );
        assert!(LabelManifest::caption("hi").with_category_id(1).is_err());
        assert_eq!(LabelManifest::caption("hi").category_id(), None);
    }

    #[test]
    fn matting_mask_is_checked_against_image_size() {
        let loader = |_: &str| MattingMask::new(2, 2, vec![0; 4]);
        let label = LabelManifest::matting(Payload::deferred("m.png"));
        assert!(label.matting_mask(&loader, Some((2, 2))).is_ok());
        assert!(label.matting_mask(&loader, Some((3, 2))).is_err());
    }

    #[test]
    fn payload_fits_its_task() {
        assert!(LabelManifest::classification(0)
            .data
            .fits(TaskType::ClassificationMultilabel));
        assert!(!LabelManifest::caption("x").data.fits(TaskType::ImageRegression));
    }
}
