//! Per-task translation between document annotations and [`LabelManifest`]s.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use super::document::{leftover_fields, PathResolver};
use crate::error::ManifestError;
use crate::manifest::{
    BBox, BBoxFormat, Grounding, GroundingLabel, LabelData, LabelManifest, Payload,
};

/// Everything a codec needs to decode one annotation.
pub(crate) struct DecodeContext<'a> {
    pub bbox_format: BBoxFormat,
    pub label_id_to_pos: &'a HashMap<i64, usize>,
    pub resolver: &'a PathResolver<'a>,
    pub annotation: String,
}

pub(crate) struct EncodeContext<'a> {
    pub bbox_format: BBoxFormat,
    pub resolver: &'a PathResolver<'a>,
}

/// Reads and writes the task-specific keys of an annotation.
pub(crate) trait LabelCodec: Send + Sync {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError>;

    fn encode(
        &self,
        label: &LabelManifest,
        ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError>;
}

fn field<'a>(
    fields: &'a Map<String, Value>,
    key: &str,
    ctx: &DecodeContext<'_>,
) -> Result<&'a Value, ManifestError> {
    fields.get(key).ok_or_else(|| {
        ManifestError::shape(
            "annotation",
            format!("annotation {} is missing '{}'", ctx.annotation, key),
        )
    })
}

fn string_field(
    fields: &Map<String, Value>,
    key: &str,
    ctx: &DecodeContext<'_>,
) -> Result<String, ManifestError> {
    field(fields, key, ctx)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            ManifestError::shape(
                "annotation",
                format!("annotation {}: '{}' must be a string", ctx.annotation, key),
            )
        })
}

fn category_field(
    fields: &Map<String, Value>,
    ctx: &DecodeContext<'_>,
) -> Result<usize, ManifestError> {
    let raw = field(fields, "category_id", ctx)?;
    let declared = raw.as_i64().ok_or_else(|| {
        ManifestError::shape(
            "annotation",
            format!(
                "annotation {}: category_id must be an integer, got {}",
                ctx.annotation, raw
            ),
        )
    })?;
    ctx.label_id_to_pos.get(&declared).copied().ok_or_else(|| {
        ManifestError::shape(
            "annotation",
            format!(
                "annotation {} references unknown category {}",
                ctx.annotation, declared
            ),
        )
    })
}

fn bbox_from_value(value: &Value, format: BBoxFormat, what: &str) -> Result<BBox, ManifestError> {
    BBox::from_json(value, format).map_err(|e| ManifestError::shape(what, e.to_string()))
}

/// Writes `known` keys on top of the label's preserved extras.
fn with_extras(label: &LabelManifest, known: Map<String, Value>) -> Map<String, Value> {
    let mut out = label.additional_info.clone();
    out.extend(known);
    out
}

fn mismatch(expected: &str) -> ManifestError {
    ManifestError::shape("label", format!("expected a {} label", expected))
}

// ============================================================================
// Implementations
// ============================================================================

pub(crate) struct ClassificationCodec;

impl LabelCodec for ClassificationCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        let category_id = category_field(fields, ctx)?;
        Ok(LabelManifest::classification(category_id)
            .with_additional_info(leftover_fields(fields, &["category_id"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        _ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Classification { category_id } = label.data else {
            return Err(mismatch("classification"));
        };
        let mut known = Map::new();
        known.insert("category_id".into(), json!(category_id + 1));
        Ok(with_extras(label, known))
    }
}

pub(crate) struct DetectionCodec;

impl LabelCodec for DetectionCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        let category_id = category_field(fields, ctx)?;
        let raw = field(fields, "bbox", ctx)?;
        let bbox = bbox_from_value(raw, ctx.bbox_format, "detection label")?;
        Ok(LabelManifest::detection(category_id, bbox)
            .with_additional_info(leftover_fields(fields, &["category_id", "bbox"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Detection(det) = &label.data else {
            return Err(mismatch("detection"));
        };
        let mut known = Map::new();
        known.insert("category_id".into(), json!(det.category_id + 1));
        known.insert("bbox".into(), det.bbox.to_json(ctx.bbox_format));
        Ok(with_extras(label, known))
    }
}

pub(crate) struct CaptionCodec;

impl LabelCodec for CaptionCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        Ok(LabelManifest::caption(string_field(fields, "caption", ctx)?)
            .with_additional_info(leftover_fields(fields, &["caption"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        _ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Caption(caption) = &label.data else {
            return Err(mismatch("caption"));
        };
        let mut known = Map::new();
        known.insert("caption".into(), json!(caption));
        Ok(with_extras(label, known))
    }
}

pub(crate) struct TextMatchingCodec;

impl LabelCodec for TextMatchingCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        let text = string_field(fields, "text", ctx)?;
        let raw = field(fields, "match", ctx)?;
        let match_value = raw.as_i64().ok_or_else(|| {
            ManifestError::shape(
                "text matching label",
                format!("annotation {}: match must be 0 or 1", ctx.annotation),
            )
        })?;
        Ok(LabelManifest::text_matching(text, match_value)?
            .with_additional_info(leftover_fields(fields, &["text", "match"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        _ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::TextMatching(tm) = &label.data else {
            return Err(mismatch("text matching"));
        };
        let mut known = Map::new();
        known.insert("text".into(), json!(tm.text));
        known.insert("match".into(), json!(u8::from(tm.matched)));
        Ok(with_extras(label, known))
    }
}

/// Matting annotations reference a mask file through `label`; the mask itself
/// is loaded on demand. `zip_file` stays among the extras so export knows
/// which paths were archived.
pub(crate) struct MattingCodec;

impl LabelCodec for MattingCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        let path = string_field(fields, "label", ctx)?;
        let zip_file = fields.get("zip_file").and_then(Value::as_str);
        Ok(
            LabelManifest::matting(Payload::deferred(ctx.resolver.resolve(zip_file, &path)))
                .with_additional_info(leftover_fields(fields, &["label"])),
        )
    }

    fn encode(
        &self,
        label: &LabelManifest,
        ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Matting(payload) = &label.data else {
            return Err(mismatch("matting"));
        };
        let path = payload.path().ok_or_else(|| {
            ManifestError::shape(
                "matting label",
                "inline masks have no path and cannot be written to a document",
            )
        })?;
        let archive = label.additional_info.get("zip_file").and_then(Value::as_str);
        let (zip_file, file_name) = ctx.resolver.split(path, archive);
        let mut known = Map::new();
        known.insert("label".into(), json!(file_name));
        let mut out = with_extras(label, known);
        match zip_file {
            Some(zip) => out.insert("zip_file".into(), json!(zip)),
            None => out.remove("zip_file"),
        };
        Ok(out)
    }
}

pub(crate) struct RegressionCodec;

impl LabelCodec for RegressionCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        let Value::Number(target) = field(fields, "target", ctx)? else {
            return Err(ManifestError::shape(
                "regression label",
                format!("annotation {}: target must be a number", ctx.annotation),
            ));
        };
        Ok(LabelManifest::regression_number(target.clone())
            .with_additional_info(leftover_fields(fields, &["target"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        _ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Regression(target) = &label.data else {
            return Err(mismatch("regression"));
        };
        let mut known = Map::new();
        known.insert("target".into(), Value::Number(target.clone()));
        Ok(with_extras(label, known))
    }
}

pub(crate) struct RetrievalCodec;

impl LabelCodec for RetrievalCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        Ok(LabelManifest::retrieval(string_field(fields, "query", ctx)?)
            .with_additional_info(leftover_fields(fields, &["query"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        _ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Retrieval(query) = &label.data else {
            return Err(mismatch("retrieval"));
        };
        let mut known = Map::new();
        known.insert("query".into(), json!(query));
        Ok(with_extras(label, known))
    }
}

pub(crate) struct VqaCodec;

impl LabelCodec for VqaCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        Ok(LabelManifest::vqa(
            string_field(fields, "question", ctx)?,
            string_field(fields, "answer", ctx)?,
        )
        .with_additional_info(leftover_fields(fields, &["question", "answer"])))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        _ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Vqa(vqa) = &label.data else {
            return Err(mismatch("vqa"));
        };
        let mut known = Map::new();
        known.insert("question".into(), json!(vqa.question));
        known.insert("answer".into(), json!(vqa.answer));
        Ok(with_extras(label, known))
    }
}

pub(crate) struct GroundingCodec;

impl GroundingCodec {
    fn decode_grounding(
        raw: &Value,
        ctx: &DecodeContext<'_>,
    ) -> Result<Grounding, ManifestError> {
        let what = "grounding";
        let entry = raw
            .as_object()
            .ok_or_else(|| ManifestError::shape(what, "grounding entries must be objects"))?;
        let text = entry
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ManifestError::shape(what, "grounding needs a 'text' string"))?;
        let span = entry
            .get("text_span")
            .and_then(Value::as_array)
            .filter(|span| span.len() == 2)
            .ok_or_else(|| ManifestError::shape(what, "'text_span' must be [start, end]"))?;
        let bound = |v: &Value| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| ManifestError::shape(what, "text span bounds must be non-negative"))
        };
        let bboxes = entry
            .get("bboxes")
            .and_then(Value::as_array)
            .ok_or_else(|| ManifestError::shape(what, "grounding needs a 'bboxes' list"))?
            .iter()
            .map(|b| bbox_from_value(b, ctx.bbox_format, what))
            .collect::<Result<Vec<_>, _>>()?;
        let id = match entry.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(raw.as_u64().ok_or_else(|| {
                ManifestError::shape(
                    what,
                    format!("grounding id must be a non-negative integer, got {}", raw),
                )
            })?),
        };
        Ok(Grounding {
            id,
            text: text.to_string(),
            text_span: (bound(&span[0])?, bound(&span[1])?),
            bboxes,
            additional_info: leftover_fields(entry, &["id", "text", "text_span", "bboxes"]),
        })
    }
}

impl LabelCodec for GroundingCodec {
    fn decode(
        &self,
        fields: &Map<String, Value>,
        ctx: &DecodeContext<'_>,
    ) -> Result<LabelManifest, ManifestError> {
        let groundings = field(fields, "groundings", ctx)?
            .as_array()
            .ok_or_else(|| ManifestError::shape("grounding", "'groundings' must be a list"))?
            .iter()
            .map(|g| Self::decode_grounding(g, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let label = GroundingLabel::new(
            string_field(fields, "question", ctx)?,
            string_field(fields, "answer", ctx)?,
            groundings,
        )?;
        Ok(LabelManifest::grounding(label).with_additional_info(leftover_fields(
            fields,
            &["question", "answer", "groundings"],
        )))
    }

    fn encode(
        &self,
        label: &LabelManifest,
        ctx: &EncodeContext<'_>,
    ) -> Result<Map<String, Value>, ManifestError> {
        let LabelData::Grounding(grounding) = &label.data else {
            return Err(mismatch("grounding"));
        };
        let groundings: Vec<Value> = grounding
            .groundings
            .iter()
            .map(|g| {
                let mut entry = g.additional_info.clone();
                if let Some(id) = g.id {
                    entry.insert("id".into(), json!(id));
                }
                entry.insert("text".into(), json!(g.text));
                entry.insert("text_span".into(), json!([g.text_span.0, g.text_span.1]));
                let bboxes = g.bboxes.iter().map(|b| b.to_json(ctx.bbox_format));
                entry.insert("bboxes".into(), Value::Array(bboxes.collect()));
                Value::Object(entry)
            })
            .collect();
        let mut known = Map::new();
        known.insert("question".into(), json!(grounding.question));
        known.insert("answer".into(), json!(grounding.answer));
        known.insert("groundings".into(), Value::Array(groundings));
        Ok(with_extras(label, known))
    }
}
