//! Key-value-pair schemas and the field values that must match them.
//!
//! A schema document looks like:
//!
//! ```json
//! {
//!   "name": "defect comparison",
//!   "fieldSchema": {
//!     "severity": {"type": "string", "enum": ["low", "high"]},
//!     "defects": {"type": "array", "items": {"type": "boundingBox"}}
//!   }
//! }
//! ```
//!
//! Each annotated field is written as `{"value": ..., "groundings": [[...]]}`.
//! Arrays hold a list of such entries, objects a map of them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::bbox::{BBox, BBoxFormat};
use crate::error::ManifestError;

/// Recognized field types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    BoundingBox,
}

/// Declaration of one field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub examples: Option<Vec<Value>>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, FieldSchema>>,

    #[serde(
        rename = "includeGrounding",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub include_grounding: bool,
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            description: None,
            examples: None,
            enum_values: None,
            items: None,
            properties: None,
            include_grounding: false,
        }
    }

    pub fn with_grounding(mut self) -> Self {
        self.include_grounding = true;
        self
    }

    fn check(&self, path: &str) -> Result<(), ManifestError> {
        match self.field_type {
            FieldType::Array => {
                let items = self
                    .items
                    .as_ref()
                    .ok_or_else(|| ManifestError::schema(path, "array field requires 'items'"))?;
                items.check(&format!("{}[]", path))?;
            }
            FieldType::Object => {
                let properties = self.properties.as_ref().ok_or_else(|| {
                    ManifestError::schema(path, "object field requires 'properties'")
                })?;
                for (name, property) in properties {
                    property.check(&format!("{}.{}", path, name))?;
                }
            }
            _ => {}
        }
        if self.enum_values.is_some()
            && !matches!(
                self.field_type,
                FieldType::String | FieldType::Number | FieldType::Integer
            )
        {
            return Err(ManifestError::schema(
                path,
                "'enum' is only allowed on string, number and integer fields",
            ));
        }
        Ok(())
    }
}

/// A key-value-pair dataset schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyValuePairSchema {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "fieldSchema")]
    pub field_schema: BTreeMap<String, FieldSchema>,
}

impl KeyValuePairSchema {
    /// Parses and checks a schema document.
    pub fn from_json_str(json: &str) -> Result<Self, ManifestError> {
        let schema: KeyValuePairSchema = serde_json::from_str(json)?;
        schema.check()?;
        Ok(schema)
    }

    /// Checks structural requirements (`array` needs `items`, `object` needs `properties`).
    pub fn check(&self) -> Result<(), ManifestError> {
        for (name, field) in &self.field_schema {
            field.check(name)?;
        }
        Ok(())
    }
}

/// The content of one annotated field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldContent {
    /// A string, number, integer or boolean.
    Scalar(Value),
    BoundingBox(BBox),
    Array(Vec<FieldValue>),
    Object(BTreeMap<String, FieldValue>),
}

/// An annotated field with optional grounding boxes.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValue {
    pub value: FieldContent,
    pub groundings: Option<Vec<BBox>>,
}

impl FieldValue {
    pub fn scalar(value: impl Into<Value>) -> Self {
        Self {
            value: FieldContent::Scalar(value.into()),
            groundings: None,
        }
    }

    pub fn with_groundings(mut self, groundings: Vec<BBox>) -> Self {
        self.groundings = Some(groundings);
        self
    }

    /// True if this value or any nested value carries grounding boxes.
    pub fn has_groundings(&self) -> bool {
        if self.groundings.as_ref().is_some_and(|g| !g.is_empty()) {
            return true;
        }
        match &self.value {
            FieldContent::Array(items) => items.iter().any(FieldValue::has_groundings),
            FieldContent::Object(props) => props.values().any(FieldValue::has_groundings),
            FieldContent::Scalar(_) | FieldContent::BoundingBox(_) => false,
        }
    }

    /// Parses a document entry, validating it against `schema`.
    pub fn from_document(
        entry: &Value,
        schema: &FieldSchema,
        path: &str,
        bbox_format: BBoxFormat,
    ) -> Result<Self, ManifestError> {
        let object = entry
            .as_object()
            .ok_or_else(|| ManifestError::schema(path, "expected an object with a 'value' key"))?;
        let raw = object
            .get("value")
            .ok_or_else(|| ManifestError::schema(path, "missing 'value'"))?;

        let value = match schema.field_type {
            FieldType::String => {
                if !raw.is_string() {
                    return Err(ManifestError::schema(path, "expected a string"));
                }
                check_enum(raw, schema, path)?;
                FieldContent::Scalar(raw.clone())
            }
            FieldType::Number => {
                if !raw.is_number() {
                    return Err(ManifestError::schema(path, "expected a number"));
                }
                check_enum(raw, schema, path)?;
                FieldContent::Scalar(raw.clone())
            }
            FieldType::Integer => {
                if !(raw.is_i64() || raw.is_u64()) {
                    return Err(ManifestError::schema(path, "expected an integer"));
                }
                check_enum(raw, schema, path)?;
                FieldContent::Scalar(raw.clone())
            }
            FieldType::Boolean => {
                if !raw.is_boolean() {
                    return Err(ManifestError::schema(path, "expected a boolean"));
                }
                FieldContent::Scalar(raw.clone())
            }
            FieldType::BoundingBox => FieldContent::BoundingBox(parse_box(raw, path, bbox_format)?),
            FieldType::Array => {
                let items_schema = schema
                    .items
                    .as_deref()
                    .ok_or_else(|| ManifestError::schema(path, "array field requires 'items'"))?;
                let items = raw
                    .as_array()
                    .ok_or_else(|| ManifestError::schema(path, "expected an array"))?;
                let parsed = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        FieldValue::from_document(
                            item,
                            items_schema,
                            &format!("{}[{}]", path, i),
                            bbox_format,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                FieldContent::Array(parsed)
            }
            FieldType::Object => {
                let properties = schema.properties.as_ref().ok_or_else(|| {
                    ManifestError::schema(path, "object field requires 'properties'")
                })?;
                let entries = raw
                    .as_object()
                    .ok_or_else(|| ManifestError::schema(path, "expected an object"))?;
                let mut parsed = BTreeMap::new();
                for (key, item) in entries {
                    let child_path = format!("{}.{}", path, key);
                    let child_schema = properties
                        .get(key)
                        .ok_or_else(|| ManifestError::schema(&child_path, "field not declared"))?;
                    parsed.insert(
                        key.clone(),
                        FieldValue::from_document(item, child_schema, &child_path, bbox_format)?,
                    );
                }
                FieldContent::Object(parsed)
            }
        };

        let groundings = match object.get("groundings") {
            None | Some(Value::Null) => None,
            Some(raw_groundings) => {
                if !schema.include_grounding {
                    return Err(ManifestError::schema(
                        path,
                        "groundings given but the schema does not include grounding",
                    ));
                }
                let boxes = raw_groundings
                    .as_array()
                    .ok_or_else(|| ManifestError::schema(path, "'groundings' must be a list"))?;
                Some(
                    boxes
                        .iter()
                        .map(|b| parse_box(b, path, bbox_format))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
        };

        Ok(FieldValue { value, groundings })
    }

    /// Writes the document form of this value.
    pub fn to_document(&self, bbox_format: BBoxFormat) -> Value {
        let value = match &self.value {
            FieldContent::Scalar(v) => v.clone(),
            FieldContent::BoundingBox(b) => b.to_json(bbox_format),
            FieldContent::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| item.to_document(bbox_format))
                    .collect(),
            ),
            FieldContent::Object(props) => Value::Object(
                props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_document(bbox_format)))
                    .collect(),
            ),
        };
        let mut out = Map::new();
        out.insert("value".to_string(), value);
        if let Some(groundings) = &self.groundings {
            out.insert(
                "groundings".to_string(),
                Value::Array(
                    groundings
                        .iter()
                        .map(|b| b.to_json(bbox_format))
                        .collect(),
                ),
            );
        }
        Value::Object(out)
    }
}

/// The payload of a key-value-pair annotation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyValuePairLabel {
    pub fields: BTreeMap<String, FieldValue>,
    pub text_input: Option<BTreeMap<String, String>>,
}

impl KeyValuePairLabel {
    /// Parses `fields` (and optional `text_input`) against `schema`.
    pub fn from_document(
        fields: &Map<String, Value>,
        text_input: Option<&Value>,
        schema: &KeyValuePairSchema,
        bbox_format: BBoxFormat,
    ) -> Result<Self, ManifestError> {
        let mut parsed = BTreeMap::new();
        for (name, entry) in fields {
            let field_schema = schema
                .field_schema
                .get(name)
                .ok_or_else(|| ManifestError::schema(name, "field not declared in schema"))?;
            parsed.insert(
                name.clone(),
                FieldValue::from_document(entry, field_schema, name, bbox_format)?,
            );
        }

        let text_input = match text_input {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => {
                let mut out = BTreeMap::new();
                for (key, value) in map {
                    let text = value.as_str().ok_or_else(|| {
                        ManifestError::schema(
                            format!("text_input.{}", key),
                            "expected a string",
                        )
                    })?;
                    out.insert(key.clone(), text.to_string());
                }
                Some(out)
            }
            Some(_) => {
                return Err(ManifestError::schema(
                    "text_input",
                    "expected an object of strings",
                ))
            }
        };

        Ok(Self {
            fields: parsed,
            text_input,
        })
    }

    pub fn has_groundings(&self) -> bool {
        self.fields.values().any(FieldValue::has_groundings)
    }

    pub fn fields_to_document(&self, bbox_format: BBoxFormat) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_document(bbox_format)))
            .collect()
    }
}

fn check_enum(raw: &Value, schema: &FieldSchema, path: &str) -> Result<(), ManifestError> {
    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(raw) {
            return Err(ManifestError::schema(
                path,
                format!("{} is not one of the allowed values", raw),
            ));
        }
    }
    Ok(())
}

fn parse_box(raw: &Value, path: &str, format: BBoxFormat) -> Result<BBox, ManifestError> {
    BBox::from_json(raw, format).map_err(|e| ManifestError::schema(path, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> KeyValuePairSchema {
        KeyValuePairSchema::from_json_str(
            r#"{
                "name": "inspection",
                "fieldSchema": {
                    "severity": {"type": "string", "enum": ["low", "high"]},
                    "count": {"type": "integer"},
                    "defect": {"type": "boundingBox"},
                    "parts": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": {"type": "string", "includeGrounding": true},
                                "ok": {"type": "boolean"}
                            }
                        }
                    }
                }
            }"#,
        )
        .expect("schema parses")
    }

    #[test]
    fn schema_requires_items_for_arrays() {
        let err = KeyValuePairSchema::from_json_str(
            r#"{"name": "x", "fieldSchema": {"a": {"type": "array"}}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("items"));
    }

    #[test]
    fn schema_requires_properties_for_objects() {
        assert!(KeyValuePairSchema::from_json_str(
            r#"{"name": "x", "fieldSchema": {"a": {"type": "object"}}}"#,
        )
        .is_err());
    }

    #[test]
    fn nested_fields_parse_and_roundtrip() {
        let fields = json!({
            "severity": {"value": "high"},
            "count": {"value": 3},
            "defect": {"value": [1.0, 2.0, 3.0, 4.0]},
            "parts": {"value": [
                {"value": {
                    "name": {"value": "lid", "groundings": [[0.0, 0.0, 5.0, 5.0]]},
                    "ok": {"value": true}
                }}
            ]}
        });
        let label = KeyValuePairLabel::from_document(
            fields.as_object().expect("object"),
            None,
            &schema(),
            BBoxFormat::Ltwh,
        )
        .expect("label parses");

        assert!(label.has_groundings());
        assert_eq!(
            label.fields["defect"].value,
            FieldContent::BoundingBox(BBox::from_ltrb(1.0, 2.0, 4.0, 6.0))
        );
        assert_eq!(
            Value::Object(label.fields_to_document(BBoxFormat::Ltwh)),
            fields
        );
    }

    #[test]
    fn enum_violation_is_rejected() {
        let fields = json!({"severity": {"value": "medium"}});
        let err = KeyValuePairLabel::from_document(
            fields.as_object().expect("object"),
            None,
            &schema(),
            BBoxFormat::Ltwh,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::Schema { ref field, .. } if field == "severity"));
    }

    #[test]
    fn wrong_scalar_type_is_rejected() {
        let fields = json!({"count": {"value": 2.5}});
        assert!(KeyValuePairLabel::from_document(
            fields.as_object().expect("object"),
            None,
            &schema(),
            BBoxFormat::Ltwh,
        )
        .is_err());
    }

    #[test]
    fn undeclared_field_is_rejected() {
        let fields = json!({"colour": {"value": "red"}});
        assert!(KeyValuePairLabel::from_document(
            fields.as_object().expect("object"),
            None,
            &schema(),
            BBoxFormat::Ltwh,
        )
        .is_err());
    }

    #[test]
    fn groundings_need_schema_permission() {
        let fields = json!({"severity": {"value": "low", "groundings": [[0, 0, 1, 1]]}});
        assert!(KeyValuePairLabel::from_document(
            fields.as_object().expect("object"),
            None,
            &schema(),
            BBoxFormat::Ltwh,
        )
        .is_err());
    }

    #[test]
    fn text_input_must_be_strings() {
        let fields = Map::new();
        let good = json!({"instruction": "compare"});
        let label =
            KeyValuePairLabel::from_document(&fields, Some(&good), &schema(), BBoxFormat::Ltwh)
                .expect("label parses");
        assert_eq!(
            label.text_input.expect("text input")["instruction"],
            "compare"
        );

        let bad = json!({"instruction": 3});
        assert!(
            KeyValuePairLabel::from_document(&fields, Some(&bad), &schema(), BBoxFormat::Ltwh)
                .is_err()
        );
    }
}
