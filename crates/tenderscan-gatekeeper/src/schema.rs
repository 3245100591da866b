//! Declarative output schemas.
//!
//! A small schema tree is enough to describe the assembled record and the
//! per-chunk extraction fragment. Validation collects every violation with
//! its JSON path instead of stopping at the first one.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Schema node
#[derive(Debug, Clone, PartialEq)]
pub enum OutputSchema {
    /// JSON object
    Object(ObjectSchema),
    /// JSON array whose items all match the inner schema
    Array(Box<OutputSchema>),
    /// JSON string
    String,
    /// Any JSON number
    Number,
    /// Integral JSON number
    Integer,
    /// JSON boolean
    Boolean,
    /// `null` or the inner schema
    Nullable(Box<OutputSchema>),
    /// At least one alternative matches
    OneOf(Vec<OutputSchema>),
    /// Anything
    Any,
}

/// Keys an object may carry beyond its declared properties
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AdditionalKeys {
    /// Unknown keys are accepted unchecked
    #[default]
    Allow,
    /// Unknown keys are violations
    Deny,
    /// Every unknown key must match the schema (maps)
    Each(Box<OutputSchema>),
}

/// Object node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    /// Declared properties
    pub properties: BTreeMap<String, OutputSchema>,
    /// Properties that must be present
    pub required: Vec<String>,
    /// Policy for undeclared keys
    pub additional: AdditionalKeys,
}

impl ObjectSchema {
    /// Empty open object
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required property
    pub fn required(mut self, name: &str, schema: OutputSchema) -> Self {
        self.required.push(name.to_string());
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Add an optional property
    pub fn optional(mut self, name: &str, schema: OutputSchema) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Reject undeclared keys
    pub fn closed(mut self) -> Self {
        self.additional = AdditionalKeys::Deny;
        self
    }
}

impl From<ObjectSchema> for OutputSchema {
    fn from(object: ObjectSchema) -> Self {
        OutputSchema::Object(object)
    }
}

/// One schema violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON path, `$` for the root
    pub path: String,
    /// What is wrong
    pub message: String,
}

/// Result of validating a value against a schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaReport {
    /// No violations
    pub valid: bool,
    /// Every violation found
    pub violations: Vec<SchemaViolation>,
}

impl SchemaReport {
    /// Report from collected violations
    pub fn from_violations(violations: Vec<SchemaViolation>) -> Self {
        Self {
            valid: violations.is_empty(),
            violations,
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl OutputSchema {
    /// Array of `item`
    pub fn array(item: OutputSchema) -> Self {
        OutputSchema::Array(Box::new(item))
    }

    /// `null` or `inner`
    pub fn nullable(inner: OutputSchema) -> Self {
        OutputSchema::Nullable(Box::new(inner))
    }

    /// Object with arbitrary keys whose values match `values`
    pub fn map(values: OutputSchema) -> Self {
        OutputSchema::Object(ObjectSchema {
            additional: AdditionalKeys::Each(Box::new(values)),
            ..ObjectSchema::default()
        })
    }

    /// Validate `value`, returning every violation
    pub fn validate(&self, value: &Value) -> SchemaReport {
        let mut violations = Vec::new();
        self.check(value, "$", &mut violations);
        SchemaReport::from_violations(violations)
    }

    fn check(&self, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
        let expect = |out: &mut Vec<SchemaViolation>, expected: &str| {
            out.push(SchemaViolation {
                path: path.to_string(),
                message: format!("expected {}, found {}", expected, json_type(value)),
            })
        };

        match self {
            OutputSchema::Any => {}
            OutputSchema::String => {
                if !value.is_string() {
                    expect(out, "string");
                }
            }
            OutputSchema::Number => {
                if !value.is_number() {
                    expect(out, "number");
                }
            }
            OutputSchema::Integer => {
                if !(value.is_u64() || value.is_i64()) {
                    expect(out, "integer");
                }
            }
            OutputSchema::Boolean => {
                if !value.is_boolean() {
                    expect(out, "boolean");
                }
            }
            OutputSchema::Nullable(inner) => {
                if !value.is_null() {
                    inner.check(value, path, out);
                }
            }
            OutputSchema::Array(item) => match value.as_array() {
                Some(items) => {
                    for (i, v) in items.iter().enumerate() {
                        item.check(v, &format!("{}[{}]", path, i), out);
                    }
                }
                None => expect(out, "array"),
            },
            OutputSchema::OneOf(alternatives) => {
                let matched = alternatives.iter().any(|alt| {
                    let mut scratch = Vec::new();
                    alt.check(value, path, &mut scratch);
                    scratch.is_empty()
                });
                if !matched {
                    out.push(SchemaViolation {
                        path: path.to_string(),
                        message: format!(
                            "{} matches none of {} alternatives",
                            json_type(value),
                            alternatives.len()
                        ),
                    });
                }
            }
            OutputSchema::Object(object) => match value.as_object() {
                Some(map) => object.check(map, path, out),
                None => expect(out, "object"),
            },
        }
    }

    /// Render as a JSON Schema document for model prompts
    pub fn to_json_schema(&self) -> Value {
        match self {
            OutputSchema::Any => json!({}),
            OutputSchema::String => json!({"type": "string"}),
            OutputSchema::Number => json!({"type": "number"}),
            OutputSchema::Integer => json!({"type": "integer"}),
            OutputSchema::Boolean => json!({"type": "boolean"}),
            OutputSchema::Nullable(inner) => {
                json!({"anyOf": [inner.to_json_schema(), {"type": "null"}]})
            }
            OutputSchema::Array(item) => json!({"type": "array", "items": item.to_json_schema()}),
            OutputSchema::OneOf(alternatives) => json!({
                "oneOf": alternatives.iter().map(OutputSchema::to_json_schema).collect::<Vec<_>>()
            }),
            OutputSchema::Object(object) => {
                let properties: Map<String, Value> = object
                    .properties
                    .iter()
                    .map(|(k, s)| (k.clone(), s.to_json_schema()))
                    .collect();
                let additional = match &object.additional {
                    AdditionalKeys::Allow => Value::Bool(true),
                    AdditionalKeys::Deny => Value::Bool(false),
                    AdditionalKeys::Each(s) => s.to_json_schema(),
                };
                let mut schema = json!({
                    "type": "object",
                    "additionalProperties": additional,
                });
                if !properties.is_empty() {
                    schema["properties"] = Value::Object(properties);
                }
                if !object.required.is_empty() {
                    schema["required"] = json!(object.required);
                }
                schema
            }
        }
    }

    /// Schema of the assembled document record
    pub fn assembled_document() -> Self {
        let provenance = OutputSchema::array(provenance());
        let record: OutputSchema = ObjectSchema::new()
            .required("fields", OutputSchema::map(OutputSchema::Any))
            .required("provenance", provenance.clone())
            .optional("conflicts", OutputSchema::array(OutputSchema::String))
            .closed()
            .into();
        let sourced_value: OutputSchema = ObjectSchema::new()
            .required("value", OutputSchema::Any)
            .required("provenance", provenance.clone())
            .optional("conflict", OutputSchema::String)
            .closed()
            .into();
        let row: OutputSchema = ObjectSchema::new()
            .required("cells", OutputSchema::array(OutputSchema::String))
            .optional("footnotes", OutputSchema::array(OutputSchema::String))
            .required("provenance", provenance.clone())
            .closed()
            .into();
        let footnote: OutputSchema = ObjectSchema::new()
            .required("marker", OutputSchema::String)
            .required("text", OutputSchema::String)
            .required("rows", OutputSchema::array(OutputSchema::Integer))
            .required("provenance", provenance.clone())
            .closed()
            .into();
        let table: OutputSchema = ObjectSchema::new()
            .required("element", OutputSchema::nullable(OutputSchema::Integer))
            .required("caption", OutputSchema::nullable(OutputSchema::String))
            .required("header", OutputSchema::array(OutputSchema::String))
            .required("rows", OutputSchema::array(row))
            .required("footnotes", OutputSchema::array(footnote))
            .required("fragments", OutputSchema::array(OutputSchema::String))
            .required("provenance", provenance.clone())
            .closed()
            .into();
        let target = OutputSchema::OneOf(vec![
            ObjectSchema::new()
                .required("status", OutputSchema::String)
                .closed()
                .into(),
            ObjectSchema::new()
                .required("status", OutputSchema::String)
                .required("heading", OutputSchema::Integer)
                .required("resolution", OutputSchema::String)
                .closed()
                .into(),
        ]);
        let reference: OutputSchema = ObjectSchema::new()
            .required("element", OutputSchema::Integer)
            .required("mention", OutputSchema::String)
            .required("label", OutputSchema::String)
            .required("family", OutputSchema::String)
            .required("target", target)
            .required("target_heading", OutputSchema::nullable(OutputSchema::String))
            .required("provenance", provenance)
            .closed()
            .into();
        let conflict_value: OutputSchema = ObjectSchema::new()
            .required("value", OutputSchema::Any)
            .required("source_chunk_id", OutputSchema::String)
            .optional("source_span", OutputSchema::nullable(span()))
            .closed()
            .into();
        let conflict: OutputSchema = ObjectSchema::new()
            .required("field_path", OutputSchema::String)
            .required("section", OutputSchema::String)
            .required("values", OutputSchema::array(conflict_value))
            .required("severity", OutputSchema::String)
            .required("kind", OutputSchema::String)
            .closed()
            .into();
        let metadata: OutputSchema = ObjectSchema::new()
            .required("source_chunks", OutputSchema::Integer)
            .required("successful_chunks", OutputSchema::Integer)
            .required("failed_chunks", OutputSchema::array(OutputSchema::String))
            .required("repaired_chunks", OutputSchema::array(OutputSchema::String))
            .required("content_hash", OutputSchema::String)
            .closed()
            .into();

        let records = OutputSchema::nullable(OutputSchema::array(record));
        let scalars = OutputSchema::nullable(OutputSchema::map(OutputSchema::array(sourced_value)));
        ObjectSchema::new()
            .required("document_id", OutputSchema::String)
            .required("requirements", records.clone())
            .required("unit_prices", records.clone())
            .required("deadlines", records)
            .required("tables", OutputSchema::nullable(OutputSchema::array(table)))
            .required("contact", scalars.clone())
            .required("administrative", scalars)
            .required("conflicts", OutputSchema::array(conflict))
            .required("references", OutputSchema::array(reference.clone()))
            .required("unresolved_references", OutputSchema::array(reference))
            .required("metadata", metadata)
            .closed()
            .into()
    }

    /// Schema of one chunk's extraction fragment, as the model is asked to
    /// return it. Every section is optional and nullable.
    pub fn extraction_fragment() -> Self {
        let text = || OutputSchema::nullable(OutputSchema::String);
        let amount =
            || OutputSchema::nullable(OutputSchema::OneOf(vec![OutputSchema::Number, OutputSchema::String]));

        let requirement = OutputSchema::OneOf(vec![
            OutputSchema::String,
            ObjectSchema::new()
                .optional("text", text())
                .optional("mandatory", OutputSchema::nullable(OutputSchema::Boolean))
                .into(),
        ]);
        let unit_price: OutputSchema = ObjectSchema::new()
            .optional("item", text())
            .optional("quantity", amount())
            .optional("unit", text())
            .optional("unit_price", amount())
            .optional("currency", text())
            .into();
        let deadline: OutputSchema = ObjectSchema::new()
            .optional("kind", text())
            .optional("date", text())
            .optional("time", text())
            .optional("description", text())
            .into();
        let footnote: OutputSchema = ObjectSchema::new()
            .optional("marker", text())
            .optional("text", text())
            .into();
        let table: OutputSchema = ObjectSchema::new()
            .optional("caption", text())
            .optional("header", OutputSchema::array(OutputSchema::Any))
            .optional("rows", OutputSchema::array(OutputSchema::array(OutputSchema::Any)))
            .optional("footnotes", OutputSchema::array(footnote))
            .into();

        let list = |item: OutputSchema| OutputSchema::nullable(OutputSchema::array(item));
        ObjectSchema::new()
            .optional("requirements", list(requirement))
            .optional("unit_prices", list(unit_price))
            .optional("deadlines", list(deadline))
            .optional("tables", list(table))
            .optional("contact", OutputSchema::nullable(OutputSchema::map(OutputSchema::Any)))
            .optional(
                "administrative",
                OutputSchema::nullable(OutputSchema::map(OutputSchema::Any)),
            )
            .into()
    }
}

impl ObjectSchema {
    fn check(&self, map: &Map<String, Value>, path: &str, out: &mut Vec<SchemaViolation>) {
        for key in &self.required {
            if !map.contains_key(key) {
                out.push(SchemaViolation {
                    path: format!("{}.{}", path, key),
                    message: "required key is missing".to_string(),
                });
            }
        }
        for (key, value) in map {
            let child = format!("{}.{}", path, key);
            match (self.properties.get(key), &self.additional) {
                (Some(schema), _) => schema.check(value, &child, out),
                (None, AdditionalKeys::Allow) => {}
                (None, AdditionalKeys::Deny) => out.push(SchemaViolation {
                    path: child,
                    message: "unexpected key".to_string(),
                }),
                (None, AdditionalKeys::Each(schema)) => schema.check(value, &child, out),
            }
        }
    }
}

fn span() -> OutputSchema {
    ObjectSchema::new()
        .required("start", OutputSchema::Integer)
        .required("end", OutputSchema::Integer)
        .closed()
        .into()
}

fn provenance() -> OutputSchema {
    ObjectSchema::new()
        .required("source_chunk_id", OutputSchema::String)
        .optional("source_span", OutputSchema::nullable(span()))
        .closed()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenderscan_domain::{
        AssembledDocument, AssembledRow, AssembledTable, ChunkId, DocumentId, Provenance,
        SourcedRecord, SourcedValue, Span,
    };

    fn document() -> AssembledDocument {
        let provenance = vec![Provenance::new(ChunkId::from_index(0)).with_span(Span::new(0, 5))];
        let mut doc = AssembledDocument::empty(DocumentId::from_string("tender-1"));
        doc.unit_prices = Some(vec![SourcedRecord {
            fields: [("item".to_string(), json!("Bread"))].into_iter().collect(),
            provenance: provenance.clone(),
            conflicts: vec!["unit_prices[bread].unit_price".to_string()],
        }]);
        doc.deadlines = Some(vec![]);
        doc.contact = Some(
            [(
                "phone".to_string(),
                vec![SourcedValue {
                    value: json!("555 01 02"),
                    provenance: provenance.clone(),
                    conflict: None,
                }],
            )]
            .into_iter()
            .collect(),
        );
        doc.tables = Some(vec![AssembledTable {
            element: None,
            caption: None,
            header: vec!["Item".into()],
            rows: vec![AssembledRow {
                cells: vec!["Bread".into()],
                footnotes: vec!["(*)".into()],
                provenance: provenance.clone(),
            }],
            footnotes: vec![],
            fragments: vec![ChunkId::from_index(0)],
            provenance,
        }]);
        doc
    }

    #[test]
    fn test_assembled_document_matches_its_schema() {
        let value = serde_json::to_value(document()).unwrap();
        let report = OutputSchema::assembled_document().validate(&value);
        assert!(report.valid, "{:?}", report.violations);
    }

    #[test]
    fn test_violations_carry_paths() {
        let mut value = serde_json::to_value(document()).unwrap();
        value["unit_prices"][0]["provenance"] = json!("c0000");
        value["metadata"]["extra"] = json!(1);
        value.as_object_mut().unwrap().remove("conflicts");

        let report = OutputSchema::assembled_document().validate(&value);
        assert!(!report.valid);
        let paths: Vec<&str> = report.violations.iter().map(|v| v.path.as_str()).collect();
        assert!(paths.contains(&"$.unit_prices[0].provenance"));
        assert!(paths.contains(&"$.metadata.extra"));
        assert!(paths.contains(&"$.conflicts"));
    }

    #[test]
    fn test_one_of_and_nullable() {
        let schema = OutputSchema::nullable(OutputSchema::OneOf(vec![
            OutputSchema::Integer,
            OutputSchema::String,
        ]));
        assert!(schema.validate(&json!(null)).valid);
        assert!(schema.validate(&json!(3)).valid);
        assert!(schema.validate(&json!("3")).valid);
        assert!(!schema.validate(&json!(3.5)).valid);
        assert!(!schema.validate(&json!([3])).valid);
    }

    #[test]
    fn test_extraction_fragment_schema() {
        let schema = OutputSchema::extraction_fragment();
        let fragment = json!({
            "requirements": ["ISO 22000 certificate", {"text": "Daily delivery", "mandatory": true}],
            "unit_prices": [{"item": "Bread", "unit_price": "12,50", "currency": "TRY"}],
            "contact": {"phone": "555"},
            "notes": "ignored"
        });
        assert!(schema.validate(&fragment).valid);
        assert!(!schema.validate(&json!({"unit_prices": "Bread"})).valid);
        assert!(!schema.validate(&json!(["not", "an", "object"])).valid);
    }

    #[test]
    fn test_json_schema_rendering() {
        let rendered = OutputSchema::extraction_fragment().to_json_schema();
        assert_eq!(rendered["type"], "object");
        assert!(rendered["properties"]["unit_prices"]["anyOf"].is_array());

        let closed = OutputSchema::assembled_document().to_json_schema();
        assert_eq!(closed["additionalProperties"], json!(false));
        assert!(closed["required"]
            .as_array()
            .unwrap()
            .contains(&json!("conflicts")));
    }
}
