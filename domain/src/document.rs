use crate::schema::{CollectionSchema, FieldDefinition, FieldType};
use crate::{DocumentId, DomainError, ID_FIELD};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored document: store-generated id plus fields validated against a schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    id: DocumentId,
    /// Document data stored as field name -> JSON Value pairs.
    fields: Map<String, Value>,
}

impl Document {
    /// Creates a new document, validating fields against the provided schema.
    ///
    /// Absent or null fields take their declared default, embedded
    /// sub-documents get an `_id` when they lack one, and fields the schema
    /// does not declare are dropped.
    pub fn new(
        id: DocumentId,
        fields: Map<String, Value>,
        schema: &CollectionSchema,
    ) -> Result<Self, DomainError> {
        if !schema.is_built() {
            return Err(DomainError::InvalidSchema(format!(
                "Schema '{}' has not been built",
                schema.name
            )));
        }
        let fields = validate_fields(&schema.fields, fields, "")?;
        Ok(Self { id, fields })
    }

    /// Creates a document from a JSON object, keeping its `_id` when present.
    pub fn from_value(value: Value, schema: &CollectionSchema) -> Result<Self, DomainError> {
        let Value::Object(mut fields) = value else {
            return Err(DomainError::InvalidDocument(format!(
                "Expected a JSON object, got {}",
                value
            )));
        };
        let id = take_id(&mut fields, ID_FIELD)?;
        Self::new(id, fields, schema)
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Gets a specific top-level field's value.
    pub fn get_field_value(&self, field_name: &str) -> Option<&Value> {
        self.fields.get(field_name)
    }

    /// Collects every value found at a dotted path. Arrays of sub-documents
    /// are traversed, so `properties.type` yields one value per property.
    pub fn values_at(&self, path: &str) -> Vec<&Value> {
        let mut segments = path.split('.');
        let mut current: Vec<&Value> = match segments.next() {
            Some(first) => self.fields.get(first).into_iter().collect(),
            None => return Vec::new(),
        };
        for segment in segments {
            current = current
                .into_iter()
                .flat_map(|value| match value {
                    Value::Array(items) => items.iter().filter_map(|item| item.get(segment)).collect(),
                    other => other.get(segment).into_iter().collect::<Vec<_>>(),
                })
                .collect();
        }
        current
    }

    /// The document as a single JSON object including `_id`.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert(ID_FIELD.to_string(), Value::String(self.id.as_str().to_string()));
        Value::Object(map)
    }
}

fn take_id(fields: &mut Map<String, Value>, path: &str) -> Result<DocumentId, DomainError> {
    match fields.remove(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(DocumentId::new(id)),
        Some(Value::Null) | None => Ok(DocumentId::generate()),
        Some(other) => Err(DomainError::InvalidFieldValue {
            field: path.to_string(),
            reason: format!("Expected a non-empty text id, got {}", other),
        }),
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

fn invalid(path: &str, reason: String) -> DomainError {
    DomainError::InvalidFieldValue {
        field: path.to_string(),
        reason,
    }
}

fn validate_fields(
    definitions: &[FieldDefinition],
    mut input: Map<String, Value>,
    prefix: &str,
) -> Result<Map<String, Value>, DomainError> {
    let mut validated = Map::new();
    for definition in definitions {
        let path = join_path(prefix, &definition.name);
        let value = match input.remove(&definition.name) {
            Some(Value::Null) | None => definition.default.as_ref().map(|d| d.resolve()),
            Some(value) => Some(value),
        };
        match value {
            Some(value) => {
                let value = validate_value(definition, value, &path)?;
                validated.insert(definition.name.clone(), value);
            }
            None if definition.required => return Err(DomainError::MissingField(path)),
            None => {}
        }
    }
    // Whatever is left in `input` is not part of the schema and is not stored.
    Ok(validated)
}

fn validate_value(
    definition: &FieldDefinition,
    value: Value,
    path: &str,
) -> Result<Value, DomainError> {
    match &definition.field_type {
        FieldType::Text => {
            let Value::String(text) = &value else {
                return Err(invalid(path, format!("Expected a text string, got {:?}", value)));
            };
            if text.is_empty() && definition.required {
                return Err(DomainError::MissingField(path.to_string()));
            }
            if let Some(allowed) = &definition.allowed {
                if !allowed.iter().any(|candidate| candidate == text) {
                    return Err(invalid(
                        path,
                        format!("'{}' is not one of {:?}", text, allowed),
                    ));
                }
            }
            Ok(value)
        }
        FieldType::Number => {
            if value.is_number() {
                Ok(value)
            } else {
                Err(invalid(path, format!("Expected a number, got {:?}", value)))
            }
        }
        FieldType::Date => normalize_date(&value)
            .map(Value::String)
            .ok_or_else(|| invalid(path, format!("Expected an RFC 3339 timestamp, got {:?}", value))),
        FieldType::Embedded(nested) => {
            let Value::Array(items) = value else {
                return Err(invalid(path, format!("Expected an array of documents, got {:?}", value)));
            };
            items
                .into_iter()
                .enumerate()
                .map(|(position, item)| {
                    let item_path = format!("{}.{}", path, position);
                    let Value::Object(mut item_fields) = item else {
                        return Err(invalid(&item_path, "Expected an embedded document".to_string()));
                    };
                    let id = take_id(&mut item_fields, &join_path(&item_path, ID_FIELD))?;
                    let mut sub_document = validate_fields(nested, item_fields, &item_path)?;
                    sub_document.insert(ID_FIELD.to_string(), Value::String(id.into()));
                    Ok(Value::Object(sub_document))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
    }
}

/// Accepts RFC 3339 text or epoch milliseconds; yields RFC 3339 UTC with
/// millisecond precision.
fn normalize_date(value: &Value) -> Option<String> {
    let parsed = match value {
        Value::String(text) => DateTime::parse_from_rfc3339(text).ok()?.with_timezone(&Utc),
        Value::Number(millis) => DateTime::from_timestamp_millis(millis.as_i64()?)?,
        _ => return None,
    };
    Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDefault, FieldDefinition};
    use serde_json::json;

    fn create_test_schema() -> CollectionSchema {
        CollectionSchema::new(
            "releases",
            vec![
                FieldDefinition::text("label").required(),
                FieldDefinition::text("summary"),
                FieldDefinition::number("level").with_default(FieldDefault::Value(json!(1))),
                FieldDefinition::date("published").with_default(FieldDefault::Now),
                FieldDefinition::embedded(
                    "notes",
                    vec![
                        FieldDefinition::text("kind")
                            .required()
                            .one_of(&["a", "b"])
                            .with_default(FieldDefault::Value(json!("a"))),
                        FieldDefinition::text("body").required(),
                    ],
                )
                .with_default(FieldDefault::EmptyArray),
            ],
        )
        .build()
        .expect("Failed to build test schema")
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fields must be an object"),
        }
    }

    #[test]
    fn document_creation_applies_defaults() {
        let schema = create_test_schema();
        let doc = Document::new(DocumentId::new("d1"), fields(json!({"label": "x"})), &schema).unwrap();
        assert_eq!(doc.get_field_value("level"), Some(&json!(1)));
        assert_eq!(doc.get_field_value("notes"), Some(&json!([])));
        assert!(doc.get_field_value("summary").is_none());
        let published = doc.get_field_value("published").and_then(Value::as_str).unwrap();
        assert!(DateTime::parse_from_rfc3339(published).is_ok());
    }

    #[test]
    fn null_takes_default() {
        let schema = create_test_schema();
        let doc = Document::new(
            DocumentId::new("d1"),
            fields(json!({"label": "x", "level": null})),
            &schema,
        )
        .unwrap();
        assert_eq!(doc.get_field_value("level"), Some(&json!(1)));
    }

    #[test]
    fn document_creation_fails_missing_required_field() {
        let schema = create_test_schema();
        let result = Document::new(DocumentId::new("d2"), fields(json!({"summary": "s"})), &schema);
        assert_eq!(result, Err(DomainError::MissingField("label".to_string())));
    }

    #[test]
    fn empty_required_text_counts_as_missing() {
        let schema = create_test_schema();
        let result = Document::new(DocumentId::new("d2"), fields(json!({"label": ""})), &schema);
        assert_eq!(result, Err(DomainError::MissingField("label".to_string())));
    }

    #[test]
    fn document_creation_fails_wrong_field_type() {
        let schema = create_test_schema();
        let result = Document::new(
            DocumentId::new("d3"),
            fields(json!({"label": "x", "level": "high"})),
            &schema,
        );
        assert!(matches!(result, Err(DomainError::InvalidFieldValue { field, .. }) if field == "level"));
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let schema = create_test_schema();
        let doc = Document::new(
            DocumentId::new("d4"),
            fields(json!({"label": "x", "extra_field": "not stored"})),
            &schema,
        )
        .unwrap();
        assert!(doc.get_field_value("extra_field").is_none());
    }

    #[test]
    fn embedded_documents_get_ids_and_defaults() {
        let schema = create_test_schema();
        let doc = Document::new(
            DocumentId::new("d5"),
            fields(json!({"label": "x", "notes": [{"body": "one"}, {"_id": "keep", "kind": "b", "body": "two"}]})),
            &schema,
        )
        .unwrap();
        let notes = doc.get_field_value("notes").and_then(Value::as_array).unwrap();
        assert_eq!(notes[0]["kind"], json!("a"));
        assert_eq!(notes[0]["_id"].as_str().map(str::len), Some(32));
        assert_eq!(notes[1]["_id"], json!("keep"));
        assert_eq!(notes[1]["kind"], json!("b"));
    }

    #[test]
    fn embedded_missing_required_reports_indexed_path() {
        let schema = create_test_schema();
        let result = Document::new(
            DocumentId::new("d6"),
            fields(json!({"label": "x", "notes": [{"body": "ok"}, {"kind": "a"}]})),
            &schema,
        );
        assert_eq!(result, Err(DomainError::MissingField("notes.1.body".to_string())));
    }

    #[test]
    fn enum_violation_is_rejected() {
        let schema = create_test_schema();
        let result = Document::new(
            DocumentId::new("d7"),
            fields(json!({"label": "x", "notes": [{"kind": "z", "body": "b"}]})),
            &schema,
        );
        assert!(
            matches!(result, Err(DomainError::InvalidFieldValue { field, .. }) if field == "notes.0.kind")
        );
    }

    #[test]
    fn dates_are_normalized_to_utc_millis() {
        let schema = create_test_schema();
        let doc = Document::new(
            DocumentId::new("d8"),
            fields(json!({"label": "x", "published": "2020-05-01T12:00:00+02:00"})),
            &schema,
        )
        .unwrap();
        assert_eq!(doc.get_field_value("published"), Some(&json!("2020-05-01T10:00:00.000Z")));

        let doc = Document::new(
            DocumentId::new("d9"),
            fields(json!({"label": "x", "published": 0})),
            &schema,
        )
        .unwrap();
        assert_eq!(doc.get_field_value("published"), Some(&json!("1970-01-01T00:00:00.000Z")));

        let result = Document::new(
            DocumentId::new("d10"),
            fields(json!({"label": "x", "published": "yesterday"})),
            &schema,
        );
        assert!(matches!(result, Err(DomainError::InvalidFieldValue { field, .. }) if field == "published"));
    }

    #[test]
    fn from_value_keeps_or_generates_id() {
        let schema = create_test_schema();
        let kept = Document::from_value(json!({"_id": "fixed", "label": "x"}), &schema).unwrap();
        assert_eq!(kept.id().as_str(), "fixed");
        assert_eq!(kept.to_value()["_id"], json!("fixed"));

        let generated = Document::from_value(json!({"label": "x"}), &schema).unwrap();
        assert_eq!(generated.id().as_str().len(), 32);

        assert!(matches!(
            Document::from_value(json!(["not", "an", "object"]), &schema),
            Err(DomainError::InvalidDocument(_))
        ));
    }

    #[test]
    fn values_at_traverses_embedded_arrays() {
        let schema = create_test_schema();
        let doc = Document::new(
            DocumentId::new("d11"),
            fields(json!({"label": "x", "notes": [{"body": "one"}, {"kind": "b", "body": "two"}]})),
            &schema,
        )
        .unwrap();
        assert_eq!(doc.values_at("notes.body"), vec![&json!("one"), &json!("two")]);
        assert_eq!(doc.values_at("label"), vec![&json!("x")]);
        assert!(doc.values_at("summary").is_empty());
    }

    #[test]
    fn unbuilt_schema_is_rejected() {
        let schema = CollectionSchema::new("raw", vec![FieldDefinition::text("a")]);
        let result = Document::new(DocumentId::new("d"), Map::new(), &schema);
        assert!(matches!(result, Err(DomainError::InvalidSchema(_))));
    }
}
