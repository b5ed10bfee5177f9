use crate::{DomainError, ID_FIELD};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// --- Schema Definition ---

/// Defines the type of a field in a collection schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "lowercase")] // Allows "text", "number" in JSON
pub enum FieldType {
    Text,
    Number,
    /// Timestamp, stored as RFC 3339 text in UTC.
    Date,
    /// Ordered array of sub-documents owned by the parent document.
    Embedded(Vec<FieldDefinition>),
}

/// Value a field takes when a write leaves it absent or null.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FieldDefault {
    Value(Value),
    /// The time of the write.
    Now,
    EmptyArray,
}

impl FieldDefault {
    pub fn resolve(&self) -> Value {
        match self {
            FieldDefault::Value(value) => value.clone(),
            FieldDefault::Now => Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
            FieldDefault::EmptyArray => Value::Array(Vec::new()),
        }
    }
}

/// Defines a single field within a collection schema.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")] // Map 'type' JSON key to 'field_type' field
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldDefault>,
    /// Closed set of accepted values for a text field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<String>>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            default: None,
            allowed: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Number)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn embedded(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self::new(name, FieldType::Embedded(fields))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// A field path taking part in the text-search index, with its relevance weight.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WeightedField {
    /// Dotted path; segments after an embedded field address its sub-fields.
    pub path: String,
    pub weight: u32,
}

/// Weighted text-search index declaration for a collection.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TextIndex {
    pub fields: Vec<WeightedField>,
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, path: impl Into<String>, weight: u32) -> Self {
        self.fields.push(WeightedField {
            path: path.into(),
            weight,
        });
        self
    }

    pub fn weight_of(&self, path: &str) -> Option<u32> {
        self.fields
            .iter()
            .find(|field| field.path == path)
            .map(|field| field.weight)
    }
}

/// Represents the schema for a collection.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CollectionSchema {
    /// The unique name of the collection (ASCII alphanumeric or underscore).
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_index: Option<TextIndex>,

    // Internal cache for faster lookups
    #[serde(skip)] // Don't serialize/deserialize this helper field
    field_lookup: Option<HashMap<String, FieldDefinition>>,
}

impl PartialEq for CollectionSchema {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.fields == other.fields && self.text_index == other.text_index
    }
}

impl CollectionSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>) -> Self {
        Self {
            name: name.into(),
            fields,
            text_index: None,
            field_lookup: None,
        }
    }

    pub fn with_text_index(mut self, index: TextIndex) -> Self {
        self.text_index = Some(index);
        self
    }

    /// Validates the schema and precomputes the lookup map.
    pub fn build(mut self) -> Result<Self, DomainError> {
        if self.name.trim().is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DomainError::InvalidSchema(
                "Collection name must be non-empty and contain only ASCII alphanumeric characters or underscores.".to_string()
            ));
        }
        if self.fields.is_empty() {
            return Err(DomainError::InvalidSchema(
                "Schema must contain at least one field.".to_string(),
            ));
        }
        validate_field_set(&self.fields, "")?;

        let lookup = self
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.clone()))
            .collect();
        self.field_lookup = Some(lookup);
        Ok(self)
    }

    pub fn is_built(&self) -> bool {
        self.field_lookup.is_some()
    }

    /// Gets a top-level field definition by name. Uses the precomputed lookup.
    pub fn get_field(&self, name: &str) -> Option<&FieldDefinition> {
        self.field_lookup
            .as_ref()
            .and_then(|lookup| lookup.get(name))
    }

    /// Resolves a dotted path (e.g. `properties.description`) to its field definition.
    pub fn resolve_path(&self, path: &str) -> Option<&FieldDefinition> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.fields.iter().find(|f| f.name == first)?;
        for segment in segments {
            let FieldType::Embedded(nested) = &current.field_type else {
                return None;
            };
            current = nested.iter().find(|f| f.name == segment)?;
        }
        Some(current)
    }

    pub fn text_index(&self) -> Option<&TextIndex> {
        self.text_index.as_ref()
    }
}

fn validate_field_set(fields: &[FieldDefinition], prefix: &str) -> Result<(), DomainError> {
    let mut field_names = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() || field.name.contains('.') {
            return Err(DomainError::InvalidSchema(
                "Field names cannot be empty or contain '.'.".to_string(),
            ));
        }
        if !field_names.insert(field.name.as_str()) {
            return Err(DomainError::InvalidSchema(format!(
                "Duplicate field name found: '{}{}'",
                prefix, field.name
            )));
        }
        if field.name == ID_FIELD {
            return Err(DomainError::InvalidSchema(format!(
                "'{}' is a reserved field name and cannot be defined in the schema.",
                ID_FIELD
            )));
        }
        if field.allowed.is_some() && field.field_type != FieldType::Text {
            return Err(DomainError::InvalidSchema(format!(
                "Allowed values are only supported on text fields ('{}{}').",
                prefix, field.name
            )));
        }
        if let FieldType::Embedded(nested) = &field.field_type {
            if nested.is_empty() {
                return Err(DomainError::InvalidSchema(format!(
                    "Embedded field '{}{}' must declare at least one field.",
                    prefix, field.name
                )));
            }
            validate_field_set(nested, &format!("{}{}.", prefix, field.name))?;
        }
    }
    Ok(())
}
