use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod document;
pub mod records;
pub mod schema;
pub mod schemas;

pub use document::Document;
pub use records::{Property, PropertyType, Role, TestsScope, User, Version};
pub use schema::{
    CollectionSchema, FieldDefault, FieldDefinition, FieldType, TextIndex, WeightedField,
};
pub use schemas::{DEFAULT_ROLE, USERS_COLLECTION, VERSIONS_COLLECTION, users_schema, versions_schema};

/// Name of the store-generated identifier carried by every document and
/// every embedded sub-document.
pub const ID_FIELD: &str = "_id";

// --- Domain Errors ---
#[derive(Error, Debug, PartialEq)]
pub enum DomainError {
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    #[error("Invalid field value for field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },
    #[error("Missing required field '{0}'")]
    MissingField(String),
}

// --- Document ID ---

/// Store-generated document identifier. Distinct from any caller-assigned
/// id a record may carry (see `User::id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mints a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<DocumentId> for String {
    fn from(doc_id: DocumentId) -> Self {
        doc_id.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_hex() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn document_id_serializes_as_plain_string() {
        let id = DocumentId::new("abc");
        assert_eq!(serde_json::to_value(&id).unwrap(), serde_json::json!("abc"));
        assert_eq!(id.to_string(), "abc");
    }
}
