use async_trait::async_trait;
use domain::{CollectionSchema, Document, DocumentId, DomainError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument};

pub mod connection;
pub mod gate;
pub mod model;
pub mod registry;
pub mod services;

pub use connection::{Connection, Connector, StoreAddress};
pub use gate::{Database, PreconditionError};
pub use model::{IndexState, Model, Scored, SearchPage};
pub use registry::{register_users_schema, register_versions_schema};
pub use services::{UserService, VersionService};

// --- Application Errors ---
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("Invalid store address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Connection failed: {0}")]
    Connection(String),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error("Collection already exists: {0}")]
    CollectionAlreadyExists(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Text index of collection '{0}' is not ready")]
    IndexNotReady(String),
    #[error("Indexing failed in collection '{collection}': {source}")]
    IndexError {
        collection: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Search failed in collection '{collection}': {source}")]
    SearchError {
        collection: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Infrastructure error: {0}")]
    InfrastructureError(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Domain validation error: {0}")]
    DomainError(#[from] DomainError), // Propagate domain errors cleanly
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// --- Query Types ---

/// Field-path -> condition map. A scalar condition means equality; an object
/// with `gt`/`gte`/`lt`/`lte` keys means a range.
pub type Filters = HashMap<String, Value>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SortBy {
    pub field: String,
    pub order: SortOrder,
}

impl SortBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Options for listing documents of a collection.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filters: Filters,
    pub sort: Vec<SortBy>,
    pub offset: usize,
    /// `None` returns every remaining document.
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, path: impl Into<String>, condition: Value) -> Self {
        self.filters.insert(path.into(), condition);
        self
    }

    pub fn sort(mut self, sort_by: SortBy) -> Self {
        self.sort.push(sort_by);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

// --- Infrastructure Interfaces (Traits) ---

/// A document matched by a text search, with its relevance score.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub document: Document,
    pub score: f64,
}

#[derive(Debug)]
pub struct SearchResult {
    /// Hits for the requested page, best score first.
    pub hits: Vec<SearchHit>,
    /// Total number of documents matching the query before pagination.
    pub total_hits: usize,
}

/// Interface for storing and retrieving documents (collection-aware).
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Adds or replaces a document in a specific collection.
    async fn save(
        &self,
        collection_name: &str,
        document: &Document,
    ) -> Result<(), ApplicationError>;
    /// Retrieves a document by its ID from a specific collection.
    async fn get(
        &self,
        collection_name: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, ApplicationError>;
    /// Deletes a document by its ID from a specific collection. Returns true if deleted.
    async fn delete(
        &self,
        collection_name: &str,
        id: &DocumentId,
    ) -> Result<bool, ApplicationError>;
    /// Lists documents matching the filters, sorted and paginated.
    async fn find(
        &self,
        collection_name: &str,
        options: &FindOptions,
    ) -> Result<Vec<Document>, ApplicationError>;
    /// Counts documents matching the filters.
    async fn count(
        &self,
        collection_name: &str,
        filters: &Filters,
    ) -> Result<usize, ApplicationError>;
    /// Adds or replaces multiple documents.
    #[instrument(skip(self, documents))]
    async fn save_batch(
        &self,
        collection_name: &str,
        documents: &[Document],
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, count = documents.len(), "Saving batch via default iteration");
        for doc in documents {
            self.save(collection_name, doc).await?;
        }
        Ok(())
    }
}

/// Interface for the weighted text-search index (collection-aware).
#[async_trait]
pub trait Index: Send + Sync {
    /// Prepares the collection's index from the schema's text index
    /// declaration. Fails when the declaration is unusable.
    async fn ensure_collection_exists(
        &self,
        schema: &CollectionSchema,
    ) -> Result<(), ApplicationError>;
    /// Adds or updates a document in the collection's index.
    async fn index_document(
        &self,
        collection_name: &str,
        document: &Document,
    ) -> Result<(), ApplicationError>;
    /// Removes a document from the collection's index.
    async fn delete_document(
        &self,
        collection_name: &str,
        id: &DocumentId,
    ) -> Result<(), ApplicationError>;
    /// Runs a text query against a collection's index.
    async fn search(
        &self,
        collection_name: &str,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchResult, ApplicationError>;
    /// Indexes multiple documents.
    #[instrument(skip(self, documents))]
    async fn index_batch(
        &self,
        collection_name: &str,
        documents: &[Document],
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, count = documents.len(), "Indexing batch via default iteration");
        for doc in documents {
            self.index_document(collection_name, doc).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn find_options_builder_collects_criteria() {
        let options = FindOptions::new()
            .filter("version", json!("1.0"))
            .sort(SortBy::desc("release_date"))
            .offset(5)
            .limit(10);
        assert_eq!(options.filters.get("version"), Some(&json!("1.0")));
        assert_eq!(options.sort, vec![SortBy::desc("release_date")]);
        assert_eq!((options.offset, options.limit), (5, Some(10)));
    }

    #[test]
    fn sort_order_json_shape() {
        let sort: SortBy = serde_json::from_value(json!({"field": "role", "order": "desc"})).unwrap();
        assert_eq!(sort, SortBy::desc("role"));
    }

    #[test]
    fn precondition_errors_display_transparently() {
        let err: ApplicationError = PreconditionError::NotInitialized.into();
        assert_eq!(err.to_string(), PreconditionError::NotInitialized.to_string());
    }
}
