use crate::{ApplicationError, DocumentRepository, Filters, FindOptions, Index};
use domain::{CollectionSchema, Document, DocumentId, FieldDefault, ID_FIELD};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

// Sensible maximum limit to prevent abuse
const MAX_SEARCH_LIMIT: usize = 1000;

/// Progress of a collection's background text-index build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexState {
    Building,
    Ready,
    Failed(String),
}

/// A record with its text-search relevance score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub record: T,
    pub score: f64,
}

/// One page of search or listing results.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchPage<T> {
    pub hits: Vec<Scored<T>>,
    /// Total number of matches before pagination.
    pub total_hits: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Typed handle bound to one registered collection.
///
/// Every write is validated against the collection schema, saved to the
/// repository and fed to the text index.
pub struct Model<T> {
    schema: Arc<CollectionSchema>,
    repository: Arc<dyn DocumentRepository>,
    index: Arc<dyn Index>,
    index_state: watch::Receiver<IndexState>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Model<T> {
    fn clone(&self) -> Self {
        Self {
            schema: self.schema.clone(),
            repository: self.repository.clone(),
            index: self.index.clone(),
            index_state: self.index_state.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("collection", &self.schema.name)
            .field("index_state", &*self.index_state.borrow())
            .finish()
    }
}

impl<T> Model<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub(crate) fn new(
        schema: Arc<CollectionSchema>,
        repository: Arc<dyn DocumentRepository>,
        index: Arc<dyn Index>,
        index_state: watch::Receiver<IndexState>,
    ) -> Self {
        Self {
            schema,
            repository,
            index,
            index_state,
            _record: PhantomData,
        }
    }

    pub fn collection(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn index_state(&self) -> IndexState {
        self.index_state.borrow().clone()
    }

    /// Waits for the background index build to finish.
    pub async fn wait_for_index(&self) -> Result<(), ApplicationError> {
        let mut receiver = self.index_state.clone();
        let state = receiver
            .wait_for(|state| *state != IndexState::Building)
            .await
            .map_err(|_| {
                ApplicationError::InfrastructureError(format!(
                    "Index build of '{}' ended without reporting",
                    self.schema.name
                ))
            })?
            .clone();
        match state {
            IndexState::Failed(reason) => Err(ApplicationError::IndexError {
                collection: self.schema.name.clone(),
                source: reason.into(),
            }),
            IndexState::Ready | IndexState::Building => Ok(()),
        }
    }

    fn to_document(&self, value: Value) -> Result<Document, ApplicationError> {
        Ok(Document::from_value(value, &self.schema)?)
    }

    fn to_record(document: &Document) -> Result<T, ApplicationError> {
        Ok(serde_json::from_value(document.to_value())?)
    }

    /// Saves a validated document and feeds it to the text index.
    async fn store(&self, document: &Document) -> Result<(), ApplicationError> {
        let collection = self.collection();
        self.repository.save(collection, document).await?;
        match self.index.index_document(collection, document).await {
            Ok(()) => Ok(()),
            Err(ApplicationError::CollectionNotFound(_)) => {
                // The index build has not created the collection yet; its backfill picks this up.
                debug!(collection = %collection, doc_id = %document.id(), "Text index not built yet, skipping");
                Ok(())
            }
            Err(e) => {
                error!(collection = %collection, doc_id = %document.id(), "Failed to index document: {}", e);
                Err(ApplicationError::IndexError {
                    collection: collection.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Validates and stores a new record, returning it as stored (defaults
    /// and generated ids filled in).
    #[instrument(skip(self, record), fields(collection = %self.schema.name))]
    pub async fn create(&self, record: &T) -> Result<T, ApplicationError> {
        self.create_from_value(serde_json::to_value(record)?).await
    }

    /// Like `create`, from a raw JSON object.
    #[instrument(skip(self, value), fields(collection = %self.schema.name))]
    pub async fn create_from_value(&self, value: Value) -> Result<T, ApplicationError> {
        let document = self.to_document(value)?;
        if self.repository.get(self.collection(), document.id()).await?.is_some() {
            warn!(doc_id = %document.id(), "Create rejected: id already in use");
            return Err(ApplicationError::InvalidInput(format!(
                "Document '{}' already exists",
                document.id()
            )));
        }
        let record = Self::to_record(&document)?;
        self.store(&document).await?;
        info!(doc_id = %document.id(), "Document created");
        Ok(record)
    }

    /// Creates several records. Every record is validated first; a single
    /// invalid one rejects the whole batch.
    #[instrument(skip(self, records), fields(collection = %self.schema.name, batch_size = records.len()))]
    pub async fn create_many(&self, records: &[T]) -> Result<Vec<T>, ApplicationError> {
        let mut documents = Vec::with_capacity(records.len());
        let mut validation_errors = Vec::new();
        let mut stored = Vec::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            match serde_json::to_value(record)
                .map_err(ApplicationError::from)
                .and_then(|value| self.to_document(value))
                .and_then(|document| Ok((Self::to_record(&document)?, document)))
            {
                Ok((converted, document)) => {
                    stored.push(converted);
                    documents.push(document);
                }
                Err(e) => {
                    let error_msg = format!("Record at index {} failed validation: {}", position, e);
                    warn!("{}", error_msg);
                    validation_errors.push(error_msg);
                }
            }
        }
        if let Some(first) = validation_errors.first() {
            return Err(ApplicationError::InvalidInput(format!(
                "Batch contained {} validation errors. First error: {}",
                validation_errors.len(),
                first
            )));
        }

        let collection = self.collection();
        self.repository.save_batch(collection, &documents).await?;
        match self.index.index_batch(collection, &documents).await {
            Ok(()) | Err(ApplicationError::CollectionNotFound(_)) => {}
            Err(e) => {
                error!(collection = %collection, count = documents.len(), "Failed to index document batch: {}", e);
                return Err(ApplicationError::IndexError {
                    collection: collection.to_string(),
                    source: Box::new(e),
                });
            }
        }
        info!(count = documents.len(), "Document batch created");
        Ok(stored)
    }

    #[instrument(skip(self), fields(collection = %self.schema.name))]
    pub async fn find_by_id(&self, id: &DocumentId) -> Result<Option<T>, ApplicationError> {
        self.repository
            .get(self.collection(), id)
            .await?
            .as_ref()
            .map(Self::to_record)
            .transpose()
    }

    #[instrument(skip(self, options), fields(collection = %self.schema.name))]
    pub async fn find(&self, options: &FindOptions) -> Result<Vec<T>, ApplicationError> {
        let documents = self.repository.find(self.collection(), options).await?;
        debug!(count = documents.len(), "Documents found");
        documents.iter().map(Self::to_record).collect()
    }

    pub async fn find_one(&self, filters: Filters) -> Result<Option<T>, ApplicationError> {
        let options = FindOptions {
            filters,
            limit: Some(1),
            ..FindOptions::default()
        };
        Ok(self.find(&options).await?.into_iter().next())
    }

    pub async fn count(&self, filters: &Filters) -> Result<usize, ApplicationError> {
        self.repository.count(self.collection(), filters).await
    }

    /// Replaces the stored record. The record's own `_id`, if any, is ignored.
    /// Timestamp fields left unset keep their stored value instead of being
    /// stamped again.
    #[instrument(skip(self, record), fields(collection = %self.schema.name))]
    pub async fn update(&self, id: &DocumentId, record: &T) -> Result<T, ApplicationError> {
        let Value::Object(mut fields) = serde_json::to_value(record)? else {
            return Err(ApplicationError::InvalidInput(
                "Record must serialize to a JSON object".to_string(),
            ));
        };
        let existing = self
            .repository
            .get(self.collection(), id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.to_string()))?;
        for field in &self.schema.fields {
            if !matches!(field.default, Some(FieldDefault::Now)) {
                continue;
            }
            let unset = fields.get(&field.name).is_none_or(Value::is_null);
            if let (true, Some(stored)) = (unset, existing.get_field_value(&field.name)) {
                fields.insert(field.name.clone(), stored.clone());
            }
        }
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self.replace(id, fields).await
    }

    /// Merges top-level field changes into the stored record.
    #[instrument(skip(self, changes), fields(collection = %self.schema.name))]
    pub async fn update_fields(
        &self,
        id: &DocumentId,
        changes: Map<String, Value>,
    ) -> Result<T, ApplicationError> {
        let existing = self
            .repository
            .get(self.collection(), id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(id.to_string()))?;
        let mut fields = existing.fields().clone();
        for (name, value) in changes {
            if name != ID_FIELD {
                fields.insert(name, value);
            }
        }
        fields.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        self.replace(id, fields).await
    }

    async fn replace(&self, id: &DocumentId, fields: Map<String, Value>) -> Result<T, ApplicationError> {
        if self.repository.get(self.collection(), id).await?.is_none() {
            warn!(doc_id = %id, "Update failed: document not found");
            return Err(ApplicationError::NotFound(id.to_string()));
        }
        let document = self.to_document(Value::Object(fields))?;
        let record = Self::to_record(&document)?;
        self.store(&document).await?;
        info!(doc_id = %id, "Document updated");
        Ok(record)
    }

    /// Deletes a record. Returns false when it did not exist.
    #[instrument(skip(self), fields(collection = %self.schema.name))]
    pub async fn delete(&self, id: &DocumentId) -> Result<bool, ApplicationError> {
        let collection = self.collection();
        if let Err(e) = self.index.delete_document(collection, id).await {
            error!(collection = %collection, doc_id = %id, "Failed to delete document from index: {}", e);
            return Err(ApplicationError::IndexError {
                collection: collection.to_string(),
                source: Box::new(e),
            });
        }
        let deleted = self.repository.delete(collection, id).await?;
        if deleted {
            info!(doc_id = %id, "Document deleted");
        } else {
            debug!(doc_id = %id, "Document not found for deletion");
        }
        Ok(deleted)
    }

    /// Weighted text search over the collection's text index. Fails with
    /// `IndexNotReady` until the index build has succeeded.
    #[instrument(skip(self), fields(collection = %self.schema.name))]
    pub async fn text_search(
        &self,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage<T>, ApplicationError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }
        let collection = self.collection();
        match self.index_state() {
            IndexState::Ready => {}
            IndexState::Building => {
                return Err(ApplicationError::IndexNotReady(collection.to_string()));
            }
            IndexState::Failed(reason) => {
                // A failed build never becomes searchable.
                debug!(reason = %reason, "Search rejected: text index build failed");
                return Err(ApplicationError::IndexNotReady(collection.to_string()));
            }
        }

        let limit = limit.clamp(1, MAX_SEARCH_LIMIT);
        let result = match self.index.search(collection, query, offset, limit).await {
            Ok(result) => result,
            Err(ApplicationError::CollectionNotFound(_)) => {
                return Err(ApplicationError::IndexNotReady(collection.to_string()));
            }
            Err(e @ ApplicationError::InvalidInput(_)) => return Err(e),
            Err(e) => {
                error!(collection = %collection, query = %query, "Search failed: {}", e);
                return Err(ApplicationError::SearchError {
                    collection: collection.to_string(),
                    source: Box::new(e),
                });
            }
        };
        debug!(total_hits = result.total_hits, returned_hits = result.hits.len(), "Search finished");

        let hits = result
            .hits
            .iter()
            .map(|hit| {
                Ok(Scored {
                    record: Self::to_record(&hit.document)?,
                    score: hit.score,
                })
            })
            .collect::<Result<Vec<_>, ApplicationError>>()?;
        Ok(SearchPage {
            hits,
            total_hits: result.total_hits,
            offset,
            limit,
        })
    }

    /// Lists records page by page; every hit scores zero.
    pub async fn list_page(
        &self,
        options: FindOptions,
    ) -> Result<SearchPage<T>, ApplicationError> {
        let limit = options.limit.unwrap_or(MAX_SEARCH_LIMIT).clamp(1, MAX_SEARCH_LIMIT);
        let offset = options.offset;
        let total_hits = self.count(&options.filters).await?;
        let records = self
            .find(&FindOptions {
                limit: Some(limit),
                ..options
            })
            .await?;
        Ok(SearchPage {
            hits: records
                .into_iter()
                .map(|record| Scored { record, score: 0.0 })
                .collect(),
            total_hits,
            offset,
            limit,
        })
    }
}
