use super::query::{check_doc_matches_filters, compare_documents};
use application::{ApplicationError, DocumentRepository, Filters, FindOptions};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{Document, DocumentId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument};

/// A document together with its insertion sequence number.
#[derive(Debug, Clone)]
struct StoredDocument {
    seq: u64,
    document: Arc<Document>,
}

// --- Document Repository Implementation (Collection-Aware) ---

#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentRepository {
    // Collection Name -> (Document ID -> Document)
    store: Arc<DashMap<String, DashMap<DocumentId, StoredDocument>>>,
    // Listing order for unsorted queries; replacing a document keeps its slot.
    next_seq: Arc<AtomicU64>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, collection_name: &str, document: &Document) {
        // Get or create the inner map for the collection
        let collection_store = self
            .store
            .entry(collection_name.to_string())
            .or_insert_with(DashMap::new); // Create if doesn't exist
        let seq = collection_store
            .get(document.id())
            .map(|existing| existing.seq)
            .unwrap_or_else(|| self.next_seq.fetch_add(1, Ordering::Relaxed));
        collection_store.insert(
            document.id().clone(),
            StoredDocument {
                seq,
                document: Arc::new(document.clone()),
            },
        );
    }

    /// Matching documents in insertion order.
    fn matching(&self, collection_name: &str, filters: &Filters) -> Vec<StoredDocument> {
        let Some(collection_store) = self.store.get(collection_name) else {
            return Vec::new(); // Collection doesn't exist yet
        };
        let mut matches: Vec<StoredDocument> = collection_store
            .iter()
            .filter(|entry| check_doc_matches_filters(&entry.value().document, filters))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_unstable_by_key(|stored| stored.seq);
        matches
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    #[instrument(skip(self, document))]
    async fn save(
        &self,
        collection_name: &str,
        document: &Document,
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, doc_id = %document.id(), "Saving document to in-memory store");
        self.insert(collection_name, document);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        collection_name: &str,
        id: &DocumentId,
    ) -> Result<Option<Document>, ApplicationError> {
        debug!(collection = %collection_name, doc_id = %id, "Getting document from in-memory store");
        let doc = self.store.get(collection_name).and_then(|collection_store| {
            collection_store
                .get(id)
                .map(|stored| (*stored.document).clone())
        });
        Ok(doc)
    }

    #[instrument(skip(self))]
    async fn delete(
        &self,
        collection_name: &str,
        id: &DocumentId,
    ) -> Result<bool, ApplicationError> {
        debug!(collection = %collection_name, doc_id = %id, "Deleting document from in-memory store");
        Ok(self
            .store
            .get(collection_name)
            .is_some_and(|collection_store| collection_store.remove(id).is_some()))
    }

    #[instrument(skip(self, options))]
    async fn find(
        &self,
        collection_name: &str,
        options: &FindOptions,
    ) -> Result<Vec<Document>, ApplicationError> {
        let mut matches = self.matching(collection_name, &options.filters);
        if !options.sort.is_empty() {
            // Stable: equal keys keep insertion order.
            matches.sort_by(|a, b| compare_documents(&a.document, &b.document, &options.sort));
        }
        let documents: Vec<Document> = matches
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .map(|stored| (*stored.document).clone())
            .collect();
        debug!(collection = %collection_name, returned = documents.len(), "Listed documents from in-memory store");
        Ok(documents)
    }

    #[instrument(skip(self, filters))]
    async fn count(
        &self,
        collection_name: &str,
        filters: &Filters,
    ) -> Result<usize, ApplicationError> {
        Ok(self.matching(collection_name, filters).len())
    }

    /// Batch save for in-memory store.
    #[instrument(skip(self, documents))]
    async fn save_batch(
        &self,
        collection_name: &str,
        documents: &[Document],
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, count = documents.len(), "Saving batch directly to in-memory store");
        for doc in documents {
            self.insert(collection_name, doc);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::SortBy;
    use domain::{CollectionSchema, FieldDefinition};
    use serde_json::{Value, json};

    fn schema() -> CollectionSchema {
        CollectionSchema::new(
            "items",
            vec![FieldDefinition::text("name"), FieldDefinition::number("rank")],
        )
        .build()
        .unwrap()
    }

    fn doc(id: &str, fields: Value) -> Document {
        let mut value = fields;
        value["_id"] = json!(id);
        Document::from_value(value, &schema()).unwrap()
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d.id().as_str()).collect()
    }

    #[tokio::test]
    async fn save_get_delete() {
        let repo = InMemoryDocumentRepository::new();
        let d = doc("a", json!({"name": "alpha"}));
        repo.save("items", &d).await.unwrap();
        assert_eq!(repo.get("items", d.id()).await.unwrap(), Some(d.clone()));
        assert_eq!(repo.get("other", d.id()).await.unwrap(), None);
        assert!(repo.delete("items", d.id()).await.unwrap());
        assert!(!repo.delete("items", d.id()).await.unwrap());
        assert!(!repo.delete("missing", d.id()).await.unwrap());
    }

    #[tokio::test]
    async fn unsorted_find_keeps_insertion_order_across_replacements() {
        let repo = InMemoryDocumentRepository::new();
        repo.save_batch(
            "items",
            &[
                doc("c", json!({"rank": 1})),
                doc("a", json!({"rank": 2})),
                doc("b", json!({"rank": 3})),
            ],
        )
        .await
        .unwrap();
        repo.save("items", &doc("c", json!({"rank": 9}))).await.unwrap();

        let all = repo.find("items", &FindOptions::new()).await.unwrap();
        assert_eq!(ids(&all), vec!["c", "a", "b"]);
        assert_eq!(all[0].get_field_value("rank"), Some(&json!(9)));
    }

    #[tokio::test]
    async fn find_filters_sorts_and_paginates() {
        let repo = InMemoryDocumentRepository::new();
        for (id, rank) in [("a", 2), ("b", 5), ("c", 1), ("d", 4)] {
            repo.save("items", &doc(id, json!({"rank": rank}))).await.unwrap();
        }
        let options = FindOptions::new()
            .filter("rank", json!({"gte": 2}))
            .sort(SortBy::desc("rank"))
            .offset(1)
            .limit(2);
        let page = repo.find("items", &options).await.unwrap();
        assert_eq!(ids(&page), vec!["d", "a"]);
        assert_eq!(repo.count("items", &options.filters).await.unwrap(), 3);
        assert_eq!(repo.count("missing", &Filters::new()).await.unwrap(), 0);
    }
}
