use application::{ApplicationError, Index, SearchHit, SearchResult};
use async_trait::async_trait;
use dashmap::DashMap;
use domain::{CollectionSchema, Document, DocumentId, FieldType, WeightedField};
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::{debug, info, instrument, trace, warn};

/// Accepted range of text index weights.
const MAX_WEIGHT: u32 = 99_999;

/// Searchable text extracted from one weighted field of a document.
#[derive(Debug)]
struct FieldTokens {
    weight: f64,
    tokens: Vec<String>,
    // Lowercased raw text, for phrase matching.
    text: String,
}

#[derive(Debug)]
struct IndexedDocument {
    seq: u64,
    document: Arc<Document>,
    fields: Vec<FieldTokens>,
}

/// Represents the data stored for a single collection within the in-memory index.
#[derive(Debug, Default)]
struct CollectionIndexData {
    weighted_fields: Vec<WeightedField>,
    documents: DashMap<DocumentId, IndexedDocument>,
}

impl CollectionIndexData {
    fn extract(&self, document: &Document) -> Vec<FieldTokens> {
        self.weighted_fields
            .iter()
            .map(|field| {
                // Only text values are searchable; numbers and the like are skipped.
                let values: Vec<&str> = document
                    .values_at(&field.path)
                    .into_iter()
                    .filter_map(|value| value.as_str())
                    .collect();
                let text = values.join("\n").to_lowercase();
                FieldTokens {
                    weight: f64::from(field.weight),
                    tokens: tokenize(&text),
                    text,
                }
            })
            .collect()
    }
}

/// In-memory weighted text index supporting multiple collections.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIndex {
    // Collection Name -> Collection Index Data
    collections: Arc<DashMap<String, Arc<CollectionIndexData>>>,
    next_seq: Arc<AtomicU64>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents indexed for a collection.
    pub fn indexed_count(&self, collection_name: &str) -> usize {
        self.collections
            .get(collection_name)
            .map_or(0, |data| data.documents.len())
    }

    fn collection(&self, collection_name: &str) -> Result<Arc<CollectionIndexData>, ApplicationError> {
        self.collections
            .get(collection_name)
            .map(|data| data.clone())
            .ok_or_else(|| ApplicationError::CollectionNotFound(collection_name.to_string()))
    }

    fn insert(&self, data: &CollectionIndexData, document: &Document) {
        let seq = data
            .documents
            .get(document.id())
            .map(|existing| existing.seq)
            .unwrap_or_else(|| self.next_seq.fetch_add(1, AtomicOrdering::Relaxed));
        data.documents.insert(
            document.id().clone(),
            IndexedDocument {
                seq,
                document: Arc::new(document.clone()),
                fields: data.extract(document),
            },
        );
    }
}

/// Checks the weighted fields declared for a collection.
fn validate_declaration(schema: &CollectionSchema) -> Result<Vec<WeightedField>, String> {
    let Some(declaration) = schema.text_index() else {
        return Ok(Vec::new());
    };
    for field in &declaration.fields {
        if field.weight == 0 || field.weight > MAX_WEIGHT {
            return Err(format!(
                "weight {} of '{}' is outside 1..={}",
                field.weight, field.path, MAX_WEIGHT
            ));
        }
        match schema.resolve_path(&field.path) {
            None => return Err(format!("indexed path '{}' is not in the schema", field.path)),
            Some(definition)
                if matches!(definition.field_type, FieldType::Number | FieldType::Embedded(_)) =>
            {
                warn!(
                    collection = %schema.name,
                    path = %field.path,
                    "Text index covers a non-text field; its values are never matched"
                );
            }
            Some(_) => {}
        }
    }
    Ok(declaration.fields.clone())
}

#[async_trait]
impl Index for InMemoryIndex {
    #[instrument(skip(self, schema), fields(collection = %schema.name))]
    async fn ensure_collection_exists(
        &self,
        schema: &CollectionSchema,
    ) -> Result<(), ApplicationError> {
        let name = schema.name.clone();
        let weighted_fields =
            validate_declaration(schema).map_err(|reason| ApplicationError::IndexError {
                collection: name.clone(),
                source: reason.into(),
            })?;
        if let Some(existing) = self.collections.get(&name) {
            if existing.weighted_fields != weighted_fields {
                warn!(
                    collection = %name,
                    "Collection already indexed with other weights; keeping the existing declaration"
                );
            } else {
                debug!(collection = %name, "Collection already exists in index");
            }
            return Ok(());
        }
        info!(collection = %name, fields = weighted_fields.len(), "Creating text index for collection");
        self.collections.insert(
            name,
            Arc::new(CollectionIndexData {
                weighted_fields,
                documents: DashMap::new(),
            }),
        );
        Ok(())
    }

    #[instrument(skip(self, document))]
    async fn index_document(
        &self,
        collection_name: &str,
        document: &Document,
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, doc_id = %document.id(), "Indexing document in-memory");
        let data = self.collection(collection_name)?;
        self.insert(&data, document);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_document(
        &self,
        collection_name: &str,
        id: &DocumentId,
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, doc_id = %id, "Removing document from in-memory index");
        if let Some(data) = self.collections.get(collection_name) {
            // It's okay if the document wasn't present
            data.documents.remove(id);
        }
        // A missing collection has no document to remove either.
        Ok(())
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        collection_name: &str,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchResult, ApplicationError> {
        let data = self.collection(collection_name)?;
        if data.weighted_fields.is_empty() {
            return Err(ApplicationError::InvalidInput(format!(
                "Collection '{}' has no text index",
                collection_name
            )));
        }
        let parsed = ParsedQuery::parse(query);
        if parsed.terms.is_empty() {
            return Err(ApplicationError::InvalidInput(
                "Search query has no searchable terms".to_string(),
            ));
        }

        let mut scored: Vec<(f64, u64, Arc<Document>)> = data
            .documents
            .iter()
            .filter_map(|entry| {
                let indexed = entry.value();
                parsed
                    .score(&indexed.fields)
                    .map(|score| (score, indexed.seq, indexed.document.clone()))
            })
            .collect();
        trace!(count = scored.len(), "Candidates after query matching");

        // Best score first; ties keep indexing order.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        let total_hits = scored.len();
        let hits: Vec<SearchHit> = scored
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(score, _, document)| SearchHit {
                document: (*document).clone(),
                score,
            })
            .collect();

        debug!(
            collection = %collection_name,
            query = %query,
            total_hits,
            returned_hits = hits.len(),
            "In-memory search finished."
        );
        Ok(SearchResult { hits, total_hits })
    }

    /// Batch index for in-memory store.
    #[instrument(skip(self, documents))]
    async fn index_batch(
        &self,
        collection_name: &str,
        documents: &[Document],
    ) -> Result<(), ApplicationError> {
        debug!(collection = %collection_name, count = documents.len(), "Indexing batch directly in in-memory index");
        let data = self.collection(collection_name)?;
        for doc in documents {
            self.insert(&data, doc);
        }
        Ok(())
    }
}

/// Lowercase alphanumeric runs.
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// A text query: bare terms (any may match), `-term` exclusions and
/// `"quoted phrases"` that must all appear.
#[derive(Debug, Default, PartialEq)]
struct ParsedQuery {
    terms: Vec<String>,
    negated: Vec<String>,
    phrases: Vec<String>,
}

impl ParsedQuery {
    fn parse(query: &str) -> Self {
        let mut parsed = ParsedQuery::default();
        // Segments at odd positions sit between quotes.
        for (position, segment) in query.split('"').enumerate() {
            if position % 2 == 1 {
                let phrase = segment.trim().to_lowercase();
                if !phrase.is_empty() {
                    // Phrase words also count towards the score.
                    parsed.terms.extend(tokenize(&phrase));
                    parsed.phrases.push(phrase);
                }
                continue;
            }
            for word in segment.split_whitespace() {
                match word.strip_prefix('-') {
                    Some(excluded) if !excluded.is_empty() => parsed.negated.extend(tokenize(excluded)),
                    _ => parsed.terms.extend(tokenize(word)),
                }
            }
        }
        parsed.terms.sort();
        parsed.terms.dedup();
        parsed
    }

    /// Relevance of a document, or `None` when it does not match.
    fn score(&self, fields: &[FieldTokens]) -> Option<f64> {
        let excluded = fields.iter().any(|field| {
            field
                .tokens
                .iter()
                .any(|token| self.negated.contains(token))
        });
        if excluded {
            return None;
        }
        let has_phrases = self
            .phrases
            .iter()
            .all(|phrase| fields.iter().any(|field| field.text.contains(phrase.as_str())));
        if !has_phrases {
            return None;
        }
        let score: f64 = fields
            .iter()
            .map(|field| {
                let occurrences = field
                    .tokens
                    .iter()
                    .filter(|token| self.terms.contains(token))
                    .count();
                field.weight * occurrences as f64
            })
            .sum();
        (score > 0.0).then_some(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{FieldDefinition, TextIndex};
    use serde_json::{Value, json};

    fn schema(index: TextIndex) -> CollectionSchema {
        CollectionSchema::new(
            "notes",
            vec![
                FieldDefinition::text("title"),
                FieldDefinition::text("body"),
                FieldDefinition::number("level"),
                FieldDefinition::embedded("items", vec![FieldDefinition::text("text")]),
            ],
        )
        .with_text_index(index)
        .build()
        .unwrap()
    }

    fn default_schema() -> CollectionSchema {
        schema(
            TextIndex::new()
                .field("title", 3)
                .field("body", 1)
                .field("items.text", 1),
        )
    }

    fn doc(schema: &CollectionSchema, id: &str, mut fields: Value) -> Document {
        fields["_id"] = json!(id);
        Document::from_value(fields, schema).unwrap()
    }

    async fn seeded() -> InMemoryIndex {
        let schema = default_schema();
        let index = InMemoryIndex::new();
        index.ensure_collection_exists(&schema).await.unwrap();
        index
            .index_batch(
                "notes",
                &[
                    doc(&schema, "body-hit", json!({"title": "misc", "body": "crash on startup"})),
                    doc(&schema, "title-hit", json!({"title": "Crash fix", "body": "details"})),
                    doc(&schema, "item-hit", json!({"title": "x", "items": [{"text": "rare crash"}, {"text": "crash again"}]})),
                    doc(&schema, "miss", json!({"title": "unrelated", "body": "nothing here"})),
                ],
            )
            .await
            .unwrap();
        index
    }

    fn hit_ids(result: &SearchResult) -> Vec<&str> {
        result.hits.iter().map(|h| h.document.id().as_str()).collect()
    }

    #[test]
    fn parses_terms_exclusions_and_phrases() {
        let parsed = ParsedQuery::parse(r#"Crash -windows "on startup" fix"#);
        assert_eq!(parsed.terms, vec!["crash", "fix", "on", "startup"]);
        assert_eq!(parsed.negated, vec!["windows"]);
        assert_eq!(parsed.phrases, vec!["on startup"]);
    }

    #[tokio::test]
    async fn weights_rank_results() {
        let index = seeded().await;
        let result = index.search("notes", "crash", 0, 10).await.unwrap();
        assert_eq!(result.total_hits, 3);
        assert_eq!(hit_ids(&result), vec!["title-hit", "item-hit", "body-hit"]);
        assert_eq!(result.hits[0].score, 3.0);
        assert_eq!(result.hits[1].score, 2.0);
        assert_eq!(result.hits[2].score, 1.0);
    }

    #[tokio::test]
    async fn exclusions_and_phrases_filter_matches() {
        let index = seeded().await;
        let result = index.search("notes", "crash -fix", 0, 10).await.unwrap();
        assert_eq!(hit_ids(&result), vec!["item-hit", "body-hit"]);

        let result = index.search("notes", "\"on startup\"", 0, 10).await.unwrap();
        assert_eq!(hit_ids(&result), vec!["body-hit"]);
    }

    #[tokio::test]
    async fn pagination_reports_total_hits() {
        let index = seeded().await;
        let result = index.search("notes", "crash", 1, 1).await.unwrap();
        assert_eq!(result.total_hits, 3);
        assert_eq!(hit_ids(&result), vec!["item-hit"]);
    }

    #[tokio::test]
    async fn numeric_fields_do_not_contribute() {
        let schema = schema(TextIndex::new().field("title", 1).field("level", 10));
        let index = InMemoryIndex::new();
        index.ensure_collection_exists(&schema).await.unwrap();
        index
            .index_document("notes", &doc(&schema, "a", json!({"title": "alpha", "level": 4})))
            .await
            .unwrap();
        let result = index.search("notes", "4", 0, 10).await.unwrap();
        assert_eq!(result.total_hits, 0);
        let result = index.search("notes", "alpha", 0, 10).await.unwrap();
        assert_eq!(result.hits[0].score, 1.0);
    }

    #[tokio::test]
    async fn invalid_declarations_fail_the_build() {
        let index = InMemoryIndex::new();
        let zero_weight = schema(TextIndex::new().field("title", 0));
        assert!(matches!(
            index.ensure_collection_exists(&zero_weight).await,
            Err(ApplicationError::IndexError { .. })
        ));
        let unknown_path = schema(TextIndex::new().field("items.missing", 1));
        assert!(matches!(
            index.ensure_collection_exists(&unknown_path).await,
            Err(ApplicationError::IndexError { .. })
        ));
        assert_eq!(index.indexed_count("notes"), 0);
    }

    #[tokio::test]
    async fn unknown_collection_and_removed_documents() {
        let index = seeded().await;
        assert!(matches!(
            index.search("missing", "crash", 0, 10).await,
            Err(ApplicationError::CollectionNotFound(_))
        ));
        index
            .delete_document("notes", &DocumentId::new("title-hit"))
            .await
            .unwrap();
        assert_eq!(index.indexed_count("notes"), 3);
        let result = index.search("notes", "crash", 0, 10).await.unwrap();
        assert_eq!(hit_ids(&result), vec!["item-hit", "body-hit"]);
    }

    #[tokio::test]
    async fn redeclaring_a_collection_keeps_existing_weights() {
        let index = seeded().await;
        let reweighted = schema(TextIndex::new().field("title", 50).field("body", 1));
        index.ensure_collection_exists(&reweighted).await.unwrap();
        assert_eq!(index.indexed_count("notes"), 4);
        let result = index.search("notes", "crash", 0, 10).await.unwrap();
        assert_eq!(result.hits[0].score, 3.0);
        assert_eq!(hit_ids(&result), vec!["title-hit", "item-hit", "body-hit"]);
    }

    #[tokio::test]
    async fn query_without_terms_is_rejected() {
        let index = seeded().await;
        assert!(matches!(
            index.search("notes", "-crash", 0, 10).await,
            Err(ApplicationError::InvalidInput(_))
        ));
    }
}
