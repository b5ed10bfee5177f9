use crate::model::{IndexState, Model};
use crate::{ApplicationError, DocumentRepository, FindOptions, Index};
use async_trait::async_trait;
use domain::CollectionSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Parsed `protocol://host/dbname` store address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAddress {
    pub scheme: String,
    pub host: String,
    pub database: String,
}

impl StoreAddress {
    pub fn parse(address: &str) -> Result<Self, ApplicationError> {
        let invalid = |reason: &str| ApplicationError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };
        let (scheme, rest) = address
            .split_once("://")
            .ok_or_else(|| invalid("expected protocol://host/dbname"))?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-')
        {
            return Err(invalid("protocol must be non-empty and alphanumeric"));
        }
        let (host, database) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing database name"))?;
        // Connection options after '?' are not interpreted.
        let database = database.split('?').next().unwrap_or_default();
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if database.is_empty() || database.contains('/') {
            return Err(invalid("database name must be a single non-empty segment"));
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_string(),
            database: database.to_string(),
        })
    }
}

impl FromStr for StoreAddress {
    type Err = ApplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for StoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.scheme, self.host, self.database)
    }
}

/// Opens connections to a document store engine.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Single attempt: no retry, no timeout.
    async fn connect(&self, address: &StoreAddress) -> Result<Connection, ApplicationError>;
}

/// An open connection to one database of a document store.
pub struct Connection {
    address: StoreAddress,
    repository: Arc<dyn DocumentRepository>,
    index: Arc<dyn Index>,
    registered: Mutex<HashSet<String>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        address: StoreAddress,
        repository: Arc<dyn DocumentRepository>,
        index: Arc<dyn Index>,
    ) -> Self {
        Self {
            address,
            repository,
            index,
            registered: Mutex::new(HashSet::new()),
        }
    }

    pub fn address(&self) -> &StoreAddress {
        &self.address
    }

    /// Registers a collection schema and returns its model handle.
    ///
    /// The text index is built in a background task; `on_index` runs with
    /// the build outcome once it finishes. A collection can be registered
    /// once per connection.
    #[instrument(skip(self, schema, on_index), fields(collection = %schema.name))]
    pub async fn register_model<T, F>(
        &self,
        schema: CollectionSchema,
        on_index: F,
    ) -> Result<Model<T>, ApplicationError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce(&Result<(), ApplicationError>) + Send + 'static,
    {
        let schema = Arc::new(schema.build()?);
        {
            let mut registered = self.registered.lock().map_err(|_| {
                ApplicationError::InfrastructureError("model registry lock poisoned".to_string())
            })?;
            if !registered.insert(schema.name.clone()) {
                return Err(ApplicationError::CollectionAlreadyExists(schema.name.clone()));
            }
        }
        info!(collection = %schema.name, "Model registered");

        let (state_tx, state_rx) = watch::channel(IndexState::Building);
        let repository = self.repository.clone();
        let index = self.index.clone();
        let build_schema = schema.clone();
        tokio::spawn(async move {
            let outcome = build_text_index(index.as_ref(), repository.as_ref(), &build_schema).await;
            on_index(&outcome);
            let state = match outcome {
                Ok(()) => IndexState::Ready,
                Err(e) => IndexState::Failed(e.to_string()),
            };
            // Nobody waiting is fine; the models may already be gone.
            let _ = state_tx.send(state);
        });

        Ok(Model::new(
            schema,
            self.repository.clone(),
            self.index.clone(),
            state_rx,
        ))
    }
}

/// Creates the collection's index, then feeds it every document already
/// stored. Documents written after the collection exists in the index are
/// indexed by the write path itself.
async fn build_text_index(
    index: &dyn Index,
    repository: &dyn DocumentRepository,
    schema: &CollectionSchema,
) -> Result<(), ApplicationError> {
    index.ensure_collection_exists(schema).await?;
    let existing = repository.find(&schema.name, &FindOptions::new()).await?;
    debug!(collection = %schema.name, count = existing.len(), "Backfilling text index");
    index.index_batch(&schema.name, &existing).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_protocol_host_and_database() {
        let address = StoreAddress::parse("mem://localhost/versions_track").unwrap();
        assert_eq!(address.scheme, "mem");
        assert_eq!(address.host, "localhost");
        assert_eq!(address.database, "versions_track");
        assert_eq!(address.to_string(), "mem://localhost/versions_track");
    }

    #[test]
    fn ignores_connection_options() {
        let address: StoreAddress = "MEM://db.local:27017/tracker?retry=false".parse().unwrap();
        assert_eq!(address.scheme, "mem");
        assert_eq!(address.host, "db.local:27017");
        assert_eq!(address.database, "tracker");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in [
            "localhost/versions",
            "://localhost/db",
            "mem://localhost",
            "mem:///db",
            "mem://localhost/",
            "mem://localhost/a/b",
        ] {
            assert!(
                matches!(StoreAddress::parse(bad), Err(ApplicationError::InvalidAddress { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
