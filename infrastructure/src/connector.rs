use crate::{InMemoryDocumentRepository, InMemoryIndex};
use application::{ApplicationError, Connection, Connector, StoreAddress};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Scheme served by [`InMemoryConnector`].
pub const MEMORY_SCHEME: &str = "mem";

/// Serves `mem://host/dbname` addresses from process memory.
///
/// Connections to the same database name share their documents and index,
/// so data survives reconnecting through the same connector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConnector {
    // Database Name -> (documents, text index)
    databases: Arc<DashMap<String, (Arc<InMemoryDocumentRepository>, Arc<InMemoryIndex>)>>,
}

impl InMemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stores backing `database`, if it was ever connected.
    pub fn stores(&self, database: &str) -> Option<(Arc<InMemoryDocumentRepository>, Arc<InMemoryIndex>)> {
        self.databases.get(database).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    #[instrument(skip(self), fields(address = %address))]
    async fn connect(&self, address: &StoreAddress) -> Result<Connection, ApplicationError> {
        if address.scheme != MEMORY_SCHEME {
            warn!(scheme = %address.scheme, "Unsupported store protocol");
            return Err(ApplicationError::Connection(format!(
                "no engine for protocol '{}' (expected '{}')",
                address.scheme, MEMORY_SCHEME
            )));
        }
        let (repository, index) = self
            .databases
            .entry(address.database.clone())
            .or_insert_with(|| {
                (
                    Arc::new(InMemoryDocumentRepository::new()),
                    Arc::new(InMemoryIndex::new()),
                )
            })
            .value()
            .clone();
        info!(database = %address.database, "Document store connected");
        Ok(Connection::new(address.clone(), repository, index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_other_protocols() {
        let connector = InMemoryConnector::new();
        let address = StoreAddress::parse("mongodb://localhost/versions_track").unwrap();
        assert!(matches!(
            connector.connect(&address).await,
            Err(ApplicationError::Connection(_))
        ));
        assert!(connector.stores("versions_track").is_none());
    }

    #[tokio::test]
    async fn same_database_shares_stores() {
        let connector = InMemoryConnector::new();
        let first = StoreAddress::parse("mem://localhost/a").unwrap();
        let second = StoreAddress::parse("mem://elsewhere/a").unwrap();
        connector.connect(&first).await.unwrap();
        let (repo_a, _) = connector.stores("a").unwrap();
        connector.connect(&second).await.unwrap();
        let (repo_b, _) = connector.stores("a").unwrap();
        assert!(Arc::ptr_eq(&repo_a, &repo_b));

        connector
            .connect(&StoreAddress::parse("mem://localhost/b").unwrap())
            .await
            .unwrap();
        let (repo_c, _) = connector.stores("b").unwrap();
        assert!(!Arc::ptr_eq(&repo_a, &repo_c));
    }
}
