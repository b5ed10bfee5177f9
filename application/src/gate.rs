//! Access gate: model handles exist only after the one-time initialization.

use crate::registry::{register_users_schema, register_versions_schema};
use crate::{ApplicationError, Connection, Connector, Model, StoreAddress};
use domain::{User, Version};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

/// Misuse of the initialization order.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Database has not been initialized. Call initialize first.")]
    NotInitialized,
    #[error("Attempt to initialize an already initialized database.")]
    AlreadyInitialized,
}

struct Models {
    connection: Connection,
    versions: Model<Version>,
    users: Model<User>,
}

/// Owns the store connection and both model handles.
///
/// Two states: not ready and ready. `initialize` moves to ready at most once;
/// there is no way back.
pub struct Database {
    connector: Arc<dyn Connector>,
    // Set by the caller that won the right to initialize.
    claimed: AtomicBool,
    models: OnceLock<Models>,
}

impl Database {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            claimed: AtomicBool::new(false),
            models: OnceLock::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.models.get().is_some()
    }

    /// Connects to `address`, registers both collections, marks the database
    /// ready and then runs `on_complete`.
    ///
    /// Fails with `AlreadyInitialized` when the database is ready or another
    /// initialization is in flight. A connection or registration failure
    /// leaves the database not ready, and initialization may be attempted
    /// again from scratch.
    #[instrument(skip(self, on_complete))]
    pub async fn initialize<F>(&self, address: &str, on_complete: F) -> Result<(), ApplicationError>
    where
        F: FnOnce() + Send,
    {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected initialization of an already initialized database");
            return Err(PreconditionError::AlreadyInitialized.into());
        }

        let models = match self.open(address).await {
            Ok(models) => models,
            Err(e) => {
                error!("Database initialization failed: {}", e);
                self.claimed.store(false, Ordering::Release);
                return Err(e);
            }
        };
        if self.models.set(models).is_err() {
            return Err(PreconditionError::AlreadyInitialized.into());
        }
        info!("Database ready");
        on_complete();
        Ok(())
    }

    async fn open(&self, address: &str) -> Result<Models, ApplicationError> {
        let address = StoreAddress::parse(address)?;
        let connection = self.connector.connect(&address).await?;
        let versions = register_versions_schema(&connection).await?;
        let users = register_users_schema(&connection).await?;
        Ok(Models {
            connection,
            versions,
            users,
        })
    }

    fn ready(&self) -> Result<&Models, PreconditionError> {
        self.models.get().ok_or(PreconditionError::NotInitialized)
    }

    pub fn versions_model(&self) -> Result<Model<Version>, PreconditionError> {
        self.ready().map(|models| models.versions.clone())
    }

    pub fn users_model(&self) -> Result<Model<User>, PreconditionError> {
        self.ready().map(|models| models.users.clone())
    }

    pub fn connection(&self) -> Result<&Connection, PreconditionError> {
        self.ready().map(|models| &models.connection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Connector for an unreachable store.
    struct RefusingConnector {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, address: &StoreAddress) -> Result<Connection, ApplicationError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(ApplicationError::Connection(format!("{} refused", address)))
        }
    }

    fn refusing() -> (Arc<RefusingConnector>, Database) {
        let connector = Arc::new(RefusingConnector {
            attempts: AtomicUsize::new(0),
        });
        (connector.clone(), Database::new(connector))
    }

    #[test]
    fn models_are_unavailable_before_initialize() {
        let (_, database) = refusing();
        assert!(!database.is_ready());
        assert_eq!(database.versions_model().err(), Some(PreconditionError::NotInitialized));
        assert_eq!(database.users_model().err(), Some(PreconditionError::NotInitialized));
        assert_eq!(database.connection().err(), Some(PreconditionError::NotInitialized));
    }

    #[tokio::test]
    async fn failed_connection_leaves_database_not_ready() {
        let (connector, database) = refusing();
        let mut completed = false;
        let result = database
            .initialize("mem://localhost/versions_track", || completed = true)
            .await;
        assert!(matches!(result, Err(ApplicationError::Connection(_))));
        assert!(!completed);
        assert!(!database.is_ready());
        assert_eq!(database.versions_model().err(), Some(PreconditionError::NotInitialized));

        // The claim is released, so a later attempt reaches the connector again.
        let retry = database.initialize("mem://localhost/versions_track", || {}).await;
        assert!(matches!(retry, Err(ApplicationError::Connection(_))));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_address_fails_before_connecting() {
        let (connector, database) = refusing();
        let result = database.initialize("not-an-address", || {}).await;
        assert!(matches!(result, Err(ApplicationError::InvalidAddress { .. })));
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }
}
