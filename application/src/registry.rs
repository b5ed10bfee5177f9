//! Registration of the tracker's two collections.

use crate::{ApplicationError, Connection, Model};
use domain::{USERS_COLLECTION, User, VERSIONS_COLLECTION, Version, users_schema, versions_schema};
use tracing::{error, info};

/// Registers the `versions` collection. Index build errors are logged and
/// never fail the registration.
pub async fn register_versions_schema(
    connection: &Connection,
) -> Result<Model<Version>, ApplicationError> {
    connection
        .register_model(versions_schema(), log_index_outcome(VERSIONS_COLLECTION))
        .await
}

/// Registers the `users` collection. Index build errors are logged and
/// never fail the registration.
pub async fn register_users_schema(connection: &Connection) -> Result<Model<User>, ApplicationError> {
    connection
        .register_model(users_schema(), log_index_outcome(USERS_COLLECTION))
        .await
}

fn log_index_outcome(
    collection: &'static str,
) -> impl FnOnce(&Result<(), ApplicationError>) + Send + 'static {
    move |outcome| match outcome {
        Ok(()) => info!(collection, "Text index ready"),
        Err(e) => error!(collection, error = %e, "Text index build failed"),
    }
}
