// ./api/src/main.rs
mod config;
mod error;
mod routes;

use application::{Database, UserService, VersionService};
use infrastructure::InMemoryConnector;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use routes::{AppState, router};

// Application entry point
#[tokio::main]
async fn main() {
    // --- Logger Initialization ---
    let filter: EnvFilter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
    info!("Logger initialized successfully.");

    let config = Config::load();

    // --- Dependency Injection ---
    // 1. Connect the document store and register both collections
    let database = Arc::new(Database::new(Arc::new(InMemoryConnector::new())));
    if let Err(e) = database
        .initialize(&config.store_address, || info!("Models registered."))
        .await
    {
        error!("Failed to initialize database at {}: {}", config.store_address, e);
        std::process::exit(1);
    }

    // 2. Create application services from the model handles
    let (versions, users) = match (database.versions_model(), database.users_model()) {
        (Ok(versions), Ok(users)) => (versions, users),
        (Err(e), _) | (_, Err(e)) => {
            error!("Models unavailable after initialization: {}", e);
            std::process::exit(1);
        }
    };
    let app_state = AppState {
        database,
        versions: Arc::new(VersionService::new(versions)),
        users: Arc::new(UserService::new(users)),
    };
    info!("Application state created.");

    // --- API Router Definition ---
    let app = router(app_state);
    info!("API routes configured.");

    // --- Server Startup ---
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server starting on {}", addr);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("Server listening on {}", addr);
            listener
        }
        Err(e) => {
            error!("Failed to bind to address {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app.into_make_service()).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
