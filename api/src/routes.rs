use crate::error::ApiError;
use application::{Database, Scored, SearchPage, UserService, VersionService};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{DateTime, Utc};
use domain::{DocumentId, Property, User, Version};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const DEFAULT_PAGE_SIZE: usize = 20;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub versions: Arc<VersionService>,
    pub users: Arc<UserService>,
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize, Debug, Default)]
pub struct SearchParams {
    #[serde(default)]
    query: String,
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
}

#[derive(Deserialize, Debug)]
pub struct DraftParams {
    #[serde(default)]
    version: String,
}

#[derive(Deserialize, Debug)]
pub struct RoleChange {
    role: i64,
}

/// A user as returned by the API; the password never leaves the server.
#[derive(Serialize, Debug)]
pub struct UserView {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    doc_id: Option<DocumentId>,
    id: i64,
    username: String,
    role: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    register_date: Option<DateTime<Utc>>,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            role: user.role_level(),
            doc_id: user.doc_id,
            id: user.id,
            username: user.username,
            register_date: user.register_date,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Version Endpoints
        .route("/versions", get(search_versions_handler).post(create_version_handler))
        .route("/versions/latest", get(latest_version_handler))
        .route("/versions/draft", get(draft_version_handler))
        .route(
            "/versions/:id",
            get(get_version_handler)
                .put(update_version_handler)
                .delete(delete_version_handler),
        )
        .route("/versions/:id/properties", post(add_property_handler))
        .route(
            "/versions/:id/properties/:property_id",
            put(update_property_handler).delete(remove_property_handler),
        )
        .route("/versions/:id/history", get(version_history_handler))
        // User Endpoints
        .route("/users", get(search_users_handler).post(register_user_handler))
        .route("/users/:id", get(get_user_handler).delete(delete_user_handler))
        .route("/users/:id/role", put(set_role_handler))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Health check endpoint called");
    if state.database.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

// --- Version Handlers ---

async fn search_versions_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchPage<Version>>> {
    info!(query = %params.query, offset = params.offset, "Received version search request");
    let page = state
        .versions
        .search(&params.query, params.offset, params.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;
    Ok(Json(page))
}

async fn create_version_handler(
    State(state): State<AppState>,
    Json(payload): Json<Version>,
) -> ApiResult<Response> {
    info!(version = %payload.version, "Received request to create version");
    let created = state.versions.create(&payload).await?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

async fn latest_version_handler(State(state): State<AppState>) -> ApiResult<Response> {
    Ok(match state.versions.latest().await? {
        Some(version) => Json(version).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn draft_version_handler(
    State(state): State<AppState>,
    Query(params): Query<DraftParams>,
) -> ApiResult<Json<Version>> {
    Ok(Json(state.versions.draft_next(params.version).await?))
}

async fn get_version_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Version>> {
    Ok(Json(state.versions.get(&DocumentId::new(id)).await?))
}

async fn update_version_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Version>,
) -> ApiResult<Json<Version>> {
    info!(doc_id = %id, "Received request to update version");
    Ok(Json(state.versions.update(&DocumentId::new(id), &payload).await?))
}

async fn delete_version_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    info!(doc_id = %id, "Received request to delete version");
    Ok(deleted_status(state.versions.delete(&DocumentId::new(id)).await?))
}

async fn add_property_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Property>,
) -> ApiResult<Response> {
    let updated = state.versions.add_property(&DocumentId::new(id), payload).await?;
    Ok((StatusCode::CREATED, Json(updated)).into_response())
}

async fn update_property_handler(
    State(state): State<AppState>,
    Path((id, property_id)): Path<(String, String)>,
    Json(payload): Json<Property>,
) -> ApiResult<Json<Version>> {
    let updated = state
        .versions
        .update_property(&DocumentId::new(id), &DocumentId::new(property_id), payload)
        .await?;
    Ok(Json(updated))
}

async fn remove_property_handler(
    State(state): State<AppState>,
    Path((id, property_id)): Path<(String, String)>,
) -> ApiResult<Json<Version>> {
    let updated = state
        .versions
        .remove_property(&DocumentId::new(id), &DocumentId::new(property_id))
        .await?;
    Ok(Json(updated))
}

async fn version_history_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Version>>> {
    let version = state.versions.get(&DocumentId::new(id)).await?;
    Ok(Json(state.versions.history(&version.version).await?))
}

// --- User Handlers ---

async fn search_users_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchPage<UserView>>> {
    let page = state
        .users
        .search(&params.query, params.offset, params.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;
    Ok(Json(SearchPage {
        hits: page
            .hits
            .into_iter()
            .map(|hit| Scored {
                record: UserView::from(hit.record),
                score: hit.score,
            })
            .collect(),
        total_hits: page.total_hits,
        offset: page.offset,
        limit: page.limit,
    }))
}

async fn register_user_handler(
    State(state): State<AppState>,
    Json(payload): Json<User>,
) -> ApiResult<Response> {
    info!(username = %payload.username, "Received request to register user");
    let user = state.users.register(&payload).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(user))).into_response())
}

async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserView>> {
    Ok(Json(state.users.get(&DocumentId::new(id)).await?.into()))
}

async fn delete_user_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    info!(doc_id = %id, "Received request to delete user");
    Ok(deleted_status(state.users.delete(&DocumentId::new(id)).await?))
}

async fn set_role_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<RoleChange>,
) -> ApiResult<Json<UserView>> {
    info!(doc_id = %id, role = payload.role, "Received request to change role");
    let user = state.users.set_role(&DocumentId::new(id), payload.role).await?;
    Ok(Json(user.into()))
}

fn deleted_status(deleted: bool) -> StatusCode {
    if deleted {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
