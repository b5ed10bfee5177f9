use application::ApplicationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let ApiError::Application(err) = self;
        match err {
            ApplicationError::InvalidInput(_)
            | ApplicationError::InvalidAddress { .. }
            | ApplicationError::DomainError(_)
            | ApplicationError::Serialization(_) => StatusCode::BAD_REQUEST,
            ApplicationError::NotFound(_) | ApplicationError::CollectionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApplicationError::CollectionAlreadyExists(_) => StatusCode::CONFLICT,
            ApplicationError::IndexNotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApplicationError::Precondition(_)
            | ApplicationError::Connection(_)
            | ApplicationError::IndexError { .. }
            | ApplicationError::SearchError { .. }
            | ApplicationError::InfrastructureError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!("Request failed: {}", self);
            "An internal server error occurred".to_string()
        } else {
            warn!(status = status.as_u16(), "Request rejected: {}", self);
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::PreconditionError;
    use domain::DomainError;

    fn status_of(err: ApplicationError) -> StatusCode {
        ApiError::from(err).status()
    }

    #[test]
    fn maps_errors_to_status_codes() {
        assert_eq!(
            status_of(DomainError::MissingField("version".to_string()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(ApplicationError::NotFound("x".to_string())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(ApplicationError::CollectionAlreadyExists("users".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApplicationError::IndexNotReady("versions".to_string())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(PreconditionError::NotInitialized.into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
