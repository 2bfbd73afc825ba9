use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use ecotrack_types::api::ErrorBody;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(BTreeMap<String, String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("You do not have access to this resource")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized | ApiError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::Validation(details) => ErrorBody {
                error: "Validation failed".into(),
                details: Some(details),
            },
            ApiError::Internal(e) => {
                error!("Unhandled error: {:#}", e);
                ErrorBody {
                    error: "Internal server error".into(),
                    details: None,
                }
            }
            other => ErrorBody {
                error: other.to_string(),
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Malformed or mistyped JSON bodies surface as a 400 with the parser's
/// message under the `body` path.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let mut details = BTreeMap::new();
        details.insert("body".to_string(), rejection.body_text());
        ApiError::Validation(details)
    }
}

/// Unparseable path segments, e.g. an id that is not a UUID.
impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        let mut details = BTreeMap::new();
        details.insert("path".to_string(), rejection.body_text());
        ApiError::Validation(details)
    }
}

/// Unknown enum values or non-numeric limits in the query string.
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let mut details = BTreeMap::new();
        details.insert("query".to_string(), rejection.body_text());
        ApiError::Validation(details)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(anyhow::anyhow!("spawn_blocking join error: {}", e))
    }
}
