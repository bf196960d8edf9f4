use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use histsync_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A write targeted a user with no registered device. The client skipped
    /// registration or its user id is corrupt; retrying will not help.
    #[error("Found no devices associated with user_id={0}")]
    NoDevices(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NoDevices { user_id } => ServerError::NoDevices(user_id),
            StoreError::UserMismatch { .. } => ServerError::BadRequest(err.to_string()),
            other => ServerError::Storage(other.to_string()),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ServerError::NoDevices(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ServerError::Unauthorized => {
                let headers = [(
                    header::WWW_AUTHENTICATE,
                    r#"Basic realm="restricted", charset="UTF-8""#,
                )];
                return (StatusCode::UNAUTHORIZED, headers, "Unauthorized").into_response();
            }
            ServerError::NotFound => (StatusCode::NOT_FOUND, self.to_string()),
            ServerError::Storage(_) => {
                tracing::error!(error = %self, "Request failed in storage layer");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ServerError::Internal(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Failures of the background release resolver. Never surfaced to clients.
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Release feed returned status {status}: {body}")]
    FeedStatus { status: u16, body: String },

    #[error("Failed to parse release feed response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Artifact {0} returned 404")]
    MissingArtifact(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),
}
