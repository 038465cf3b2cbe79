use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tandem_core::{CoreError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Missing or invalid x-user-id header")]
    Unauthenticated,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ServerError::Core(CoreError::DuplicateSwipe) => {
                (StatusCode::CONFLICT, ErrorKind::Validation.as_str())
            }
            ServerError::Core(err) => {
                let kind = err.kind();
                let status = match kind {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::Authorization => StatusCode::FORBIDDEN,
                    ErrorKind::State => StatusCode::CONFLICT,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, kind.as_str())
            }
            ServerError::Unauthenticated => (StatusCode::UNAUTHORIZED, "authentication"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorKind::Validation.as_str()),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ServerError {
    fn from(rejection: QueryRejection) -> Self {
        ServerError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = serde_json::json!({
            "error": message,
            "kind": kind,
        });

        (status, axum::Json(body)).into_response()
    }
}
