use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use safewatch_hub::{ErrorKind, HubError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Hub(#[from] HubError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Too many requests")]
    RateLimited,
}

impl ServerError {
    fn status(&self) -> StatusCode {
        match self {
            ServerError::Hub(e) => match e.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::InvalidInput | ErrorKind::Precondition => StatusCode::BAD_REQUEST,
            },
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (self.status(), axum::Json(body)).into_response()
    }
}
