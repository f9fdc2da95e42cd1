use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Item {0} not found")]
    ItemNotFound(u32),

    #[error("Index {index} out of range for snapshot of {len} items")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Progress {0} exceeds 100")]
    InvalidProgress(u8),

    #[error("Download manager is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::ItemNotFound(_) => StatusCode::NOT_FOUND,
            Error::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Error::IndexOutOfRange { .. } | Error::InvalidProgress(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
