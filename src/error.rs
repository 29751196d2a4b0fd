use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;

/// Failures of a single file inside the sheet pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SheetError {
    #[error("file is empty or contains no data")]
    EmptyInput,
    #[error("missing required columns: {}", .0.join(", "))]
    MissingRequiredColumns(Vec<String>),
    #[error("unable to read spreadsheet: {0}")]
    UnreadableSource(String),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("duplicate column key: {0}")]
    DuplicateKey(String),
    #[error("unable to write spreadsheet: {0}")]
    Encode(String),
}

impl From<rust_xlsxwriter::XlsxError> for SheetError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        SheetError::Encode(err.to_string())
    }
}

impl From<calamine::Error> for SheetError {
    fn from(err: calamine::Error) -> Self {
        SheetError::UnreadableSource(err.to_string())
    }
}

#[derive(Debug)]
pub enum AppError {
    InvalidInput(String),
    IoError(std::io::Error),
    Sheet(SheetError),
    BatchRejected(Vec<String>),
    HttpError(String),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            AppError::IoError(err) => write!(f, "IO error: {}", err),
            AppError::Sheet(err) => write!(f, "Sheet error: {}", err),
            AppError::BatchRejected(files) => write!(
                f,
                "Cannot process files with errors: {}. Check the file structure and try again.",
                files.join(", ")
            ),
            AppError::HttpError(msg) => write!(f, "HTTP Error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError(err)
    }
}

impl From<SheetError> for AppError {
    fn from(err: SheetError) -> Self {
        AppError::Sheet(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Sheet(SheetError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Sheet(SheetError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            AppError::Sheet(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::BatchRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::HttpError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
