use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to initialize OCR engine for [{languages}]: {reason}")]
    InitializationError { languages: String, reason: String },

    #[error("Failed to process image: {0}")]
    ProcessingError(String),

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("Image too large: {size} bytes (max: {max} bytes)")]
    ImageTooLarge { size: usize, max: usize },

    #[error("Missing file in request")]
    MissingFile,

    #[error("No text was extracted from the image")]
    NoText,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OcrError {
    /// Build an initialization error for a language set
    pub fn init(languages: impl ToString, reason: impl ToString) -> Self {
        OcrError::InitializationError {
            languages: languages.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Machine-readable code sent alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            OcrError::InitializationError { .. } => "INIT_ERROR",
            OcrError::ProcessingError(_) => "PROCESSING_ERROR",
            OcrError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            OcrError::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            OcrError::MissingFile => "MISSING_FILE",
            OcrError::NoText => "NO_TEXT",
            OcrError::InvalidRequest(_) => "INVALID_REQUEST",
            OcrError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OcrError::InitializationError { .. }
            | OcrError::ProcessingError(_)
            | OcrError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OcrError::UnsupportedFormat(_)
            | OcrError::MissingFile
            | OcrError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OcrError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            OcrError::NoText => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl From<JsonRejection> for OcrError {
    fn from(rejection: JsonRejection) -> Self {
        OcrError::InvalidRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for OcrError {
    fn from(rejection: MultipartRejection) -> Self {
        OcrError::InvalidRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for OcrError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        });

        (status, body).into_response()
    }
}
