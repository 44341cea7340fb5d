use crate::engine::EngineError;
use crate::storage::StorageError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use facedrop_core::DecodeError;
use std::time::Duration;
use thiserror::Error;

pub const MISSING_FILE_MESSAGE: &str = "No file uploaded.";
pub const PROCESSING_FAILED_MESSAGE: &str = "Error processing the image.";
pub const NOT_READY_MESSAGE: &str = "Models are still loading.";
pub const TOO_LARGE_MESSAGE: &str = "File too large.";

/// Failure after the upload was stored: decoding or analysis.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("analysis timed out after {0:?}")]
    TimedOut(Duration),
    #[error("decode worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Everything the upload endpoint can answer with besides success.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request carried no file field")]
    MissingFile,
    #[error("upload exceeds the configured size limit")]
    PayloadTooLarge,
    #[error("models not loaded yet")]
    NotReady,
    #[error("storing upload failed: {0}")]
    Storage(StorageError),
    #[error("processing upload failed: {0}")]
    Processing(#[from] ProcessingError),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Upload(ref m) if m.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                ApiError::PayloadTooLarge
            }
            other => ApiError::Storage(other),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Storage(_) | ApiError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Fixed client-facing text; internal detail stays in the logs.
    fn public_message(&self) -> &'static str {
        match self {
            ApiError::MissingFile => MISSING_FILE_MESSAGE,
            ApiError::PayloadTooLarge => TOO_LARGE_MESSAGE,
            ApiError::NotReady => NOT_READY_MESSAGE,
            ApiError::Storage(_) | ApiError::Processing(_) => PROCESSING_FAILED_MESSAGE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            tracing::error!(error = %self, "upload failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "upload rejected");
        }
        (status, self.public_message()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PayloadTooLarge.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::NotReady.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::Processing(ProcessingError::TimedOut(Duration::from_secs(1))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_io_storage_error_is_server_error() {
        let err: ApiError = StorageError::Io(std::io::Error::other("disk full")).into();
        assert!(matches!(err, ApiError::Storage(_)));
        assert_eq!(err.public_message(), PROCESSING_FAILED_MESSAGE);
    }

    #[test]
    fn test_processing_detail_not_in_public_message() {
        let err = ApiError::Processing(ProcessingError::Engine(EngineError::ChannelClosed));
        assert_eq!(err.public_message(), "Error processing the image.");
        assert!(err.to_string().contains("engine thread exited"));
    }
}
