use crate::services::{
    blob_store::BlobError,
    file_service::FileServiceError,
    file_validator::ValidationError,
    resume_service::{NotFoundError, ResumeServiceError},
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;

/// An HTTP-facing error carrying the JSON body clients receive.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    /// Set for not-found errors: the missing id and entity.
    pub identifier: Option<(String, String)>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identifier: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_name: Option<&'a str>,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
            identifier: None,
        }
    }

    /// Shortcut for a 500. The cause is logged here and kept out of the body.
    pub fn internal(cause: impl fmt::Display) -> Self {
        tracing::error!("request failed: {}", cause);
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "Internal server error",
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    /// A form field is missing or unparsable.
    pub fn invalid_form(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_form", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            code: self.code,
            message: &self.message,
            identifier: self.identifier.as_ref().map(|(id, _)| id.as_str()),
            entity_name: self.identifier.as_ref().map(|(_, entity)| entity.as_str()),
        });

        (self.status, body).into_response()
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FilenameMissing => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "filename_is_none",
                "Filename must be not None",
            ),
            ValidationError::ContentTypeMissing => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "file_content_type_is_none",
                "File content-type is None",
            ),
            ValidationError::InvalidFileSize { max_size, .. } => AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "invalid_file_size",
                format!("The file must not be larger than {} bytes", max_size),
            ),
            ValidationError::SizeMismatch { .. } => AppError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                "file_size_mismatch",
                err.to_string(),
            ),
        }
    }
}

impl From<NotFoundError> for AppError {
    fn from(err: NotFoundError) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "object_not_found",
            message: "Object not found".into(),
            identifier: Some((err.id, err.entity_name.to_string())),
        }
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::InvalidSignature => AppError::new(
                StatusCode::FORBIDDEN,
                "invalid_signature",
                "Download link is invalid or expired",
            ),
            BlobError::ObjectNotFound(_) | BlobError::InvalidKey(_) => {
                AppError::new(StatusCode::NOT_FOUND, "object_not_found", "Object not found")
            }
            other => AppError::internal(other),
        }
    }
}

impl From<FileServiceError> for AppError {
    fn from(err: FileServiceError) -> Self {
        match err {
            FileServiceError::Validation(err) => err.into(),
            other => AppError::internal(other),
        }
    }
}

impl From<ResumeServiceError> for AppError {
    fn from(err: ResumeServiceError) -> Self {
        match err {
            ResumeServiceError::NotFound(err) => err.into(),
            ResumeServiceError::Upload(err) => err.into(),
            other => AppError::internal(other),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err)
    }
}
