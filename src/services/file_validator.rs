//! Metadata checks run before any byte of an upload is transferred.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("filename is missing")]
    FilenameMissing,
    #[error("content type is missing")]
    ContentTypeMissing,
    #[error("file size {declared_size:?} exceeds the limit of {max_size} bytes")]
    InvalidFileSize {
        declared_size: Option<u64>,
        max_size: u64,
    },
    #[error("file declared {declared} bytes but {actual} were received")]
    SizeMismatch { declared: u64, actual: u64 },
}

/// What the caller knows about an inbound file before reading it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDescriptor {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFileParams {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
}

/// Check filename, content type and declared size, in that order.
pub fn validate(
    file: &FileDescriptor,
    max_size: u64,
) -> Result<ValidatedFileParams, ValidationError> {
    let filename = match file.filename.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => return Err(ValidationError::FilenameMissing),
    };

    let content_type = match file.content_type.as_deref() {
        Some(ct) if !ct.is_empty() => ct,
        _ => return Err(ValidationError::ContentTypeMissing),
    };

    let size = match file.size {
        Some(size) if size <= max_size => size,
        declared_size => {
            return Err(ValidationError::InvalidFileSize {
                declared_size,
                max_size,
            });
        }
    };

    Ok(ValidatedFileParams {
        filename: filename.to_string(),
        content_type: content_type.to_string(),
        size,
    })
}
