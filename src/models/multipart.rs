//! Values exchanged while a multipart upload is in flight.

use serde::{Deserialize, Serialize};

/// A part acknowledged by the blob store, supplied back on completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,

    /// Integrity tag returned by the store, with quoting stripped.
    pub etag: String,
}

/// Everything needed to persist an `UploadedFile` row once the upload completed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFileDto {
    pub bucket: String,
    pub full_path: String,
    pub size: u64,
    pub filename: String,
    pub content_type: String,
}
