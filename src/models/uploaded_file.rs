//! Represents a file whose bytes live in the blob store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for an object written through a completed multipart upload.
///
/// The row never holds content bytes; `path` addresses the object inside
/// `bucket`.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct UploadedFile {
    /// Server-generated identifier.
    pub id: Uuid,

    /// Bucket the object was written to.
    pub bucket: String,

    /// Original filename as supplied by the client, extension included.
    pub name: String,

    /// Full object key inside the bucket.
    pub path: String,

    /// MIME type declared by the client.
    pub content_type: String,

    /// Size in bytes.
    pub file_size: i64,

    /// When this record was created.
    pub created_at: DateTime<Utc>,
}
