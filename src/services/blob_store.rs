//! Capability interface over an object store.
//!
//! The upload pipeline only ever talks to a [`BlobStore`]; the disk-backed
//! [`LocalBlobStore`](super::local_blob_store::LocalBlobStore) is the
//! implementation wired in `main`, and tests substitute in-memory fakes.

use crate::models::multipart::CompletedPart;
use async_trait::async_trait;
use bytes::Bytes;
use std::{io, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("multipart upload `{upload_id}` not found for key `{key}`")]
    UploadNotFound { upload_id: String, key: String },
    #[error("invalid part list: {0}")]
    InvalidParts(String),
    #[error("object `{0}` not found")]
    ObjectNotFound(String),
    #[error("presigned url signature is invalid or expired")]
    InvalidSignature,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Highest part number a multipart upload accepts; parts are numbered from 1.
pub const MAX_PART_NUMBER: u32 = 10_000;

/// Operations the upload pipeline needs from an object store.
///
/// Keys are bucket-relative; the bucket is fixed per store instance.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket every key of this store lives in.
    fn bucket(&self) -> &str;

    /// Open a multipart upload for `key` and return its upload id.
    async fn create_multipart_session(&self, key: &str) -> BlobResult<String>;

    /// Store one part and return its integrity tag. The tag may carry
    /// surrounding quotes, as S3-compatible stores return ETags.
    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String>;

    /// Assemble the object from `parts`, which must be in ascending part order.
    async fn complete_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()>;

    /// Discard an unfinished upload and every part staged for it.
    async fn abort_multipart(&self, upload_id: &str, key: &str) -> BlobResult<()>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, key: &str) -> BlobResult<()>;

    /// Build a time-limited download URL that serves `key` as an attachment
    /// named `filename`.
    async fn presign_download(
        &self,
        key: &str,
        filename: &str,
        expires_in: Duration,
    ) -> BlobResult<String>;
}
