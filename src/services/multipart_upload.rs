//! Client side of the multipart upload protocol for a single object.
//!
//! A [`MultipartUpload`] is opened against a [`BlobStore`], fed parts in
//! order, and consumed by exactly one of [`complete`](MultipartUpload::complete)
//! or [`abort`](MultipartUpload::abort). [`finish`](MultipartUpload::finish)
//! picks between the two from the outcome of the streaming step: it completes
//! on success and aborts on failure. An aborted upload is never completed.

use crate::{
    models::multipart::CompletedPart,
    services::blob_store::{BlobError, BlobResult, BlobStore},
};
use bytes::Bytes;
use std::{fmt, path::Path, sync::Arc};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// What a completed upload produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedUpload {
    pub full_path: String,
    pub file_size: u64,
    pub part_count: usize,
}

pub struct MultipartUpload {
    store: Arc<dyn BlobStore>,
    /// Destination key, derived once at open time.
    full_path: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    file_size: u64,
    finished: bool,
}

impl MultipartUpload {
    /// Open an upload for `directory/<random name keeping filename's extension>`.
    pub async fn open(
        store: Arc<dyn BlobStore>,
        directory: &str,
        filename: &str,
    ) -> BlobResult<Self> {
        let full_path = join_key(&[directory, &build_random_filename(filename)]);
        let upload_id = store.create_multipart_session(&full_path).await?;
        debug!(upload_id = %upload_id, path = %full_path, "multipart upload opened");

        Ok(Self {
            store,
            full_path,
            upload_id,
            parts: Vec::new(),
            file_size: 0,
            finished: false,
        })
    }

    #[cfg(test)]
    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    /// Bytes sent so far.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    /// Send the next part. Part numbers start at 1 and increase by one per call.
    pub async fn upload_part(&mut self, chunk: Bytes) -> BlobResult<()> {
        let part_number = self.parts.len() as u32 + 1;
        let len = chunk.len() as u64;
        let tag = self
            .store
            .upload_part(&self.upload_id, &self.full_path, part_number, chunk)
            .await?;

        self.parts.push(CompletedPart {
            part_number,
            etag: tag.replace('"', ""),
        });
        self.file_size += len;
        Ok(())
    }

    /// Ask the store to assemble the object from the recorded parts.
    pub async fn complete(mut self) -> BlobResult<CompletedUpload> {
        self.finished = true;
        self.store
            .complete_multipart(&self.upload_id, &self.full_path, &self.parts)
            .await?;
        debug!(
            upload_id = %self.upload_id,
            path = %self.full_path,
            parts = self.parts.len(),
            bytes = self.file_size,
            "multipart upload completed"
        );

        Ok(CompletedUpload {
            full_path: self.full_path.clone(),
            file_size: self.file_size,
            part_count: self.parts.len(),
        })
    }

    /// Release the store-side upload and every staged part.
    pub async fn abort(mut self) -> BlobResult<()> {
        self.finished = true;
        self.store
            .abort_multipart(&self.upload_id, &self.full_path)
            .await?;
        debug!(upload_id = %self.upload_id, path = %self.full_path, "multipart upload aborted");
        Ok(())
    }

    /// Close the upload according to `outcome`.
    ///
    /// `Ok` completes the upload. `Err` aborts it and hands the original error
    /// back; an abort failure is logged, not returned.
    pub async fn finish<E>(self, outcome: Result<(), E>) -> Result<CompletedUpload, E>
    where
        E: From<BlobError> + fmt::Display,
    {
        match outcome {
            Ok(()) => Ok(self.complete().await?),
            Err(err) => {
                let upload_id = self.upload_id.clone();
                let full_path = self.full_path.clone();
                if let Err(abort_err) = self.abort().await {
                    error!(
                        upload_id = %upload_id,
                        path = %full_path,
                        error = %abort_err,
                        cause = %err,
                        "failed to abort multipart upload; staged parts remain in the store"
                    );
                }
                Err(err)
            }
        }
    }
}

impl Drop for MultipartUpload {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                upload_id = %self.upload_id,
                path = %self.full_path,
                "multipart upload dropped without complete or abort"
            );
        }
    }
}

/// Replace the stem of `original` with a fresh UUID, keeping its extension.
///
/// Only the final path component is considered, and extensions that are not
/// plain ASCII alphanumerics are dropped.
pub fn build_random_filename(original: &str) -> String {
    let stem = Uuid::new_v4().to_string();
    match Path::new(original).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            format!("{}.{}", stem, ext)
        }
        _ => stem,
    }
}

/// Join key segments with `/`, dropping empty segments and stray slashes.
pub fn join_key(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|segment| segment.split('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}
