//! Validates an inbound file, streams it into the blob store
//! through a multipart upload and records it in the database.
//!
//! Input is read in fixed `read_chunk_size` pieces so peak memory stays at
//! one chunk regardless of the file size.

use crate::{
    config::UploadSettings,
    models::{multipart::UploadedFileDto, uploaded_file::UploadedFile},
    repositories::{RepositoryError, UploadedFileRepository},
    services::{
        blob_store::{BlobError, BlobResult, BlobStore},
        file_validator::{self, FileDescriptor, ValidationError},
        multipart_upload::MultipartUpload,
    },
};
use bytes::Bytes;
use std::{io, sync::Arc};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum FileServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("reading upload body: {0}")]
    Read(#[source] io::Error),
}

/// An inbound file: metadata known up front plus a reader over its bytes.
pub struct FileUpload<R> {
    pub descriptor: FileDescriptor,
    pub reader: R,
}

pub struct FileService {
    store: Arc<dyn BlobStore>,
    repository: Arc<dyn UploadedFileRepository>,
    settings: UploadSettings,
}

impl FileService {
    pub fn new(
        store: Arc<dyn BlobStore>,
        repository: Arc<dyn UploadedFileRepository>,
        settings: UploadSettings,
    ) -> Self {
        Self {
            store,
            repository,
            settings,
        }
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    /// Validate `file` and upload it beneath `directory`.
    ///
    /// Validation failures return before the store is contacted.
    pub async fn upload_file<R>(
        &self,
        directory: &str,
        file: FileUpload<R>,
    ) -> Result<UploadedFileDto, FileServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let params =
            file_validator::validate(&file.descriptor, self.settings.allowed_uploaded_file_size)?;

        let mut reader = file.reader;
        let mut upload =
            MultipartUpload::open(self.store.clone(), directory, &params.filename).await?;
        let streamed = self.stream_parts(&mut upload, &mut reader, params.size).await;
        let completed = upload.finish(streamed).await?;

        info!(
            path = %completed.full_path,
            parts = completed.part_count,
            bytes = completed.file_size,
            "file uploaded"
        );

        Ok(UploadedFileDto {
            bucket: self.store.bucket().to_string(),
            full_path: completed.full_path,
            size: completed.file_size,
            filename: params.filename,
            content_type: params.content_type,
        })
    }

    /// Feed the reader into `upload` chunk by chunk.
    ///
    /// The stream must deliver exactly `declared` bytes. An empty file is
    /// sent as a single empty part, since a multipart upload needs at least one.
    async fn stream_parts<R>(
        &self,
        upload: &mut MultipartUpload,
        reader: &mut R,
        declared: u64,
    ) -> Result<(), FileServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        loop {
            let chunk = read_chunk(reader, self.settings.read_chunk_size)
                .await
                .map_err(FileServiceError::Read)?;
            if chunk.is_empty() {
                break;
            }

            let actual = upload.file_size() + chunk.len() as u64;
            if actual > declared {
                return Err(ValidationError::SizeMismatch { declared, actual }.into());
            }
            upload.upload_part(chunk).await?;
        }

        if upload.file_size() != declared {
            return Err(ValidationError::SizeMismatch {
                declared,
                actual: upload.file_size(),
            }
            .into());
        }
        if upload.parts().is_empty() {
            upload.upload_part(Bytes::new()).await?;
        }
        Ok(())
    }

    /// Upload `file` and persist its metadata row.
    ///
    /// If the row cannot be written, the freshly written object is deleted
    /// before the error is returned.
    pub async fn upload_and_save<R>(
        &self,
        directory: &str,
        file: FileUpload<R>,
    ) -> Result<UploadedFile, FileServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let dto = self.upload_file(directory, file).await?;
        match self.repository.create(&dto).await {
            Ok(record) => Ok(record),
            Err(err) => {
                if let Err(cleanup_err) = self.store.delete_object(&dto.full_path).await {
                    error!(
                        path = %dto.full_path,
                        error = %cleanup_err,
                        "failed to delete object after its metadata row was rejected; object is orphaned"
                    );
                }
                Err(err.into())
            }
        }
    }

    /// Best-effort object delete. A missing object is not an error.
    pub async fn delete_file(&self, path: &str) -> BlobResult<()> {
        self.store.delete_object(path).await
    }

    /// Presigned URL serving `file` under its original name.
    pub async fn download_url(&self, file: &UploadedFile) -> BlobResult<String> {
        self.store
            .presign_download(&file.path, &file.name, self.settings.presign_expiry)
            .await
    }
}

/// Read up to `chunk_size` bytes, returning fewer only at end of input.
async fn read_chunk<R>(reader: &mut R, chunk_size: usize) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    let mut filled = 0;
    while filled < chunk_size {
        let read = reader.read(&mut buf[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}
