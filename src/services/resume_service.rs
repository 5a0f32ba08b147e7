//! Resume lifecycle on top of [`FileService`] and the two
//! repositories.
//!
//! Deletion is not transactional. It removes the resume row, then the blob,
//! then the file row; a failure part-way leaves the remaining steps undone and
//! is logged with everything needed to finish the cleanup by hand.

use crate::{
    models::{
        resume::{Resume, ResumeCreateDto},
        uploaded_file::UploadedFile,
    },
    repositories::{RepositoryError, ResumeRepository, UploadedFileRepository},
    services::{
        blob_store::BlobError,
        file_service::{FileService, FileServiceError, FileUpload},
        multipart_upload::join_key,
    },
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{entity_name} `{id}` not found")]
pub struct NotFoundError {
    pub id: String,
    pub entity_name: &'static str,
}

impl NotFoundError {
    pub fn new(id: impl ToString, entity_name: &'static str) -> Self {
        Self {
            id: id.to_string(),
            entity_name,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResumeServiceError {
    #[error(transparent)]
    NotFound(#[from] NotFoundError),
    #[error(transparent)]
    Upload(#[from] FileServiceError),
    #[error(transparent)]
    Blob(#[from] BlobError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct ResumeService {
    files: Arc<FileService>,
    resume_repository: Arc<dyn ResumeRepository>,
    file_repository: Arc<dyn UploadedFileRepository>,
}

impl ResumeService {
    pub fn new(
        files: Arc<FileService>,
        resume_repository: Arc<dyn ResumeRepository>,
        file_repository: Arc<dyn UploadedFileRepository>,
    ) -> Self {
        Self {
            files,
            resume_repository,
            file_repository,
        }
    }

    pub async fn read_resume_list(&self) -> Result<Vec<Resume>, ResumeServiceError> {
        Ok(self.resume_repository.list_ordered().await?)
    }

    /// Upload the resume file and create the resume row pointing at it.
    ///
    /// The file lands in `<root>/<resume folder>/<fresh uuid>/`, so it can be
    /// written before the resume row exists.
    pub async fn upload_pretender_resume<R>(
        &self,
        file: FileUpload<R>,
        dto: ResumeCreateDto,
    ) -> Result<Resume, ResumeServiceError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let settings = self.files.settings();
        let resume_file_id = Uuid::new_v4().to_string();
        let directory = join_key(&[
            &settings.root_path,
            &settings.resume_attachments_folder,
            &resume_file_id,
        ]);

        let uploaded = self.files.upload_and_save(&directory, file).await?;
        let resume = match self.resume_repository.create(&dto, uploaded.id).await {
            Ok(resume) => resume,
            Err(err) => {
                self.discard_file(&uploaded).await;
                return Err(err.into());
            }
        };
        info!(resume_id = %resume.id, file_id = %uploaded.id, "resume created");
        Ok(resume)
    }

    /// Remove a file nothing references yet. Failures are logged only.
    async fn discard_file(&self, file: &UploadedFile) {
        if let Err(err) = self.files.delete_file(&file.path).await {
            error!(file_id = %file.id, path = %file.path, error = %err, "failed to delete unreferenced blob");
        }
        if let Err(err) = self.file_repository.delete(file).await {
            error!(file_id = %file.id, error = %err, "failed to delete unreferenced file row");
        }
    }

    /// Resolve a resume and its file, failing with the first missing one.
    async fn resolve(&self, id: Uuid) -> Result<(Resume, UploadedFile), ResumeServiceError> {
        let resume = self
            .resume_repository
            .get(id)
            .await?
            .ok_or_else(|| NotFoundError::new(id, "Resume"))?;

        let file = self
            .file_repository
            .get(resume.file_id)
            .await?
            .ok_or_else(|| NotFoundError::new(resume.file_id, "UploadedFile"))?;

        Ok((resume, file))
    }

    /// Delete a resume, its blob and its file row, in that order.
    ///
    /// Nothing is deleted unless both the resume and its file row exist.
    pub async fn delete_resume(&self, id: Uuid) -> Result<(), ResumeServiceError> {
        let (resume, file) = self.resolve(id).await?;

        self.resume_repository.delete(&resume).await?;

        if let Err(err) = self.files.delete_file(&file.path).await {
            error!(
                resume_id = %resume.id,
                file_id = %file.id,
                path = %file.path,
                error = %err,
                "resume row deleted but blob deletion failed; file row and blob are orphaned"
            );
            return Err(err.into());
        }

        if let Err(err) = self.file_repository.delete(&file).await {
            error!(
                resume_id = %resume.id,
                file_id = %file.id,
                path = %file.path,
                error = %err,
                "resume row and blob deleted but file row deletion failed; file row is orphaned"
            );
            return Err(err.into());
        }

        info!(resume_id = %resume.id, file_id = %file.id, "resume deleted");
        Ok(())
    }

    /// Presigned download URL for the resume's file.
    pub async fn resume_download_url(&self, id: Uuid) -> Result<String, ResumeServiceError> {
        let (_, file) = self.resolve(id).await?;
        Ok(self.files.download_url(&file).await?)
    }
}
