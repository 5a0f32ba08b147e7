//! Persistence collaborators for resumes and uploaded files.
//!
//! Services depend on the traits only; [`sqlite`] holds the implementations
//! wired in `main`.

pub mod sqlite;

use crate::models::{
    multipart::UploadedFileDto,
    resume::{Resume, ResumeCreateDto},
    uploaded_file::UploadedFile,
};
use async_trait::async_trait;
use sqlx::error::ErrorKind;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if matches!(
                    db_err.kind(),
                    ErrorKind::CheckViolation
                        | ErrorKind::UniqueViolation
                        | ErrorKind::ForeignKeyViolation
                        | ErrorKind::NotNullViolation
                ) =>
            {
                RepositoryError::ConstraintViolation(db_err.message().to_string())
            }
            _ => RepositoryError::Sqlx(err),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait UploadedFileRepository: Send + Sync {
    /// Insert a row for a completed upload and return it with its generated id.
    async fn create(&self, dto: &UploadedFileDto) -> RepositoryResult<UploadedFile>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<UploadedFile>>;

    async fn delete(&self, file: &UploadedFile) -> RepositoryResult<()>;
}

#[async_trait]
pub trait ResumeRepository: Send + Sync {
    /// Every resume, ordered by creation time then rating, both ascending.
    async fn list_ordered(&self) -> RepositoryResult<Vec<Resume>>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Resume>>;

    /// Insert a resume referencing an existing file row.
    async fn create(&self, dto: &ResumeCreateDto, file_id: Uuid) -> RepositoryResult<Resume>;

    async fn delete(&self, resume: &Resume) -> RepositoryResult<()>;
}
