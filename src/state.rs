use crate::{
    config::UploadSettings,
    repositories::sqlite::{SqliteResumeRepository, SqliteUploadedFileRepository},
    services::{
        file_service::FileService, local_blob_store::LocalBlobStore, resume_service::ResumeService,
    },
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub resumes: Arc<ResumeService>,
    /// Serves presigned downloads; also the store behind `resumes`.
    pub blobs: Arc<LocalBlobStore>,
    pub db: SqlitePool,
    /// Upload limit; spooling stops writing past it.
    pub max_upload_size: u64,
}

impl AppState {
    /// Wire the services over SQLite repositories and the local blob store.
    pub fn new(db: SqlitePool, blobs: Arc<LocalBlobStore>, upload: UploadSettings) -> Self {
        let file_repository = Arc::new(SqliteUploadedFileRepository::new(db.clone()));
        let resume_repository = Arc::new(SqliteResumeRepository::new(db.clone()));
        let max_upload_size = upload.allowed_uploaded_file_size;

        let files = Arc::new(FileService::new(
            blobs.clone(),
            file_repository.clone(),
            upload,
        ));
        let resumes = Arc::new(ResumeService::new(files, resume_repository, file_repository));

        Self {
            resumes,
            blobs,
            db,
            max_upload_size,
        }
    }
}
