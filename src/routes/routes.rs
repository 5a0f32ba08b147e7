//! Defines routes for resume operations, presigned downloads and probes.
//!
//! ## Structure
//! - **Resume endpoints**
//!   - `GET    /resume/list`                  — paginated list (`?page=&size=`)
//!   - `POST   /resume/upload`                — multipart form, 204 on success
//!   - `DELETE /resume/delete/{resume_id}`    — delete resume, file row and blob
//!   - `GET    /resume/{resume_id}/download`  — presigned download link
//!
//! - **Blob endpoints**
//!   - `GET    /blobs/{bucket}/{*key}`        — serve a presigned download
//!
//! The wildcard `*key` allows nested keys like `uploads/resume/<id>/<file>.pdf`.

use crate::{
    handlers::{
        blob_handlers::download_blob,
        health_handlers::{healthz, readyz},
        resume_handlers::{delete_resume, list_resumes, resume_download, upload_resume},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};

/// Build and return the router for all routes.
///
/// Request bodies are not capped by axum; the upload handler enforces the
/// configured file size itself so oversize files get a structured 413, and
/// caps each text field.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/resume/list", get(list_resumes))
        .route("/resume/upload", post(upload_resume))
        .route("/resume/delete/{resume_id}", delete(delete_resume))
        .route("/resume/{resume_id}/download", get(resume_download))
        .route("/blobs/{bucket}/{*key}", get(download_blob))
        .layer(DefaultBodyLimit::disable())
}
