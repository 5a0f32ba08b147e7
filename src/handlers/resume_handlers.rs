//! HTTP handlers for resume operations.
//!
//! Uploaded files are spooled to an anonymous temporary file while the form
//! is parsed, so the declared size is known before validation and the file
//! is never held in memory.

use crate::{
    errors::AppError,
    models::resume::{Resume, ResumeCreateDto},
    services::{file_service::FileUpload, file_validator::FileDescriptor},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncSeekExt, AsyncWriteExt},
};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 100;
const MAX_NAME_BYTES: usize = 4 * 1024;
const MAX_RATING_BYTES: usize = 64;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    /// Slice `all` according to `query`; `page` is 1-based.
    fn paginate(all: Vec<T>, query: &PageQuery) -> Self {
        let page = query.page.unwrap_or(1).max(1);
        let size = query
            .size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let total = all.len();
        let items = all
            .into_iter()
            .skip((page - 1).saturating_mul(size))
            .take(size)
            .collect();

        Self {
            items,
            total,
            page,
            size,
            pages: total.div_ceil(size),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeSchema {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pretender_name: String,
    pub rating: f64,
    pub file_id: Uuid,
}

impl From<Resume> for ResumeSchema {
    fn from(resume: Resume) -> Self {
        Self {
            id: resume.id,
            created_at: resume.created_at,
            updated_at: resume.updated_at,
            pretender_name: resume.pretender_name,
            rating: resume.rating,
            file_id: resume.file_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadLink {
    pub url: String,
}

/// `GET /resume/list?page=&size=`
pub async fn list_resumes(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ResumeSchema>>, AppError> {
    let resumes = state.resumes.read_resume_list().await?;
    let schemas = resumes.into_iter().map(ResumeSchema::from).collect();
    Ok(Json(Page::paginate(schemas, &query)))
}

/// `POST /resume/upload` — multipart form with `pretender_name`, `rating`
/// and the file under `file` (or `upload_file`).
pub async fn upload_resume(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<StatusCode, AppError> {
    let mut pretender_name = None;
    let mut rating = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pretender_name" => {
                pretender_name =
                    Some(read_text_field(field, "pretender_name", MAX_NAME_BYTES).await?)
            }
            "rating" => rating = Some(read_text_field(field, "rating", MAX_RATING_BYTES).await?),
            "file" | "upload_file" => upload = Some(spool_field(field, state.max_upload_size).await?),
            _ => {}
        }
    }

    let pretender_name = pretender_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| AppError::invalid_form("form field `pretender_name` is required"))?;
    let rating = rating
        .ok_or_else(|| AppError::invalid_form("form field `rating` is required"))?
        .trim()
        .parse::<f64>()
        .map_err(|_| AppError::invalid_form("form field `rating` must be a number"))?;
    let upload = upload.ok_or_else(|| AppError::invalid_form("form field `file` is required"))?;

    let dto = ResumeCreateDto {
        pretender_name,
        rating,
    };
    if !dto.rating_in_range() {
        return Err(AppError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "invalid_rating",
            "Rating must be between 0.0 and 5.0",
        ));
    }

    state.resumes.upload_pretender_resume(upload, dto).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /resume/delete/{resume_id}`
pub async fn delete_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.resumes.delete_resume(resume_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /resume/{resume_id}/download` — presigned link to the resume's file.
pub async fn resume_download(
    State(state): State<AppState>,
    Path(resume_id): Path<Uuid>,
) -> Result<Json<DownloadLink>, AppError> {
    let url = state.resumes.resume_download_url(resume_id).await?;
    Ok(Json(DownloadLink { url }))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::bad_request(err.body_text())
}

/// Read a text field, failing once it grows past `max_bytes`.
async fn read_text_field(
    mut field: Field<'_>,
    name: &str,
    max_bytes: usize,
) -> Result<String, AppError> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if buf.len() + chunk.len() > max_bytes {
            return Err(AppError::invalid_form(format!(
                "form field `{}` must not be longer than {} bytes",
                name, max_bytes
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8(buf)
        .map_err(|_| AppError::invalid_form(format!("form field `{}` must be UTF-8", name)))
}

/// Copy a file field into a temporary file, counting every byte.
///
/// Bytes past `max_size` are counted but discarded; the count becomes the
/// declared size checked by validation.
async fn spool_field(mut field: Field<'_>, max_size: u64) -> Result<FileUpload<File>, AppError> {
    let filename = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);

    let mut file = File::from_std(tempfile::tempfile().map_err(AppError::internal)?);
    let mut size: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        size += chunk.len() as u64;
        if size <= max_size {
            file.write_all(&chunk).await.map_err(AppError::internal)?;
        }
    }
    file.flush().await.map_err(AppError::internal)?;
    file.rewind().await.map_err(AppError::internal)?;

    Ok(FileUpload {
        descriptor: FileDescriptor {
            filename,
            content_type,
            size: Some(size),
        },
        reader: file,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<usize>, size: Option<usize>) -> PageQuery {
        PageQuery { page, size }
    }

    #[test]
    fn paginate_slices_and_counts_pages() {
        let page = Page::paginate((1..=7).collect::<Vec<_>>(), &query(Some(2), Some(3)));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.total, 7);
        assert_eq!(page.pages, 3);

        let last = Page::paginate((1..=7).collect::<Vec<_>>(), &query(Some(3), Some(3)));
        assert_eq!(last.items, vec![7]);

        let beyond = Page::paginate((1..=7).collect::<Vec<_>>(), &query(Some(9), Some(3)));
        assert!(beyond.items.is_empty());
    }

    #[test]
    fn paginate_clamps_inputs() {
        let page = Page::paginate(vec![1, 2], &query(Some(0), Some(0)));
        assert_eq!(page.page, 1);
        assert_eq!(page.size, 1);
        assert_eq!(page.items, vec![1]);

        let page = Page::paginate(Vec::<u8>::new(), &query(None, Some(1000)));
        assert_eq!(page.size, MAX_PAGE_SIZE);
        assert_eq!(page.pages, 0);
    }
}
