//! SQLite-backed repositories.

use crate::{
    models::{
        multipart::UploadedFileDto,
        resume::{Resume, ResumeCreateDto},
        uploaded_file::UploadedFile,
    },
    repositories::{RepositoryResult, ResumeRepository, UploadedFileRepository},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteUploadedFileRepository {
    db: SqlitePool,
}

impl SqliteUploadedFileRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UploadedFileRepository for SqliteUploadedFileRepository {
    async fn create(&self, dto: &UploadedFileDto) -> RepositoryResult<UploadedFile> {
        let file = sqlx::query_as::<_, UploadedFile>(
            r#"
            INSERT INTO uploaded_file (id, bucket, name, path, content_type, file_size, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id, bucket, name, path, content_type, file_size, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&dto.bucket)
        .bind(&dto.filename)
        .bind(&dto.full_path)
        .bind(&dto.content_type)
        .bind(dto.size as i64)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        Ok(file)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<UploadedFile>> {
        let file = sqlx::query_as::<_, UploadedFile>(
            "SELECT id, bucket, name, path, content_type, file_size, created_at
             FROM uploaded_file WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(file)
    }

    async fn delete(&self, file: &UploadedFile) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM uploaded_file WHERE id = ?")
            .bind(file.id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!("uploaded_file {} was already gone", file.id);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteResumeRepository {
    db: SqlitePool,
}

impl SqliteResumeRepository {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResumeRepository for SqliteResumeRepository {
    async fn list_ordered(&self) -> RepositoryResult<Vec<Resume>> {
        let rows = sqlx::query_as::<_, Resume>(
            "SELECT id, pretender_name, rating, file_id, created_at, updated_at
             FROM resume ORDER BY created_at ASC, rating ASC",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Resume>> {
        let resume = sqlx::query_as::<_, Resume>(
            "SELECT id, pretender_name, rating, file_id, created_at, updated_at
             FROM resume WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(resume)
    }

    async fn create(&self, dto: &ResumeCreateDto, file_id: Uuid) -> RepositoryResult<Resume> {
        let now = Utc::now();
        let resume = sqlx::query_as::<_, Resume>(
            r#"
            INSERT INTO resume (id, pretender_name, rating, file_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, pretender_name, rating, file_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&dto.pretender_name)
        .bind(dto.rating)
        .bind(file_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(resume)
    }

    async fn delete(&self, resume: &Resume) -> RepositoryResult<()> {
        let result = sqlx::query("DELETE FROM resume WHERE id = ?")
            .bind(resume.id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!("resume {} was already gone", resume.id);
        }
        Ok(())
    }
}
