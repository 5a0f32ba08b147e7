//! Core data models for the resume service.
//!
//! Persisted records map to SQLite tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`. Ephemeral DTOs carry data between the upload pipeline
//! and the repositories.

pub mod multipart;
pub mod resume;
pub mod uploaded_file;
