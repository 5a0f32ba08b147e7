//! Represents a candidate resume and the payload used to create one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

/// A resume submitted by a candidate ("pretender").
///
/// Every resume references exactly one [`UploadedFile`](super::uploaded_file::UploadedFile);
/// the file row is created first and removed together with the resume.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct Resume {
    pub id: Uuid,

    /// Candidate name.
    pub pretender_name: String,

    /// Reviewer rating, `0.0..=5.0` (enforced by a CHECK constraint).
    pub rating: f64,

    /// The attached file.
    pub file_id: Uuid,

    pub created_at: DateTime<Utc>,

    /// Maintained by a trigger on every UPDATE.
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the client when creating a resume.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeCreateDto {
    pub pretender_name: String,
    pub rating: f64,
}

impl ResumeCreateDto {
    pub fn rating_in_range(&self) -> bool {
        (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}
