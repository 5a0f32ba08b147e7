//! In-memory collaborators for unit tests.

use crate::{
    models::{
        multipart::{CompletedPart, UploadedFileDto},
        resume::{Resume, ResumeCreateDto},
        uploaded_file::UploadedFile,
    },
    repositories::{RepositoryError, RepositoryResult, ResumeRepository, UploadedFileRepository},
    services::blob_store::{BlobError, BlobResult, BlobStore},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::{
    collections::{BTreeMap, HashMap},
    io,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

/// Every call the upload pipeline made, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobCall {
    Create { key: String },
    UploadPart { key: String, part_number: u32, len: usize },
    Complete { key: String, parts: Vec<u32> },
    Abort { key: String },
    Delete { key: String },
    Presign { key: String, filename: String },
}

#[derive(Default)]
struct MemoryState {
    calls: Vec<BlobCall>,
    uploads: HashMap<String, (String, BTreeMap<u32, Bytes>)>,
    objects: HashMap<String, Vec<u8>>,
}

pub struct MemoryBlobStore {
    bucket: String,
    state: Mutex<MemoryState>,
    fail_upload_part: AtomicBool,
    fail_complete: AtomicBool,
    fail_abort: AtomicBool,
    fail_delete: AtomicBool,
}

fn injected(what: &str) -> BlobError {
    BlobError::Io(io::Error::other(format!("injected {} failure", what)))
}

impl MemoryBlobStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            state: Mutex::new(MemoryState::default()),
            fail_upload_part: AtomicBool::new(false),
            fail_complete: AtomicBool::new(false),
            fail_abort: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    pub fn fail_upload_part(&self) {
        self.fail_upload_part.store(true, Ordering::SeqCst);
    }

    pub fn fail_complete(&self) {
        self.fail_complete.store(true, Ordering::SeqCst);
    }

    pub fn fail_abort(&self) {
        self.fail_abort.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<BlobCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().unwrap().objects.get(key).cloned()
    }

    pub fn put_object(&self, key: &str, data: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), data.to_vec());
    }

    pub fn open_uploads(&self) -> usize {
        self.state.lock().unwrap().uploads.len()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart_session(&self, key: &str) -> BlobResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BlobCall::Create { key: key.to_string() });
        let upload_id = Uuid::new_v4().to_string();
        state
            .uploads
            .insert(upload_id.clone(), (key.to_string(), BTreeMap::new()));
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BlobCall::UploadPart {
            key: key.to_string(),
            part_number,
            len: data.len(),
        });
        if self.fail_upload_part.load(Ordering::SeqCst) {
            return Err(injected("upload_part"));
        }
        let tag = format!("\"{:x}\"", md5::compute(&data));
        let (_, parts) = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| BlobError::UploadNotFound {
                upload_id: upload_id.to_string(),
                key: key.to_string(),
            })?;
        parts.insert(part_number, data);
        Ok(tag)
    }

    async fn complete_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BlobCall::Complete {
            key: key.to_string(),
            parts: parts.iter().map(|p| p.part_number).collect(),
        });
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(injected("complete"));
        }
        let (_, staged) = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| BlobError::UploadNotFound {
                upload_id: upload_id.to_string(),
                key: key.to_string(),
            })?;

        let mut object = Vec::new();
        for part in parts {
            let data = staged.get(&part.part_number).ok_or_else(|| {
                BlobError::InvalidParts(format!("part {} missing", part.part_number))
            })?;
            if format!("{:x}", md5::compute(data)) != part.etag {
                return Err(BlobError::InvalidParts("tag mismatch".into()));
            }
            object.extend_from_slice(data);
        }
        state.objects.insert(key.to_string(), object);
        Ok(())
    }

    async fn abort_multipart(&self, upload_id: &str, key: &str) -> BlobResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BlobCall::Abort { key: key.to_string() });
        if self.fail_abort.load(Ordering::SeqCst) {
            return Err(injected("abort"));
        }
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> BlobResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BlobCall::Delete { key: key.to_string() });
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn presign_download(
        &self,
        key: &str,
        filename: &str,
        expires_in: Duration,
    ) -> BlobResult<String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(BlobCall::Presign {
            key: key.to_string(),
            filename: filename.to_string(),
        });
        Ok(format!(
            "memory://{}/{}?filename={}&expires_in={}",
            self.bucket,
            key,
            filename,
            expires_in.as_secs()
        ))
    }
}

#[derive(Default)]
pub struct MemoryFileRepository {
    rows: Mutex<Vec<UploadedFile>>,
    fail_create: AtomicBool,
}

impl MemoryFileRepository {
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<UploadedFile> {
        self.rows.lock().unwrap().clone()
    }

    /// Remove a row behind the services' back.
    pub fn remove(&self, id: Uuid) {
        self.rows.lock().unwrap().retain(|f| f.id != id);
    }
}

#[async_trait]
impl UploadedFileRepository for MemoryFileRepository {
    async fn create(&self, dto: &UploadedFileDto) -> RepositoryResult<UploadedFile> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(RepositoryError::ConstraintViolation("injected".into()));
        }
        let file = UploadedFile {
            id: Uuid::new_v4(),
            bucket: dto.bucket.clone(),
            name: dto.filename.clone(),
            path: dto.full_path.clone(),
            content_type: dto.content_type.clone(),
            file_size: dto.size as i64,
            created_at: Utc::now(),
        };
        self.rows.lock().unwrap().push(file.clone());
        Ok(file)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<UploadedFile>> {
        Ok(self.rows.lock().unwrap().iter().find(|f| f.id == id).cloned())
    }

    async fn delete(&self, file: &UploadedFile) -> RepositoryResult<()> {
        self.remove(file.id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryResumeRepository {
    rows: Mutex<Vec<Resume>>,
}

impl MemoryResumeRepository {
    pub fn rows(&self) -> Vec<Resume> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResumeRepository for MemoryResumeRepository {
    async fn list_ordered(&self) -> RepositoryResult<Vec<Resume>> {
        let mut rows = self.rows();
        rows.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.rating.total_cmp(&b.rating))
        });
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> RepositoryResult<Option<Resume>> {
        Ok(self.rows.lock().unwrap().iter().find(|r| r.id == id).cloned())
    }

    async fn create(&self, dto: &ResumeCreateDto, file_id: Uuid) -> RepositoryResult<Resume> {
        if !dto.rating_in_range() {
            return Err(RepositoryError::ConstraintViolation(
                "rating_between_0_5_range".into(),
            ));
        }
        let now = Utc::now();
        let resume = Resume {
            id: Uuid::new_v4(),
            pretender_name: dto.pretender_name.clone(),
            rating: dto.rating,
            file_id,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().push(resume.clone());
        Ok(resume)
    }

    async fn delete(&self, resume: &Resume) -> RepositoryResult<()> {
        self.rows.lock().unwrap().retain(|r| r.id != resume.id);
        Ok(())
    }
}

/// Convenience bundle of fakes sharing one bucket.
pub struct Fakes {
    pub store: Arc<MemoryBlobStore>,
    pub files: Arc<MemoryFileRepository>,
    pub resumes: Arc<MemoryResumeRepository>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryBlobStore::new("resumes")),
            files: Arc::new(MemoryFileRepository::default()),
            resumes: Arc::new(MemoryResumeRepository::default()),
        }
    }
}
