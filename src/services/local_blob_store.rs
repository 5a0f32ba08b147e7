//! src/services/local_blob_store.rs
//!
//! A [`BlobStore`] that keeps objects on local disk.
//!
//! Layout beneath `base_path`:
//! - `.multipart/{upload_id}/key` binds an upload to its destination key
//! - `.multipart/{upload_id}/{part:05}.part` holds one staged part
//! - `{bucket}/{shard}/{shard}/{key}` holds a completed object
//!
//! Part tags are quoted MD5 hex digests, the way S3-compatible stores return
//! ETags. Completion re-hashes every staged part and rejects mismatches.

use crate::{
    models::multipart::CompletedPart,
    services::blob_store::{BlobError, BlobResult, BlobStore, MAX_PART_NUMBER},
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use md5::Context;
use sha2::Sha256;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, info};
use uuid::Uuid;

const MAX_OBJECT_KEY_LEN: usize = 1024;
const MULTIPART_DIR: &str = ".multipart";
const UPLOAD_KEY_FILE: &str = "key";
const COPY_BUFFER_LEN: usize = 64 * 1024;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    /// Root directory for staged parts and completed objects.
    base_path: PathBuf,

    bucket: String,

    /// Externally reachable base URL used when presigning downloads.
    public_url: String,

    presign_secret: String,
}

impl LocalBlobStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        bucket: impl Into<String>,
        public_url: impl Into<String>,
        presign_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_path: base_path.into(),
            bucket: bucket.into(),
            public_url: public_url.into().trim_end_matches('/').to_string(),
            presign_secret: presign_secret.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Basic key validation to avoid trivial path traversal vectors.
    ///
    /// Rejects empty or oversized keys, keys that begin with `/`, contain
    /// `..`, backslashes or control characters.
    fn ensure_key_safe(key: &str) -> BlobResult<()> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.ends_with('/')
            || key.contains("..")
            || key.bytes().any(|b| b.is_ascii_control() || b == b'\\');
        if invalid {
            return Err(BlobError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    fn bucket_root(&self) -> PathBuf {
        self.base_path.join(&self.bucket)
    }

    /// Two-level shard identifiers: the first two bytes of MD5(bucket/key) as hex.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/bucket/{shard}/{shard}/{key}`. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(&self.bucket, key);
        let mut path = self.bucket_root();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn upload_dir(&self, upload_id: &str) -> PathBuf {
        self.base_path.join(MULTIPART_DIR).join(upload_id)
    }

    fn part_path(upload_dir: &Path, part_number: u32) -> PathBuf {
        upload_dir.join(format!("{:05}.part", part_number))
    }

    /// Resolve the staging directory of an open upload bound to `key`.
    async fn open_upload(&self, upload_id: &str, key: &str) -> BlobResult<PathBuf> {
        let not_found = || BlobError::UploadNotFound {
            upload_id: upload_id.to_string(),
            key: key.to_string(),
        };
        if Uuid::parse_str(upload_id).is_err() {
            return Err(not_found());
        }

        let dir = self.upload_dir(upload_id);
        match fs::read_to_string(dir.join(UPLOAD_KEY_FILE)).await {
            Ok(bound_key) if bound_key == key => Ok(dir),
            Ok(_) => Err(not_found()),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    /// Open a completed object for streaming, returning its length in bytes.
    pub async fn open_object(&self, key: &str) -> BlobResult<(File, u64)> {
        Self::ensure_key_safe(key)?;
        let file = File::open(self.object_path(key))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => BlobError::ObjectNotFound(key.to_string()),
                _ => BlobError::Io(err),
            })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    /// HMAC-SHA256 over bucket, key, filename and expiry. Each field is
    /// length-prefixed so no two field tuples share an input.
    fn download_mac(&self, key: &str, filename: &str, expires: i64) -> BlobResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.presign_secret.as_bytes())
            .map_err(|_| BlobError::InvalidSignature)?;
        for field in [self.bucket.as_bytes(), key.as_bytes(), filename.as_bytes()] {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field);
        }
        mac.update(&expires.to_be_bytes());
        Ok(mac)
    }

    fn sign(&self, key: &str, filename: &str, expires: i64) -> BlobResult<String> {
        let mac = self.download_mac(key, filename, expires)?;
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Check a presigned download request produced by [`BlobStore::presign_download`].
    ///
    /// The signature is compared in constant time.
    pub fn verify_download(
        &self,
        bucket: &str,
        key: &str,
        filename: &str,
        expires: i64,
        signature: &str,
    ) -> BlobResult<()> {
        if bucket != self.bucket || expires < Utc::now().timestamp() {
            return Err(BlobError::InvalidSignature);
        }
        let signature = general_purpose::URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| BlobError::InvalidSignature)?;
        self.download_mac(key, filename, expires)?
            .verify_slice(&signature)
            .map_err(|_| BlobError::InvalidSignature)
    }

    /// Concatenate staged parts into `tmp_path`, verifying each part's tag.
    async fn assemble(
        &self,
        upload_dir: &Path,
        tmp_path: &Path,
        parts: &[CompletedPart],
    ) -> BlobResult<()> {
        let mut out = File::create(tmp_path).await?;
        let mut buf = vec![0u8; COPY_BUFFER_LEN];

        for part in parts {
            let part_path = Self::part_path(upload_dir, part.part_number);
            let mut input = File::open(&part_path).await.map_err(|err| match err.kind() {
                ErrorKind::NotFound => {
                    BlobError::InvalidParts(format!("part {} was never uploaded", part.part_number))
                }
                _ => BlobError::Io(err),
            })?;

            let mut digest = Context::new();
            loop {
                let read = input.read(&mut buf).await?;
                if read == 0 {
                    break;
                }
                digest.consume(&buf[..read]);
                out.write_all(&buf[..read]).await?;
            }

            let actual = format!("{:x}", digest.compute());
            if actual != part.etag.trim_matches('"') {
                return Err(BlobError::InvalidParts(format!(
                    "tag mismatch for part {}",
                    part.part_number
                )));
            }
        }

        out.flush().await?;
        out.sync_all().await?;
        Ok(())
    }

    /// Remove staging directories of uploads untouched for at least `max_age`.
    ///
    /// Uploads dropped mid-stream are never aborted, so their parts stay
    /// staged until a sweep. Returns how many uploads were removed.
    pub async fn sweep_stale_uploads(&self, max_age: Duration) -> BlobResult<usize> {
        let root = self.base_path.join(MULTIPART_DIR);
        let mut entries = match fs::read_dir(&root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let now = SystemTime::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if !metadata.is_dir() {
                continue;
            }
            let age = now
                .duration_since(metadata.modified()?)
                .unwrap_or_default();
            if age < max_age {
                continue;
            }
            match fs::remove_dir_all(entry.path()).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        if removed > 0 {
            info!("removed {} stale multipart uploads", removed);
        }
        Ok(removed)
    }

    /// Recursively remove empty directories up to (not including) `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

fn ensure_parts_ordered(parts: &[CompletedPart]) -> BlobResult<()> {
    if parts.is_empty() {
        return Err(BlobError::InvalidParts("no parts supplied".into()));
    }
    let mut previous = 0;
    for part in parts {
        if part.part_number <= previous {
            return Err(BlobError::InvalidParts(format!(
                "part {} is out of order",
                part.part_number
            )));
        }
        previous = part.part_number;
    }
    Ok(())
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn create_multipart_session(&self, key: &str) -> BlobResult<String> {
        Self::ensure_key_safe(key)?;
        let upload_id = Uuid::new_v4().to_string();
        let dir = self.upload_dir(&upload_id);
        fs::create_dir_all(&dir).await?;
        fs::write(dir.join(UPLOAD_KEY_FILE), key).await?;
        debug!("opened multipart upload {} for {}", upload_id, key);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        upload_id: &str,
        key: &str,
        part_number: u32,
        data: Bytes,
    ) -> BlobResult<String> {
        if part_number == 0 || part_number > MAX_PART_NUMBER {
            return Err(BlobError::InvalidParts(format!(
                "part number {} outside 1..={}",
                part_number, MAX_PART_NUMBER
            )));
        }
        let dir = self.open_upload(upload_id, key).await?;

        let tmp_path = dir.join(format!(".tmp-{}", Uuid::new_v4()));
        let written: io::Result<()> = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, Self::part_path(&dir, part_number)).await
        }
        .await;
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(BlobError::Io(err));
        }

        Ok(format!("\"{:x}\"", md5::compute(&data)))
    }

    async fn complete_multipart(
        &self,
        upload_id: &str,
        key: &str,
        parts: &[CompletedPart],
    ) -> BlobResult<()> {
        ensure_parts_ordered(parts)?;
        let upload_dir = self.open_upload(upload_id, key).await?;

        let file_path = self.object_path(key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            BlobError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        if let Err(err) = self.assemble(&upload_dir, &tmp_path, parts).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(err);
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(BlobError::Io(err));
            }
        }

        fs::remove_dir_all(&upload_dir).await?;
        debug!("completed multipart upload {} into {}", upload_id, key);
        Ok(())
    }

    async fn abort_multipart(&self, upload_id: &str, key: &str) -> BlobResult<()> {
        let upload_dir = self.open_upload(upload_id, key).await?;
        fs::remove_dir_all(&upload_dir).await?;
        debug!("aborted multipart upload {} for {}", upload_id, key);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> BlobResult<()> {
        Self::ensure_key_safe(key)?;
        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(BlobError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root();
            self.prune_empty_dirs(parent, &bucket_root).await;
        }
        Ok(())
    }

    async fn presign_download(
        &self,
        key: &str,
        filename: &str,
        expires_in: Duration,
    ) -> BlobResult<String> {
        Self::ensure_key_safe(key)?;
        let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
        let signature = self.sign(key, filename, expires)?;
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/blobs/{}/{}?filename={}&expires={}&signature={}",
            self.public_url,
            urlencoding::encode(&self.bucket),
            encoded_key,
            urlencoding::encode(filename),
            expires,
            signature
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> LocalBlobStore {
        LocalBlobStore::new(dir.path(), "resumes", "http://localhost:8000/", "secret")
    }

    async fn read_object(store: &LocalBlobStore, key: &str) -> Vec<u8> {
        let (mut file, _) = store.open_object(key).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        buf
    }

    fn part(part_number: u32, tag: &str) -> CompletedPart {
        CompletedPart {
            part_number,
            etag: tag.trim_matches('"').to_string(),
        }
    }

    #[tokio::test]
    async fn multipart_upload_assembles_parts_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let key = "uploads/resume/abc/file.pdf";

        let upload_id = store.create_multipart_session(key).await.unwrap();
        let first = store
            .upload_part(&upload_id, key, 1, Bytes::from_static(b"hello "))
            .await
            .unwrap();
        let second = store
            .upload_part(&upload_id, key, 2, Bytes::from_static(b"world"))
            .await
            .unwrap();
        assert!(first.starts_with('"') && first.ends_with('"'));

        store
            .complete_multipart(&upload_id, key, &[part(1, &first), part(2, &second)])
            .await
            .unwrap();

        assert_eq!(read_object(&store, key).await, b"hello world");
        assert!(!store.upload_dir(&upload_id).exists());
    }

    #[tokio::test]
    async fn complete_rejects_tag_mismatch_and_unordered_parts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let key = "a/b.txt";

        let upload_id = store.create_multipart_session(key).await.unwrap();
        let tag = store
            .upload_part(&upload_id, key, 1, Bytes::from_static(b"data"))
            .await
            .unwrap();

        let err = store
            .complete_multipart(&upload_id, key, &[part(1, "deadbeef")])
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::InvalidParts(_)));

        let err = store
            .complete_multipart(&upload_id, key, &[part(1, &tag), part(1, &tag)])
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::InvalidParts(_)));

        assert!(matches!(
            store.open_object(key).await.unwrap_err(),
            BlobError::ObjectNotFound(_)
        ));
    }

    #[tokio::test]
    async fn abort_discards_staged_parts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let key = "a/b.txt";

        let upload_id = store.create_multipart_session(key).await.unwrap();
        store
            .upload_part(&upload_id, key, 1, Bytes::from_static(b"data"))
            .await
            .unwrap();
        store.abort_multipart(&upload_id, key).await.unwrap();

        assert!(!store.upload_dir(&upload_id).exists());
        let err = store
            .upload_part(&upload_id, key, 2, Bytes::from_static(b"more"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::UploadNotFound { .. }));
    }

    #[tokio::test]
    async fn upload_is_bound_to_its_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let upload_id = store.create_multipart_session("a/one.txt").await.unwrap();
        let err = store
            .upload_part(&upload_id, "a/two.txt", 1, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::UploadNotFound { .. }));
    }

    #[tokio::test]
    async fn delete_missing_object_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.delete_object("never/written.pdf").await.unwrap();
    }

    #[tokio::test]
    async fn delete_removes_object_and_prunes_shards() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let key = "x/y.bin";

        let upload_id = store.create_multipart_session(key).await.unwrap();
        let tag = store
            .upload_part(&upload_id, key, 1, Bytes::from_static(b"payload"))
            .await
            .unwrap();
        store
            .complete_multipart(&upload_id, key, &[part(1, &tag)])
            .await
            .unwrap();

        store.delete_object(key).await.unwrap();
        assert!(!store.object_path(key).exists());
        let (shard_a, _) = LocalBlobStore::object_shards("resumes", key);
        assert!(!store.bucket_root().join(shard_a).exists());
    }

    #[tokio::test]
    async fn traversal_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        for key in ["", "/abs", "a/../b", "a\\b", "trailing/"] {
            let err = store.create_multipart_session(key).await.unwrap_err();
            assert!(matches!(err, BlobError::InvalidKey(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn presigned_url_verifies_and_rejects_tampering() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let url = store
            .presign_download("a/b c.pdf", "my cv.pdf", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:8000/blobs/resumes/a/b%20c.pdf?"));
        assert!(url.contains("filename=my%20cv.pdf"));

        let query = url.split_once('?').unwrap().1;
        let params: std::collections::HashMap<_, _> = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        let expires: i64 = params["expires"].parse().unwrap();
        let signature = params["signature"];

        store
            .verify_download("resumes", "a/b c.pdf", "my cv.pdf", expires, signature)
            .unwrap();
        assert!(
            store
                .verify_download("resumes", "a/other.pdf", "my cv.pdf", expires, signature)
                .is_err()
        );
        assert!(
            store
                .verify_download("resumes", "a/b c.pdf", "my cv.pdf", expires + 1, signature)
                .is_err()
        );
        let expired = Utc::now().timestamp() - 1;
        let stale = store.sign("a/b c.pdf", "my cv.pdf", expired).unwrap();
        assert!(
            store
                .verify_download("resumes", "a/b c.pdf", "my cv.pdf", expired, &stale)
                .is_err()
        );
    }

    #[test]
    fn signature_separates_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_ne!(
            store.sign("a/b", "x\ny", 1000).unwrap(),
            store.sign("a/b\nx", "y", 1000).unwrap()
        );
        assert_ne!(
            store.sign("a/bx", "y", 1000).unwrap(),
            store.sign("a/b", "xy", 1000).unwrap()
        );

        let other = LocalBlobStore::new(dir.path(), "resumes", "http://localhost:8000", "other");
        assert_ne!(
            store.sign("a/b", "x", 1000).unwrap(),
            other.sign("a/b", "x", 1000).unwrap()
        );
    }

    #[test]
    fn malformed_signature_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let expires = Utc::now().timestamp() + 60;
        let signature = store.sign("a/b.pdf", "b.pdf", expires).unwrap();

        for bad in ["", "not base64!", &signature[..signature.len() - 2]] {
            let err = store
                .verify_download("resumes", "a/b.pdf", "b.pdf", expires, bad)
                .unwrap_err();
            assert!(matches!(err, BlobError::InvalidSignature), "signature {bad:?}");
        }
        assert!(
            store
                .verify_download("other", "a/b.pdf", "b.pdf", expires, &signature)
                .is_err()
        );
    }

    #[tokio::test]
    async fn sweep_removes_only_stale_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert_eq!(store.sweep_stale_uploads(Duration::ZERO).await.unwrap(), 0);

        let key = "uploads/resume/abc/file.pdf";
        let upload_id = store.create_multipart_session(key).await.unwrap();
        store
            .upload_part(&upload_id, key, 1, Bytes::from_static(b"abc"))
            .await
            .unwrap();

        let fresh = store
            .sweep_stale_uploads(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(fresh, 0);
        assert!(store.upload_dir(&upload_id).exists());

        assert_eq!(store.sweep_stale_uploads(Duration::ZERO).await.unwrap(), 1);
        assert!(!store.upload_dir(&upload_id).exists());
        let err = store
            .upload_part(&upload_id, key, 2, Bytes::from_static(b"de"))
            .await
            .unwrap_err();
        assert!(matches!(err, BlobError::UploadNotFound { .. }));
    }
}
