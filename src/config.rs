use crate::services::blob_store::MAX_PART_NUMBER;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables (optionally from `.env`) and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub allow_origins: Vec<String>,
    pub storage: StorageSettings,
    pub upload: UploadSettings,
}

/// Where and how blobs are stored.
#[derive(Clone)]
pub struct StorageSettings {
    pub storage_dir: String,
    pub bucket: String,
    /// Base URL presigned download links point at.
    pub public_url: String,
    pub presign_secret: String,
    /// Staged uploads older than this are removed at startup.
    pub stale_upload_age: Duration,
}

impl std::fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSettings")
            .field("storage_dir", &self.storage_dir)
            .field("bucket", &self.bucket)
            .field("public_url", &self.public_url)
            .field("presign_secret", &"<redacted>")
            .field("stale_upload_age", &self.stale_upload_age)
            .finish()
    }
}

/// Upload policy and key layout.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub root_path: String,
    pub resume_attachments_folder: String,
    /// Largest accepted file, in bytes.
    pub allowed_uploaded_file_size: u64,
    /// Bytes read from the input per uploaded part.
    pub read_chunk_size: usize,
    pub presign_expiry: Duration,
}

impl UploadSettings {
    /// Reject settings under which a valid upload could not be sent.
    pub fn check(&self) -> Result<()> {
        if self.read_chunk_size == 0 {
            bail!("UPLOAD_READ_CHUNK_SIZE must be positive");
        }
        let parts_needed = self
            .allowed_uploaded_file_size
            .div_ceil(self.read_chunk_size as u64);
        if parts_needed > u64::from(MAX_PART_NUMBER) {
            bail!(
                "UPLOAD_ALLOWED_UPLOADED_FILE_SIZE ({}) needs {} parts of UPLOAD_READ_CHUNK_SIZE ({}); at most {} parts are allowed",
                self.allowed_uploaded_file_size,
                parts_needed,
                self.read_chunk_size,
                MAX_PART_NUMBER
            );
        }
        Ok(())
    }
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            root_path: "uploads".into(),
            resume_attachments_folder: "resume".into(),
            allowed_uploaded_file_size: 100 * 1024 * 1024,
            read_chunk_size: 5 * 1024 * 1024,
            presign_expiry: Duration::from_secs(3600),
        }
    }
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Resume storage API")]
pub struct Args {
    /// Host to bind to (overrides APP_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides APP_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blobs are stored (overrides STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name`, falling back to `default` when unset.
fn env_or(name: &str, default: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(env::VarError::NotPresent) => Ok(default.to_string()),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

/// Read and parse `name`, falling back to `default` when unset.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        dotenvy::dotenv().ok();
        let args = Args::parse();
        let cfg = Self::from_env(args.host, args.port, args.storage_dir, args.database_url)?;
        Ok((cfg, args.migrate))
    }

    fn from_env(
        host: Option<String>,
        port: Option<u16>,
        storage_dir: Option<String>,
        database_url: Option<String>,
    ) -> Result<Self> {
        let defaults = UploadSettings::default();
        let upload = UploadSettings {
            root_path: env_or("UPLOAD_ROOT_PATH", &defaults.root_path)?,
            resume_attachments_folder: env_or(
                "UPLOAD_RESUME_ATTACHMENTS_FOLDER",
                &defaults.resume_attachments_folder,
            )?,
            allowed_uploaded_file_size: env_parse(
                "UPLOAD_ALLOWED_UPLOADED_FILE_SIZE",
                defaults.allowed_uploaded_file_size,
            )?,
            read_chunk_size: env_parse("UPLOAD_READ_CHUNK_SIZE", defaults.read_chunk_size)?,
            presign_expiry: Duration::from_secs(env_parse(
                "STORAGE_PRESIGN_EXPIRY_SECS",
                defaults.presign_expiry.as_secs(),
            )?),
        };
        upload.check()?;

        let port = match port {
            Some(port) => port,
            None => env_parse("APP_PORT", 8000)?,
        };

        let presign_secret = env::var("STORAGE_PRESIGN_SECRET")
            .context("Required environment variable 'STORAGE_PRESIGN_SECRET' is not set")?;
        let storage = StorageSettings {
            storage_dir: match storage_dir {
                Some(dir) => dir,
                None => env_or("STORAGE_DIR", "./data/objects")?,
            },
            bucket: env_or("STORAGE_BUCKET", "resumes")?,
            public_url: env_or("STORAGE_PUBLIC_URL", &format!("http://localhost:{}", port))?,
            presign_secret,
            stale_upload_age: Duration::from_secs(env_parse("STORAGE_STALE_UPLOAD_SECS", 86_400)?),
        };

        let allow_origins = env_or("APP_ALLOW_ORIGINS", "")?
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            host: match host {
                Some(host) => host,
                None => env_or("APP_HOST", "0.0.0.0")?,
            },
            port,
            database_url: match database_url {
                Some(url) => url,
                None => env_or("DATABASE_URL", "sqlite://./data/meta/resume_store.db")?,
            },
            allow_origins,
            storage,
            upload,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
