pub mod blob_store;
pub mod file_service;
pub mod file_validator;
pub mod local_blob_store;
pub mod multipart_upload;
pub mod resume_service;
