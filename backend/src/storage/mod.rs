pub mod local;
pub mod s3_service;

use async_trait::async_trait;
use tomato_shared::ImageKind;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("Image not found: {0}")]
    NotFound(String),
    #[error("File too large")]
    FileTooLarge,
}

pub const MAX_IMAGE_SIZE: usize = 50 * 1024 * 1024;

pub fn validate_image_size(image_data: &[u8]) -> Result<(), StorageError> {
    if image_data.len() > MAX_IMAGE_SIZE {
        return Err(StorageError::FileTooLarge);
    }
    Ok(())
}

/// Rejects anything that is not a single plain path component.
pub fn validate_filename(filename: &str) -> Result<(), StorageError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename.contains("..")
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(())
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Writes the image and returns the location recorded for it.
    async fn put(
        &self,
        kind: ImageKind,
        filename: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn get(&self, kind: ImageKind, filename: &str) -> Result<Vec<u8>, StorageError>;
}
