pub mod dynamodb_repository;
pub mod memory;
pub mod models;

use async_trait::async_trait;
use models::ImageRecord;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid data format: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Stores the record and returns the id assigned to it.
    async fn insert(&self, record: &ImageRecord) -> Result<String, RepositoryError>;

    async fn count(&self) -> Result<usize, RepositoryError>;

    /// Newest first, at most `limit` entries, raw segmentation stripped.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ImageRecord>, RepositoryError>;
}
