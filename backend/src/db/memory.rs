use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::ImageRecord;
use super::{RecordStore, RepositoryError};

/// Process-local record store. Records are lost on restart.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<ImageRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: &ImageRecord) -> Result<String, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        self.records.write().await.push(stored);
        Ok(id)
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        Ok(self.records.read().await.len())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ImageRecord>, RepositoryError> {
        let records = self.records.read().await;
        // equal timestamps: later inserts first
        let mut recent: Vec<ImageRecord> = records.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        recent.truncate(limit);
        Ok(recent.into_iter().map(ImageRecord::without_raw).collect())
    }
}
