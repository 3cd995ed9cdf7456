use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tomato_shared::ClassifiedTomato;

/// One analyzed upload, written once and never changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub filename_original: String,
    pub filename_saved: String,
    pub path: String,
    pub annotated_filename: String,
    pub annotated_path: String,
    pub uploaded_at: DateTime<Utc>,
    pub tomato_count: usize,
    pub tomatoes: Vec<ClassifiedTomato>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segmentation_raw: Option<serde_json::Value>,
    pub display_name: String,
}

impl ImageRecord {
    pub fn display_name_for(existing: usize) -> String {
        format!("Record {}", existing + 1)
    }

    /// The history view leaves out the raw segmentation payload.
    pub fn without_raw(mut self) -> Self {
        self.segmentation_raw = None;
        self
    }
}
