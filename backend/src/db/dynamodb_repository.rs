use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::types::{AttributeValue, Select};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use super::models::ImageRecord;
use super::{RecordStore, RepositoryError};

type Item = HashMap<String, AttributeValue>;

// Attributes fetched for the history view; `segmentation_raw` is left out.
const HISTORY_PROJECTION: &str = "id, filename_original, filename_saved, #path, \
     annotated_filename, annotated_path, uploaded_at, tomato_count, tomatoes, display_name";

// Items are capped at 400 KB; leave room for the rest of the record.
const MAX_RAW_ATTRIBUTE_BYTES: usize = 300 * 1024;

#[derive(Clone)]
pub struct DynamoDbRepository {
    client: Client,
    images_table: String,
}

impl DynamoDbRepository {
    pub fn new(client: Client, images_table: String) -> Self {
        log::info!("Storing image records in DynamoDB table {}", images_table);
        Self {
            client,
            images_table,
        }
    }

    pub async fn create_image_record(&self, record: &ImageRecord) -> Result<String, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        let item = record_to_item(&id, record)?;

        match self
            .client
            .put_item()
            .table_name(&self.images_table)
            .set_item(Some(item))
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Stored image record {} ({})", id, record.display_name);
                Ok(id)
            }
            Err(e) => {
                log::error!("DynamoDB put_item failed for record {}: {:?}", id, e);
                Err(RepositoryError::DynamoDb(e.to_string()))
            }
        }
    }

    pub async fn count_image_records(&self) -> Result<usize, RepositoryError> {
        let mut total = 0usize;
        let mut start_key: Option<Item> = None;

        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.images_table)
                .select(Select::Count)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            total += result.count().max(0) as usize;
            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        Ok(total)
    }

    pub async fn get_recent_image_records(
        &self,
        limit: usize,
    ) -> Result<Vec<ImageRecord>, RepositoryError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        loop {
            let result = self
                .client
                .scan()
                .table_name(&self.images_table)
                .projection_expression(HISTORY_PROJECTION)
                .expression_attribute_names("#path", "path")
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(|e| RepositoryError::DynamoDb(e.to_string()))?;

            if let Some(items) = result.items {
                for item in items {
                    records.push(parse_record_from_item(item)?);
                }
            }
            match result.last_evaluated_key {
                Some(key) if !key.is_empty() => start_key = Some(key),
                _ => break,
            }
        }

        records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        records.truncate(limit);
        log::debug!("Loaded {} recent image records", records.len());
        Ok(records)
    }
}

#[async_trait]
impl RecordStore for DynamoDbRepository {
    async fn insert(&self, record: &ImageRecord) -> Result<String, RepositoryError> {
        self.create_image_record(record).await
    }

    async fn count(&self) -> Result<usize, RepositoryError> {
        self.count_image_records().await
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ImageRecord>, RepositoryError> {
        self.get_recent_image_records(limit).await
    }
}

fn record_to_item(id: &str, record: &ImageRecord) -> Result<Item, RepositoryError> {
    let mut item = HashMap::new();
    item.insert("id".to_string(), AttributeValue::S(id.to_string()));
    item.insert(
        "filename_original".to_string(),
        AttributeValue::S(record.filename_original.clone()),
    );
    item.insert(
        "filename_saved".to_string(),
        AttributeValue::S(record.filename_saved.clone()),
    );
    item.insert("path".to_string(), AttributeValue::S(record.path.clone()));
    item.insert(
        "annotated_filename".to_string(),
        AttributeValue::S(record.annotated_filename.clone()),
    );
    item.insert(
        "annotated_path".to_string(),
        AttributeValue::S(record.annotated_path.clone()),
    );
    item.insert(
        "uploaded_at".to_string(),
        AttributeValue::S(record.uploaded_at.to_rfc3339()),
    );
    item.insert(
        "tomato_count".to_string(),
        AttributeValue::N(record.tomato_count.to_string()),
    );
    item.insert(
        "tomatoes".to_string(),
        AttributeValue::S(serde_json::to_string(&record.tomatoes)?),
    );
    if let Some(raw) = &record.segmentation_raw {
        let raw = serde_json::to_string(raw)?;
        if raw.len() <= MAX_RAW_ATTRIBUTE_BYTES {
            item.insert("segmentation_raw".to_string(), AttributeValue::S(raw));
        } else {
            log::warn!(
                "Segmentation response for {} is {} bytes, not storing it with the record",
                record.filename_saved,
                raw.len()
            );
        }
    }
    item.insert(
        "display_name".to_string(),
        AttributeValue::S(record.display_name.clone()),
    );
    Ok(item)
}

fn string_attr(item: &Item, name: &str) -> Result<String, RepositoryError> {
    item.get(name)
        .and_then(|av| av.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidData(format!("Missing {} attribute", name)))
}

fn parse_record_from_item(item: Item) -> Result<ImageRecord, RepositoryError> {
    let uploaded_at = string_attr(&item, "uploaded_at")?;
    let uploaded_at = DateTime::parse_from_rfc3339(&uploaded_at)
        .map_err(|e| RepositoryError::InvalidData(format!("uploaded_at: {}", e)))?
        .with_timezone(&Utc);

    let tomato_count = item
        .get("tomato_count")
        .and_then(|av| av.as_n().ok())
        .ok_or_else(|| RepositoryError::InvalidData("Missing tomato_count attribute".to_string()))?
        .parse::<usize>()
        .map_err(|e| RepositoryError::InvalidData(format!("tomato_count: {}", e)))?;

    let tomatoes = serde_json::from_str(&string_attr(&item, "tomatoes")?)?;

    let segmentation_raw = match item.get("segmentation_raw").and_then(|av| av.as_s().ok()) {
        Some(raw) => Some(serde_json::from_str(raw)?),
        None => None,
    };

    Ok(ImageRecord {
        id: Some(string_attr(&item, "id")?),
        filename_original: string_attr(&item, "filename_original")?,
        filename_saved: string_attr(&item, "filename_saved")?,
        path: string_attr(&item, "path")?,
        annotated_filename: string_attr(&item, "annotated_filename")?,
        annotated_path: string_attr(&item, "annotated_path")?,
        uploaded_at,
        tomato_count,
        tomatoes,
        segmentation_raw,
        display_name: string_attr(&item, "display_name")?,
    })
}
