use chrono::Utc;
use std::sync::Arc;
use tomato_shared::{AnalyzeResponse, ClassifiedTomato, ImageKind};

use crate::classifier::{Classifier, ClassifierError};
use crate::db::models::ImageRecord;
use crate::db::{RecordStore, RepositoryError};
use crate::imaging::annotate::Annotator;
use crate::imaging::codec::{self, CodecError};
use crate::imaging::crop::crop_detection;
use crate::segmentation::{SegmentationError, Segmenter};
use crate::storage::{ImageStore, StorageError};

pub const MAX_HISTORY_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidImage(CodecError),
    #[error(transparent)]
    Encoding(#[from] CodecError),
    #[error(transparent)]
    Segmentation(#[from] SegmentationError),
    #[error(transparent)]
    Classification(#[from] ClassifierError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Runs one analysis request end to end. Collaborators are built once at
/// startup and shared between requests.
#[derive(Clone)]
pub struct AnalysisPipeline {
    segmenter: Arc<dyn Segmenter>,
    classifier: Arc<dyn Classifier>,
    images: Arc<dyn ImageStore>,
    records: Arc<dyn RecordStore>,
    annotator: Arc<Annotator>,
    history_limit: usize,
}

impl AnalysisPipeline {
    pub fn new(
        segmenter: Arc<dyn Segmenter>,
        classifier: Arc<dyn Classifier>,
        images: Arc<dyn ImageStore>,
        records: Arc<dyn RecordStore>,
        annotator: Arc<Annotator>,
        history_limit: usize,
    ) -> Self {
        Self {
            segmenter,
            classifier,
            images,
            records,
            annotator,
            history_limit,
        }
    }

    pub async fn analyze(&self, upload: Upload) -> Result<AnalyzeResponse, PipelineError> {
        let image = codec::decode_rgb(&upload.bytes).map_err(PipelineError::InvalidImage)?;
        log::info!(
            "Analyzing {} ({}x{})",
            upload.filename,
            image.width(),
            image.height()
        );

        let filename_saved = codec::unique_filename(&upload.filename);
        let original_bytes = codec::encode(&image, codec::format_for(&filename_saved))?;
        let path = self
            .images
            .put(
                ImageKind::Original,
                &filename_saved,
                original_bytes.clone(),
                codec::content_type_for(&filename_saved),
            )
            .await?;
        log::info!("Saved original as {}", path);

        let segmentation = self
            .segmenter
            .segment(&original_bytes, &filename_saved)
            .await?;

        let mut tomatoes = Vec::with_capacity(segmentation.detections.len());
        for (i, detection) in segmentation.detections.iter().enumerate() {
            let crop = crop_detection(&image, &detection.bbox);
            let classification = self.classifier.classify(&crop).await?;
            log::info!(
                "Tomato #{}: {} ({:.2})",
                i + 1,
                classification.class,
                classification.probability
            );
            tomatoes.push(ClassifiedTomato {
                class: classification.class,
                prob: classification.probability,
                detection_confidence: detection.confidence,
                bbox: detection.bbox,
                detection_id: detection.detection_id.clone(),
            });
        }

        let annotated = self
            .annotator
            .annotate(&image, &tomatoes, &segmentation.detections);
        let annotated_filename = codec::annotated_filename(&filename_saved);
        let annotated_bytes = codec::encode(&annotated, codec::format_for(&annotated_filename))?;
        let annotated_path = self
            .images
            .put(
                ImageKind::Annotated,
                &annotated_filename,
                annotated_bytes,
                codec::content_type_for(&annotated_filename),
            )
            .await?;
        let annotated_image = codec::to_data_uri(&annotated)?;

        let existing = self.records.count().await?;
        let record = ImageRecord {
            id: None,
            filename_original: upload.filename,
            filename_saved: filename_saved.clone(),
            path: path.clone(),
            annotated_filename: annotated_filename.clone(),
            annotated_path: annotated_path.clone(),
            uploaded_at: Utc::now(),
            tomato_count: tomatoes.len(),
            tomatoes: tomatoes.clone(),
            segmentation_raw: Some(segmentation.raw),
            display_name: ImageRecord::display_name_for(existing),
        };
        let id = self.records.insert(&record).await?;
        log::info!("Analysis {} complete: {} tomatoes", id, tomatoes.len());

        Ok(AnalyzeResponse {
            id,
            filename_saved,
            path,
            annotated_filename,
            annotated_path,
            tomato_count: tomatoes.len(),
            tomatoes,
            annotated_image,
        })
    }

    pub async fn history(&self, limit: Option<usize>) -> Result<Vec<ImageRecord>, PipelineError> {
        let limit = limit
            .unwrap_or(self.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.records.list_recent(limit).await?)
    }

    pub async fn load_image(&self, kind: ImageKind, filename: &str) -> Result<Vec<u8>, PipelineError> {
        Ok(self.images.get(kind, filename).await?)
    }
}
