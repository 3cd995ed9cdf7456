use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use url::Url;

use super::{SegmentationError, SegmentationResult, Segmenter};
use crate::config::SegmentationConfig;
use crate::imaging::codec::content_type_for;

/// Client for a hosted instance-segmentation model that takes the image as
/// a multipart `file` field and the key as an `api_key` query parameter.
#[derive(Clone)]
pub struct RoboflowSegmenter {
    client: reqwest::Client,
    detect_url: Url,
    api_key: String,
}

impl RoboflowSegmenter {
    pub fn new(config: &SegmentationConfig) -> Result<Self, SegmentationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let detect_url = detect_url(&config.endpoint, &config.model_id);
        log::info!("Using segmentation endpoint: {}", detect_url);
        if config.api_key.is_empty() {
            log::warn!("Segmentation API key is empty; set ROBOFLOW_API_KEY");
        }
        Ok(Self {
            client,
            detect_url,
            api_key: config.api_key.clone(),
        })
    }
}

fn detect_url(endpoint: &Url, model_id: &str) -> Url {
    let mut url = endpoint.clone();
    let path = format!(
        "{}/{}",
        endpoint.path().trim_end_matches('/'),
        model_id.trim_matches('/')
    );
    url.set_path(&path);
    url
}

#[async_trait]
impl Segmenter for RoboflowSegmenter {
    async fn segment(
        &self,
        image: &[u8],
        filename: &str,
    ) -> Result<SegmentationResult, SegmentationError> {
        log::info!(
            "Sending {} ({} bytes) to segmentation service",
            filename,
            image.len()
        );

        let part = Part::bytes(image.to_vec())
            .file_name(filename.to_string())
            .mime_str(content_type_for(filename))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(self.detect_url.clone())
            .query(&[("api_key", self.api_key.as_str())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        log::info!("Segmentation service responded with {}", status);
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SegmentationError::Status { status, body });
        }

        let raw: serde_json::Value = response.json().await?;
        let result = SegmentationResult::from_raw(raw)?;
        log::info!("Segmentation returned {} predictions", result.detections.len());
        Ok(result)
    }
}
