use async_trait::async_trait;
use image::RgbImage;
use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use super::{Classification, Classifier, ClassifierError, pick_class, preprocess};
use crate::config::ClassifierConfig;

/// Classifier backed by a model server speaking the TensorFlow Serving
/// REST `:predict` contract.
#[derive(Clone)]
pub struct RemoteClassifier {
    client: reqwest::Client,
    endpoint: Url,
    image_size: [u32; 2],
    class_names: Vec<String>,
}

#[derive(Serialize)]
struct PredictRequest {
    instances: Vec<Vec<Vec<Vec<f32>>>>,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Vec<Vec<f32>>,
}

impl RemoteClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        log::info!("Using classifier endpoint: {}", config.endpoint);
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            image_size: config.image_size,
            class_names: config.class_names.clone(),
        })
    }
}

fn predict_request(input: &Array4<f32>) -> PredictRequest {
    let instances = input
        .axis_iter(Axis(0))
        .map(|image| {
            image
                .axis_iter(Axis(0))
                .map(|row| row.axis_iter(Axis(0)).map(|px| px.to_vec()).collect())
                .collect()
        })
        .collect();
    PredictRequest { instances }
}

fn first_scores(body: &str) -> Result<Vec<f32>, ClassifierError> {
    let response: PredictResponse =
        serde_json::from_str(body).map_err(|e| ClassifierError::Malformed(e.to_string()))?;
    response
        .predictions
        .into_iter()
        .next()
        .ok_or(ClassifierError::EmptyOutput)
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifierError> {
        let input = preprocess(image, self.image_size);
        let request = predict_request(&input);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ClassifierError::Status { status, body });
        }

        let scores = first_scores(&body)?;
        log::debug!("Classifier scores: {:?}", scores);
        pick_class(&scores, &self.class_names)
    }
}
