pub mod roboflow;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tomato_shared::BoundingBox;

#[derive(Debug, thiserror::Error)]
pub enum SegmentationError {
    #[error("Segmentation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Segmentation service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Malformed segmentation response: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vertex {
    pub x: f32,
    pub y: f32,
}

/// One candidate tomato as reported by the segmentation service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(flatten)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub points: Vec<Vertex>,
    #[serde(default)]
    pub detection_id: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SegmentationResult {
    pub detections: Vec<Detection>,
    /// Response body exactly as received, kept for the stored record.
    pub raw: serde_json::Value,
}

impl SegmentationResult {
    pub fn from_raw(raw: serde_json::Value) -> Result<Self, SegmentationError> {
        let detections = match raw.get("predictions") {
            Some(predictions) if !predictions.is_null() => {
                Vec::<Detection>::deserialize(predictions)?
            }
            _ => Vec::new(),
        };
        Ok(Self { detections, raw })
    }
}

#[async_trait]
pub trait Segmenter: Send + Sync {
    async fn segment(&self, image: &[u8], filename: &str)
    -> Result<SegmentationResult, SegmentationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_predictions_in_order() {
        let raw = json!({
            "time": 0.12,
            "image": {"width": 800, "height": 600},
            "predictions": [
                {
                    "x": 400.0, "y": 300.0, "width": 200.0, "height": 100.0,
                    "confidence": 0.93, "class": "tomato", "class_id": 0,
                    "detection_id": "a1",
                    "points": [{"x": 300.0, "y": 250.0}, {"x": 500.0, "y": 250.0}, {"x": 400.0, "y": 350.0}]
                },
                {
                    "x": 50, "y": 60, "width": 10, "height": 12,
                    "confidence": 0.4, "detection_id": "b2"
                }
            ]
        });

        let result = SegmentationResult::from_raw(raw.clone()).unwrap();
        assert_eq!(result.raw, raw);
        assert_eq!(result.detections.len(), 2);

        let first = &result.detections[0];
        assert_eq!(
            first.bbox,
            BoundingBox {
                x: 400.0,
                y: 300.0,
                width: 200.0,
                height: 100.0
            }
        );
        assert_eq!(first.points.len(), 3);
        assert_eq!(first.points[2], Vertex { x: 400.0, y: 350.0 });
        assert_eq!(first.detection_id.as_deref(), Some("a1"));
        assert_eq!(first.class.as_deref(), Some("tomato"));

        let second = &result.detections[1];
        assert_eq!(second.bbox.x, 50.0);
        assert!(second.points.is_empty());
        assert_eq!(second.detection_id.as_deref(), Some("b2"));
    }

    #[test]
    fn missing_fields_default_to_zero() {
        let result = SegmentationResult::from_raw(json!({"predictions": [{}]})).unwrap();
        assert_eq!(result.detections, vec![Detection::default()]);
    }

    #[test]
    fn absent_predictions_mean_no_detections() {
        assert!(SegmentationResult::from_raw(json!({})).unwrap().detections.is_empty());
        assert!(
            SegmentationResult::from_raw(json!({"predictions": null}))
                .unwrap()
                .detections
                .is_empty()
        );
    }

    #[test]
    fn wrongly_typed_predictions_are_malformed() {
        let err = SegmentationResult::from_raw(json!({"predictions": "oops"})).unwrap_err();
        assert!(matches!(err, SegmentationError::Malformed(_)));
    }
}
