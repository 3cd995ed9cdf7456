use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Axis-aligned box in pixel units, anchored at its center.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassifiedTomato {
    pub class: String,
    pub prob: f32,
    pub detection_confidence: f32,
    pub bbox: BoundingBox,
    pub detection_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalyzeResponse {
    pub id: String,
    pub filename_saved: String,
    pub path: String,
    pub annotated_filename: String,
    pub annotated_path: String,
    pub tomato_count: usize,
    pub tomatoes: Vec<ClassifiedTomato>,
    pub annotated_image: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

/// Which collection a stored image belongs to. Displays as its URL segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ImageKind {
    #[strum(serialize = "uploads")]
    Original,
    #[strum(serialize = "annotated")]
    Annotated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_kinds_display_as_url_segments() {
        assert_eq!(ImageKind::Original.to_string(), "uploads");
        assert_eq!(ImageKind::Annotated.to_string(), "annotated");
    }
}
