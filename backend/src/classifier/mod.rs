pub mod remote;
#[cfg(feature = "torch")]
pub mod torch;

use async_trait::async_trait;
use image::RgbImage;
use image::imageops::{self, FilterType};
use ndarray::Array4;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classifier request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Classifier service returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("Malformed classifier output: {0}")]
    Malformed(String),
    #[error("Classifier produced no scores")]
    EmptyOutput,
    #[error("Class index {index} has no name ({known} classes configured)")]
    UnknownClass { index: usize, known: usize },
    #[error("Model error: {0}")]
    #[cfg_attr(not(feature = "torch"), allow(dead_code))]
    Model(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub class: String,
    pub probability: f32,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifierError>;
}

/// Resizes to `size` (width, height) with bicubic filtering and lays the
/// pixels out as a `[1, height, width, 3]` float tensor with raw 0-255
/// values. Normalization is left to the model.
pub fn preprocess(image: &RgbImage, size: [u32; 2]) -> Array4<f32> {
    let [width, height] = size;
    let resized = imageops::resize(image, width, height, FilterType::CatmullRom);
    Array4::from_shape_fn(
        (1, height as usize, width as usize, 3),
        |(_, y, x, c)| resized.get_pixel(x as u32, y as u32)[c] as f32,
    )
}

/// Index of the highest score (first one on ties) mapped to its name.
pub fn pick_class(scores: &[f32], class_names: &[String]) -> Result<Classification, ClassifierError> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    let (index, probability) = best.ok_or(ClassifierError::EmptyOutput)?;
    let class = class_names
        .get(index)
        .ok_or(ClassifierError::UnknownClass {
            index,
            known: class_names.len(),
        })?
        .clone();
    Ok(Classification { class, probability })
}
