use async_trait::async_trait;
use image::RgbImage;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tch::{CModule, Device, Kind, Tensor, nn::ModuleT};

use super::{Classification, Classifier, ClassifierError, pick_class, preprocess};
use crate::config::ClassifierConfig;

/// In-process TorchScript classifier. The module takes a float NCHW batch
/// of raw 0-255 values; its logits are softmaxed before picking a class.
#[derive(Clone)]
pub struct TorchClassifier {
    model: Arc<Mutex<CModule>>,
    device: Device,
    image_size: [u32; 2],
    class_names: Vec<String>,
}

impl TorchClassifier {
    pub fn load(config: &ClassifierConfig) -> Result<Self, ClassifierError> {
        let device = Device::cuda_if_available();
        let model = load_module(&config.model_path, device)?;
        log::info!(
            "Loaded TorchScript classifier {} on {:?}",
            config.model_path.display(),
            device
        );
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            device,
            image_size: config.image_size,
            class_names: config.class_names.clone(),
        })
    }

    fn scores(&self, image: &RgbImage) -> Result<Vec<f32>, ClassifierError> {
        let [width, height] = self.image_size;
        let input = preprocess(image, self.image_size);
        let data = input
            .as_slice()
            .ok_or_else(|| ClassifierError::Model("input tensor is not contiguous".into()))?;
        let tensor = Tensor::from_slice(data)
            .view([1, height as i64, width as i64, 3])
            .permute([0, 3, 1, 2])
            .to_device(self.device);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| ClassifierError::Model("model lock poisoned".into()))?;
            model.forward_t(&tensor, false)
        };

        let flat = output
            .softmax(-1, Kind::Float)
            .to_device(Device::Cpu)
            .view([-1]);
        let len = flat.size()[0] as usize;
        let mut scores = vec![0.0f32; len];
        flat.copy_data(&mut scores, len);
        Ok(scores)
    }
}

fn load_module(path: &Path, device: Device) -> Result<CModule, ClassifierError> {
    CModule::load_on_device(path, device).map_err(|e| ClassifierError::Model(e.to_string()))
}

#[async_trait]
impl Classifier for TorchClassifier {
    async fn classify(&self, image: &RgbImage) -> Result<Classification, ClassifierError> {
        let scores = self.scores(image)?;
        pick_class(&scores, &self.class_names)
    }
}
