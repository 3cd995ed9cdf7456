use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "config/app.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub segmentation: SegmentationConfig,
    pub classifier: ClassifierConfig,
    pub annotation: AnnotationConfig,
    pub images: ImageStoreConfig,
    pub records: RecordStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub endpoint: Url,
    pub model_id: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    Remote,
    Torch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub backend: ClassifierBackend,
    pub endpoint: Url,
    pub model_path: PathBuf,
    pub image_size: [u32; 2],
    pub class_names: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub font_path: Option<PathBuf>,
    pub font_size: f32,
    pub stroke_width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStoreBackend {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageStoreConfig {
    pub backend: ImageStoreBackend,
    pub upload_dir: PathBuf,
    pub annotated_dir: PathBuf,
    pub bucket: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStoreBackend {
    Dynamodb,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordStoreConfig {
    pub backend: RecordStoreBackend,
    pub table: String,
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            static_dir: None,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse("https://detect.roboflow.com/").expect("static url"),
            model_id: "tomatoes-segmentation-2-jxjaj/1".to_string(),
            api_key: String::new(),
            timeout_secs: 60,
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            backend: ClassifierBackend::Remote,
            endpoint: Url::parse("http://localhost:8501/v1/models/tomato:predict")
                .expect("static url"),
            model_path: PathBuf::from("models/efficientnetb7_final.pt"),
            image_size: [256, 256],
            class_names: ["Damaged", "Old", "Ripe", "Unripe"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 30,
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_path: Some(PathBuf::from(
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            )),
            font_size: 18.0,
            stroke_width: 4,
        }
    }
}

impl Default for ImageStoreConfig {
    fn default() -> Self {
        Self {
            backend: ImageStoreBackend::Local,
            upload_dir: PathBuf::from("uploads"),
            annotated_dir: PathBuf::from("uploads/annotated"),
            bucket: "tomato-images".to_string(),
        }
    }
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            backend: RecordStoreBackend::Dynamodb,
            table: "tomato-image-records".to_string(),
            history_limit: 50,
        }
    }
}

impl AppConfig {
    /// Reads the YAML file named by `TOMATO_CONFIG` (or `config/app.yaml`),
    /// falling back to defaults when the default path does not exist, then
    /// applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = env::var("TOMATO_CONFIG").ok();
        let path = PathBuf::from(explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH));

        let mut config = if explicit.is_some() || path.exists() {
            Self::from_file(&path)?
        } else {
            log::warn!(
                "No config file at {}, using built-in defaults",
                path.display()
            );
            Self::default()
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(raw)?)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnv {
                key: "PORT",
                value: port.clone(),
            })?;
        }
        if let Some(key) = lookup("ROBOFLOW_API_KEY") {
            self.segmentation.api_key = key;
        }
        if let Some(bucket) = lookup("S3_BUCKET_NAME") {
            self.images.bucket = bucket;
        }
        if let Some(table) = lookup("DYNAMODB_IMAGES_TABLE") {
            self.records.table = table;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classifier.class_names.is_empty() {
            return Err(ConfigError::Invalid(
                "classifier.class_names must not be empty".to_string(),
            ));
        }
        if self.classifier.image_size.contains(&0) {
            return Err(ConfigError::Invalid(
                "classifier.image_size must be non-zero".to_string(),
            ));
        }
        if self.records.history_limit == 0 {
            return Err(ConfigError::Invalid(
                "records.history_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
