mod classifier;
mod config;
mod db;
mod imaging;
mod pipeline;
mod routes;
mod segmentation;
mod storage;

use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use classifier::Classifier;
use classifier::remote::RemoteClassifier;
use config::{AppConfig, ClassifierBackend, ImageStoreBackend, RecordStoreBackend};
use db::RecordStore;
use db::dynamodb_repository::DynamoDbRepository;
use db::memory::MemoryRecordStore;
use imaging::annotate::Annotator;
use imaging::font::LabelFont;
use pipeline::AnalysisPipeline;
use routes::configure_routes;
use segmentation::roboflow::RoboflowSegmenter;
use std::io::Error;
use std::sync::Arc;
use storage::ImageStore;
use storage::local::LocalImageStore;
use storage::s3_service::S3Service;

fn init_error(what: &str, e: impl std::fmt::Display) -> Error {
    log::error!("Failed to initialize {}: {}", what, e);
    Error::other(format!("{} initialization failed: {}", what, e))
}

fn build_classifier(config: &AppConfig) -> Result<Arc<dyn Classifier>, Error> {
    match config.classifier.backend {
        ClassifierBackend::Remote => {
            let classifier = RemoteClassifier::new(&config.classifier)
                .map_err(|e| init_error("classifier", e))?;
            Ok(Arc::new(classifier))
        }
        #[cfg(feature = "torch")]
        ClassifierBackend::Torch => {
            let classifier = classifier::torch::TorchClassifier::load(&config.classifier)
                .map_err(|e| init_error("classifier", e))?;
            Ok(Arc::new(classifier))
        }
        #[cfg(not(feature = "torch"))]
        ClassifierBackend::Torch => Err(init_error(
            "classifier",
            "the torch backend requires building with `--features torch`",
        )),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = AppConfig::load().map_err(|e| init_error("configuration", e))?;

    let segmenter = RoboflowSegmenter::new(&config.segmentation)
        .map_err(|e| init_error("segmentation client", e))?;
    let classifier = build_classifier(&config)?;

    let needs_aws = config.images.backend == ImageStoreBackend::S3
        || config.records.backend == RecordStoreBackend::Dynamodb;
    let aws_config = if needs_aws {
        Some(aws_config::defaults(BehaviorVersion::latest()).load().await)
    } else {
        None
    };

    let images: Arc<dyn ImageStore> = match (&config.images.backend, &aws_config) {
        (ImageStoreBackend::S3, Some(aws)) => Arc::new(S3Service::new(
            S3Client::new(aws),
            config.images.bucket.clone(),
        )),
        _ => Arc::new(
            LocalImageStore::new(
                config.images.upload_dir.clone(),
                config.images.annotated_dir.clone(),
            )
            .await
            .map_err(|e| init_error("image store", e))?,
        ),
    };

    let records: Arc<dyn RecordStore> = match (&config.records.backend, &aws_config) {
        (RecordStoreBackend::Dynamodb, Some(aws)) => Arc::new(DynamoDbRepository::new(
            DynamoDbClient::new(aws),
            config.records.table.clone(),
        )),
        _ => {
            log::warn!("Keeping image records in memory; history is lost on restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let font = LabelFont::load(
        config.annotation.font_path.as_deref(),
        config.annotation.font_size,
    );
    let annotator = Annotator::new(font, config.annotation.stroke_width);

    let pipeline = AnalysisPipeline::new(
        Arc::new(segmenter),
        classifier,
        images,
        records,
        Arc::new(annotator),
        config.records.history_limit,
    );

    let static_dir = config.server.static_dir.clone();
    let bind_address = config.bind_address();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(pipeline.clone()))
            .configure(|cfg| configure_routes(cfg, static_dir.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
