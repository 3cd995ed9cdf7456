use actix_files::Files;
use actix_multipart::{Field, Multipart};
use actix_web::{HttpResponse, web};
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::Deserialize;
use std::path::PathBuf;
use tomato_shared::{ErrorResponse, ImageKind};

use crate::imaging::codec::content_type_for;
use crate::pipeline::{AnalysisPipeline, PipelineError, Upload};
use crate::storage::{MAX_IMAGE_SIZE, StorageError};

const IMAGE_FIELD: &str = "image";

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>) {
    cfg.service(web::resource(["/api/analyze", "/analyze"]).route(web::post().to(analyze)))
        .service(web::resource(["/api/history", "/history"]).route(web::get().to(history)))
        .service(web::resource("/uploads/{filename}").route(web::get().to(get_original)))
        .service(web::resource("/annotated/{filename}").route(web::get().to(get_annotated)));
    if let Some(dir) = static_dir {
        cfg.service(Files::new("/static", dir).index_file("index.html"));
    }
}

fn error_body(message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        error: message.into(),
    }
}

fn pipeline_error_response(e: &PipelineError) -> HttpResponse {
    match e {
        PipelineError::InvalidImage(_) => HttpResponse::BadRequest().json(error_body(e.to_string())),
        PipelineError::Segmentation(_) | PipelineError::Classification(_) => {
            HttpResponse::BadGateway().json(error_body(e.to_string()))
        }
        PipelineError::Storage(StorageError::InvalidName(_)) => {
            HttpResponse::BadRequest().json(error_body(e.to_string()))
        }
        PipelineError::Storage(StorageError::NotFound(_)) => {
            HttpResponse::NotFound().json(error_body(e.to_string()))
        }
        PipelineError::Storage(StorageError::FileTooLarge) => {
            HttpResponse::PayloadTooLarge().json(error_body(e.to_string()))
        }
        PipelineError::Encoding(_) | PipelineError::Storage(_) | PipelineError::Repository(_) => {
            HttpResponse::InternalServerError().json(error_body(e.to_string()))
        }
    }
}

enum UploadError {
    TooLarge,
    Read(String),
}

async fn read_field(field: &mut Field) -> Result<Vec<u8>, UploadError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| UploadError::Read(e.to_string()))?;
        if data.len() + chunk.len() > MAX_IMAGE_SIZE {
            return Err(UploadError::TooLarge);
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn analyze(pipeline: web::Data<AnalysisPipeline>, mut payload: Multipart) -> HttpResponse {
    let mut upload: Option<Upload> = None;

    loop {
        let mut field = match payload.try_next().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart payload: {}", e);
                return HttpResponse::BadRequest().json(error_body(format!(
                    "Malformed multipart payload: {}",
                    e
                )));
            }
        };

        let is_image = field.name() == Some(IMAGE_FIELD);
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();

        let data = match read_field(&mut field).await {
            Ok(data) => data,
            Err(UploadError::TooLarge) => {
                return HttpResponse::PayloadTooLarge()
                    .json(error_body(StorageError::FileTooLarge.to_string()));
            }
            Err(UploadError::Read(e)) => {
                return HttpResponse::BadRequest()
                    .json(error_body(format!("Failed to read upload: {}", e)));
            }
        };

        if is_image && upload.is_none() && !data.is_empty() {
            upload = Some(Upload {
                filename,
                bytes: data,
            });
        }
    }

    let Some(upload) = upload else {
        return HttpResponse::BadRequest()
            .json(error_body(format!("No '{}' file was sent", IMAGE_FIELD)));
    };

    info!(
        "Received {} ({} bytes) for analysis",
        upload.filename,
        upload.bytes.len()
    );
    match pipeline.analyze(upload).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            error!("Analysis failed: {}", e);
            pipeline_error_response(&e)
        }
    }
}

async fn history(
    pipeline: web::Data<AnalysisPipeline>,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    match pipeline.history(query.limit).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => {
            error!("Failed to load history: {}", e);
            pipeline_error_response(&e)
        }
    }
}

async fn get_original(
    pipeline: web::Data<AnalysisPipeline>,
    filename: web::Path<String>,
) -> HttpResponse {
    serve_image(&pipeline, ImageKind::Original, &filename).await
}

async fn get_annotated(
    pipeline: web::Data<AnalysisPipeline>,
    filename: web::Path<String>,
) -> HttpResponse {
    serve_image(&pipeline, ImageKind::Annotated, &filename).await
}

async fn serve_image(pipeline: &AnalysisPipeline, kind: ImageKind, filename: &str) -> HttpResponse {
    match pipeline.load_image(kind, filename).await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type(content_type_for(filename))
            .body(bytes),
        Err(e) => {
            warn!("Could not serve {}/{}: {}", kind, filename, e);
            pipeline_error_response(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::RecordStore;
    use crate::pipeline::tests::{harness, png_upload, two_tomato_response};
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use serde_json::json;
    use tomato_shared::AnalyzeResponse;

    const BOUNDARY: &str = "----tomato-test-boundary";

    fn multipart_body(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, field, filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn multipart_request(body: Vec<u8>) -> test::TestRequest {
        multipart_request_to("/api/analyze", body)
    }

    fn multipart_request_to(uri: &str, body: Vec<u8>) -> test::TestRequest {
        test::TestRequest::post()
            .uri(uri)
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            ))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn analyze_returns_combined_result() {
        let h = harness(two_tomato_response(), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let upload = png_upload(800, 600);
        let req = multipart_request(multipart_body("image", "field.png", &upload.bytes)).to_request();
        let resp: AnalyzeResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(resp.tomato_count, 2);
        assert_eq!(resp.tomatoes[0].class, "Ripe");
        assert_eq!(resp.tomatoes[1].class, "Damaged");

        let req = test::TestRequest::get()
            .uri(&format!("/annotated/{}", resp.annotated_filename))
            .to_request();
        let served = test::call_service(&app, req).await;
        assert_eq!(served.status(), StatusCode::OK);
        assert_eq!(
            served.headers().get("content-type").unwrap(),
            "image/png"
        );
    }

    #[actix_web::test]
    async fn missing_image_field_is_a_bad_request() {
        let h = harness(two_tomato_response(), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let req = multipart_request(multipart_body("photo", "a.png", b"123")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.records.count().await.unwrap(), 0);
    }

    #[actix_web::test]
    async fn undecodable_image_is_a_bad_request() {
        let h = harness(two_tomato_response(), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let req = multipart_request(multipart_body("image", "a.png", b"not a png")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn segmentation_outage_is_a_bad_gateway() {
        let h = harness(two_tomato_response(), true);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let upload = png_upload(64, 64);
        let req = multipart_request(multipart_body("image", "a.png", &upload.bytes)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[actix_web::test]
    async fn history_lists_records_without_raw_payload() {
        let h = harness(json!({"predictions": []}), false);
        h.pipeline.analyze(png_upload(16, 16)).await.unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/history?limit=5").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let entries = body.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["display_name"], "Record 1");
        assert!(entries[0].get("segmentation_raw").is_none());
        assert!(entries[0].get("id").is_some());
    }

    #[actix_web::test]
    async fn unknown_images_and_bad_names_are_rejected() {
        let h = harness(json!({"predictions": []}), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let req = test::TestRequest::get().uri("/uploads/missing.jpg").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::get().uri("/uploads/..").to_request();
        let status = test::call_service(&app, req).await.status();
        assert!(status == StatusCode::BAD_REQUEST || status == StatusCode::NOT_FOUND);

        let req = test::TestRequest::get().uri("/elsewhere/a.jpg").to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let h = harness(two_tomato_response(), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let bytes = vec![0u8; MAX_IMAGE_SIZE + 1];
        let req = multipart_request(multipart_body("image", "big.jpg", &bytes)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(h.records.count().await.unwrap(), 0);
        assert!(h.images.files.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn empty_image_field_is_a_bad_request() {
        let h = harness(two_tomato_response(), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let req = multipart_request(multipart_body("image", "empty.jpg", b"")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().contains("image"));
    }

    #[actix_web::test]
    async fn unprefixed_paths_reach_the_same_handlers() {
        let h = harness(json!({"predictions": []}), false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(h.pipeline.clone()))
                .configure(|cfg| configure_routes(cfg, None)),
        )
        .await;

        let upload = png_upload(32, 32);
        let req = multipart_request_to("/analyze", multipart_body("image", "a.png", &upload.bytes))
            .to_request();
        let resp: AnalyzeResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.tomato_count, 0);

        let req = test::TestRequest::get().uri("/history").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }
}
