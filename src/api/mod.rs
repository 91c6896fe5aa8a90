// src/api/mod.rs

use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{web, App, Error, HttpResponse, HttpServer};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::config::ApiConfig;
use crate::pipeline::{Pipeline, PipelineError};
use crate::source::Visibility;

#[derive(Deserialize)]
pub struct ProcessRequest {
    #[serde(rename = "documentId")]
    pub document_id: String,
    #[serde(rename = "type")]
    pub visibility: Visibility,
}

#[derive(Deserialize)]
pub struct StatusQuery {
    #[serde(rename = "type")]
    pub visibility: Visibility,
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Input(_) => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::AlreadyProcessing(_) => StatusCode::CONFLICT,
        PipelineError::Upstream(_)
        | PipelineError::EmbeddingMismatch { .. }
        | PipelineError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Trigger endpoint: runs the whole ingestion pipeline for one document.
pub async fn process_document(
    pipeline: web::Data<Pipeline>,
    req: web::Json<ProcessRequest>,
) -> Result<HttpResponse, Error> {
    info!(document_id = %req.document_id, visibility = req.visibility.as_str(), "Processing triggered");

    match pipeline.run(&req.document_id, req.visibility).await {
        Ok(report) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "extractedTextLength": report.extracted_text_length,
            "chunksInserted": report.chunks_inserted,
        }))),
        Err(e) => {
            error!(document_id = %req.document_id, error = %e, "Processing failed");
            Ok(HttpResponse::build(status_for(&e)).json(json!({ "error": e.to_string() })))
        }
    }
}

/// Lifecycle fields for the uploading UI to poll.
pub async fn document_status(
    pipeline: web::Data<Pipeline>,
    path: web::Path<String>,
    query: web::Query<StatusQuery>,
) -> Result<HttpResponse, Error> {
    let document_id = path.into_inner();
    match pipeline.status(&document_id, query.visibility) {
        Ok(Some(status)) => Ok(HttpResponse::Ok().json(status)),
        Ok(None) => Ok(HttpResponse::NotFound().json(json!({
            "error": format!("Document {} not found", document_id)
        }))),
        Err(e) => {
            error!(document_id = %document_id, error = %e, "Status read failed");
            Ok(HttpResponse::InternalServerError().json(json!({ "error": e.to_string() })))
        }
    }
}

pub async fn health_check(pipeline: web::Data<Pipeline>) -> Result<HttpResponse, Error> {
    match pipeline.health_check() {
        Ok(()) => Ok(HttpResponse::Ok().json(json!({ "status": "healthy" }))),
        Err(e) => Ok(HttpResponse::ServiceUnavailable().json(json!({
            "status": "unhealthy",
            "error": e.to_string(),
        }))),
    }
}

async fn root_handler() -> Result<HttpResponse, Error> {
    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("docpipe is running\n\nTry /health or POST /process\n"))
}

/// Keeps body deserialization failures (missing documentId/type, unknown
/// visibility) at 400 with the same { "error": ... } shape as the pipeline
/// errors.
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        actix_web::error::InternalError::from_response(
            err,
            HttpResponse::BadRequest().json(json!({ "error": message })),
        )
        .into()
    })
}

pub fn start_api_server(
    config: &ApiConfig,
    pipeline: Pipeline,
) -> impl std::future::Future<Output = std::io::Result<()>> {
    let bind_addr = config.bind_addr();
    let data = web::Data::new(pipeline);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST"])
            .allowed_headers(vec![
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::AUTHORIZATION,
            ])
            .max_age(3600);

        App::new()
            .app_data(data.clone())
            .app_data(json_config())
            .wrap(cors)
            .route("/", web::get().to(root_handler))
            .route("/health", web::get().to(health_check))
            .route("/process", web::post().to(process_document))
            .route("/documents/{id}/status", web::get().to(document_status))
    })
    .bind(bind_addr.clone())
    .unwrap_or_else(|e| panic!("Failed to bind to {}: {}", bind_addr, e))
    .run()
}
