use actix_web::{HttpResponse, Responder, get, web};
use serde::Serialize;

use crate::api::job::JobService;
use crate::db::job_store::StatusCounts;

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    jobs: Option<StatusCounts>,
}

/// Health check endpoint
///
/// Reports job counts per status. The store lives in memory, so this only
/// fails if the process cannot answer at all.
#[get("/health")]
async fn health_check(service: web::Data<JobService>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        jobs: Some(service.counts().await),
    })
}

/// Liveness check endpoint
#[get("/live")]
async fn liveness_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "alive".to_string(),
        jobs: None,
    })
}

pub fn health_config(config: &mut web::ServiceConfig) {
    config.service(health_check).service(liveness_check);
}
