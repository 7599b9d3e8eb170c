use actix_web::{
    HttpResponse, post,
    web::{Data, ServiceConfig, scope},
};
use actix_web_validator::Json;
use tracing::debug;

use super::models::{JobSelector, MutateRequest};
use super::service::{JobService, ServiceError};

/// Create a job from a batch of operations
#[post("")]
async fn create_job(
    service: Data<JobService>,
    request: Json<MutateRequest>,
) -> Result<HttpResponse, ServiceError> {
    let handle = service.create_job(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(handle))
}

/// Status snapshots for the selected jobs
#[post("/status")]
async fn job_status(service: Data<JobService>, selector: Json<JobSelector>) -> HttpResponse {
    let jobs = service.job_status(&selector).await;
    debug!("Status query for {:?} matched {} jobs", selector.job_ids, jobs.len());
    HttpResponse::Ok().json(jobs)
}

/// Result of a completed job, or 204 while it is still running
#[post("/result")]
async fn job_result(
    service: Data<JobService>,
    selector: Json<JobSelector>,
) -> Result<HttpResponse, ServiceError> {
    match service.job_result(&selector).await? {
        Some(result) => Ok(HttpResponse::Ok().json(result)),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

pub fn job_config(config: &mut ServiceConfig) {
    config.service(
        scope("jobs")
            .service(create_job)
            .service(job_status)
            .service(job_result),
    );
}
