use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::api::validation::ErrorResponse;
use crate::db::job_store::{JobStore, StatusCounts, StoreError};
use super::models::{BulkMutateJob, JobHandle, JobId, JobResult, JobSelector, JobStatus, MutateRequest};

/// Service-level errors
#[derive(Debug)]
pub enum ServiceError {
    /// Policy referenced a job that does not exist
    UnknownPrerequisite(JobId),

    /// Job not found
    NotFound(JobId),

    /// Store was left in an unexpected state
    Internal(String),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::UnknownPrerequisite(id) => write!(f, "Unknown prerequisite job: {}", id),
            ServiceError::NotFound(id) => write!(f, "Job not found: {}", id),
            ServiceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownPrerequisite(id) => ServiceError::UnknownPrerequisite(id),
            StoreError::NotFound(id) => ServiceError::NotFound(id),
        }
    }
}

impl ResponseError for ServiceError {
    fn error_response(&self) -> HttpResponse {
        match self {
            ServiceError::UnknownPrerequisite(id) => {
                warn!("Rejected job with unknown prerequisite {}", id);
                HttpResponse::BadRequest().json(
                    ErrorResponse::new("Validation failed").with_record([
                        ("field", json!("policy.prerequisite_job_ids")),
                        ("reason", json!("UNKNOWN_PREREQUISITE_JOB")),
                        ("trigger", json!(id)),
                    ]),
                )
            }
            ServiceError::NotFound(id) => {
                warn!("Job not found: {}", id);
                HttpResponse::NotFound().json(
                    ErrorResponse::new("Not found").with_record([
                        ("field", json!("job_ids")),
                        ("reason", json!("JOB_NOT_FOUND")),
                        ("trigger", json!(id)),
                    ]),
                )
            }
            ServiceError::Internal(msg) => {
                error!("Internal error: {}", msg);
                HttpResponse::InternalServerError().json(ErrorResponse::new("Internal error"))
            }
        }
    }
}

/// Job service containing the sandbox business logic
pub struct JobService {
    store: Arc<JobStore>,
}

impl JobService {
    /// Create a new JobService instance
    pub fn new(store: Arc<JobStore>) -> Self {
        Self { store }
    }

    /// Create a single job holding every operation of the request
    ///
    /// # Returns
    /// - `Ok(JobHandle)` - Job queued as `PENDING`
    /// - `Err(ServiceError)` - A prerequisite job does not exist
    pub async fn create_job(&self, request: MutateRequest) -> Result<JobHandle, ServiceError> {
        info!(
            "Service: Creating job with {} operations",
            request.operations.len()
        );

        let record = self.store.create(request.operations, request.policy).await?;

        info!("Service: Job created successfully with id={}", record.id);
        Ok(JobHandle { id: record.id })
    }

    /// Status snapshots for every known job in the selector
    pub async fn job_status(&self, selector: &JobSelector) -> Vec<BulkMutateJob> {
        self.store.snapshots(&selector.job_ids).await
    }

    /// Result of the first selected job
    ///
    /// # Returns
    /// - `Ok(Some(JobResult))` - Job completed
    /// - `Ok(None)` - Job exists but has not completed
    /// - `Err(ServiceError::NotFound)` - No such job
    pub async fn job_result(&self, selector: &JobSelector) -> Result<Option<JobResult>, ServiceError> {
        let id = selector
            .job_ids
            .first()
            .copied()
            .ok_or_else(|| ServiceError::Internal("empty job selector".to_string()))?;

        let record = self.store.get(id).await.ok_or(ServiceError::NotFound(id))?;

        if record.status != JobStatus::Completed {
            info!("Service: Result requested for job {} in status {}", id, record.status);
            return Ok(None);
        }

        Ok(Some(JobResult {
            simple_mutate_result: record.result,
        }))
    }

    pub async fn counts(&self) -> StatusCounts {
        self.store.counts().await
    }
}
