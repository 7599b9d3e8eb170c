use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::api::job::models::{
    BulkMutateJob, JobId, JobPolicy, JobStatus, Operation, SimpleMutateResult,
};
use crate::db::models::JobRecord;

/// Failure reason for jobs whose prerequisite failed
pub const PREREQUISITE_FAILED_REASON: &str = "PREREQUISITE_JOB_FAILED";

#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A policy named a job that does not exist
    UnknownPrerequisite(JobId),
    NotFound(JobId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::UnknownPrerequisite(id) => write!(f, "Unknown prerequisite job: {}", id),
            StoreError::NotFound(id) => write!(f, "Job not found: {}", id),
        }
    }
}

impl std::error::Error for StoreError {}

/// Number of jobs per status
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Default)]
struct StoreState {
    jobs: BTreeMap<JobId, JobRecord>,
    next_id: JobId,
}

/// In-memory job table shared by the HTTP handlers and the workers
#[derive(Default)]
pub struct JobStore {
    state: RwLock<StoreState>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new pending job and return the full record
    pub async fn create(
        &self,
        operations: Vec<Operation>,
        policy: JobPolicy,
    ) -> Result<JobRecord, StoreError> {
        let mut state = self.state.write().await;

        if let Some(missing) = policy
            .prerequisite_job_ids
            .iter()
            .find(|id| !state.jobs.contains_key(*id))
        {
            return Err(StoreError::UnknownPrerequisite(*missing));
        }

        state.next_id += 1;
        let id = state.next_id;
        let record = JobRecord {
            id,
            status: JobStatus::Pending,
            failure_reason: None,
            operation_count: operations.len(),
            operations,
            policy,
            result: None,
            created_at: Utc::now(),
        };
        debug!(
            "Creating job: id={}, operations={}, prerequisites={:?}",
            id,
            record.operation_count,
            record.policy.prerequisite_job_ids
        );
        state.jobs.insert(id, record.clone());

        Ok(record)
    }

    /// Status snapshots in request order; unknown ids are skipped
    pub async fn snapshots(&self, ids: &[JobId]) -> Vec<BulkMutateJob> {
        let state = self.state.read().await;
        ids.iter()
            .filter_map(|id| state.jobs.get(id))
            .map(JobRecord::snapshot)
            .collect()
    }

    pub async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.state.read().await.jobs.get(&id).cloned()
    }

    /// Claim the oldest pending job whose prerequisites have all completed
    ///
    /// Pending jobs with a failed prerequisite are failed on the way.
    /// The claimed job is marked `Processing` before it is returned.
    pub async fn acquire_next_job(&self) -> Option<JobRecord> {
        let mut state = self.state.write().await;

        let pending: Vec<JobId> = state
            .jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending)
            .map(|job| job.id)
            .collect();

        for id in pending {
            let prerequisites: Vec<JobStatus> = state.jobs[&id]
                .policy
                .prerequisite_job_ids
                .iter()
                .filter_map(|p| state.jobs.get(p).map(|job| job.status))
                .collect();

            let job = state.jobs.get_mut(&id)?;
            if prerequisites.contains(&JobStatus::Failed) {
                warn!("Job {} failed: a prerequisite job failed", id);
                job.finish(JobStatus::Failed);
                job.failure_reason = Some(PREREQUISITE_FAILED_REASON.to_string());
                continue;
            }

            if prerequisites.iter().all(|s| *s == JobStatus::Completed) {
                job.status = JobStatus::Processing;
                return Some(job.clone());
            }
        }

        None
    }

    /// Store the result and mark the job `Completed`
    pub async fn complete(&self, id: JobId, result: SimpleMutateResult) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.finish(JobStatus::Completed);
        job.result = Some(result);
        Ok(())
    }

    /// Mark the job `Failed` with the given reason
    pub async fn fail(&self, id: JobId, reason: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let job = state.jobs.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        job.finish(JobStatus::Failed);
        job.failure_reason = Some(reason.to_string());
        Ok(())
    }

    pub async fn counts(&self) -> StatusCounts {
        let state = self.state.read().await;
        state
            .jobs
            .values()
            .fold(StatusCounts::default(), |mut counts, job| {
                match job.status {
                    JobStatus::Pending => counts.pending += 1,
                    JobStatus::Processing => counts.processing += 1,
                    JobStatus::Completed => counts.completed += 1,
                    JobStatus::Failed => counts.failed += 1,
                }
                counts
            })
    }
}
