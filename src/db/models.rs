use chrono::{DateTime, Utc};

use crate::api::job::models::{
    BulkMutateJob, JobId, JobPolicy, JobStatus, Operation, SimpleMutateResult,
};

/// Stored representation of a job with all fields
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
    /// Dropped once the job finishes
    pub operations: Vec<Operation>,
    pub operation_count: usize,
    pub policy: JobPolicy,
    pub result: Option<SimpleMutateResult>,
    /// Set once at submission
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Status snapshot as returned to clients
    pub fn snapshot(&self) -> BulkMutateJob {
        BulkMutateJob {
            id: self.id,
            status: self.status,
            failure_reason: self.failure_reason.clone(),
        }
    }

    /// Move to a terminal status and release the submitted operations
    pub fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.operations = Vec::new();
    }
}
