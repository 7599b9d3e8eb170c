pub mod error;
pub mod http;

use async_trait::async_trait;

use crate::api::job::models::{BulkMutateJob, JobHandle, JobPolicy, JobResult, JobSelector, Operation};

pub use error::ClientError;
pub use http::HttpMutateJobClient;

/// Client side of the mutate job API
///
/// Every call may come back empty (`Ok(None)`). Callers decide what an empty
/// response means for them.
#[async_trait]
pub trait MutateJobService: Send + Sync {
    /// Create a job holding all `operations`
    async fn mutate(
        &self,
        operations: &[Operation],
        policy: &JobPolicy,
    ) -> Result<Option<JobHandle>, ClientError>;

    /// Fetch status snapshots for the selected jobs
    async fn get(&self, selector: &JobSelector) -> Result<Option<Vec<BulkMutateJob>>, ClientError>;

    /// Fetch the result payload of a completed job
    async fn get_result(&self, selector: &JobSelector) -> Result<Option<JobResult>, ClientError>;
}
