use crate::api::job::models::JobId;
use crate::client::ClientError;

/// Errors that end a bulk placement run
#[derive(Debug, thiserror::Error)]
pub enum BulkJobError {
    /// Job creation came back empty
    #[error("Failed to submit a job; aborting.")]
    Submission,

    /// A status query came back empty
    #[error("Error retrieving job status; aborting.")]
    StatusQuery,

    /// The service reported the job as failed
    #[error("Job failed with reason: '{0}'")]
    JobFailed(String),

    /// The result query came back empty
    #[error("Error retrieving job results; aborting.")]
    ResultRetrieval,

    #[error("Polling of job {0} was cancelled")]
    Cancelled(JobId),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}
