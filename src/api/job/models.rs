use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Server-assigned job identifier
pub type JobId = i64;

/// Job status as reported by the mutate job service
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Add,
}

/// Targeting rule attached to an ad group
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Criterion {
    Placement { url: String },
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AdGroupCriterion {
    pub ad_group_id: i64,
    pub criterion: Criterion,
}

/// One ad group criterion operation bundled into a job
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Operation {
    pub operator: Operator,
    pub operand: AdGroupCriterion,
}

impl Operation {
    /// Build an ADD operation for a placement on the given ad group
    pub fn add_placement(ad_group_id: i64, url: impl Into<String>) -> Self {
        Self {
            operator: Operator::Add,
            operand: AdGroupCriterion {
                ad_group_id,
                criterion: Criterion::Placement { url: url.into() },
            },
        }
    }
}

/// Scheduling policy for a new job
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq, Validate)]
pub struct JobPolicy {
    #[serde(default)]
    #[validate(length(
        max = 3,
        message = "At most 3 prerequisite jobs may be specified"
    ))]
    pub prerequisite_job_ids: Vec<JobId>,
}

/// Body of a job creation request
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct MutateRequest {
    #[validate(length(
        min = 1,
        max = 10000,
        message = "A job must contain between 1 and 10000 operations"
    ))]
    pub operations: Vec<Operation>,
    #[serde(default)]
    #[validate(nested)]
    pub policy: JobPolicy,
}

/// Selects jobs by id for status and result queries
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq, Validate)]
pub struct JobSelector {
    #[validate(length(min = 1, message = "At least one job id is required"))]
    pub job_ids: Vec<JobId>,
}

impl JobSelector {
    pub fn single(job_id: JobId) -> Self {
        Self { job_ids: vec![job_id] }
    }
}

/// Returned by a successful job creation
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct JobHandle {
    pub id: JobId,
}

/// Job status snapshot
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct BulkMutateJob {
    pub id: JobId,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Outcome of a single operation, in submission order
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationResult {
    Succeeded,
    /// Stands in for an operation that failed
    PlaceHolder,
}

impl OperationResult {
    pub fn label(self) -> &'static str {
        match self {
            OperationResult::Succeeded => "SUCCEEDED",
            OperationResult::PlaceHolder => "FAILED",
        }
    }
}

/// Structured error attached to a completed job
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub reason: String,
    pub trigger: String,
    pub field_path: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct SimpleMutateResult {
    #[serde(default)]
    pub results: Vec<OperationResult>,
    #[serde(default)]
    pub errors: Vec<OperationError>,
}

/// Result payload of a completed job
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct JobResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simple_mutate_result: Option<SimpleMutateResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_serializes_with_tags() {
        let op = Operation::add_placement(42, "http://mars.google.com/");
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(
            value,
            json!({
                "operator": "ADD",
                "operand": {
                    "ad_group_id": 42,
                    "criterion": {"type": "PLACEMENT", "url": "http://mars.google.com/"}
                }
            })
        );
    }

    #[test]
    fn status_uses_upper_case_vocabulary() {
        let job: BulkMutateJob =
            serde_json::from_value(json!({"id": 7, "status": "FAILED", "failure_reason": "INTERNAL_ERROR"}))
                .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_reason.as_deref(), Some("INTERNAL_ERROR"));
    }

    #[test]
    fn placeholder_reads_as_failed() {
        let result: SimpleMutateResult = serde_json::from_value(json!({
            "results": [{"type": "SUCCEEDED"}, {"type": "PLACE_HOLDER"}]
        }))
        .unwrap();
        let labels: Vec<_> = result.results.iter().map(|r| r.label()).collect();
        assert_eq!(labels, vec!["SUCCEEDED", "FAILED"]);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn policy_rejects_too_many_prerequisites() {
        let policy = JobPolicy {
            prerequisite_job_ids: vec![1, 2, 3, 4],
        };
        assert!(policy.validate().is_err());
        assert!(JobPolicy::default().validate().is_ok());
    }

    #[test]
    fn mutate_request_requires_operations() {
        let request = MutateRequest {
            operations: vec![],
            policy: JobPolicy::default(),
        };
        assert!(request.validate().is_err());
    }
}
