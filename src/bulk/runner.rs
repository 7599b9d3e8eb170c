use std::io::Write;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::job::models::{JobId, JobPolicy, JobSelector, JobStatus};
use crate::client::MutateJobService;
use super::error::BulkJobError;
use super::operations::PlacementGenerator;
use super::poll::{PollSchedule, Tick};
use super::report::write_outcomes;

/// Drives one bulk placement job from submission to report
///
/// Strictly sequential: one call in flight at a time, and the only wait is
/// the pause between status polls. Human-readable progress goes to `out`.
pub struct BulkJobRunner<'a, C: ?Sized, W> {
    client: &'a C,
    out: W,
    schedule: PollSchedule,
    cancel: watch::Receiver<bool>,
    /// Status queries made by the last `poll_until_done`
    polls: u32,
}

impl<'a, C, W> BulkJobRunner<'a, C, W>
where
    C: MutateJobService + ?Sized,
    W: Write,
{
    pub fn new(client: &'a C, out: W, schedule: PollSchedule, cancel: watch::Receiver<bool>) -> Self {
        Self {
            client,
            out,
            schedule,
            cancel,
            polls: 0,
        }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Submit `count` placements for `ad_group_id` as a single job
    ///
    /// # Returns
    /// - `Ok(JobId)` - Server-assigned job id
    /// - `Err(BulkJobError::Submission)` - Service returned no response
    pub async fn submit_batch(
        &mut self,
        ad_group_id: i64,
        count: usize,
        generator: &PlacementGenerator,
    ) -> Result<JobId, BulkJobError> {
        let operations = generator.build_operations(ad_group_id, count, &mut rand::thread_rng());
        info!(
            "Submitting job with {} operations for ad group {}",
            operations.len(),
            ad_group_id
        );

        // Up to 3 prerequisite jobs may be named; this one waits on none
        let policy = JobPolicy::default();

        let handle = self
            .client
            .mutate(&operations, &policy)
            .await?
            .ok_or(BulkJobError::Submission)?;

        writeln!(self.out, "Job ID {} was successfully created.", handle.id)?;
        Ok(handle.id)
    }

    /// Poll the job until it completes, fails or the schedule runs out
    ///
    /// Returns `Completed`, or the last non-terminal status once attempts are
    /// exhausted. `Pending` stands in when no attempt was made at all.
    pub async fn poll_until_done(&mut self, job_id: JobId) -> Result<JobStatus, BulkJobError> {
        let selector = JobSelector::single(job_id);
        let mut ticker = self.schedule.ticker();
        let mut last_status = JobStatus::Pending;

        writeln!(self.out, "Retrieving job status...")?;

        loop {
            let attempt = match ticker.tick(&mut self.cancel).await {
                Tick::Attempt(attempt) => attempt,
                Tick::Exhausted => break,
                Tick::Cancelled => {
                    warn!("Stopped polling job {} after {} attempts", job_id, ticker.attempts());
                    return Err(BulkJobError::Cancelled(job_id));
                }
            };

            let job = self
                .client
                .get(&selector)
                .await?
                .and_then(|jobs| jobs.into_iter().find(|job| job.id == job_id))
                .ok_or(BulkJobError::StatusQuery)?;

            last_status = job.status;
            match job.status {
                JobStatus::Failed => {
                    return Err(BulkJobError::JobFailed(job.failure_reason.unwrap_or_default()));
                }
                JobStatus::Completed => {
                    writeln!(self.out, "[{}] Job finished with status '{}'", attempt, job.status)?;
                    return Ok(job.status);
                }
                status if ticker.has_next() => {
                    writeln!(
                        self.out,
                        "[{}] Current status is '{}', waiting {} seconds to retry...",
                        attempt,
                        status,
                        self.schedule.interval.as_secs()
                    )?;
                }
                status => {
                    writeln!(self.out, "[{}] Current status is '{}'", attempt, status)?;
                }
            }
        }

        self.polls = ticker.attempts();
        Ok(last_status)
    }

    /// Fetch the result of a completed job and print it
    ///
    /// Returns the number of operation outcomes printed.
    pub async fn fetch_and_report(&mut self, job_id: JobId) -> Result<usize, BulkJobError> {
        let result = self
            .client
            .get_result(&JobSelector::single(job_id))
            .await?
            .and_then(|response| response.simple_mutate_result)
            .ok_or(BulkJobError::ResultRetrieval)?;

        write_outcomes(&mut self.out, &result)?;
        Ok(result.results.len())
    }

    /// Submit, poll, and report when the job completed
    pub async fn run(
        &mut self,
        ad_group_id: i64,
        count: usize,
        generator: &PlacementGenerator,
    ) -> Result<JobStatus, BulkJobError> {
        let job_id = self.submit_batch(ad_group_id, count, generator).await?;
        let status = self.poll_until_done(job_id).await?;

        if status == JobStatus::Completed {
            let reported = self.fetch_and_report(job_id).await?;
            if reported != count {
                warn!(
                    "Job {} returned {} outcomes for {} operations",
                    job_id, reported, count
                );
            }
        } else {
            writeln!(self.out, "Job failed to complete after {} retries", self.polls)?;
        }

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::job::models::{
        BulkMutateJob, JobHandle, JobResult, Operation, OperationResult, SimpleMutateResult,
    };
    use crate::client::ClientError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const JOB_ID: JobId = 77;

    /// Replays a fixed status sequence and counts calls
    struct ScriptedClient {
        handle: Option<JobHandle>,
        statuses: Mutex<VecDeque<Option<Vec<BulkMutateJob>>>>,
        result: Option<JobResult>,
        submitted: Mutex<Vec<usize>>,
        status_calls: AtomicUsize,
        result_calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(statuses: Vec<Option<Vec<BulkMutateJob>>>) -> Self {
            Self {
                handle: Some(JobHandle { id: JOB_ID }),
                statuses: Mutex::new(statuses.into()),
                result: None,
                submitted: Mutex::new(Vec::new()),
                status_calls: AtomicUsize::new(0),
                result_calls: AtomicUsize::new(0),
            }
        }

        fn with_sequence(statuses: &[JobStatus]) -> Self {
            Self::new(statuses.iter().map(|s| Some(vec![job(*s, None)])).collect())
        }

        fn with_result(mut self, result: Option<JobResult>) -> Self {
            self.result = result;
            self
        }

        fn status_calls(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }

        fn result_calls(&self) -> usize {
            self.result_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MutateJobService for ScriptedClient {
        async fn mutate(
            &self,
            operations: &[Operation],
            _policy: &JobPolicy,
        ) -> Result<Option<JobHandle>, ClientError> {
            self.submitted.lock().unwrap().push(operations.len());
            Ok(self.handle)
        }

        async fn get(&self, _selector: &JobSelector) -> Result<Option<Vec<BulkMutateJob>>, ClientError> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.statuses.lock().unwrap().pop_front().flatten())
        }

        async fn get_result(&self, _selector: &JobSelector) -> Result<Option<JobResult>, ClientError> {
            self.result_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn job(status: JobStatus, failure_reason: Option<&str>) -> BulkMutateJob {
        BulkMutateJob {
            id: JOB_ID,
            status,
            failure_reason: failure_reason.map(str::to_string),
        }
    }

    fn all_succeeded(n: usize) -> Option<JobResult> {
        Some(JobResult {
            simple_mutate_result: Some(SimpleMutateResult {
                results: vec![OperationResult::Succeeded; n],
                errors: vec![],
            }),
        })
    }

    fn runner(client: &ScriptedClient, max_attempts: u32) -> BulkJobRunner<'_, ScriptedClient, Vec<u8>> {
        let (_tx, cancel) = watch::channel(false);
        BulkJobRunner::new(
            client,
            Vec::new(),
            PollSchedule::new(Duration::ZERO, max_attempts),
            cancel,
        )
    }

    fn lines(runner: BulkJobRunner<'_, ScriptedClient, Vec<u8>>) -> Vec<String> {
        String::from_utf8(runner.into_output())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn completes_after_two_running_polls() {
        use JobStatus::*;
        let client = ScriptedClient::with_sequence(&[Processing, Processing, Completed])
            .with_result(all_succeeded(3));
        let mut runner = runner(&client, 30);

        let status = runner
            .run(9, 3, &PlacementGenerator::new(0.0))
            .await
            .unwrap();

        assert_eq!(status, Completed);
        assert_eq!(*client.submitted.lock().unwrap(), vec![3]);
        assert_eq!(client.status_calls(), 3);
        assert_eq!(client.result_calls(), 1);

        let output = lines(runner);
        assert_eq!(output[0], "Job ID 77 was successfully created.");
        assert!(output.contains(&"[0] Current status is 'PROCESSING', waiting 0 seconds to retry...".to_string()));
        assert!(output.contains(&"[2] Job finished with status 'COMPLETED'".to_string()));
        let outcome_lines = output.iter().filter(|l| l.starts_with("Operation [")).count();
        assert_eq!(outcome_lines, 3);
    }

    #[tokio::test]
    async fn failed_job_stops_after_one_poll() {
        let client = ScriptedClient::new(vec![
            Some(vec![job(JobStatus::Failed, Some("INTERNAL_ERROR"))]),
            Some(vec![job(JobStatus::Completed, None)]),
        ]);
        let mut runner = runner(&client, 30);

        let err = runner
            .run(9, 3, &PlacementGenerator::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BulkJobError::JobFailed(ref reason) if reason == "INTERNAL_ERROR"));
        assert_eq!(client.status_calls(), 1);
        assert_eq!(client.result_calls(), 0);
    }

    #[tokio::test]
    async fn exhausted_attempts_return_last_status() {
        use JobStatus::*;
        let client = ScriptedClient::with_sequence(&[Processing, Processing, Completed]);
        let mut runner = runner(&client, 2);

        let status = runner
            .run(9, 3, &PlacementGenerator::default())
            .await
            .unwrap();

        assert_eq!(status, Processing);
        assert_eq!(client.status_calls(), 2);
        assert_eq!(client.result_calls(), 0);
        let output = lines(runner);
        assert_eq!(output.last().unwrap(), "Job failed to complete after 2 retries");
        assert!(output.contains(&"[1] Current status is 'PROCESSING'".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_ends_polling_without_promising_a_retry() {
        let client = ScriptedClient::with_sequence(&[JobStatus::Processing; 30]);
        let (_tx, cancel) = watch::channel(false);
        let schedule = PollSchedule::new(Duration::from_secs(10), 30)
            .with_deadline(Some(Duration::from_secs(15)));
        let mut runner = BulkJobRunner::new(&client, Vec::new(), schedule, cancel);

        let status = runner
            .run(9, 3, &PlacementGenerator::default())
            .await
            .unwrap();

        assert_eq!(status, JobStatus::Processing);
        assert_eq!(client.status_calls(), 2);
        let output = lines(runner);
        assert!(output.contains(&"[0] Current status is 'PROCESSING', waiting 10 seconds to retry...".to_string()));
        assert!(output.contains(&"[1] Current status is 'PROCESSING'".to_string()));
        assert_eq!(output.last().unwrap(), "Job failed to complete after 2 retries");
    }

    #[tokio::test]
    async fn never_exceeds_max_attempts() {
        let client = ScriptedClient::with_sequence(&[JobStatus::Pending; 10]);
        let mut runner = runner(&client, 4);

        let status = runner.poll_until_done(JOB_ID).await.unwrap();

        assert_eq!(status, JobStatus::Pending);
        assert_eq!(client.status_calls(), 4);
    }

    #[tokio::test]
    async fn empty_submission_response_is_fatal() {
        let mut client = ScriptedClient::with_sequence(&[JobStatus::Completed]);
        client.handle = None;
        let mut runner = runner(&client, 30);

        let err = runner
            .run(9, 5, &PlacementGenerator::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BulkJobError::Submission));
        assert_eq!(*client.submitted.lock().unwrap(), vec![5]);
        assert_eq!(client.status_calls(), 0);
    }

    #[tokio::test]
    async fn empty_status_response_is_fatal_without_retry() {
        let client = ScriptedClient::new(vec![
            Some(vec![job(JobStatus::Processing, None)]),
            None,
            Some(vec![job(JobStatus::Completed, None)]),
        ]);
        let mut runner = runner(&client, 30);

        let err = runner.poll_until_done(JOB_ID).await.unwrap_err();

        assert!(matches!(err, BulkJobError::StatusQuery));
        assert_eq!(client.status_calls(), 2);
    }

    #[tokio::test]
    async fn status_list_without_our_job_is_fatal() {
        let mut other = job(JobStatus::Completed, None);
        other.id = JOB_ID + 1;
        let client = ScriptedClient::new(vec![Some(vec![other])]);
        let mut runner = runner(&client, 30);

        let err = runner.poll_until_done(JOB_ID).await.unwrap_err();
        assert!(matches!(err, BulkJobError::StatusQuery));
    }

    #[tokio::test]
    async fn missing_result_payload_is_fatal() {
        for result in [None, Some(JobResult::default())] {
            let client = ScriptedClient::with_sequence(&[JobStatus::Completed]).with_result(result);
            let mut runner = runner(&client, 30);

            let err = runner
                .run(9, 2, &PlacementGenerator::default())
                .await
                .unwrap_err();

            assert!(matches!(err, BulkJobError::ResultRetrieval));
            assert_eq!(client.result_calls(), 1);
        }
    }

    #[tokio::test]
    async fn cancelled_before_polling() {
        let client = ScriptedClient::with_sequence(&[JobStatus::Completed]);
        let (tx, cancel) = watch::channel(false);
        tx.send(true).unwrap();
        let mut runner = BulkJobRunner::new(
            &client,
            Vec::new(),
            PollSchedule::new(Duration::ZERO, 30),
            cancel,
        );

        let err = runner.poll_until_done(JOB_ID).await.unwrap_err();

        assert!(matches!(err, BulkJobError::Cancelled(JOB_ID)));
        assert_eq!(client.status_calls(), 0);
    }
}
