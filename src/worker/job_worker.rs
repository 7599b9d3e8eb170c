use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::api::job::models::{Criterion, Operation, OperationError, OperationResult, SimpleMutateResult};
use crate::db::job_store::JobStore;
use crate::db::models::JobRecord;

/// Error reason for a placement whose URL is not an absolute http(s) URL
pub const INVALID_URL_REASON: &str = "INVALID_URL";

/// Failure reason for jobs the sandbox fails at random
pub const INTERNAL_ERROR_REASON: &str = "INTERNAL_ERROR";

/// Knobs for simulated processing
#[derive(Clone, Debug)]
pub struct WorkerSettings {
    /// Probability in [0, 1] that a job fails outright
    pub failure_rate: f64,
    /// Upper bound of the random processing delay
    pub max_processing_delay: Duration,
    /// Sleep between polls of an empty queue
    pub idle_sleep: Duration,
}

impl WorkerSettings {
    /// `failure_rate` clamped to [0, 1]; NaN counts as never failing
    pub fn failure_probability(&self) -> f64 {
        if self.failure_rate.is_nan() {
            0.0
        } else {
            self.failure_rate.clamp(0.0, 1.0)
        }
    }
}

/// Background worker for processing jobs
pub struct JobWorker {
    store: Arc<JobStore>,
    settings: WorkerSettings,
}

impl JobWorker {
    /// Create a new JobWorker instance
    pub fn new(store: Arc<JobStore>, settings: WorkerSettings) -> Self {
        Self { store, settings }
    }

    /// Run worker with semaphore-based bounded concurrency
    ///
    /// # Architecture
    /// - Acquires a semaphore permit, then claims the next runnable job
    /// - Spawns a task per job; the permit is released when the task ends
    /// - Each task sleeps a random delay, then completes or fails the job
    /// - Sleeps `idle_sleep` when no job is runnable
    ///
    /// On shutdown the worker stops claiming jobs and waits for its in-flight
    /// tasks before returning.
    pub async fn run(
        &self,
        worker_id: usize,
        semaphore: Arc<Semaphore>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("Worker {} started with semaphore-based concurrency", worker_id);
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                info!("Worker {} received shutdown signal", worker_id);
                break;
            }

            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => permit,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let permit = match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Worker {} failed to acquire semaphore: {:?}", worker_id, e);
                    break;
                }
            };

            match self.store.acquire_next_job().await {
                Some(job) => {
                    info!(
                        "Worker {} acquired job: id={}, operations={}",
                        worker_id,
                        job.id,
                        job.operations.len()
                    );

                    let store = self.store.clone();
                    let settings = self.settings.clone();
                    in_flight.spawn(async move {
                        process_job(&store, &settings, job).await;
                        drop(permit);
                    });
                }
                None => {
                    drop(permit);
                    debug!("Worker {} found no runnable jobs, sleeping...", worker_id);
                    tokio::select! {
                        _ = sleep(self.settings.idle_sleep) => {}
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        let remaining = in_flight.len();
        if remaining > 0 {
            info!("Worker {} waiting for {} in-flight jobs", worker_id, remaining);
        }
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                error!("Worker {} job task panicked: {:?}", worker_id, e);
            }
        }
        info!("Worker {} stopped", worker_id);
    }
}

async fn process_job(store: &JobStore, settings: &WorkerSettings, job: JobRecord) {
    let (delay_ms, fails) = {
        let mut rng = rand::thread_rng();
        let max_ms = settings.max_processing_delay.as_millis() as u64;
        (
            rng.gen_range(0..=max_ms),
            rng.gen_bool(settings.failure_probability()),
        )
    };

    debug!("Processing job {} for {} ms", job.id, delay_ms);
    sleep(Duration::from_millis(delay_ms)).await;

    if fails {
        match store.fail(job.id, INTERNAL_ERROR_REASON).await {
            Ok(_) => warn!("Job {} failed: {}", job.id, INTERNAL_ERROR_REASON),
            Err(e) => error!("Failed to update job {}: {}", job.id, e),
        }
        return;
    }

    let result = evaluate_operations(&job.operations);
    let failed = result.errors.len();
    match store.complete(job.id, result).await {
        Ok(_) => info!(
            "Completed job {}: {} operations, {} failed, {} ms after submission",
            job.id,
            job.operation_count,
            failed,
            (Utc::now() - job.created_at).num_milliseconds()
        ),
        Err(e) => error!("Failed to update job {}: {}", job.id, e),
    }
}

/// Apply every operation, producing one outcome per operation in order
pub fn evaluate_operations(operations: &[Operation]) -> SimpleMutateResult {
    let mut result = SimpleMutateResult::default();

    for (index, operation) in operations.iter().enumerate() {
        let Criterion::Placement { url } = &operation.operand.criterion;
        if is_valid_placement_url(url) {
            result.results.push(OperationResult::Succeeded);
        } else {
            result.results.push(OperationResult::PlaceHolder);
            result.errors.push(OperationError {
                reason: INVALID_URL_REASON.to_string(),
                trigger: url.clone(),
                field_path: format!("operations[{}].operand.criterion.url", index),
            });
        }
    }

    result
}

fn is_valid_placement_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}
