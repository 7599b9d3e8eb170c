use actix_web::{App, HttpServer, web};
use clap::{Args, Parser, Subcommand};
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer, filter::LevelFilter};
mod api;
use crate::api::{
    health::health_config,
    job::{handlers::job_config, JobService},
    validation,
};
mod bulk;
mod client;
mod config;
mod db;
mod shutdown;
mod worker;
use crate::bulk::{report::write_failure, BulkJobError, BulkJobRunner, PlacementGenerator, PollSchedule};
use crate::client::HttpMutateJobClient;
use crate::db::job_store::JobStore;
use crate::shutdown::{shutdown_signal, ShutdownCoordinator};
use crate::worker::{JobWorker, WorkerSettings};

#[derive(Parser)]
#[command(author, version, about = "Add placements in bulk through an asynchronous mutate job", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a bulk placement job, wait for it and print its results
    Submit(SubmitArgs),
    /// Run the sandbox mutate job service
    Serve {
        /// Listen address, overrides SERVER_BIND
        #[arg(long)]
        bind: Option<String>,
    },
}

#[derive(Args)]
struct SubmitArgs {
    /// Ad group receiving the placements
    #[arg(long)]
    ad_group_id: i64,
    /// Placements per job, overrides PLACEMENT_COUNT
    #[arg(long)]
    count: Option<usize>,
    /// Seconds between status polls, overrides POLL_INTERVAL_SECS
    #[arg(long)]
    interval: Option<u64>,
    /// Status polls before giving up, overrides MAX_POLL_ATTEMPTS
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Share of invalid placement URLs (0.0 to 1.0), overrides INVALID_URL_RATIO
    #[arg(long)]
    invalid_ratio: Option<f64>,
    /// Overall polling budget in seconds, overrides POLL_TIMEOUT_SECS
    #[arg(long)]
    timeout: Option<u64>,
    /// Service root URL, overrides API_BASE_URL
    #[arg(long)]
    api_base_url: Option<String>,
}

/// Console on stderr plus daily rolling files per level
///
/// Log files are created as: logs/info.log.2024-12-22, logs/error.log.2024-12-22, etc.
fn init_tracing(log_dir: &str) -> io::Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());

    let info_file = tracing_appender::rolling::daily(log_dir, "info.log");
    let warn_file = tracing_appender::rolling::daily(log_dir, "warn.log");
    let error_file = tracing_appender::rolling::daily(log_dir, "error.log");
    let debug_file = tracing_appender::rolling::daily(log_dir, "debug.log");

    let info_layer = tracing_subscriber::fmt::layer()
        .with_writer(info_file)
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    let warn_layer = tracing_subscriber::fmt::layer()
        .with_writer(warn_file)
        .with_ansi(false)
        .with_filter(LevelFilter::WARN);

    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_file)
        .with_ansi(false)
        .with_filter(LevelFilter::ERROR);

    let debug_layer = tracing_subscriber::fmt::layer()
        .with_writer(debug_file)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    // stdout carries the job report
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(info_layer)
        .with(warn_layer)
        .with(error_layer)
        .with(debug_layer)
        .init();

    Ok(())
}

#[actix_web::main]
async fn main() -> io::Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration from environment
    let config = config::Config::from_env()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    init_tracing(&config.log_dir)?;

    match cli.command {
        Commands::Submit(args) => submit(config, args).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server_bind.clone());
            serve(config, bind).await
        }
    }
}

/// Effective settings of one submit run
#[derive(Debug, PartialEq)]
struct SubmitPlan {
    base_url: String,
    count: usize,
    generator: PlacementGenerator,
    schedule: PollSchedule,
}

impl SubmitArgs {
    /// Command-line flags win over configured values
    fn plan(&self, config: &config::Config) -> SubmitPlan {
        let schedule = PollSchedule::new(
            self.interval.map(Duration::from_secs).unwrap_or(config.poll_interval),
            self.max_attempts.unwrap_or(config.max_poll_attempts),
        )
        .with_deadline(self.timeout.map(Duration::from_secs).or(config.poll_timeout));

        SubmitPlan {
            base_url: self
                .api_base_url
                .clone()
                .unwrap_or_else(|| config.api_base_url.clone()),
            count: self.count.unwrap_or(config.placement_count),
            generator: PlacementGenerator::new(self.invalid_ratio.unwrap_or(config.invalid_url_ratio)),
            schedule,
        }
    }
}

async fn submit(config: config::Config, args: SubmitArgs) -> io::Result<ExitCode> {
    let SubmitPlan {
        base_url,
        count,
        generator,
        schedule,
    } = args.plan(&config);

    info!("Submitting {} placements to ad group {} via {}", count, args.ad_group_id, base_url);
    info!(
        "Polling every {}s, at most {} attempts",
        schedule.interval.as_secs(),
        schedule.max_attempts
    );

    // CTRL+C stops polling instead of killing the process mid-request
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let signal_task = tokio::spawn(async move {
        if shutdown_signal().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let outcome = match HttpMutateJobClient::new(&base_url, config.api_token, config.request_timeout) {
        Ok(client) => {
            let mut runner = BulkJobRunner::new(&client, io::stdout(), schedule, cancel_rx);
            runner.run(args.ad_group_id, count, &generator).await
        }
        Err(e) => Err(BulkJobError::from(e)),
    };
    signal_task.abort();

    match outcome {
        Ok(status) => {
            info!("Bulk placement run finished with job status {}", status);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("Bulk placement run failed: {}", err);
            write_failure(&mut io::stdout(), &err)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn serve(config: config::Config, bind: String) -> io::Result<ExitCode> {
    info!("Starting sandbox mutate job service");
    info!("Configuration loaded successfully:");
    info!("  - Max payload size: {} bytes", config.max_payload_size);
    info!("  - Max concurrent jobs: {}", config.max_concurrent_jobs);
    info!("  - Number of workers: {}", config.num_workers);
    info!("  - Job failure rate: {}", config.job_failure_rate);

    let store = Arc::new(JobStore::new());

    // watch channel allows multiple receivers to get the same value
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn background workers with semaphore-based bounded concurrency
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
    let settings = WorkerSettings {
        failure_rate: config.job_failure_rate,
        max_processing_delay: config.max_processing_delay,
        idle_sleep: Duration::from_millis(500),
    };
    let mut worker_handles = Vec::new();

    for worker_id in 1..=config.num_workers {
        let worker_store = store.clone();
        let worker_settings = settings.clone();
        let worker_semaphore = semaphore.clone();
        let worker_shutdown_rx = shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            let job_worker = JobWorker::new(worker_store, worker_settings);
            job_worker.run(worker_id, worker_semaphore, worker_shutdown_rx).await;
        });

        worker_handles.push(handle);
        info!("Spawned worker {}", worker_id);
    }

    let max_payload_size = config.max_payload_size;
    let server_store = store.clone();

    let server = HttpServer::new(move || {
        let job_service = web::Data::new(JobService::new(server_store.clone()));

        App::new()
            .app_data(job_service)
            .app_data(web::PayloadConfig::default().limit(max_payload_size))
            .app_data(validation::json_config().limit(max_payload_size))
            .configure(health_config)
            .configure(job_config)
    });

    info!("Server starting on http://{}", bind);

    let server = server.bind(bind.as_str())?.run();
    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    let coordinator = ShutdownCoordinator::new(
        server_handle,
        server_task,
        worker_handles,
        shutdown_tx,
    );

    coordinator.wait_for_shutdown().await?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::job::models::JobStatus;

    fn test_config() -> config::Config {
        config::Config {
            api_base_url: "http://configured:8080".to_string(),
            api_token: None,
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            max_poll_attempts: 30,
            poll_timeout: Some(Duration::from_secs(600)),
            placement_count: 100,
            invalid_url_ratio: 0.1,
            log_dir: "logs".to_string(),
            server_bind: "127.0.0.1:8080".to_string(),
            max_payload_size: 1024,
            num_workers: 1,
            max_concurrent_jobs: 1,
            job_failure_rate: 0.0,
            max_processing_delay: Duration::ZERO,
        }
    }

    fn submit_args(extra: &[&str]) -> SubmitArgs {
        let argv = ["placement-bulk-job", "submit", "--ad-group-id", "42"]
            .into_iter()
            .chain(extra.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Submit(args) => args,
            Commands::Serve { .. } => panic!("parsed as serve"),
        }
    }

    #[test]
    fn submit_without_flags_uses_config() {
        let config = test_config();
        let plan = submit_args(&[]).plan(&config);

        assert_eq!(
            plan,
            SubmitPlan {
                base_url: "http://configured:8080".to_string(),
                count: 100,
                generator: PlacementGenerator::new(0.1),
                schedule: PollSchedule::new(Duration::from_secs(30), 30)
                    .with_deadline(Some(Duration::from_secs(600))),
            }
        );
    }

    #[test]
    fn submit_flags_override_config() {
        let config = test_config();
        let args = submit_args(&[
            "--count",
            "7",
            "--interval",
            "2",
            "--max-attempts",
            "5",
            "--invalid-ratio",
            "0.5",
            "--timeout",
            "9",
            "--api-base-url",
            "http://flag:9000",
        ]);
        assert_eq!(args.ad_group_id, 42);

        let plan = args.plan(&config);

        assert_eq!(plan.base_url, "http://flag:9000");
        assert_eq!(plan.count, 7);
        assert_eq!(plan.generator, PlacementGenerator::new(0.5));
        assert_eq!(
            plan.schedule,
            PollSchedule::new(Duration::from_secs(2), 5).with_deadline(Some(Duration::from_secs(9)))
        );
    }

    #[actix_web::test]
    async fn submit_against_sandbox_end_to_end() {
        let store = Arc::new(JobStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker_store = store.clone();
        let worker = tokio::spawn(async move {
            let settings = WorkerSettings {
                failure_rate: 0.0,
                max_processing_delay: Duration::ZERO,
                idle_sleep: Duration::from_millis(10),
            };
            JobWorker::new(worker_store, settings)
                .run(1, Arc::new(Semaphore::new(2)), shutdown_rx)
                .await;
        });

        let server_store = store.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(JobService::new(server_store.clone())))
                .app_data(validation::json_config())
                .configure(health_config)
                .configure(job_config)
        })
        .workers(1)
        .bind("127.0.0.1:0")
        .unwrap();
        let addr = server.addrs()[0];
        let server = server.run();
        let server_handle = server.handle();
        tokio::spawn(server);

        let client =
            HttpMutateJobClient::new(&format!("http://{}", addr), None, Duration::from_secs(5)).unwrap();
        let (_cancel_tx, cancel) = watch::channel(false);
        let mut runner = BulkJobRunner::new(
            &client,
            Vec::new(),
            PollSchedule::new(Duration::from_millis(20), 250),
            cancel,
        );

        let status = runner
            .run(42, 10, &PlacementGenerator::new(1.0))
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Completed);

        let output = String::from_utf8(runner.into_output()).unwrap();
        assert!(output.lines().any(|l| l == "Operation [9] - FAILED"));
        assert_eq!(output.lines().filter(|l| l.starts_with("Operation [")).count(), 10);
        assert_eq!(
            output
                .lines()
                .filter(|l| l.starts_with("Error, reason: 'INVALID_URL', trigger: 'invalid-url'"))
                .count(),
            10
        );

        server_handle.stop(true).await;
        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
