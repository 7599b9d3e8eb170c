use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Root URL of the mutate job service
    /// Default: http://127.0.0.1:8080
    pub api_base_url: String,

    /// Bearer token sent with every request, if set
    pub api_token: Option<String>,

    pub request_timeout: Duration,

    /// Wait between two status polls
    /// Default: 30 seconds
    pub poll_interval: Duration,

    /// Status polls before giving up
    /// Default: 30
    pub max_poll_attempts: u32,

    /// Overall polling budget, unlimited when unset
    pub poll_timeout: Option<Duration>,

    /// Placements per job
    /// Default: 100
    pub placement_count: usize,

    /// Share of deliberately invalid placement URLs
    /// Default: 0.1
    pub invalid_url_ratio: f64,

    /// Directory for rolling log files
    pub log_dir: String,

    /// Sandbox listen address
    pub server_bind: String,

    /// Maximum payload size for all sandbox requests (in bytes)
    /// Default: 10MB (10 * 1024 * 1024)
    pub max_payload_size: usize,

    pub num_workers: usize,
    pub max_concurrent_jobs: usize,

    /// Probability that the sandbox fails a job outright
    pub job_failure_rate: f64,

    /// Upper bound of simulated processing time per job
    pub max_processing_delay: Duration,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, String> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("{} has an invalid value: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

/// Like `parse_or`, but only accepts a probability in [0, 1]
fn parse_rate(key: &str, default: f64) -> Result<f64, String> {
    let rate = parse_or(key, default)?;
    if (0.0..=1.0).contains(&rate) {
        Ok(rate)
    } else {
        Err(format!("{} must be between 0 and 1, got {}", key, rate))
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// All variables are optional:
    /// - API_BASE_URL, API_TOKEN, REQUEST_TIMEOUT_SECS (default: 30)
    /// - POLL_INTERVAL_SECS (default: 30), MAX_POLL_ATTEMPTS (default: 30), POLL_TIMEOUT_SECS
    /// - PLACEMENT_COUNT (default: 100), INVALID_URL_RATIO (default: 0.1)
    /// - LOG_DIR (default: logs)
    /// - SERVER_BIND (default: 127.0.0.1:8080), MAX_PAYLOAD_SIZE (default: 10485760 = 10MB)
    /// - NUM_WORKERS (default: 2), MAX_CONCURRENT_JOBS (default: 4)
    /// - JOB_FAILURE_RATE (default: 0.0), MAX_PROCESSING_DELAY_SECS (default: 5)
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        let api_token = env::var("API_TOKEN").ok().filter(|t| !t.is_empty());

        let poll_timeout = match env::var("POLL_TIMEOUT_SECS") {
            Ok(raw) => Some(Duration::from_secs(raw.trim().parse().map_err(|_| {
                format!("POLL_TIMEOUT_SECS has an invalid value: {:?}", raw)
            })?)),
            Err(_) => None,
        };

        Ok(Config {
            api_base_url: parse_or("API_BASE_URL", "http://127.0.0.1:8080".to_string())?,
            api_token,
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 30)?),
            poll_interval: Duration::from_secs(parse_or("POLL_INTERVAL_SECS", 30)?),
            max_poll_attempts: parse_or("MAX_POLL_ATTEMPTS", 30)?,
            poll_timeout,
            placement_count: parse_or("PLACEMENT_COUNT", 100)?,
            invalid_url_ratio: parse_rate("INVALID_URL_RATIO", 0.1)?,
            log_dir: parse_or("LOG_DIR", "logs".to_string())?,
            server_bind: parse_or("SERVER_BIND", "127.0.0.1:8080".to_string())?,
            max_payload_size: parse_or("MAX_PAYLOAD_SIZE", 10 * 1024 * 1024)?,
            num_workers: parse_or("NUM_WORKERS", 2)?,
            max_concurrent_jobs: parse_or("MAX_CONCURRENT_JOBS", 4)?,
            job_failure_rate: parse_rate("JOB_FAILURE_RATE", 0.0)?,
            max_processing_delay: Duration::from_secs(parse_or("MAX_PROCESSING_DELAY_SECS", 5)?),
        })
    }
}
