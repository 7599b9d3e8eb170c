use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{ClientError, MutateJobService};
use crate::api::job::models::{BulkMutateJob, JobHandle, JobPolicy, JobResult, JobSelector, Operation};
use crate::api::validation::ErrorResponse;

#[derive(Serialize)]
struct MutateBody<'a> {
    operations: &'a [Operation],
    policy: &'a JobPolicy,
}

/// JSON-over-HTTP client for the mutate job API
pub struct HttpMutateJobClient {
    http: reqwest::Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpMutateJobClient {
    /// Create a client rooted at `base_url`
    ///
    /// # Parameters
    /// - `base_url`: service root, e.g. `http://127.0.0.1:8080`
    /// - `token`: sent as a bearer token when present
    /// - `timeout`: per-request timeout
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ClientError> {
        // Url::join drops the last path segment unless the base ends with '/'
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        debug!("POST {}", url);

        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            debug!("{} returned no content", path);
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await?;
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(api_error) => ClientError::Api(api_error),
                Err(_) => ClientError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        // A JSON `null` body decodes to None
        Ok(serde_json::from_slice::<Option<T>>(&bytes)?)
    }
}

#[async_trait]
impl MutateJobService for HttpMutateJobClient {
    async fn mutate(
        &self,
        operations: &[Operation],
        policy: &JobPolicy,
    ) -> Result<Option<JobHandle>, ClientError> {
        self.post("jobs", &MutateBody { operations, policy }).await
    }

    async fn get(&self, selector: &JobSelector) -> Result<Option<Vec<BulkMutateJob>>, ClientError> {
        self.post("jobs/status", selector).await
    }

    async fn get_result(&self, selector: &JobSelector) -> Result<Option<JobResult>, ClientError> {
        self.post("jobs/result", selector).await
    }
}
