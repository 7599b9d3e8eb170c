use crate::api::validation::ErrorResponse;

/// Errors raised by the mutate job client
///
/// Transport failures and API exceptions are kept apart so the caller can
/// report them differently.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// The service rejected the request with a structured error body
    #[error("{}", .0.message)]
    Api(ErrorResponse),

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid API base URL: {0}")]
    BaseUrl(#[from] url::ParseError),
}
