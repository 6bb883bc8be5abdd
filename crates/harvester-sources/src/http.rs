//! HTTP plumbing shared by the source clients.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::SourceError;

/// Default user agent when a source does not configure one.
pub(crate) const DEFAULT_USER_AGENT: &str = "oth-datapipeline";

/// Build a client with a total request timeout and a shorter connect timeout.
pub(crate) fn build_client(timeout_secs: u64, user_agent: &str) -> Result<Client, SourceError> {
    let timeout = Duration::from_secs(timeout_secs.max(1));
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(user_agent)
        .build()
        .map_err(SourceError::from)
}

/// Build a client for long-lived streaming responses: only connecting is
/// bounded, the body may stay open indefinitely.
pub(crate) fn build_streaming_client(
    connect_timeout_secs: u64,
    user_agent: &str,
) -> Result<Client, SourceError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs.max(1)))
        .user_agent(user_agent)
        .build()
        .map_err(SourceError::from)
}

/// Map non-2xx responses to typed errors, passing successful ones through.
pub(crate) fn ensure_success(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(SourceError::RateLimited {
            url,
            retry_after_secs,
        });
    }

    Err(SourceError::UnexpectedStatus {
        status: status.as_u16(),
        url,
    })
}

/// Read a successful response body as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    context: &str,
) -> Result<T, SourceError> {
    let body = ensure_success(response)?.text().await?;
    serde_json::from_str(&body).map_err(|e| SourceError::Deserialize {
        context: context.to_string(),
        source: e,
    })
}
