//! Shared HTTP plumbing.
//!
//! Every component builds its own short-lived [`reqwest::Client`]; nothing here keeps
//! connection state across requests. The helpers add:
//! * a consistent user agent and connect timeout
//! * status checking that keeps the failing URL
//! * cancellation of any in-flight request future

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{cookie::Jar, Client, Response};
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, Result};

/// User agent sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Upper bound for establishing a TCP/TLS connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a plain client with a total request timeout.
pub fn client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Config(format!("Failed to create client: {}", e)))
}

/// Build a client backed by a cookie jar.
///
/// No total timeout is set: callers set one per request so that long body streams
/// are not cut off by the API timeout.
pub fn client_with_cookies(jar: Arc<Jar>) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .cookie_provider(jar)
        .build()
        .map_err(|e| FetchError::Config(format!("Failed to create client: {}", e)))
}

/// Turn a non-success status into [`FetchError::HttpStatus`].
pub fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::HttpStatus {
            status,
            url: response.url().to_string(),
        })
    }
}

/// Await `future` unless `cancel` fires first.
///
/// On cancellation the future is dropped, which closes any in-flight connection.
pub async fn cancellable<T, F>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        result = future => result,
    }
}
