//! HTTP client for the server's customer API.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use url::Url;

/// Connection timeout for HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Base delay between readiness-poll attempts.
const READY_BACKOFF: Duration = Duration::from_millis(250);

/// Errors from flow operations.
#[derive(thiserror::Error, Debug)]
pub enum FlowError {
    /// The request could not be sent or the response not read.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("server returned {status} for {path}")]
    Status {
        status: reqwest::StatusCode,
        path: String,
    },
    /// An endpoint path did not resolve against the base URL.
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The server asked for authorization but sent no URL to visit.
    #[error("authorization response did not include an authorization URL")]
    MissingAuthorizationUrl,
    /// The server never accepted a connection during readiness polling.
    #[error("server not ready after {0} attempts")]
    NotReady(u32),
    /// Reading the verification code from the operator failed.
    #[error("failed to read verification code: {0}")]
    Prompt(#[from] std::io::Error),
}

/// Authentication status returned by the auth endpoint.
///
/// The server answers `{"status": "authorize", "authorizationUrl": ...}`
/// when the operator must visit a URL to obtain a verification code,
/// and `{"status": "success"}` when the session is already authorized.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthStatus {
    /// `"authorize"` or `"success"`.
    pub status: String,
    /// URL to visit for a verification code, present when required.
    #[serde(rename = "authorizationUrl")]
    pub authorization_url: Option<String>,
}

impl AuthStatus {
    /// Whether the operator must complete the authorization step.
    ///
    /// Any status other than `"authorize"` is treated as already
    /// authorized.
    #[must_use]
    pub fn needs_authorization(&self) -> bool {
        self.status == "authorize"
    }
}

/// Client for the customer auth and accounts endpoints.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client against the given base URL.
    #[must_use]
    pub fn new(base_url: Url, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(request_timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self { client, base_url }
    }

    fn endpoint(&self, customer: &str, resource: &str) -> Result<Url, FlowError> {
        Ok(self
            .base_url
            .join(&format!("customers/{customer}/{resource}"))?)
    }

    /// Poll the server until it accepts a connection, with backoff.
    ///
    /// Any HTTP response counts as ready; only connection failures are
    /// retried. Replaces the fixed startup sleep with a bounded loop.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::NotReady` when all attempts fail.
    pub async fn wait_ready(&self, attempts: u32) -> Result<(), FlowError> {
        for attempt in 0..attempts {
            match self.client.get(self.base_url.clone()).send().await {
                Ok(_) => {
                    tracing::debug!(attempt, "server is accepting connections");
                    return Ok(());
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "server not ready yet");
                }
            }
            if attempt + 1 < attempts {
                // Exponential backoff: 250ms, 500ms, 1s, ...
                tokio::time::sleep(READY_BACKOFF * 2u32.pow(attempt.min(4))).await;
            }
        }
        Err(FlowError::NotReady(attempts))
    }

    /// Begin authentication for the customer.
    ///
    /// POSTs to the auth endpoint with no body and parses the status
    /// response.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` on transport failure, non-success status, or
    /// an unparseable response.
    pub async fn begin_auth(&self, customer: &str) -> Result<AuthStatus, FlowError> {
        let url = self.endpoint(customer, "auth")?;
        let response = self.client.post(url.clone()).send().await?;
        let response = ensure_success(response, url.path())?;
        Ok(response.json().await?)
    }

    /// Complete authentication with a verification code.
    ///
    /// POSTs the code as the `verifyCode` form field; the response body
    /// is ignored.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` on transport failure or non-success status.
    pub async fn verify(&self, customer: &str, code: &str) -> Result<(), FlowError> {
        let url = self.endpoint(customer, "auth")?;
        let response = self
            .client
            .post(url.clone())
            .form(&[("verifyCode", code)])
            .send()
            .await?;
        ensure_success(response, url.path())?;
        Ok(())
    }

    /// Fetch the customer's account list as raw response text.
    ///
    /// # Errors
    ///
    /// Returns `FlowError` on transport failure or non-success status.
    pub async fn list_accounts(&self, customer: &str) -> Result<String, FlowError> {
        let url = self.endpoint(customer, "accounts")?;
        let response = self.client.get(url.clone()).send().await?;
        let response = ensure_success(response, url.path())?;
        Ok(response.text().await?)
    }
}

/// Map a non-success status to `FlowError::Status`.
fn ensure_success(
    response: reqwest::Response,
    path: &str,
) -> Result<reqwest::Response, FlowError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FlowError::Status {
            status,
            path: path.to_string(),
        })
    }
}
