//! Shared HTTP plumbing for the API clients.
//!
//! Every client talks JSON over `reqwest`, authenticates with a fixed header
//! and retries transient failures with bounded exponential backoff.

use std::time::Duration;

use log::{debug, warn};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use timesync_core::errors::{ApiError, Error, Result};

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of retries for transient failures.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retry policy for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retries).
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
        attempt < self.max_retries && error.is_transient()
    }

    /// `min(base * 2^attempt, max)` plus up to 25% random jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponential = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay_ms);
        let jitter = if exponential >= 4 {
            rand::thread_rng().gen_range(0..=exponential / 4)
        } else {
            0
        };
        Duration::from_millis(exponential + jitter)
    }
}

/// How requests authenticate.
#[derive(Clone)]
pub enum Auth {
    Bearer(String),
    Basic { user: String, password: String },
}

/// A JSON API client bound to one base URL.
#[derive(Clone)]
pub struct HttpClient {
    service: &'static str,
    client: reqwest::Client,
    base_url: String,
    auth_header: Option<HeaderValue>,
    basic: Option<(String, String)>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Raw response body with its status.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    pub fn json<T: DeserializeOwned>(&self, service: &str) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            Error::Api(ApiError::Decode {
                service: service.to_string(),
                message: format!("{} - {}", e, truncate(&self.body)),
            })
        })
    }
}

impl HttpClient {
    /// Creates a client for `service` rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials cannot be used as a header value or
    /// the HTTP client cannot be initialized.
    pub fn new(
        service: &'static str,
        base_url: &str,
        auth: Auth,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let (auth_header, basic) = match auth {
            Auth::Bearer(token) => {
                let header = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e| {
                    Error::InvalidConfigValue(format!("Invalid {} API token: {}", service, e))
                })?;
                (Some(header), None)
            }
            Auth::Basic { user, password } => (None, Some((user, password))),
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Unexpected(format!("Failed to initialize HTTP client: {}", e)))?;

        Ok(Self {
            service,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_header,
            basic,
            retry,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(auth) = &self.auth_header {
            headers.insert(AUTHORIZATION, auth.clone());
        }
        headers
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        self.send(Method::GET, path, query, None::<&()>)
            .await?
            .json(self.service)
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(Method::POST, path, &[], Some(body))
            .await?
            .json(self.service)
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(Method::PUT, path, &[], Some(body))
            .await?
            .json(self.service)
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, &[], None::<&()>).await?;
        Ok(())
    }

    /// Sends a request, retrying transient failures. Non-2xx responses
    /// become [`ApiError::Status`].
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;
        loop {
            debug!("[{}] {} {}", self.service, method, url);
            match self.send_once(method.clone(), &url, query, body).await {
                Ok(response) => return Ok(response),
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "[{}] {} {} failed ({}), retrying in {:?}",
                        self.service, method, url, error, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(Error::Api(error)),
            }
        }
    }

    async fn send_once<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> std::result::Result<RawResponse, ApiError> {
        let mut request = self
            .client
            .request(method, url)
            .headers(self.headers())
            .query(query);
        if let Some((user, password)) = &self.basic {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(ApiError::Status {
                service: self.service.to_string(),
                status: status.as_u16(),
                message: error_message(status, &body),
            });
        }
        Ok(RawResponse { status, body })
    }

    fn transport_error(&self, error: reqwest::Error) -> ApiError {
        let service = self.service.to_string();
        let message = error.to_string();
        if error.is_timeout() {
            ApiError::Timeout { service, message }
        } else if error.is_connect() || error.is_request() || error.is_body() {
            ApiError::Connection { service, message }
        } else if error.is_decode() {
            ApiError::Decode { service, message }
        } else {
            ApiError::InvalidRequest { service, message }
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorMessages")]
    error_messages: Vec<String>,
}

/// Best human-readable message of an error response.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(err) = serde_json::from_str::<ApiErrorResponse>(body) {
        if let Some(msg) = err
            .message
            .or(err.error)
            .or_else(|| err.error_messages.into_iter().next())
        {
            return msg;
        }
    }
    if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        truncate(body)
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ApiError {
        ApiError::Status {
            service: "test".to_string(),
            status: code,
            message: String::new(),
        }
    }

    #[test]
    fn test_client_url_normalization() {
        let client = HttpClient::new(
            "test",
            "https://example.com/",
            Auth::Bearer("token".to_string()),
            Duration::from_secs(5),
            RetryPolicy::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://example.com");
    }

    #[test]
    fn test_invalid_token_is_rejected() {
        let result = HttpClient::new(
            "test",
            "https://example.com",
            Auth::Bearer("bad\ntoken".to_string()),
            Duration::from_secs(5),
            RetryPolicy::default(),
        );
        assert!(matches!(result, Err(Error::InvalidConfigValue(_))));
    }

    #[test]
    fn test_retry_only_transient_errors() {
        let policy = RetryPolicy::new(2);
        assert!(policy.should_retry(0, &status(503)));
        assert!(policy.should_retry(1, &status(429)));
        assert!(!policy.should_retry(2, &status(503)));
        assert!(!policy.should_retry(0, &status(400)));
        assert!(!policy.should_retry(0, &status(404)));
    }

    #[test]
    fn test_delay_grows_and_is_capped() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let first = policy.delay_for(0).as_millis();
        assert!((100..=125).contains(&first));
        let third = policy.delay_for(2).as_millis();
        assert!((400..=500).contains(&third));
        let capped = policy.delay_for(9).as_millis();
        assert!((1_000..=1_250).contains(&capped));
    }

    #[test]
    fn test_error_message_prefers_json_fields() {
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"message":"Time entry not found"}"#),
            "Time entry not found"
        );
        assert_eq!(
            error_message(
                StatusCode::BAD_REQUEST,
                r#"{"errorMessages":["Issue does not exist"],"errors":{}}"#
            ),
            "Issue does not exist"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "HTTP 502 Bad Gateway");
    }
}
