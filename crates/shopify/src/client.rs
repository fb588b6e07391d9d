use std::time::Duration;

use fitsync_core::config::ShopifyConfig;
use reqwest::{header::RETRY_AFTER, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("shopify credentials are not configured")]
    NotConfigured,
    #[error("customer id `{0}` is not a shopify customer id")]
    InvalidCustomerId(String),
    #[error("shopify request failed: {0}")]
    Transport(String),
    #[error("shopify returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("shopify response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 500, max_delay_ms: 10_000 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    fn retry_after(&self, seconds: u64) -> Duration {
        Duration::from_millis(seconds.saturating_mul(1_000).min(self.max_delay_ms))
    }
}

#[derive(Clone)]
enum Credentials {
    Basic { api_key: String, password: SecretString },
    AccessToken(SecretString),
}

/// Admin REST client bound to a single store and API version.
#[derive(Clone)]
pub struct ShopifyClient {
    http: reqwest::Client,
    admin_url: String,
    credentials: Credentials,
    retry_policy: RetryPolicy,
}

impl ShopifyClient {
    pub fn from_config(config: &ShopifyConfig) -> Result<Self, SyncError> {
        if !config.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        let admin_url = config.admin_api_url().ok_or(SyncError::NotConfigured)?;

        let credentials = match (&config.access_token, &config.api_key, &config.password) {
            (Some(token), _, _) => Credentials::AccessToken(token.clone()),
            (None, Some(api_key), Some(password)) => {
                Credentials::Basic { api_key: api_key.clone(), password: password.clone() }
            }
            _ => return Err(SyncError::NotConfigured),
        };

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| SyncError::Transport(error.to_string()))?;

        Ok(Self {
            http,
            admin_url,
            credentials,
            retry_policy: RetryPolicy {
                max_retries: config.max_retries,
                ..RetryPolicy::default()
            },
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn admin_url(&self) -> &str {
        &self.admin_url
    }

    /// POSTs `body` to `{admin_url}/{path}`, retrying transport failures, 429 and 5xx.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SyncError> {
        let url = format!("{}/{}", self.admin_url, path.trim_start_matches('/'));
        let mut attempt = 0;

        loop {
            let request = self.authorize(self.http.post(&url)).json(body);
            let (error, delay) = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response
                            .text()
                            .await
                            .map_err(|error| SyncError::Decode(error.to_string()))?;
                        if text.trim().is_empty() {
                            return Ok(Value::Null);
                        }
                        return serde_json::from_str(&text)
                            .map_err(|error| SyncError::Decode(error.to_string()));
                    }

                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|value| value.to_str().ok())
                        .and_then(|value| value.trim().parse::<f64>().ok())
                        .map(|seconds| self.retry_policy.retry_after(seconds.ceil() as u64));
                    let body = response.text().await.unwrap_or_default();
                    let error = SyncError::Status { status: status.as_u16(), body };

                    if !is_retryable(status) {
                        return Err(error);
                    }
                    (error, retry_after.unwrap_or_else(|| self.retry_policy.backoff(attempt)))
                }
                Err(error) => {
                    (SyncError::Transport(error.to_string()), self.retry_policy.backoff(attempt))
                }
            };

            if attempt >= self.retry_policy.max_retries {
                return Err(error);
            }

            warn!(
                event_name = "shopify.request.retrying",
                attempt,
                max_retries = self.retry_policy.max_retries,
                path,
                error = %error,
                "shopify request failed; retrying"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Credentials::Basic { api_key, password } => {
                request.basic_auth(api_key, Some(password.expose_secret()))
            }
            Credentials::AccessToken(token) => {
                request.header(ACCESS_TOKEN_HEADER, token.expose_secret())
            }
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}
