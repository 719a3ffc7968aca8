// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of rendered payloads.
//!
//! One [`DeliveryClient`] owns a pooled `reqwest::Client` and is shared by
//! every delivery task. A delivery never reports an error to its caller:
//! failures are logged and summarized in the returned [`DeliveryOutcome`].

use crate::config::RestOutputConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::retry::RetryPolicy;
use crate::template::{self, SubstitutionContext};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, HOST};
use reqwest::{Response, StatusCode, Url};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One event's payload and the values needed to resolve its destination.
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub payload: Bytes,
    pub context: SubstitutionContext,
}

impl DeliveryTask {
    pub fn new(payload: impl Into<Bytes>, context: SubstitutionContext) -> Self {
        Self {
            payload: payload.into(),
            context,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The collector answered 2xx or 3xx.
    Delivered { status: StatusCode, attempts: u32 },
    /// The collector answered with a status that is final, either because it
    /// is not retryable or because retries ran out.
    Rejected { status: StatusCode, attempts: u32 },
    /// No response was obtained on the last attempt.
    Failed { reason: String, attempts: u32 },
}

impl DeliveryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            DeliveryOutcome::Delivered { attempts, .. }
            | DeliveryOutcome::Rejected { attempts, .. }
            | DeliveryOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// Performs a delivery task. Implemented by [`DeliveryClient`]; the
/// dispatcher only depends on this trait.
#[async_trait]
pub trait Deliver: Send + Sync {
    async fn deliver(&self, task: DeliveryTask) -> DeliveryOutcome;
}

pub struct DeliveryClientConfig {
    pub url_template: String,
    pub token: Option<String>,
    pub content_type: String,
    pub max_pool_size: usize,
    pub timeout: Option<Duration>,
    pub https_proxy: Option<String>,
    pub retry_policy: RetryPolicy,
    pub silent: bool,
}

impl From<&RestOutputConfig> for DeliveryClientConfig {
    fn from(config: &RestOutputConfig) -> Self {
        Self {
            url_template: config.rest_host.trim().to_string(),
            token: config.rest_token.clone(),
            content_type: config.content_type.clone(),
            max_pool_size: config.max_pool_size,
            timeout: config.request_timeout(),
            https_proxy: config.https_proxy.clone(),
            retry_policy: config.retry_policy(),
            silent: config.silent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
    url_template: String,
    retry_policy: RetryPolicy,
    silent: bool,
}

impl DeliveryClient {
    pub fn new(config: DeliveryClientConfig) -> Result<Self, ConfigError> {
        let headers = default_headers(&config.content_type, config.token.as_deref())?;
        let client = build_client(
            headers,
            config.max_pool_size,
            config.timeout,
            config.https_proxy.as_deref(),
        )?;
        Ok(DeliveryClient {
            client,
            url_template: config.url_template,
            retry_policy: config.retry_policy,
            silent: config.silent,
        })
    }

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn resolve_url(&self, context: &SubstitutionContext) -> Result<Url, DeliveryError> {
        let resolved = template::resolve(&self.url_template, context);
        Url::parse(&resolved).map_err(|e| DeliveryError::InvalidUrl {
            url: resolved,
            reason: e.to_string(),
        })
    }

    async fn send(
        &self,
        url: &Url,
        host: Option<&HeaderValue>,
        payload: Bytes,
    ) -> Result<Response, DeliveryError> {
        let mut request = self.client.post(url.clone()).body(payload);
        if let Some(host) = host {
            request = request.header(HOST, host.clone());
        }
        Ok(request.send().await?)
    }

    async fn finish(&self, url: &Url, response: Response, attempts: u32) -> DeliveryOutcome {
        let status = response.status();
        // Drain the body so the connection returns to the pool.
        let body = response.text().await.unwrap_or_default();
        if !self.silent {
            info!(%status, "Collector response: {body}");
        }

        if status.is_success() || status.is_redirection() {
            debug!(%url, %status, attempts, "Delivered payload");
            DeliveryOutcome::Delivered { status, attempts }
        } else {
            error!(%url, %status, attempts, "Delivery rejected by collector: {body}");
            DeliveryOutcome::Rejected { status, attempts }
        }
    }
}

#[async_trait]
impl Deliver for DeliveryClient {
    async fn deliver(&self, task: DeliveryTask) -> DeliveryOutcome {
        let url = match self.resolve_url(&task.context) {
            Ok(url) => url,
            Err(e) => {
                error!("Dropping payload: {e}");
                return DeliveryOutcome::Failed {
                    reason: e.to_string(),
                    attempts: 0,
                };
            }
        };
        let host = host_header(&url);

        if !self.silent {
            info!(%url, "Payload: {}", String::from_utf8_lossy(&task.payload));
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let time = Instant::now();
            let result = self.send(&url, host.as_ref(), task.payload.clone()).await;
            let elapsed = time.elapsed();

            match result {
                Ok(response) => {
                    let status = response.status();
                    if !(self.retry_policy.is_retryable_status(status)
                        && self.retry_policy.has_attempts_left(attempts))
                    {
                        return self.finish(&url, response, attempts).await;
                    }
                    warn!(
                        %url,
                        %status,
                        attempts,
                        "Transient delivery failure after {} ms, retrying",
                        elapsed.as_millis()
                    );
                }
                Err(e) => {
                    let retryable =
                        self.retry_policy.retry_on_connection_errors && e.is_connection_error();
                    if !(retryable && self.retry_policy.has_attempts_left(attempts)) {
                        error!(%url, attempts, "Failed to deliver payload: {e}");
                        return DeliveryOutcome::Failed {
                            reason: e.to_string(),
                            attempts,
                        };
                    }
                    warn!(%url, attempts, "Connection error, retrying: {e}");
                }
            }

            let delay = self.retry_policy.backoff(attempts);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

fn default_headers(content_type: &str, token: Option<&str>) -> Result<HeaderMap, ConfigError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_str(content_type).map_err(|_| ConfigError::Invalid {
            option: "content_type",
            reason: format!("'{content_type}' is not a valid header value"),
        })?,
    );
    if let Some(token) = token {
        let mut value =
            HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| ConfigError::Invalid {
                option: "rest_token",
                reason: "not a valid header value".to_string(),
            })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

fn build_client(
    headers: HeaderMap,
    max_pool_size: usize,
    timeout: Option<Duration>,
    https_proxy: Option<&str>,
) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder()
        .default_headers(headers)
        .pool_max_idle_per_host(max_pool_size);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(proxy) = https_proxy {
        let proxy = reqwest::Proxy::https(proxy).map_err(|e| ConfigError::Invalid {
            option: "https_proxy",
            reason: e.to_string(),
        })?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

/// `host[:port]` of the URL; the port is omitted when it is the scheme default.
fn host_header(url: &Url) -> Option<HeaderValue> {
    let host = url.host_str()?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&authority).ok()
}
