// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ConfigError;
use crate::retry::{RetryPolicy, DEFAULT_MAX_BACKOFF};
use reqwest::header::HeaderValue;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_FACILITY: &str = "healthcheck";
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_INSTANCE_ID: &str = "healthcheckbot";
pub const DEFAULT_MAX_POOL_SIZE: usize = 100;
pub const DEFAULT_WORKERS: usize = 10;

/// Configuration of the REST output, read once at startup.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RestOutputConfig {
    /// Destination URL template, e.g. `https://collector/{watcher_name}/{status}`
    pub rest_host: String,
    /// Bearer token; no Authorization header is sent without one
    pub rest_token: Option<String>,
    pub facility: String,
    /// When false, payloads and response bodies are echoed to the logs
    pub silent: bool,
    #[serde(alias = "contentType")]
    pub content_type: String,
    /// Merged into every outgoing record, winning over result fields
    pub extra_fields: BTreeMap<String, String>,
    /// Identifies this agent in the rendered message
    pub instance_id: String,
    /// Maximum idle connections kept per host
    pub max_pool_size: usize,
    /// Maximum concurrent deliveries
    pub workers: usize,
    pub max_attempts: u32,
    /// Base backoff in seconds
    pub backoff_factor: f64,
    pub retry_statuses: Vec<u16>,
    pub retry_on_connection_errors: bool,
    pub request_timeout_secs: Option<u64>,
    pub https_proxy: Option<String>,
}

impl Default for RestOutputConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            rest_host: String::new(),
            rest_token: None,
            facility: DEFAULT_FACILITY.to_string(),
            silent: true,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            extra_fields: BTreeMap::new(),
            instance_id: DEFAULT_INSTANCE_ID.to_string(),
            max_pool_size: DEFAULT_MAX_POOL_SIZE,
            workers: DEFAULT_WORKERS,
            max_attempts: retry.max_attempts,
            backoff_factor: retry.backoff_factor.as_secs_f64(),
            retry_statuses: retry.retry_statuses.iter().map(StatusCode::as_u16).collect(),
            retry_on_connection_errors: retry.retry_on_connection_errors,
            request_timeout_secs: None,
            https_proxy: None,
        }
    }
}

impl RestOutputConfig {
    /// Builds the configuration from the parameter mapping handed over by the
    /// plugin loader. Unknown keys are ignored.
    pub fn from_params(params: serde_json::Value) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_value(params)?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |name: &str| env::var(name).ok().filter(|v| !v.trim().is_empty());

        let config = Self {
            rest_host: non_empty("HEALTHCHECK_REST_HOST").unwrap_or_default(),
            rest_token: non_empty("HEALTHCHECK_REST_TOKEN"),
            facility: non_empty("HEALTHCHECK_REST_FACILITY").unwrap_or(defaults.facility),
            silent: env::var("HEALTHCHECK_REST_SILENT")
                .map(|val| val.to_lowercase() != "false")
                .unwrap_or(true),
            content_type: non_empty("HEALTHCHECK_REST_CONTENT_TYPE")
                .unwrap_or(defaults.content_type),
            instance_id: non_empty("HEALTHCHECK_INSTANCE_ID").unwrap_or(defaults.instance_id),
            https_proxy: non_empty("HEALTHCHECK_REST_PROXY").or_else(|| non_empty("HTTPS_PROXY")),
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let host = self.rest_host.trim();
        if host.is_empty() {
            return Err(ConfigError::Missing("rest_host"));
        }
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                option: "rest_host",
                reason: format!("'{host}' must start with http:// or https://"),
            });
        }

        if let Some(token) = &self.rest_token {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    option: "rest_token",
                    reason: "cannot be empty".to_string(),
                });
            }
            if HeaderValue::from_str(&format!("Bearer {token}")).is_err() {
                return Err(ConfigError::Invalid {
                    option: "rest_token",
                    reason: "not a valid header value".to_string(),
                });
            }
        }

        if HeaderValue::from_str(&self.content_type).is_err() || self.content_type.is_empty() {
            return Err(ConfigError::Invalid {
                option: "content_type",
                reason: format!("'{}' is not a valid header value", self.content_type),
            });
        }

        for (option, value) in [
            ("max_pool_size", self.max_pool_size),
            ("workers", self.workers),
            ("max_attempts", self.max_attempts as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    option,
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if Duration::try_from_secs_f64(self.backoff_factor).is_err() {
            return Err(ConfigError::Invalid {
                option: "backoff_factor",
                reason: format!("{} is not a non-negative number of seconds", self.backoff_factor),
            });
        }

        if let Some(code) = self
            .retry_statuses
            .iter()
            .find(|code| StatusCode::from_u16(**code).is_err())
        {
            return Err(ConfigError::Invalid {
                option: "retry_statuses",
                reason: format!("{code} is not an HTTP status code"),
            });
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_factor: Duration::try_from_secs_f64(self.backoff_factor)
                .unwrap_or(Duration::ZERO),
            max_backoff: DEFAULT_MAX_BACKOFF,
            retry_statuses: self
                .retry_statuses
                .iter()
                .filter_map(|code| StatusCode::from_u16(*code).ok())
                .collect(),
            retry_on_connection_errors: self.retry_on_connection_errors,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}
