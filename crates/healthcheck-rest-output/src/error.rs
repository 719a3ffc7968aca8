// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while reading or validating the output configuration.
/// These surface synchronously at startup, before any event is processed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {option}: {reason}")]
    Invalid {
        option: &'static str,
        reason: String,
    },

    #[error("Malformed configuration: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// Failure of a single delivery attempt. Never returned to the producer.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid destination URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Connection-level failures (connect, timeout, reset) may succeed on a
    /// later attempt; everything else is final.
    pub fn is_connection_error(&self) -> bool {
        match self {
            DeliveryError::Transport(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            DeliveryError::InvalidUrl { .. } => false,
        }
    }
}

/// Errors from the dispatcher lifecycle.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Dispatcher is closed")]
    Closed,

    #[error("Shutdown timeout exceeded with {0} deliveries still pending")]
    ShutdownTimeout(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::Missing("rest_host");
        assert_eq!(error.to_string(), "Missing required option: rest_host");

        let error = ConfigError::Invalid {
            option: "workers",
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid value for workers: must be at least 1"
        );

        assert_eq!(
            DispatchError::ShutdownTimeout(3).to_string(),
            "Shutdown timeout exceeded with 3 deliveries still pending"
        );
    }

    #[test]
    fn test_invalid_url_is_not_a_connection_error() {
        let error = DeliveryError::InvalidUrl {
            url: "nope".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert!(!error.is_connection_error());
    }
}
