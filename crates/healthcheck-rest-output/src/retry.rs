// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Retry policy for deliveries.
//!
//! A delivery is attempted at most `max_attempts` times. Only the configured
//! status codes (403 and 500 by default) and, optionally, connection-level
//! failures trigger another attempt. The wait before retry `n` is zero for
//! the first retry and `backoff_factor * 2^(n-2)` afterwards, so the default
//! factor of 0.5s yields 0s, 0.5s, 1s, 2s.

use reqwest::StatusCode;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BACKOFF_FACTOR: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(120);
pub const DEFAULT_RETRY_STATUSES: [StatusCode; 2] =
    [StatusCode::FORBIDDEN, StatusCode::INTERNAL_SERVER_ERROR];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub backoff_factor: Duration,
    pub max_backoff: Duration,
    pub retry_statuses: Vec<StatusCode>,
    pub retry_on_connection_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_backoff: DEFAULT_MAX_BACKOFF,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
            retry_on_connection_errors: true,
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay to wait before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry <= 1 {
            return Duration::ZERO;
        }
        let exponent = (retry - 2).min(31);
        self.backoff_factor
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }
}
