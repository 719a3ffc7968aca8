// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ships health-check results to a remote HTTP collector.
//!
//! The producer calls [`output::RestOutput::output`] once per finished check.
//! The result is flattened, enriched and rendered in place, then handed to
//! a [`dispatcher::Dispatcher`] that delivers it in the background through a
//! pooled, retrying [`client::DeliveryClient`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod flatten;
pub mod logger;
pub mod output;
pub mod retry;
pub mod template;
pub mod value;

pub use client::{Deliver, DeliveryClient, DeliveryOutcome, DeliveryTask};
pub use config::RestOutputConfig;
pub use dispatcher::Dispatcher;
pub use output::{CheckResult, RestOutput, Watcher, WatcherInstance, WatcherResult};
