// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The output module called by the check scheduler.
//!
//! `output` turns one health-check result into a flat record, renders it and
//! hands it to the [`Dispatcher`]. It never performs network I/O and never
//! fails; delivery problems only show up in the logs.

use crate::client::{DeliveryClient, DeliveryClientConfig, DeliveryTask};
use crate::config::RestOutputConfig;
use crate::dispatcher::Dispatcher;
use crate::error::ConfigError;
use crate::flatten::flatten;
use crate::template::SubstitutionContext;
use crate::value::{FlatRecord, Record, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// Value of the `tags` field on every record.
pub const TAG_VALUE: &str = "healthcheck";
pub const EXTRA_KEY: &str = "extra";

/// The check that produced a result.
pub trait Watcher {
    fn name(&self) -> &str;

    fn output_slug(&self) -> Option<&str> {
        None
    }
}

/// A finished health check.
pub trait CheckResult {
    /// The structured outcome, possibly nested.
    fn to_record(&self) -> Record;

    fn checks_passed(&self) -> bool;

    /// Additional nested fields attached by the watcher, possibly empty.
    fn extra(&self) -> &Record;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatcherInstance {
    pub name: String,
    pub output_slug: Option<String>,
}

impl WatcherInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output_slug: None,
        }
    }

    pub fn with_output_slug(mut self, slug: impl Into<String>) -> Self {
        self.output_slug = Some(slug.into());
        self
    }
}

impl Watcher for WatcherInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_slug(&self) -> Option<&str> {
        self.output_slug.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatcherResult {
    pub checks_passed: bool,
    pub data: Record,
    pub extra: Record,
}

impl CheckResult for WatcherResult {
    /// `data` plus `checks_passed` and the nested `extra` entry.
    fn to_record(&self) -> Record {
        let mut record = self.data.clone();
        record.insert("checks_passed".to_string(), Value::Bool(self.checks_passed));
        record.insert(EXTRA_KEY.to_string(), Value::Map(self.extra.clone()));
        record
    }

    fn checks_passed(&self) -> bool {
        self.checks_passed
    }

    fn extra(&self) -> &Record {
        &self.extra
    }
}

pub struct RestOutput {
    config: RestOutputConfig,
    dispatcher: Arc<Dispatcher>,
}

impl RestOutput {
    /// Wires the output to an existing dispatcher. Fails fast on an invalid
    /// configuration.
    pub fn new(config: RestOutputConfig, dispatcher: Arc<Dispatcher>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(RestOutput { config, dispatcher })
    }

    /// Builds the delivery client and a dispatcher running on `runtime` from
    /// the configuration.
    pub fn start(config: RestOutputConfig, runtime: Handle) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = DeliveryClient::new(DeliveryClientConfig::from(&config))?;
        let dispatcher = Dispatcher::new(runtime, Arc::new(client), config.workers);
        debug!(
            url_template = config.rest_host.as_str(),
            workers = config.workers,
            "REST output configured"
        );
        Ok(RestOutput {
            config,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn config(&self) -> &RestOutputConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Flattens and enriches a result. Later steps win on key overlap:
    /// result fields, then tags, then `extra`, then configured extra fields.
    pub fn build_record<W, R>(&self, watcher: &W, result: &R) -> FlatRecord
    where
        W: Watcher + ?Sized,
        R: CheckResult + ?Sized,
    {
        let extra = result.extra();
        let mut record = result.to_record();
        if !extra.is_empty() {
            record.remove(EXTRA_KEY);
        }

        let mut merged = flatten(&record);
        merged.insert("tags".to_string(), Value::from(TAG_VALUE));
        merged.insert("watcher_name".to_string(), Value::from(watcher.name()));
        if let Some(slug) = watcher.output_slug() {
            merged.insert("output_slug".to_string(), Value::from(slug));
        }
        if !extra.is_empty() {
            merged.extend(flatten(extra));
        }
        merged.extend(
            self.config
                .extra_fields
                .iter()
                .map(|(key, value)| (key.clone(), Value::from(value.as_str()))),
        );
        merged
    }

    pub fn message<W, R>(&self, watcher: &W, result: &R) -> String
    where
        W: Watcher + ?Sized,
        R: CheckResult + ?Sized,
    {
        format!(
            "HealthcheckBot {}: Watcher {} - checks {}",
            self.config.instance_id,
            watcher.name(),
            if result.checks_passed() {
                "passed"
            } else {
                "failed"
            }
        )
    }

    /// Renders the JSON body: the reserved `message`, `level`, `facility` and
    /// `timestamp` keys plus every merged field. Merged fields replace
    /// reserved keys of the same name.
    pub fn render(&self, message: String, record: FlatRecord) -> serde_json::Result<Vec<u8>> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or_default();

        let mut body = serde_json::Map::new();
        body.insert("message".to_string(), message.into());
        body.insert("level".to_string(), "INFO".into());
        body.insert("facility".to_string(), self.config.facility.clone().into());
        body.insert("timestamp".to_string(), timestamp.into());
        for (key, value) in record {
            body.insert(key, serde_json::to_value(value)?);
        }
        serde_json::to_vec(&body)
    }

    /// Hands one result to the delivery pipeline and returns immediately.
    pub fn output<W, R>(&self, watcher: &W, result: &R)
    where
        W: Watcher + ?Sized,
        R: CheckResult + ?Sized,
    {
        let record = self.build_record(watcher, result);
        let payload = match self.render(self.message(watcher, result), record) {
            Ok(payload) => payload,
            Err(e) => {
                error!(watcher = watcher.name(), "Failed to render payload. Data dropped: {e}");
                return;
            }
        };

        let context = SubstitutionContext::for_event(
            watcher.name(),
            watcher.output_slug(),
            result.checks_passed(),
        );
        if let Err(e) = self.dispatcher.submit(DeliveryTask::new(payload, context)) {
            warn!(watcher = watcher.name(), "Result not delivered: {e}");
        }
    }
}
