// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hands delivery tasks to a bounded pool of concurrent deliveries.
//!
//! `submit` is synchronous and returns as soon as the task is spawned on the
//! runtime. At most `concurrency` deliveries run at once; the rest wait for a
//! permit. Nothing bounds the number of waiting tasks and completion order is
//! unrelated to submission order. Tasks still pending when the process exits
//! are lost.

use crate::client::{Deliver, DeliveryTask};
use crate::error::DispatchError;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

pub const DEFAULT_CONCURRENCY: usize = 10;

/// Builds a dedicated runtime for producers that do not run inside one.
pub fn build_runtime(worker_threads: usize) -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .thread_name("healthcheck-delivery")
        .enable_all()
        .build()
}

pub struct Dispatcher {
    runtime: Handle,
    deliverer: Arc<dyn Deliver>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(runtime: Handle, deliverer: Arc<dyn Deliver>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Dispatcher {
            runtime,
            deliverer,
            permits: Arc::new(Semaphore::new(concurrency)),
            tracker: TaskTracker::new(),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queues `task` for delivery without waiting on the network.
    pub fn submit(&self, task: DeliveryTask) -> Result<(), DispatchError> {
        if self.tracker.is_closed() {
            return Err(DispatchError::Closed);
        }

        let deliverer = Arc::clone(&self.deliverer);
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn_on(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let outcome = deliverer.deliver(task).await;
                debug!(?outcome, "Delivery task finished");
            },
            &self.runtime,
        );
        Ok(())
    }

    /// Tasks submitted and not yet finished, including those waiting for a
    /// permit.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stops accepting new tasks. Already submitted tasks keep running.
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Closes the dispatcher and waits up to `timeout` for every submitted
    /// task to finish.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), DispatchError> {
        self.close();
        debug!(pending = self.in_flight(), "Draining delivery tasks");
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let pending = self.in_flight();
                warn!(pending, "Shutdown timed out before all deliveries finished");
                Err(DispatchError::ShutdownTimeout(pending))
            }
        }
    }
}
