// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::delivery::{
    DeliveryAttempt, DeliveryConfig, ExhaustedPolicy, PendingBatch, RecordTemplate,
};
use crate::error::DeliveryError;
use crate::event::LineEvent;
use crate::sink::Sink;

/// Counters over the coordinator's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub batches_delivered: u64,
    pub records_delivered: u64,
    pub batches_dropped: u64,
    pub records_dropped: u64,
    pub retries: u64,
}

#[derive(Debug, Default)]
struct Counters {
    batches_delivered: AtomicU64,
    records_delivered: AtomicU64,
    batches_dropped: AtomicU64,
    records_dropped: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
struct Queue {
    pending: Vec<LineEvent>,
    /// Set while a flush task is scheduled or running.
    flush_scheduled: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    config: DeliveryConfig,
    sink: Arc<dyn Sink>,
    template: RecordTemplate,
    counters: Counters,
    idle: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Batches line events and delivers them with at most one flush in flight.
///
/// Cloning is cheap; clones share the same queue.
#[derive(Clone)]
pub struct BatchCoordinator {
    shared: Arc<Shared>,
}

impl BatchCoordinator {
    #[must_use]
    pub fn new(config: DeliveryConfig, sink: Arc<dyn Sink>, template: RecordTemplate) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(Queue::default()),
                config,
                sink,
                template,
                counters: Counters::default(),
                idle,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Queues `event` and makes sure a flush will pick it up.
    ///
    /// Must be called from within a tokio runtime. Never blocks on delivery.
    pub fn enqueue(&self, event: LineEvent) {
        let schedule = {
            let mut queue = self.shared.queue();
            queue.pending.push(event);
            if queue.flush_scheduled {
                false
            } else {
                queue.flush_scheduled = true;
                self.shared.idle.send_replace(false);
                true
            }
        };

        if schedule {
            tokio::spawn(flush(self.shared.clone()));
        }
    }

    /// Resolves once nothing is queued and no flush is scheduled or running.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // the sender lives as long as `self`
        let _ = idle.wait_for(|idle| *idle).await;
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.queue().pending.len()
    }

    #[must_use]
    pub fn stats(&self) -> DeliveryStats {
        self.shared.counters.snapshot()
    }

    /// Cancelled when a batch is lost under [`ExhaustedPolicy::Shutdown`].
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    #[must_use]
    pub fn config(&self) -> &DeliveryConfig {
        &self.shared.config
    }
}

async fn flush(shared: Arc<Shared>) {
    // let the burst that scheduled this flush finish enqueueing
    tokio::task::yield_now().await;

    loop {
        let events = {
            let mut queue = shared.queue();
            if queue.pending.is_empty() {
                queue.flush_scheduled = false;
                shared.idle.send_replace(true);
                return;
            }
            std::mem::take(&mut queue.pending)
        };

        let batch = PendingBatch::from_events(&shared.template, &events);
        let records = batch.len() as u64;
        debug!("DELIVERY | Flushing {records} records to {}", shared.config.table);

        let mut attempt = DeliveryAttempt::new(batch);
        let result = AssertUnwindSafe(attempt.run(
            shared.sink.as_ref(),
            &shared.config.table,
            &shared.config.retry,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            Err(DeliveryError::Panicked {
                table: shared.config.table.clone(),
                records: events.len(),
            })
        });

        let counters = &shared.counters;
        counters
            .retries
            .fetch_add(u64::from(attempt.retries_used), Ordering::Relaxed);
        match result {
            Ok(()) => {
                counters.batches_delivered.fetch_add(1, Ordering::Relaxed);
                counters
                    .records_delivered
                    .fetch_add(records, Ordering::Relaxed);
            }
            Err(e) => {
                counters.batches_dropped.fetch_add(1, Ordering::Relaxed);
                counters.records_dropped.fetch_add(records, Ordering::Relaxed);
                on_exhausted(&shared, &e);
            }
        }
    }
}

fn on_exhausted(shared: &Shared, e: &DeliveryError) {
    match shared.config.on_exhausted {
        ExhaustedPolicy::LogAndDrop => {
            error!("DELIVERY | Dropping batch: {e}");
        }
        ExhaustedPolicy::Shutdown => {
            error!("DELIVERY | Dropping batch and shutting down: {e}");
            shared.shutdown.cancel();
        }
    }
}
