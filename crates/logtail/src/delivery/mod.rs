// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Debounced, single-flight delivery of line events to a [`Sink`].
//!
//! # Architecture
//!
//! ```text
//!   enqueue(event) ─┐
//!   enqueue(event) ─┼─> ┌─────────────┐   snapshot   ┌──────────────┐
//!   enqueue(event) ─┘   │ pending Vec │ ───────────> │ PendingBatch │
//!                       └─────────────┘   & clear    └──────┬───────┘
//!                             ^                             │
//!                             │ follow-up flush             v
//!                             └──────────────────── DeliveryAttempt ──> Sink
//! ```
//!
//! At most one flush runs at a time. Events enqueued while a batch is being
//! delivered are picked up by exactly one follow-up flush once the current
//! delivery finishes, as a single batch.
//!
//! [`Sink`]: crate::sink::Sink

pub mod coordinator;
pub mod record;
pub mod retry;

use std::time::Duration;

pub use coordinator::{BatchCoordinator, DeliveryStats};
pub use record::{PendingBatch, RecordTemplate};
pub use retry::DeliveryAttempt;

/// How often and how long to wait between delivery attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryStrategy {
    /// Same wait after every failure.
    Fixed { attempts: u32, backoff: Duration },
    /// Wait doubles after every failure, starting at `base`, capped at `max`.
    Exponential {
        attempts: u32,
        base: Duration,
        max: Duration,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Fixed {
            attempts: crate::config::DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(crate::config::DEFAULT_BACKOFF_MS),
        }
    }
}

impl RetryStrategy {
    /// Total attempts for one batch, the first one included.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            RetryStrategy::Fixed { attempts, .. } | RetryStrategy::Exponential { attempts, .. } => {
                (*attempts).max(1)
            }
        }
    }

    /// Wait before the retry that follows the `failures`-th failed attempt.
    #[must_use]
    pub fn backoff(&self, failures: u32) -> Duration {
        match self {
            RetryStrategy::Fixed { backoff, .. } => *backoff,
            RetryStrategy::Exponential { base, max, .. } => {
                let exponent = failures.saturating_sub(1).min(31);
                base.saturating_mul(1u32 << exponent).min(*max)
            }
        }
    }
}

/// What happens to a batch whose attempts are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExhaustedPolicy {
    /// Log the loss and keep shipping later batches.
    #[default]
    LogAndDrop,
    /// Log the loss and cancel the coordinator's shutdown token.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryConfig {
    pub table: String,
    pub retry: RetryStrategy,
    pub on_exhausted: ExhaustedPolicy,
}

impl DeliveryConfig {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            retry: RetryStrategy::default(),
            on_exhausted: ExhaustedPolicy::default(),
        }
    }
}
