// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::delivery::{PendingBatch, RetryStrategy};
use crate::error::DeliveryError;
use crate::sink::Sink;

/// One batch on its way to the sink.
///
/// The same records are sent on every attempt. There is no wait after the
/// last failed attempt: the batch is given up right away.
#[derive(Debug)]
pub struct DeliveryAttempt {
    pub batch: PendingBatch,
    /// Retries performed so far, i.e. waits slept.
    pub retries_used: u32,
}

impl DeliveryAttempt {
    #[must_use]
    pub fn new(batch: PendingBatch) -> Self {
        Self {
            batch,
            retries_used: 0,
        }
    }

    pub async fn run(
        &mut self,
        sink: &dyn Sink,
        table: &str,
        retry: &RetryStrategy,
    ) -> Result<(), DeliveryError> {
        let attempts = retry.attempts();
        loop {
            let attempt = self.retries_used + 1;
            match sink.insert(table, self.batch.records()).await {
                Ok(()) => {
                    if self.retries_used > 0 {
                        debug!(
                            "DELIVERY | {} records delivered to {table} on attempt {attempt}",
                            self.batch.len()
                        );
                    }
                    return Ok(());
                }
                Err(e) if attempt >= attempts => {
                    return Err(DeliveryError::Exhausted {
                        table: table.to_string(),
                        records: self.batch.len(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    let wait = retry.backoff(attempt);
                    warn!(
                        "DELIVERY | Attempt {attempt}/{attempts} to deliver {} records to {table} failed, retrying in {} ms: {e}",
                        self.batch.len(),
                        wait.as_millis()
                    );
                    sleep(wait).await;
                    self.retries_used += 1;
                }
            }
        }
    }
}
