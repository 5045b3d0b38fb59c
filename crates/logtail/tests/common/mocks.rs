// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use logtail::error::SinkError;
use logtail::sink::{Record, Sink};

/// Keeps every delivered batch in memory.
#[derive(Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<Record>>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<Record> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// `(source, content)` of every delivered record, in delivery order.
    pub fn lines(&self) -> Vec<(String, String)> {
        self.records()
            .iter()
            .map(|r| {
                (
                    r["source"].as_str().unwrap().to_string(),
                    r["content"].as_str().unwrap().to_string(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn insert(&self, _table: &str, records: &[Record]) -> Result<(), SinkError> {
        self.batches.lock().unwrap().push(records.to_vec());
        Ok(())
    }
}

/// Rejects every insert.
#[derive(Default)]
pub struct FailingSink {
    pub calls: AtomicU32,
}

#[async_trait]
impl Sink for FailingSink {
    async fn insert(&self, _table: &str, _records: &[Record]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SinkError::Other("sink unavailable".to_string()))
    }
}
