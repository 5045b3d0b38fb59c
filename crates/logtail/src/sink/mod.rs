// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Destination of delivered records.
//!
//! The delivery coordinator only needs one capability from a store: insert a
//! batch of records into a named table, or fail. Every failure is treated as
//! transient and retried by the caller.

pub mod rest;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SinkError;

pub use rest::{RestSink, RestSinkConfig};

/// One row as sent to the sink. Field names are chosen by the caller.
pub type Record = serde_json::Map<String, Value>;

#[async_trait]
pub trait Sink: Send + Sync {
    async fn insert(&self, table: &str, records: &[Record]) -> Result<(), SinkError>;
}
