// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;

use crate::event::LineEvent;
use crate::sink::Record;

pub const DEFAULT_IDENTITY_FIELD: &str = "user_id";
pub const DEFAULT_CONTENT_FIELD: &str = "content";
pub const DEFAULT_SOURCE_FIELD: &str = "source";

/// Turns line events into records carrying identity and destination
/// metadata.
///
/// ```json
/// {"user_id": "6f1c", "project_id": "p-9", "content": "GET / 200", "source": "stdout"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordTemplate {
    identity_field: String,
    identity: String,
    foreign_key_field: String,
    foreign_key_value: String,
    content_field: String,
    source_field: String,
}

impl RecordTemplate {
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        foreign_key_field: impl Into<String>,
        foreign_key_value: impl Into<String>,
    ) -> Self {
        Self {
            identity_field: DEFAULT_IDENTITY_FIELD.to_string(),
            identity: identity.into(),
            foreign_key_field: foreign_key_field.into(),
            foreign_key_value: foreign_key_value.into(),
            content_field: DEFAULT_CONTENT_FIELD.to_string(),
            source_field: DEFAULT_SOURCE_FIELD.to_string(),
        }
    }

    #[must_use]
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    #[must_use]
    pub fn with_content_field(mut self, field: impl Into<String>) -> Self {
        self.content_field = field.into();
        self
    }

    #[must_use]
    pub fn with_source_field(mut self, field: impl Into<String>) -> Self {
        self.source_field = field.into();
        self
    }

    #[must_use]
    pub fn record(&self, event: &LineEvent) -> Record {
        let mut record = Record::new();
        record.insert(
            self.identity_field.clone(),
            Value::String(self.identity.clone()),
        );
        record.insert(
            self.foreign_key_field.clone(),
            Value::String(self.foreign_key_value.clone()),
        );
        record.insert(
            self.content_field.clone(),
            Value::String(event.content.clone()),
        );
        record.insert(
            self.source_field.clone(),
            Value::String(event.source_tag.clone()),
        );
        record
    }
}

/// Records awaiting one delivery, in enqueue order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingBatch {
    records: Vec<Record>,
}

impl PendingBatch {
    #[must_use]
    pub fn from_events(template: &RecordTemplate, events: &[LineEvent]) -> Self {
        Self {
            records: events.iter().map(|event| template.record(event)).collect(),
        }
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
