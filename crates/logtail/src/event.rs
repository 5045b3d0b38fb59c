// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// One reconstructed log line and the source it came from.
///
/// `content` is never empty and never contains a newline; the line
/// reconstructor and the format parsers drop anything that would violate
/// that before an event is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    /// Origin label, e.g. `stdout`, `stderr` or the tailed file's path.
    pub source_tag: String,
    pub content: String,
}

impl LineEvent {
    #[must_use]
    pub fn new(source_tag: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source_tag: source_tag.into(),
            content: content.into(),
        }
    }
}
