// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-source line formats.
//!
//! A source is tagged with a [`LogFormat`] when it is configured; the format
//! hands out a [`LineParser`] that turns each raw line into the content that
//! is shipped. A parser may reject a line, in which case it is dropped.
//!
//! - **plain**: the raw line is the content.
//! - **docker**: lines written by Docker's `json-file` logging driver,
//!   `{"log":"message\n","stream":"stderr","time":"..."}`. The `log` field
//!   is the content and `stream` becomes the line's source tag.

use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Plain,
    Docker,
}

impl AsRef<str> for LogFormat {
    fn as_ref(&self) -> &str {
        match self {
            LogFormat::Plain => "plain",
            LogFormat::Docker => "docker",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(LogFormat::Plain),
            "docker" => Ok(LogFormat::Docker),
            _ => Err(format!("unknown log format: '{s}'")),
        }
    }
}

impl LogFormat {
    #[must_use]
    pub fn parser(self) -> Arc<dyn LineParser> {
        match self {
            LogFormat::Plain => Arc::new(PlainParser),
            LogFormat::Docker => Arc::new(DockerParser),
        }
    }
}

/// Content extracted from one raw line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub content: String,
    /// Replaces the source's own tag when set.
    pub stream: Option<String>,
}

impl ParsedLine {
    /// The content split on embedded newlines, without empty lines.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
    }
}

pub trait LineParser: Send + Sync {
    /// Returns `None` when the line must be dropped.
    fn parse(&self, raw: &str) -> Option<ParsedLine>;
}

#[derive(Debug, Clone, Copy)]
pub struct PlainParser;

impl LineParser for PlainParser {
    fn parse(&self, raw: &str) -> Option<ParsedLine> {
        Some(ParsedLine {
            content: raw.to_string(),
            stream: None,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DockerParser;

#[derive(Deserialize)]
struct DockerLine {
    log: String,
    #[serde(default)]
    stream: Option<String>,
}

impl LineParser for DockerParser {
    fn parse(&self, raw: &str) -> Option<ParsedLine> {
        let line = match serde_json::from_str::<DockerLine>(raw) {
            Ok(line) => line,
            Err(e) => {
                warn!("TAIL | Dropping malformed docker log line: {e}");
                return None;
            }
        };

        let content = line.log.trim_end_matches(['\n', '\r']);
        if content.is_empty() {
            return None;
        }

        Some(ParsedLine {
            content: content.to_string(),
            stream: line.stream.filter(|s| !s.is_empty()),
        })
    }
}
