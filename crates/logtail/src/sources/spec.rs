// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::sources::format::LogFormat;

/// Marker that selects the process's standard input.
pub const STDIN_MARKER: &str = "-";

/// A user-supplied source: `-`, `path`, `glob` or `format:path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    Stdin,
    Path { format: LogFormat, pattern: String },
}

impl SourceSpec {
    /// Parses `-`, `[format:]path`.
    ///
    /// The prefix before the first `:` only counts as a format tag when it
    /// names a known format; otherwise the whole input is the path, which
    /// keeps paths such as `C:\logs\app.log` or `a:b.log` intact.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ConfigError::InvalidSource(input.to_string()));
        }
        if input == STDIN_MARKER {
            return Ok(SourceSpec::Stdin);
        }

        if let Some((tag, rest)) = input.split_once(':') {
            if let Ok(format) = LogFormat::from_str(tag) {
                if rest.trim().is_empty() {
                    return Err(ConfigError::InvalidSource(input.to_string()));
                }
                return Ok(SourceSpec::Path {
                    format,
                    pattern: rest.to_string(),
                });
            }
        }

        Ok(SourceSpec::Path {
            format: LogFormat::Plain,
            pattern: input.to_string(),
        })
    }

    #[must_use]
    pub fn format(&self) -> LogFormat {
        match self {
            SourceSpec::Stdin => LogFormat::Plain,
            SourceSpec::Path { format, .. } => *format,
        }
    }
}

impl FromStr for SourceSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceSpec::parse(s)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::Stdin => f.write_str(STDIN_MARKER),
            SourceSpec::Path {
                format: LogFormat::Plain,
                pattern,
            } => f.write_str(pattern),
            SourceSpec::Path { format, pattern } => write!(f, "{}:{pattern}", format.as_ref()),
        }
    }
}
