// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tracing formatter for the agent's own diagnostics.
//!
//! Every line is prefixed with `LOGTAIL` so the agent's output can be told
//! apart from the application output it is often interleaved with:
//!
//! ```text
//! LOGTAIL | INFO | DISCOVERY | Tailing /var/log/app/api.log
//! LOGTAIL | ERROR | flush{table=logs}: DELIVERY | Dropping 42 records after 10 attempts
//! ```
//!
//! Diagnostics go to stderr; the agent never writes to stdout.

use std::fmt;

use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::log_level::LogLevel;

/// Noisy dependencies that are capped at `warn` whatever the agent level is.
const QUIET_TARGETS: &str = "h2=warn,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "LOGTAIL | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

/// Builds the filter for `level`, keeping HTTP internals quiet.
#[must_use]
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::new(format!("{QUIET_TARGETS},{}", level.as_directive()))
}
