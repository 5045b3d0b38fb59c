// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration.
//!
//! Configuration is layered: defaults, then an optional YAML file, then
//! `LOGTAIL_*` environment variables. Each layer is a [`ConfigSource`] that
//! patches the [`Config`] built so far; later sources win.
//!
//! ```yaml
//! backoff_ms: 1000
//! max_retries: 10
//! retry_strategy: exponential
//! log_level: debug
//! ```
//!
//! Only tuning knobs live here. Identity, destination table and field
//! mappings come from the command line.

pub mod env;
pub mod log_level;
pub mod yaml;

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error};

use crate::config::log_level::LogLevel;
use crate::delivery::{DeliveryConfig, ExhaustedPolicy, RetryStrategy};
use crate::error::ConfigError;
use crate::sources::{discovery::WatchOptions, tail::TailOptions};

pub const DEFAULT_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_SETTLE_THRESHOLD_MS: u64 = 200;
const DEFAULT_SETTLE_POLL_INTERVAL_MS: u64 = 50;
const DEFAULT_SETTLE_MAX_WAIT_MS: u64 = 2_000;
const DEFAULT_READ_CHUNK_BYTES: usize = 64 * 1024;

/// How the wait between delivery attempts evolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, PartialEq)]
#[allow(clippy::module_name_repetitions)]
pub struct Config {
    /// Delay between delivery attempts, in milliseconds.
    pub backoff_ms: u64,
    /// Upper bound for exponential backoff, in milliseconds.
    pub max_backoff_ms: u64,
    pub retry_strategy: RetryKind,
    /// Total delivery attempts for one batch before it is dropped.
    pub max_retries: u32,
    /// Timeout for a single sink request, in milliseconds.
    pub request_timeout_ms: u64,
    /// How long a tail session idles at end-of-file before reading again.
    pub poll_interval_ms: u64,
    /// A new file must keep the same size this long before it is tailed.
    pub settle_threshold_ms: u64,
    pub settle_poll_interval_ms: u64,
    /// A file still growing after this long is tailed anyway.
    pub settle_max_wait_ms: u64,
    pub read_chunk_bytes: usize,
    pub detect_truncation: bool,
    pub exit_on_delivery_failure: bool,
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backoff_ms: DEFAULT_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            retry_strategy: RetryKind::Fixed,
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            settle_threshold_ms: DEFAULT_SETTLE_THRESHOLD_MS,
            settle_poll_interval_ms: DEFAULT_SETTLE_POLL_INTERVAL_MS,
            settle_max_wait_ms: DEFAULT_SETTLE_MAX_WAIT_MS,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            detect_truncation: false,
            exit_on_delivery_failure: false,
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retries",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.read_chunk_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "read_chunk_bytes",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval_ms",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.retry_strategy == RetryKind::Exponential && self.max_backoff_ms < self.backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "max_backoff_ms",
                reason: format!("must not be lower than backoff_ms ({})", self.backoff_ms),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn retry(&self) -> RetryStrategy {
        let base = Duration::from_millis(self.backoff_ms);
        match self.retry_strategy {
            RetryKind::Fixed => RetryStrategy::Fixed {
                attempts: self.max_retries,
                backoff: base,
            },
            RetryKind::Exponential => RetryStrategy::Exponential {
                attempts: self.max_retries,
                base,
                max: Duration::from_millis(self.max_backoff_ms),
            },
        }
    }

    #[must_use]
    pub fn delivery(&self, table: impl Into<String>) -> DeliveryConfig {
        DeliveryConfig {
            table: table.into(),
            retry: self.retry(),
            on_exhausted: if self.exit_on_delivery_failure {
                ExhaustedPolicy::Shutdown
            } else {
                ExhaustedPolicy::LogAndDrop
            },
        }
    }

    #[must_use]
    pub fn tail_options(&self) -> TailOptions {
        TailOptions {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            read_chunk_bytes: self.read_chunk_bytes,
            detect_truncation: self.detect_truncation,
        }
    }

    #[must_use]
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            settle_threshold: Duration::from_millis(self.settle_threshold_ms),
            settle_poll_interval: Duration::from_millis(self.settle_poll_interval_ms.max(1)),
            settle_max_wait: Duration::from_millis(self.settle_max_wait_ms),
        }
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Partial configuration read from one source. Unset fields keep the value
/// from earlier layers.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub retry_strategy: Option<RetryKind>,
    pub max_retries: Option<u32>,
    pub request_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub settle_threshold_ms: Option<u64>,
    pub settle_poll_interval_ms: Option<u64>,
    pub settle_max_wait_ms: Option<u64>,
    pub read_chunk_bytes: Option<usize>,
    pub detect_truncation: Option<bool>,
    pub exit_on_delivery_failure: Option<bool>,
    pub log_level: Option<LogLevel>,
}

macro_rules! merge_option {
    ($config:expr, $overrides:expr, $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = $overrides.$field {
                $config.$field = value;
            }
        )+
    };
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut Config) {
        merge_option!(
            config,
            self,
            backoff_ms,
            max_backoff_ms,
            retry_strategy,
            max_retries,
            request_timeout_ms,
            poll_interval_ms,
            settle_threshold_ms,
            settle_poll_interval_ms,
            settle_max_wait_ms,
            read_chunk_bytes,
            detect_truncation,
            exit_on_delivery_failure,
            log_level,
        );
    }
}

#[allow(clippy::module_name_repetitions)]
pub trait ConfigSource {
    fn load(&self, config: &mut Config) -> Result<(), ConfigError>;
}

#[derive(Default)]
#[allow(clippy::module_name_repetitions)]
pub struct ConfigBuilder {
    sources: Vec<Box<dyn ConfigSource>>,
    config: Config,
}

#[allow(clippy::module_name_repetitions)]
impl ConfigBuilder {
    #[must_use]
    pub fn add_source(mut self, source: Box<dyn ConfigSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Applies every source in order and validates the result.
    ///
    /// A source that fails to load is logged and skipped; an invalid final
    /// configuration is an error.
    pub fn build(mut self) -> Result<Config, ConfigError> {
        let mut failed_sources = 0;
        for source in &self.sources {
            if let Err(e) = source.load(&mut self.config) {
                error!("CONFIG | {e}");
                failed_sources += 1;
            }
        }

        if !self.sources.is_empty() && failed_sources == self.sources.len() {
            debug!("CONFIG | All sources failed to load, using defaults");
        }

        self.config.validate()?;
        Ok(self.config)
    }
}
