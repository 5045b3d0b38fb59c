// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the shipping pipeline.
//!
//! Startup errors ([`ConfigError`], [`CredentialError`], [`AgentError`]) abort
//! the process. Steady-state errors are scoped: a [`SourceAccessError`] only
//! disables one source spec, a [`TailError`] only ends one tail session, a
//! [`SinkError`] is retried, and a [`DeliveryError`] loses exactly one batch.

use std::path::PathBuf;

/// Missing or invalid settings and arguments.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no sources were given")]
    MissingSources,

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid source: {0:?}")]
    InvalidSource(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// The token could not be turned into an identity.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("token is blank")]
    Blank,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token has no usable {0:?} claim")]
    MissingClaim(String),
}

/// A watch could not be established for a source spec.
#[derive(Debug, thiserror::Error)]
pub enum SourceAccessError {
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("cannot watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("cannot resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A tail stream failed mid-flight. Ends only the affected session.
#[derive(Debug, thiserror::Error)]
pub enum TailError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read stdin: {0}")]
    Stdin(#[from] std::io::Error),
}

/// A single insert attempt against the sink failed.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("sink answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("failed to encode records: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Delivery gave up on a batch.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery of {records} records to {table:?} failed after {attempts} attempts: {last_error}")]
    Exhausted {
        table: String,
        records: usize,
        attempts: u32,
        #[source]
        last_error: SinkError,
    },

    #[error("sink panicked while delivering {records} records to {table:?}")]
    Panicked { table: String, records: usize },
}

/// Errors that prevent the agent from starting.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("failed to set up the sink: {0}")]
    Sink(#[from] SinkError),

    #[error("none of the {0} configured sources could be started")]
    NoSources(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let error = ConfigError::Missing("table");
        assert_eq!(error.to_string(), "missing required setting: table");
    }

    #[test]
    fn test_credential_error_display() {
        assert_eq!(CredentialError::Blank.to_string(), "token is blank");
        assert_eq!(
            CredentialError::MissingClaim("sub".to_string()).to_string(),
            "token has no usable \"sub\" claim"
        );
    }

    #[test]
    fn test_delivery_error_carries_last_error() {
        let error = DeliveryError::Exhausted {
            table: "logs".to_string(),
            records: 3,
            attempts: 10,
            last_error: SinkError::Other("boom".to_string()),
        };
        let message = error.to_string();
        assert!(message.contains("3 records"));
        assert!(message.contains("10 attempts"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_agent_error_is_transparent_over_config() {
        let error: AgentError = ConfigError::MissingSources.into();
        assert_eq!(error.to_string(), "no sources were given");
    }
}
