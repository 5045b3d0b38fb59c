// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # logtail
//!
//! Ships appended log lines from files and standard input to a remote
//! table, in near real time.
//!
//! ## Overview
//!
//! ```text
//!   files / stdin ─> tail ─> lines ─> mux ─> batch coordinator ─> sink
//! ```
//!
//! - [`sources`]: discovery of files matching a path or glob, tailing of
//!   appended bytes, line reconstruction and per-source formats
//! - [`mux`]: fan-in of every source into one ordered-per-source stream
//! - [`delivery`]: debounced, single-flight batching with retries
//! - [`sink`]: the insert capability and its REST implementation
//! - [`credentials`]: identity extraction from the access token
//! - [`agent`]: wiring and graceful shutdown
//!
//! Lines that existed before a file was discovered are never shipped, and
//! nothing is persisted across restarts.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]

pub mod agent;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod error;
pub mod event;
pub mod logger;
pub mod mux;
pub mod sink;
pub mod sources;

pub use agent::LogsAgent;
pub use event::LineEvent;
