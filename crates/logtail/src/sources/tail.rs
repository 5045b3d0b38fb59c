// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Incremental reading of a growing file.
//!
//! A [`TailSession`] starts at the file's size when it is opened, so content
//! that existed before discovery is never shipped. From there it hands out
//! every appended byte exactly once, idling at end-of-file.
//!
//! # Lifecycle
//!
//! ```text
//!   Opening ──> Streaming <──> EofIdle
//!                   │             │
//!                   v             v
//!                Errored        Closed   (path removed or replaced)
//! ```
//!
//! # Truncation
//!
//! Truncation is not corrected by default: a session whose cursor is past
//! the end of a truncated file stalls until the file grows beyond the cursor
//! again. With [`TailOptions::detect_truncation`] the session rewinds to the
//! start of the file instead.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::error::TailError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TailOptions {
    /// Idle time at end-of-file before the next read attempt.
    pub poll_interval: Duration,
    /// Maximum bytes handed out per chunk.
    pub read_chunk_bytes: usize,
    pub detect_truncation: bool,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            read_chunk_bytes: 64 * 1024,
            detect_truncation: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Opening,
    Streaming,
    EofIdle,
    Closed,
    Errored,
}

/// Identifies the file behind a path so a replaced file can be told apart
/// from the one the session has open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    fn of(metadata: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        }
    }

    #[cfg(not(unix))]
    fn of(_metadata: &std::fs::Metadata) -> Self {
        Self {}
    }
}

#[derive(Debug)]
pub struct TailSession {
    path: PathBuf,
    file: File,
    identity: FileIdentity,
    start_offset: u64,
    cursor: u64,
    state: TailState,
    options: TailOptions,
}

impl TailSession {
    /// Opens `path` positioned at its current end.
    ///
    /// The size is read from the opened handle, so bytes appended between
    /// discovery and this call are the first ones delivered.
    pub async fn open(path: impl AsRef<Path>, options: TailOptions) -> Result<Self, TailError> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| TailError::Open {
            path: path.clone(),
            source,
        };

        let mut file = File::open(&path).await.map_err(open_error)?;
        let metadata = file.metadata().await.map_err(open_error)?;
        let start_offset = metadata.len();
        file.seek(SeekFrom::Start(start_offset))
            .await
            .map_err(open_error)?;

        debug!(
            "TAIL | Opened {} at offset {start_offset}",
            path.display()
        );

        Ok(TailSession {
            identity: FileIdentity::of(&metadata),
            path,
            file,
            start_offset,
            cursor: start_offset,
            state: TailState::Streaming,
            options,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    #[must_use]
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    #[must_use]
    pub fn state(&self) -> TailState {
        self.state
    }

    pub fn close(&mut self) {
        self.state = TailState::Closed;
    }

    /// Waits for and returns the next appended bytes.
    ///
    /// Returns `Ok(None)` once the session is closed. An error moves the
    /// session to [`TailState::Errored`]; later calls return `Ok(None)`.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TailError> {
        let mut buffer = BytesMut::zeroed(self.options.read_chunk_bytes);

        loop {
            if matches!(self.state, TailState::Closed | TailState::Errored) {
                return Ok(None);
            }

            let read = match self.file.read(&mut buffer).await {
                Ok(read) => read,
                Err(source) => return Err(self.fail(source)),
            };

            if read > 0 {
                self.cursor += read as u64;
                self.state = TailState::Streaming;
                buffer.truncate(read);
                return Ok(Some(buffer.freeze()));
            }

            self.state = TailState::EofIdle;
            if !self.still_current().await {
                debug!(
                    "TAIL | {} was removed or replaced, closing session at offset {}",
                    self.path.display(),
                    self.cursor
                );
                self.state = TailState::Closed;
                return Ok(None);
            }
            if self.options.detect_truncation {
                if let Err(source) = self.rewind_if_truncated().await {
                    return Err(self.fail(source));
                }
            }
            tokio::time::sleep(self.options.poll_interval).await;
        }
    }

    /// Consumes the session into a stream of appended chunks.
    pub fn into_chunks(self) -> impl Stream<Item = Result<Bytes, TailError>> {
        stream::unfold(self, |mut session| async move {
            match session.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), session)),
                Ok(None) => None,
                Err(e) => Some((Err(e), session)),
            }
        })
    }

    fn fail(&mut self, source: std::io::Error) -> TailError {
        self.state = TailState::Errored;
        TailError::Read {
            path: self.path.clone(),
            source,
        }
    }

    /// Whether the path still names the file this session has open.
    async fn still_current(&self) -> bool {
        match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => FileIdentity::of(&metadata) == self.identity,
            Err(_) => false,
        }
    }

    async fn rewind_if_truncated(&mut self) -> std::io::Result<()> {
        let len = self.file.metadata().await?.len();
        if len < self.cursor {
            warn!(
                "TAIL | {} shrank from {} to {len} bytes, reading from the start",
                self.path.display(),
                self.cursor
            );
            self.file.seek(SeekFrom::Start(0)).await?;
            self.cursor = 0;
        }
        Ok(())
    }
}
