// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Line sources: files found by discovery and the process's standard input.
//!
//! ```text
//!   SourceWatcher ─> TailSession ─> chunks ─> reconstruct ─> LineParser ─> LineEvent
//!   stdin ───────────────────────> LineCodec ──────────────────────────> LineEvent
//! ```

pub mod discovery;
pub mod format;
pub mod lines;
pub mod spec;
pub mod tail;

use std::io::{self, Read};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use crate::error::TailError;
use crate::event::LineEvent;
use crate::sources::format::LineParser;
use crate::sources::lines::{reconstruct, LineCodec};

pub use discovery::{DiscoveryEvent, SourceWatcher, WatchOptions};
pub use format::LogFormat;
pub use spec::SourceSpec;
pub use tail::{TailOptions, TailSession, TailState};

/// Source tag of lines read from standard input.
pub const STDIN_TAG: &str = "stdout";

const READER_CHUNK_BYTES: usize = 8 * 1024;
const READER_BUFFER_CHUNKS: usize = 16;

/// Lines of the process's standard input, from its current position.
pub fn stdin_lines() -> impl Stream<Item = Result<LineEvent, TailError>> + Send {
    blocking_reader_lines(std::io::stdin(), STDIN_TAG)
}

/// Lines of a blocking reader, read on a dedicated thread.
///
/// Dropping the stream detaches the thread. A read that is blocked waiting
/// for input never holds up runtime shutdown.
pub fn blocking_reader_lines<R>(
    reader: R,
    tag: impl Into<String>,
) -> impl Stream<Item = Result<LineEvent, TailError>> + Send
where
    R: Read + Send + 'static,
{
    let tag = tag.into();
    let (tx, mut rx) = mpsc::channel(READER_BUFFER_CHUNKS);
    let spawn_error = tx.clone();
    if let Err(e) = std::thread::Builder::new()
        .name(format!("logtail-read-{tag}"))
        .spawn(move || pump(reader, &tx))
    {
        // the receiver is still held here, so the channel has room
        let _ = spawn_error.try_send(Err(TailError::Stdin(e)));
    }

    let chunks = stream::poll_fn(move |cx| rx.poll_recv(cx));
    reconstruct(chunks).map(move |line| line.map(|content| LineEvent::new(tag.clone(), content)))
}

fn pump<R: Read>(mut reader: R, tx: &mpsc::Sender<Result<Bytes, TailError>>) {
    let mut buf = vec![0u8; READER_CHUNK_BYTES];
    loop {
        let chunk = match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => Ok(Bytes::copy_from_slice(&buf[..n])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => Err(TailError::Stdin(e)),
        };
        let failed = chunk.is_err();
        if tx.blocking_send(chunk).is_err() || failed {
            return;
        }
    }
}

/// Lines of any reader, each tagged with `tag`. Ends with the reader.
pub fn reader_lines<R>(
    reader: R,
    tag: impl Into<String>,
) -> impl Stream<Item = Result<LineEvent, TailError>> + Send
where
    R: AsyncRead + Send,
{
    let tag = tag.into();
    FramedRead::new(reader, LineCodec::new()).map(move |line| {
        line.map(|content| LineEvent::new(tag.clone(), content))
            .map_err(TailError::Stdin)
    })
}

/// Lines appended to a tailed file, parsed with the source's format.
///
/// Lines are tagged with the file's path unless the parser supplies its own
/// stream label. Lines the parser rejects are skipped. Parsed content that
/// spans several lines becomes one event per line.
pub fn file_lines(
    session: TailSession,
    parser: Arc<dyn LineParser>,
) -> impl Stream<Item = Result<LineEvent, TailError>> + Send {
    let tag = session.path().display().to_string();
    let chunks = Box::pin(session.into_chunks());

    reconstruct(chunks).flat_map(move |line| {
        let events: Vec<Result<LineEvent, TailError>> = match line {
            Ok(raw) => match parser.parse(&raw) {
                Some(parsed) => {
                    let tag = parsed.stream.as_deref().unwrap_or(tag.as_str());
                    parsed
                        .lines()
                        .map(|content| Ok(LineEvent::new(tag, content)))
                        .collect()
                }
                None => Vec::new(),
            },
            Err(e) => vec![Err(e)],
        };
        stream::iter(events)
    })
}
