// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Byte stream to line reconstruction.
//!
//! Appended bytes arrive in arbitrary chunks; a chunk may end in the middle
//! of a line. [`LineCodec`] keeps the partial tail buffered until the next
//! chunk completes it and only ever emits whole lines:
//!
//! ```text
//!   chunk 1: "GET /a 200\nGET /b"     -> "GET /a 200"
//!   chunk 2: " 404\n\nGET /c 200"     -> "GET /b 404"        ("" dropped)
//!   end of stream                     -> "GET /c 200"        (flushed)
//! ```
//!
//! Empty lines carry nothing worth shipping and are never emitted. A single
//! `\r` before the newline is stripped so CRLF files produce the same
//! content as LF files.

use std::io;

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tokio_util::codec::Decoder;

const DELIMITER: u8 = b'\n';

#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec {
    /// Offset up to which the buffer is known not to contain a delimiter.
    next_index: usize,
}

impl LineCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn to_line(mut raw: &[u8]) -> Option<String> {
    if let [rest @ .., b'\r'] = raw {
        raw = rest;
    }
    if raw.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(raw).into_owned())
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        loop {
            let Some(offset) = src[self.next_index..]
                .iter()
                .position(|b| *b == DELIMITER)
            else {
                self.next_index = src.len();
                return Ok(None);
            };

            let delimiter_index = self.next_index + offset;
            self.next_index = 0;
            let line = src.split_to(delimiter_index + 1);
            if let Some(line) = to_line(&line[..delimiter_index]) {
                return Ok(Some(line));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let remainder = src.split();
        Ok(to_line(remainder.chunk()))
    }
}

struct Reconstructor<S> {
    chunks: S,
    buffer: BytesMut,
    codec: LineCodec,
    finished: bool,
}

/// Turns a stream of byte chunks into a lazy stream of complete lines.
///
/// When `chunks` ends, a held partial line is emitted as the final line.
/// When `chunks` yields an error, the error is passed through and the
/// stream ends; the held partial line is discarded.
pub fn reconstruct<S, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: From<io::Error>,
{
    let state = Reconstructor {
        chunks,
        buffer: BytesMut::new(),
        codec: LineCodec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        loop {
            match state.codec.decode(&mut state.buffer) {
                Ok(Some(line)) => return Some((Ok(line), state)),
                Ok(None) => {}
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e.into()), state));
                }
            }

            match state.chunks.next().await {
                Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                    return match state.codec.decode_eof(&mut state.buffer) {
                        Ok(Some(line)) => Some((Ok(line), state)),
                        Ok(None) => None,
                        Err(e) => Some((Err(e.into()), state)),
                    };
                }
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunked(parts: &[&str]) -> impl Stream<Item = Result<Bytes, io::Error>> + Unpin {
        let owned: Vec<Result<Bytes, io::Error>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        stream::iter(owned)
    }

    async fn collect(parts: &[&str]) -> Vec<String> {
        reconstruct(chunked(parts))
            .map(|line: Result<String, io::Error>| line.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_flushed() {
        assert_eq!(collect(&["hello\nworld"]).await, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_partial_line_spans_chunks() {
        assert_eq!(
            collect(&["GET /a 200\nGET /b", " 404\n\nGET /c 200"]).await,
            vec!["GET /a 200", "GET /b 404", "GET /c 200"]
        );
    }

    #[tokio::test]
    async fn test_empty_lines_are_dropped() {
        assert_eq!(collect(&["\n\n\na\n\n", "\nb\n"]).await, vec!["a", "b"]);
        assert!(collect(&["\n", "\n\r\n"]).await.is_empty());
    }

    #[tokio::test]
    async fn test_crlf_is_stripped() {
        assert_eq!(collect(&["one\r\ntwo\r", "\n"]).await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_delimiter_split_from_its_line() {
        assert_eq!(collect(&["abc", "\n", "def", "\n"]).await, vec!["abc", "def"]);
    }

    #[tokio::test]
    async fn test_error_ends_stream_without_flushing() {
        let chunks = stream::iter(vec![
            Ok(Bytes::from_static(b"done\npartial")),
            Err(io::Error::new(io::ErrorKind::Other, "gone")),
            Ok(Bytes::from_static(b"never\n")),
        ]);
        let results: Vec<Result<String, io::Error>> = reconstruct(chunks).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "done");
        assert!(results[1].is_err());
    }

    #[test]
    fn test_decode_eof_flushes_remainder_once() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from("tail");
        assert_eq!(codec.decode(&mut buffer).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), Some("tail".to_string()));
        assert_eq!(codec.decode_eof(&mut buffer).unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let mut buffer = BytesMut::from(&b"ok \xff\n"[..]);
        assert_eq!(
            codec.decode(&mut buffer).unwrap(),
            Some("ok \u{fffd}".to_string())
        );
    }

    proptest! {
        #[test]
        fn prop_lines_survive_any_chunking(
            lines in prop::collection::vec("[a-z ]{0,12}", 0..20),
            cuts in prop::collection::vec(0usize..200, 0..10),
            trailing_newline in any::<bool>(),
        ) {
            let mut text = lines.join("\n");
            if trailing_newline {
                text.push('\n');
            }
            let bytes = text.as_bytes();

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c.min(bytes.len())).collect();
            cuts.push(0);
            cuts.push(bytes.len());
            cuts.sort_unstable();
            cuts.dedup();
            let chunks: Vec<Result<Bytes, io::Error>> = cuts
                .windows(2)
                .map(|w| Ok(Bytes::copy_from_slice(&bytes[w[0]..w[1]])))
                .collect();

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let got: Vec<String> = runtime.block_on(
                reconstruct(stream::iter(chunks))
                    .map(|line: Result<String, io::Error>| line.unwrap())
                    .collect(),
            );
            let expected: Vec<String> = lines.into_iter().filter(|l| !l.is_empty()).collect();
            prop_assert_eq!(got, expected);
        }
    }
}
