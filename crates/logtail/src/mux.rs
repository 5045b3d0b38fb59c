// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fan-in of every line source into one event stream.
//!
//! ```text
//!    ┌──────────┐  ┌──────────┐  ┌──────────┐
//!    │ source a │  │ source b │  │  stdin   │   one forwarding task each
//!    └────┬─────┘  └────┬─────┘  └────┬─────┘
//!         └─────────────┼─────────────┘
//!                       v
//!               ┌───────────────┐
//!               │  Multiplexer  │  single consumer
//!               └───────────────┘
//! ```
//!
//! Each source keeps its own order; nothing is promised across sources.
//! Sources can be attached while the consumer is already reading. A source
//! that fails is logged and detached without disturbing the others.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::error::TailError;
use crate::event::LineEvent;

/// The consuming side of the fan-in.
///
/// [`Multiplexer::next`] returns `None` once every [`MuxHandle`] is dropped
/// and every attached source has detached.
#[derive(Debug)]
pub struct Multiplexer {
    rx: mpsc::UnboundedReceiver<LineEvent>,
    active: Arc<AtomicUsize>,
}

/// Attaches sources to a [`Multiplexer`]. Cloneable.
#[derive(Debug, Clone)]
pub struct MuxHandle {
    tx: mpsc::UnboundedSender<LineEvent>,
    control: MuxControl,
    active: Arc<AtomicUsize>,
}

/// Detaches every source. Unlike a [`MuxHandle`], holding one does not keep
/// the [`Multiplexer`] open.
#[derive(Debug, Clone)]
pub struct MuxControl {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Detaches one attached source.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    label: String,
    cancel: CancellationToken,
}

impl Multiplexer {
    #[must_use]
    pub fn new() -> (Self, MuxHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let active = Arc::new(AtomicUsize::new(0));
        (
            Multiplexer {
                rx,
                active: active.clone(),
            },
            MuxHandle {
                tx,
                control: MuxControl {
                    cancel: CancellationToken::new(),
                    tracker: TaskTracker::new(),
                },
                active,
            },
        )
    }

    pub async fn next(&mut self) -> Option<LineEvent> {
        self.rx.recv().await
    }

    /// Returns an already forwarded event without waiting.
    pub fn try_next(&mut self) -> Option<LineEvent> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

impl MuxHandle {
    pub fn attach<S>(&self, label: impl Into<String>, stream: S) -> SourceHandle
    where
        S: Stream<Item = Result<LineEvent, TailError>> + Send + 'static,
    {
        let label = label.into();
        let cancel = self.control.cancel.child_token();
        self.active.fetch_add(1, Ordering::AcqRel);
        debug!("MUX | Attaching {label}");

        self.control.tracker.spawn(forward(
            label.clone(),
            stream,
            self.tx.clone(),
            cancel.clone(),
            self.active.clone(),
        ));

        SourceHandle { label, cancel }
    }

    #[must_use]
    pub fn active_sources(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn control(&self) -> MuxControl {
        self.control.clone()
    }

    pub async fn shutdown(&self) {
        self.control.shutdown().await;
    }
}

impl MuxControl {
    /// Detaches every source and waits for their forwarding tasks to end.
    ///
    /// Events already forwarded stay readable from the [`Multiplexer`].
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        debug!("MUX | All sources detached");
    }
}

impl SourceHandle {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

async fn forward<S>(
    label: String,
    stream: S,
    tx: mpsc::UnboundedSender<LineEvent>,
    cancel: CancellationToken,
    active: Arc<AtomicUsize>,
) where
    S: Stream<Item = Result<LineEvent, TailError>>,
{
    tokio::pin!(stream);
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("MUX | Detached {label}");
                break;
            }
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    if tx.send(event).is_err() {
                        debug!("MUX | Consumer gone, detaching {label}");
                        break;
                    }
                }
                Some(Err(e)) => {
                    error!("MUX | Source {label} failed and was detached: {e}");
                    break;
                }
                None => {
                    debug!("MUX | Source {label} ended");
                    break;
                }
            }
        }
    }
    active.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures::stream;
    use std::time::Duration;
    use tokio::time::timeout;
    use tracing_test::traced_test;

    fn lines(tag: &'static str, contents: &[&'static str]) -> Vec<Result<LineEvent, TailError>> {
        contents
            .iter()
            .map(|content| Ok(LineEvent::new(tag, *content)))
            .collect()
    }

    async fn drain(mux: &mut Multiplexer) -> Vec<LineEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = timeout(Duration::from_secs(5), mux.next()).await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_per_source_order_is_kept() {
        let (mut mux, handle) = Multiplexer::new();
        handle.attach("a", stream::iter(lines("a", &["a1", "a2", "a3"])));
        handle.attach("b", stream::iter(lines("b", &["b1", "b2"])));
        drop(handle);

        let events = drain(&mut mux).await;
        assert_eq!(events.len(), 5);
        let from_a: Vec<&str> = events
            .iter()
            .filter(|e| e.source_tag == "a")
            .map(|e| e.content.as_str())
            .collect();
        let from_b: Vec<&str> = events
            .iter()
            .filter(|e| e.source_tag == "b")
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(from_a, vec!["a1", "a2", "a3"]);
        assert_eq!(from_b, vec!["b1", "b2"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failing_source_is_detached_alone() {
        let (mut mux, handle) = Multiplexer::new();
        let failing = vec![
            Ok(LineEvent::new("bad", "before")),
            Err(TailError::Stdin(std::io::Error::other("broken pipe"))),
            Ok(LineEvent::new("bad", "after")),
        ];
        handle.attach("bad", stream::iter(failing));
        handle.attach("good", stream::iter(lines("good", &["g1", "g2"])));
        drop(handle);

        let events = drain(&mut mux).await;
        let contents: Vec<&str> = events.iter().map(|e| e.content.as_str()).collect();
        assert!(contents.contains(&"before"));
        assert!(!contents.contains(&"after"));
        assert!(contents.contains(&"g1"));
        assert!(contents.contains(&"g2"));
        assert!(logs_contain("Source bad failed and was detached"));
    }

    #[tokio::test]
    async fn test_late_attach_and_cancel() {
        let (mut mux, handle) = Multiplexer::new();
        assert_eq!(mux.active_sources(), 0);

        let (tx, rx) = mpsc::unbounded_channel::<Result<LineEvent, TailError>>();
        let pending = tokio_stream_from(rx);
        let source = handle.attach("live", pending);
        assert_eq!(handle.active_sources(), 1);

        tx.send(Ok(LineEvent::new("live", "one"))).unwrap();
        assert_eq!(mux.next().await.unwrap().content, "one");

        source.cancel();
        handle.shutdown().await;
        assert_eq!(mux.active_sources(), 0);

        // nothing sent after cancellation reaches the consumer
        let _ = tx.send(Ok(LineEvent::new("live", "two")));
        assert!(mux.try_next().is_none());
    }

    #[tokio::test]
    async fn test_control_does_not_keep_consumer_open() {
        let (mut mux, handle) = Multiplexer::new();
        let control = handle.control();
        handle.attach("short", stream::iter(lines("short", &["only"])));
        drop(handle);

        assert_eq!(mux.next().await.unwrap().content, "only");
        assert!(mux.next().await.is_none());
        control.shutdown().await;
    }

    #[tokio::test]
    async fn test_next_ends_after_shutdown() {
        let (mut mux, handle) = Multiplexer::new();
        handle.attach(
            "endless",
            stream::pending::<Result<LineEvent, TailError>>(),
        );
        handle.shutdown().await;
        drop(handle);
        assert!(mux.next().await.is_none());
    }

    fn tokio_stream_from(
        mut rx: mpsc::UnboundedReceiver<Result<LineEvent, TailError>>,
    ) -> impl Stream<Item = Result<LineEvent, TailError>> + Send {
        stream::poll_fn(move |cx| rx.poll_recv(cx))
    }
}
