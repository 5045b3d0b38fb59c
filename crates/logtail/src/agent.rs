// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wiring of sources, multiplexer and delivery.
//!
//! ```text
//!   SourceSpec ─> SourceWatcher ─> TailSession ─┐
//!   SourceSpec ─> SourceWatcher ─> TailSession ─┼─> Multiplexer ─> LogsAgent::spin ─> BatchCoordinator
//!   "-" ─────────────────────────> stdin ───────┘
//! ```
//!
//! # Graceful Shutdown
//!
//! When the cancel token fires (or the coordinator gives up under
//! [`ExhaustedPolicy::Shutdown`]), discovery stops, every source is
//! detached, events already read are handed to the coordinator and
//! [`LogsAgent::spin`] returns once the coordinator is idle.
//!
//! [`ExhaustedPolicy::Shutdown`]: crate::delivery::ExhaustedPolicy::Shutdown

use std::future::Future;

use futures::future::join_all;
use futures::stream::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::delivery::BatchCoordinator;
use crate::error::{AgentError, ConfigError, TailError};
use crate::event::LineEvent;
use crate::mux::{Multiplexer, MuxControl, MuxHandle};
use crate::sources::{
    file_lines, stdin_lines, DiscoveryEvent, LogFormat, SourceSpec, SourceWatcher, TailOptions,
    TailSession,
};

#[allow(clippy::module_name_repetitions)]
pub struct LogsAgent {
    mux: Multiplexer,
    handle: Option<MuxHandle>,
    control: MuxControl,
    coordinator: BatchCoordinator,
    cancel_token: CancellationToken,
    discovery: TaskTracker,
    ready: Vec<oneshot::Receiver<()>>,
    watchers: usize,
}

impl LogsAgent {
    /// Starts every source in `sources`.
    ///
    /// A path source whose watch cannot be established is logged and
    /// skipped. Fails when no source at all could be started.
    pub fn start(
        sources: &[SourceSpec],
        config: &Config,
        coordinator: BatchCoordinator,
    ) -> Result<Self, AgentError> {
        if sources.is_empty() {
            return Err(ConfigError::MissingSources.into());
        }

        let (mux, handle) = Multiplexer::new();
        let mut agent = LogsAgent {
            mux,
            control: handle.control(),
            handle: Some(handle.clone()),
            coordinator,
            cancel_token: CancellationToken::new(),
            discovery: TaskTracker::new(),
            ready: Vec::new(),
            watchers: 0,
        };

        let mut started = 0;
        for spec in sources {
            match spec {
                SourceSpec::Stdin => {
                    handle.attach("stdin", stdin_lines());
                    started += 1;
                }
                SourceSpec::Path { format, pattern } => {
                    match SourceWatcher::watch(pattern, config.watch_options()) {
                        Ok((watcher, events)) => {
                            let (ready_tx, ready_rx) = oneshot::channel();
                            agent.ready.push(ready_rx);
                            agent.watchers += 1;
                            agent.discovery.spawn(discover(
                                watcher,
                                events,
                                *format,
                                config.tail_options(),
                                handle.clone(),
                                agent.cancel_token.clone(),
                                ready_tx,
                            ));
                            info!("DISCOVERY | Watching {spec}");
                            started += 1;
                        }
                        Err(e) => error!("DISCOVERY | Skipping source {spec}: {e}"),
                    }
                }
            }
        }
        agent.discovery.close();

        if started == 0 {
            return Err(AgentError::NoSources(sources.len()));
        }
        Ok(agent)
    }

    /// Attaches an already open line stream as an additional source.
    pub fn attach<S>(&self, label: impl Into<String>, stream: S)
    where
        S: Stream<Item = Result<LineEvent, TailError>> + Send + 'static,
    {
        if let Some(handle) = &self.handle {
            handle.attach(label, stream);
        }
    }

    /// Resolves once every watcher finished its initial scan.
    ///
    /// The returned future does not borrow the agent, so it can be awaited
    /// while [`LogsAgent::spin`] runs.
    pub fn ready(&mut self) -> impl Future<Output = ()> + Send + 'static {
        let ready = std::mem::take(&mut self.ready);
        async move {
            // a dropped sender means discovery already stopped
            join_all(ready).await;
        }
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    #[must_use]
    pub fn coordinator(&self) -> &BatchCoordinator {
        &self.coordinator
    }

    /// Forwards events to the coordinator until cancelled.
    ///
    /// Without any path source, also returns once every attached stream has
    /// ended, since nothing new can arrive.
    pub async fn spin(&mut self) {
        if self.watchers == 0 {
            self.handle = None;
        }
        let delivery_failed = self.coordinator.shutdown_token();

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("LOGS_AGENT | Received shutdown signal, draining remaining events");
                    break;
                }
                () = delivery_failed.cancelled() => {
                    warn!("LOGS_AGENT | Delivery failed permanently, shutting down");
                    break;
                }
                event = self.mux.next() => match event {
                    Some(event) => self.coordinator.enqueue(event),
                    None => {
                        debug!("LOGS_AGENT | All sources ended");
                        break;
                    }
                }
            }
        }

        self.cancel_token.cancel();
        self.discovery.wait().await;
        self.control.shutdown().await;
        self.handle = None;

        let mut drained = 0;
        while let Some(event) = self.mux.try_next() {
            self.coordinator.enqueue(event);
            drained += 1;
        }
        debug!("LOGS_AGENT | Drained {drained} events, waiting for delivery");
        self.coordinator.wait_idle().await;
    }
}

async fn discover(
    watcher: SourceWatcher,
    mut events: mpsc::UnboundedReceiver<DiscoveryEvent>,
    format: LogFormat,
    options: TailOptions,
    handle: MuxHandle,
    cancel: CancellationToken,
    ready: oneshot::Sender<()>,
) {
    let mut ready = Some(ready);
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Some(DiscoveryEvent::Ready) => {
                if let Some(ready) = ready.take() {
                    let _ = ready.send(());
                }
            }
            Some(DiscoveryEvent::Discovered(path)) => {
                match TailSession::open(&path, options).await {
                    Ok(session) => {
                        let lines = file_lines(session, format.parser());
                        handle.attach(path.display().to_string(), lines);
                    }
                    Err(e) => warn!("TAIL | {e}"),
                }
            }
            None => break,
        }
    }
    debug!("DISCOVERY | Stopped watching {}", watcher.pattern());
}
