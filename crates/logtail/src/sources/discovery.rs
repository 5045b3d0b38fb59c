// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Discovery of files to tail.
//!
//! A [`SourceWatcher`] resolves a path or glob to a watch root, subscribes to
//! filesystem notifications under it and reports every matching file once
//! per creation:
//!
//! ```text
//!   notify events ──┐
//!                   ├─> match pattern ─> settle (size stable) ─> Discovered(path)
//!   initial glob ───┘
//! ```
//!
//! Files that do not exist yet are fine: the watch is on the root directory
//! and the file is reported when it appears. The root itself must exist.
//!
//! A path is only reported after its size stopped changing for
//! [`WatchOptions::settle_threshold`], so a tail session is never opened in
//! the middle of the write burst that created the file. A file that keeps
//! growing is reported after [`WatchOptions::settle_max_wait`]. A removed
//! path is forgotten, so recreating it reports it again.
//!
//! [`DiscoveryEvent::Ready`] is sent once every file present at startup was
//! reported or found gone. Filesystem events are handled in the meantime.
//! Discovery keeps running until the watcher is dropped.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use glob::{MatchOptions, Pattern};
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::SourceAccessError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// How long a file's size must stay unchanged before it is reported.
    pub settle_threshold: Duration,
    pub settle_poll_interval: Duration,
    /// Upper bound on settling; a file still growing is reported after it.
    pub settle_max_wait: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            settle_threshold: Duration::from_millis(200),
            settle_poll_interval: Duration::from_millis(50),
            settle_max_wait: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    Discovered(PathBuf),
    Ready,
}

/// Watches one path or glob. Dropping it stops discovery.
pub struct SourceWatcher {
    pattern: String,
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl SourceWatcher {
    /// Starts watching `pattern`.
    ///
    /// Must be called from within a tokio runtime. Fails when the pattern is
    /// invalid or its root directory cannot be watched; no file is ever
    /// reported in that case.
    pub fn watch(
        pattern: &str,
        options: WatchOptions,
    ) -> Result<(Self, mpsc::UnboundedReceiver<DiscoveryEvent>), SourceAccessError> {
        let target = WatchTarget::resolve(pattern)?;

        let (fs_tx, fs_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            // the receiver only goes away when discovery stops
            let _ = fs_tx.send(res);
        })
        .map_err(|source| SourceAccessError::Watch {
            path: target.root.clone(),
            source,
        })?;
        watcher
            .watch(&target.root, target.mode)
            .map_err(|source| SourceAccessError::Watch {
                path: target.root.clone(),
                source,
            })?;

        debug!(
            "DISCOVERY | Watching {} ({:?}) for {}",
            target.root.display(),
            target.mode,
            target.pattern
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let discovery = Discovery {
            target,
            options,
            known: HashSet::new(),
            settling: HashSet::new(),
            tx,
        };
        let task = tokio::spawn(discovery.run(fs_rx));

        Ok((
            SourceWatcher {
                pattern: pattern.to_string(),
                _watcher: watcher,
                task,
            },
            rx,
        ))
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl Drop for SourceWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The resolved form of a user pattern.
#[derive(Debug)]
struct WatchTarget {
    /// Absolute pattern rooted at the canonical watch root.
    pattern: Pattern,
    root: PathBuf,
    mode: RecursiveMode,
}

fn has_glob_chars(component: &str) -> bool {
    component.contains(['*', '?', '['])
}

impl WatchTarget {
    fn resolve(input: &str) -> Result<Self, SourceAccessError> {
        let mut absolute = PathBuf::from(input);
        if absolute.is_relative() {
            let cwd = std::env::current_dir().map_err(|source| SourceAccessError::Io {
                path: absolute.clone(),
                source,
            })?;
            absolute = cwd.join(absolute);
        }

        let components: Vec<Component<'_>> = absolute.components().collect();
        let literal_len = components
            .iter()
            .position(|c| has_glob_chars(&c.as_os_str().to_string_lossy()))
            .unwrap_or(components.len());

        // A literal file is watched through its parent directory.
        let (root_len, mode) = if literal_len == components.len() {
            (components.len().saturating_sub(1), RecursiveMode::NonRecursive)
        } else {
            let rest = &components[literal_len..];
            let recursive =
                rest.len() > 1 || rest.iter().any(|c| c.as_os_str().to_string_lossy() == "**");
            let mode = if recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            (literal_len, mode)
        };

        let root: PathBuf = components[..root_len].iter().collect();
        let root = std::fs::canonicalize(&root).map_err(|source| SourceAccessError::Io {
            path: root.clone(),
            source,
        })?;

        let mut full = root.clone();
        for component in &components[root_len..] {
            full.push(component);
        }
        let full = full.to_string_lossy().into_owned();
        let pattern = Pattern::new(&full).map_err(|source| SourceAccessError::InvalidPattern {
            pattern: input.to_string(),
            source,
        })?;

        Ok(WatchTarget {
            pattern,
            root,
            mode,
        })
    }

    fn matches(&self, path: &Path) -> bool {
        self.pattern.matches_path_with(path, MATCH_OPTIONS)
    }

    fn scan(&self) -> Vec<PathBuf> {
        match glob::glob_with(self.pattern.as_str(), MATCH_OPTIONS) {
            Ok(paths) => paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("DISCOVERY | Skipping unreadable path during scan: {e}");
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("DISCOVERY | Failed to scan {}: {e}", self.pattern);
                Vec::new()
            }
        }
    }
}

struct Discovery {
    target: WatchTarget,
    options: WatchOptions,
    /// Paths reported and not removed since.
    known: HashSet<PathBuf>,
    /// Paths waiting for their writes to settle.
    settling: HashSet<PathBuf>,
    tx: mpsc::UnboundedSender<DiscoveryEvent>,
}

impl Discovery {
    async fn run(mut self, mut fs_rx: mpsc::UnboundedReceiver<notify::Result<Event>>) {
        let mut pending = FuturesUnordered::new();
        let mut initial = HashSet::new();
        for path in self.target.scan() {
            if self.settling.insert(path.clone()) {
                initial.insert(path.clone());
                pending.push(settle(path, self.options));
            }
        }
        let mut ready = false;

        loop {
            if !ready && initial.is_empty() {
                if self.tx.send(DiscoveryEvent::Ready).is_err() {
                    return;
                }
                info!("DISCOVERY | Initial scan of {} complete", self.target.pattern);
                ready = true;
            }

            tokio::select! {
                () = self.tx.closed() => {
                    debug!("DISCOVERY | Receiver dropped, stopping watch of {}", self.target.pattern);
                    return;
                }
                event = fs_rx.recv() => {
                    let Some(event) = event else {
                        return;
                    };
                    match event {
                        Ok(event) => {
                            for path in self.candidates(event) {
                                pending.push(settle(path, self.options));
                            }
                        }
                        Err(e) => warn!("DISCOVERY | Watch error for {}: {e}", self.target.pattern),
                    }
                }
                Some(settled) = pending.next(), if !pending.is_empty() => match settled {
                    Settled::File(path) => {
                        initial.remove(&path);
                        self.report(path);
                    }
                    Settled::Vanished(path) => {
                        initial.remove(&path);
                        self.settling.remove(&path);
                        debug!("DISCOVERY | {} went away while settling", path.display());
                    }
                }
            }
        }
    }

    /// Applies removals from `event` and returns the paths that need settling.
    fn candidates(&mut self, event: Event) -> Vec<PathBuf> {
        let mut created = Vec::new();
        let mut rescan = false;

        match event.kind {
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.forget(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = event.paths.as_slice() {
                    self.forget(from);
                    created.push(to.clone());
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in &event.paths {
                    if path.exists() {
                        created.push(path.clone());
                    } else {
                        self.forget(path);
                    }
                }
            }
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any => {
                for path in &event.paths {
                    if path.is_dir() {
                        rescan = true;
                    } else {
                        created.push(path.clone());
                    }
                }
            }
            EventKind::Access(_) | EventKind::Other => {}
        }

        if rescan {
            created.extend(self.target.scan());
        }

        created.retain(|path| {
            self.target.matches(path)
                && !self.known.contains(path)
                && self.settling.insert(path.clone())
        });
        created
    }

    fn forget(&mut self, path: &Path) {
        if self.known.remove(path) {
            debug!("DISCOVERY | {} removed", path.display());
        }
    }

    fn report(&mut self, path: PathBuf) {
        self.settling.remove(&path);
        if !self.known.insert(path.clone()) {
            return;
        }
        debug!("DISCOVERY | Discovered {}", path.display());
        // a closed receiver is noticed by the run loop
        let _ = self.tx.send(DiscoveryEvent::Discovered(path));
    }
}

/// Outcome of waiting for a candidate path's writes to settle.
#[derive(Debug, PartialEq, Eq)]
enum Settled {
    /// A regular file, ready to be tailed.
    File(PathBuf),
    /// Missing, or not a regular file.
    Vanished(PathBuf),
}

/// Waits until `path` is a regular file whose size held still for the
/// settle threshold, or for at most `settle_max_wait`.
async fn settle(path: PathBuf, options: WatchOptions) -> Settled {
    let started = Instant::now();
    let mut stable: Option<(u64, Instant)> = None;
    loop {
        let size = match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return Settled::Vanished(path),
        };
        match stable {
            Some((previous, since)) if previous == size => {
                if since.elapsed() >= options.settle_threshold {
                    return Settled::File(path);
                }
            }
            _ => stable = Some((size, Instant::now())),
        }
        if started.elapsed() >= options.settle_max_wait {
            debug!(
                "DISCOVERY | {} is still being written, tailing it anyway",
                path.display()
            );
            return Settled::File(path);
        }
        sleep(options.settle_poll_interval).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::timeout;

    fn fast() -> WatchOptions {
        WatchOptions {
            settle_threshold: Duration::from_millis(20),
            settle_poll_interval: Duration::from_millis(10),
            settle_max_wait: Duration::from_secs(2),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<DiscoveryEvent>) -> DiscoveryEvent {
        timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for discovery")
            .expect("discovery stopped")
    }

    fn canonical(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap()
    }

    #[test]
    fn test_literal_path_watches_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.log");
        let target = WatchTarget::resolve(file.to_str().unwrap()).unwrap();

        assert_eq!(target.root, canonical(dir.path()));
        assert_eq!(target.mode, RecursiveMode::NonRecursive);
        assert!(target.matches(&canonical(dir.path()).join("app.log")));
        assert!(!target.matches(&canonical(dir.path()).join("other.log")));
    }

    #[test]
    fn test_glob_root_and_recursion() {
        let dir = tempfile::tempdir().unwrap();
        let flat = format!("{}/*.log", dir.path().display());
        let target = WatchTarget::resolve(&flat).unwrap();
        assert_eq!(target.root, canonical(dir.path()));
        assert_eq!(target.mode, RecursiveMode::NonRecursive);

        let nested = format!("{}/*/current.log", dir.path().display());
        let target = WatchTarget::resolve(&nested).unwrap();
        assert_eq!(target.mode, RecursiveMode::Recursive);
        let root = canonical(dir.path());
        assert!(target.matches(&root.join("svc").join("current.log")));
        assert!(!target.matches(&root.join("a").join("b").join("current.log")));
    }

    #[test]
    fn test_missing_root_is_an_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/missing/*.log", dir.path().display());
        let err = WatchTarget::resolve(&pattern).unwrap_err();
        assert!(matches!(err, SourceAccessError::Io { .. }));
    }

    #[tokio::test]
    async fn test_existing_files_are_discovered_before_ready() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "x\n").unwrap();
        std::fs::write(dir.path().join("skip.txt"), "x\n").unwrap();

        let pattern = format!("{}/*.log", dir.path().display());
        let (_watcher, mut rx) = SourceWatcher::watch(&pattern, fast()).unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            DiscoveryEvent::Discovered(canonical(&dir.path().join("a.log")))
        );
        assert_eq!(next_event(&mut rx).await, DiscoveryEvent::Ready);
    }

    #[tokio::test]
    async fn test_busy_file_is_discovered_and_ready_fires() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("busy.log");
        std::fs::write(&file, "").unwrap();
        let expected = canonical(&file);

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let (file, stop) = (file.clone(), stop.clone());
            std::thread::spawn(move || {
                let mut out = std::fs::OpenOptions::new().append(true).open(file).unwrap();
                while !stop.load(Ordering::Relaxed) {
                    out.write_all(b"tick\n").unwrap();
                    std::thread::sleep(Duration::from_millis(50));
                }
            })
        };

        let (_watcher, mut rx) =
            SourceWatcher::watch(file.to_str().unwrap(), WatchOptions::default()).unwrap();
        let first = timeout(Duration::from_secs(5), rx.recv()).await;
        let second = timeout(Duration::from_secs(5), rx.recv()).await;
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();

        assert_eq!(
            first.unwrap().unwrap(),
            DiscoveryEvent::Discovered(expected)
        );
        assert_eq!(second.unwrap().unwrap(), DiscoveryEvent::Ready);
    }

    #[tokio::test]
    async fn test_file_created_after_start_is_discovered_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("late.log");
        let (_watcher, mut rx) = SourceWatcher::watch(file.to_str().unwrap(), fast()).unwrap();
        assert_eq!(next_event(&mut rx).await, DiscoveryEvent::Ready);

        std::fs::write(&file, "first\n").unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            DiscoveryEvent::Discovered(canonical(&file))
        );

        // further writes to a known file are not rediscoveries
        std::fs::write(&file, "first\nsecond\n").unwrap();
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_recreated_file_is_discovered_again() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.log");
        std::fs::write(&file, "").unwrap();
        let expected = canonical(&file);

        let (_watcher, mut rx) = SourceWatcher::watch(file.to_str().unwrap(), fast()).unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            DiscoveryEvent::Discovered(expected.clone())
        );
        assert_eq!(next_event(&mut rx).await, DiscoveryEvent::Ready);

        std::fs::remove_file(&file).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&file, "again\n").unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            DiscoveryEvent::Discovered(expected)
        );
    }

    #[tokio::test]
    async fn test_file_removed_while_settling_is_discovered_when_recreated() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("app.log");
        let options = WatchOptions {
            settle_threshold: Duration::from_millis(200),
            settle_poll_interval: Duration::from_millis(10),
            settle_max_wait: Duration::from_secs(2),
        };
        let (_watcher, mut rx) = SourceWatcher::watch(file.to_str().unwrap(), options).unwrap();
        assert_eq!(next_event(&mut rx).await, DiscoveryEvent::Ready);

        std::fs::write(&file, "x").unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::remove_file(&file).unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        std::fs::write(&file, "again\n").unwrap();

        assert_eq!(
            next_event(&mut rx).await,
            DiscoveryEvent::Discovered(canonical(&file))
        );
    }

    #[tokio::test]
    async fn test_settle_rejects_directories_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert_eq!(
            settle(dir.path().to_path_buf(), fast()).await,
            Settled::Vanished(dir.path().to_path_buf())
        );
        assert_eq!(
            settle(missing.clone(), fast()).await,
            Settled::Vanished(missing)
        );
    }

    #[tokio::test]
    async fn test_settle_waits_for_stable_size() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("quiet.log");
        std::fs::write(&file, "").unwrap();

        let options = WatchOptions {
            settle_threshold: Duration::from_millis(100),
            settle_poll_interval: Duration::from_millis(10),
            settle_max_wait: Duration::from_secs(2),
        };
        let started = Instant::now();
        let settled = settle(file.clone(), options).await;
        assert_eq!(settled, Settled::File(file));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_settle_gives_up_waiting_on_growing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("growing.log");
        std::fs::write(&file, "").unwrap();

        let options = WatchOptions {
            settle_threshold: Duration::from_millis(100),
            settle_poll_interval: Duration::from_millis(10),
            settle_max_wait: Duration::from_millis(300),
        };
        let grower = {
            let file = file.clone();
            tokio::spawn(async move {
                loop {
                    let mut out = std::fs::OpenOptions::new().append(true).open(&file).unwrap();
                    out.write_all(b"more\n").unwrap();
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            })
        };

        let started = Instant::now();
        let settled = settle(file.clone(), options).await;
        grower.abort();
        assert_eq!(settled, Settled::File(file));
        assert!(started.elapsed() >= Duration::from_millis(300));
    }
}
