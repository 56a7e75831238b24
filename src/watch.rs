//! Config file reconciliation loop
//!
//! Waits for writes to the config file and re-applies it to the live
//! interface, one event at a time:
//!
//! ```text
//!            arm ok                write event
//!   start ──────────▶ WATCHING ─────────────────▶ APPLYING
//!                       ▲   │                         │
//!                       │   │ arm / stream failure    │ re-arm
//!                       │   ▼                         │
//!                       │ FAILED ◀── apply failure ───┤
//!                       └─────────────────────────────┘
//! ```
//!
//! The watch is re-registered on the path after every delivered event.
//! Editors that save by writing a temporary file and renaming it over the
//! target leave the old subscription pointing at a deleted inode; binding
//! to the path again picks up the new file.

use async_trait::async_trait;
use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::apply::ConfigApply;
use crate::config::RuntimeConfig;
use crate::error::{WgError, WgResult};

/// Whether an event changed the file's content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Write,
    Other,
}

/// A delivered file change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub paths: Vec<PathBuf>,
}

impl ChangeEvent {
    pub fn write(path: impl Into<PathBuf>) -> Self {
        Self { kind: ChangeKind::Write, paths: vec![path.into()] }
    }

    pub fn other(path: impl Into<PathBuf>) -> Self {
        Self { kind: ChangeKind::Other, paths: vec![path.into()] }
    }

    pub fn is_write(&self) -> bool {
        self.kind == ChangeKind::Write
    }
}

impl From<Event> for ChangeEvent {
    fn from(event: Event) -> Self {
        Self { kind: classify(&event.kind), paths: event.paths }
    }
}

/// Content writes are data modifications; metadata, renames, removals and
/// access notifications are not.
pub fn classify(kind: &EventKind) -> ChangeKind {
    match kind {
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => ChangeKind::Write,
        _ => ChangeKind::Other,
    }
}

/// A subscription to changes of a single file
#[async_trait]
pub trait ChangeSource: Send {
    /// Bind (or re-bind) the subscription to whatever is at `path` now
    fn arm(&mut self, path: &Path) -> WgResult<()>;

    /// Wait for the next notification. `None` means the source is gone.
    async fn next_event(&mut self) -> Option<WgResult<ChangeEvent>>;
}

/// inotify-backed (on Linux) change source
pub struct NotifySource {
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl NotifySource {
    pub fn new() -> WgResult<Self> {
        let (tx, events) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // The receiver only goes away when the loop has ended
                let _ = tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| WgError::watch("unable to initialize the file watching", e))?;

        Ok(Self { watcher, events })
    }
}

#[async_trait]
impl ChangeSource for NotifySource {
    fn arm(&mut self, path: &Path) -> WgResult<()> {
        // Watching an already watched path re-resolves it to the current
        // inode, which is what a replaced file needs.
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|e| WgError::watch(format!("cannot watch {}", path.display()), e))?;
        debug!("Watching {}", path.display());
        Ok(())
    }

    async fn next_event(&mut self) -> Option<WgResult<ChangeEvent>> {
        let res = self.events.recv().await?;
        Some(
            res.map(ChangeEvent::from)
                .map_err(|e| WgError::watch("file watcher reported an error", e)),
        )
    }
}

/// Position of the loop in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Watching,
    Applying,
    Failed,
}

/// Counters returned when the loop is shut down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub events: u64,
    pub applies: u64,
}

/// Watches the config file and re-applies it on every write
pub struct ReconcileLoop<'a, S, A: ?Sized> {
    config: &'a RuntimeConfig,
    source: S,
    applier: &'a A,
    state: LoopState,
    stats: ReconcileStats,
}

impl<'a, S, A> ReconcileLoop<'a, S, A>
where
    S: ChangeSource,
    A: ConfigApply + ?Sized,
{
    pub fn new(config: &'a RuntimeConfig, source: S, applier: &'a A) -> Self {
        Self {
            config,
            source,
            applier,
            state: LoopState::Idle,
            stats: ReconcileStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until a fatal error. Never returns `Ok`.
    pub async fn run(&mut self) -> WgResult<ReconcileStats> {
        self.run_until(std::future::pending()).await
    }

    /// Run until a fatal error or until `shutdown` completes.
    pub async fn run_until<F>(&mut self, shutdown: F) -> WgResult<ReconcileStats>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if let Err(e) = self.arm() {
            self.state = LoopState::Failed;
            return Err(e);
        }
        self.state = LoopState::Watching;
        info!("Monitoring {} for changes", self.config.config_path().display());

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!(
                        events = self.stats.events,
                        applies = self.stats.applies,
                        "Config monitoring stopped"
                    );
                    return Ok(self.stats);
                }
                next = self.source.next_event() => next,
            };

            if let Err(e) = self.handle(next).await {
                self.state = LoopState::Failed;
                return Err(e);
            }
        }
    }

    async fn handle(&mut self, next: Option<WgResult<ChangeEvent>>) -> WgResult<()> {
        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!("Ignoring watcher error: {}", e);
                return self.arm();
            }
            None => {
                return Err(WgError::Watch {
                    message: format!(
                        "event stream for {} closed",
                        self.config.config_path().display()
                    ),
                    source: None,
                });
            }
        };

        self.stats.events += 1;
        debug!(kind = ?event.kind, paths = ?event.paths, "Config file event");

        let applied = if event.is_write() {
            self.state = LoopState::Applying;
            info!("Updating the wireguard interface config");
            self.stats.applies += 1;
            self.applier.apply(self.config).await
        } else {
            Ok(())
        };

        // Re-arm even after a failed apply so the watch never refers to a
        // replaced file, then surface the apply failure.
        self.arm()?;
        applied?;
        self.state = LoopState::Watching;
        Ok(())
    }

    fn arm(&mut self) -> WgResult<()> {
        self.source.arm(self.config.config_path())
    }
}
