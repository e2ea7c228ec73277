//! Debounced watch controller.
//!
//! One control loop consumes filesystem events, the debounce deadline, the
//! fallback ticker and the shutdown token. Because everything funnels through
//! that loop, event handling and timer handling never run concurrently, and a
//! pass always completes before the next message is looked at.
//!
//! ```text
//!            event                 deadline            pass done
//!   Idle ──────────▶ PendingTrigger ────────▶ Running ──────────▶ Idle
//!                      ▲      │ event (re-arm)   ▲
//!                      └──────┘                  │ fallback tick
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use notify::EventKind;
use notify::event::{AccessKind, AccessMode, CreateKind, ModifyKind, RemoveKind};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{ReconcileConfig, WatchConfig};
use crate::error::Result;
use crate::guard::PassRunner;
use crate::manifest::is_sidecar_name;

pub mod subscription;

pub use subscription::{NotifySubscription, Subscription, WatchMessage};

/// Capacity of the backend → control loop queue.
pub const EVENT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    /// Debounce deadline armed.
    PendingTrigger,
    /// A pass is in flight.
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Debounce,
    Fallback,
}

/// What the controller did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControllerSummary {
    pub passes: u64,
    pub resubscriptions: u64,
}

/// Turns filesystem activity into serialized reconciliation passes.
pub struct WatchController {
    config: WatchConfig,
    manifest_name: String,
    recursive: bool,
    runner: Arc<dyn PassRunner>,
    subscription: Box<dyn Subscription>,
    rx: mpsc::Receiver<WatchMessage>,
    state: ControllerState,
    summary: ControllerSummary,
}

impl fmt::Debug for WatchController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchController")
            .field("config", &self.config)
            .field("manifest_name", &self.manifest_name)
            .field("recursive", &self.recursive)
            .field("state", &self.state)
            .field("summary", &self.summary)
            .finish()
    }
}

impl WatchController {
    pub fn new(
        config: WatchConfig,
        reconcile: &ReconcileConfig,
        runner: Arc<dyn PassRunner>,
        subscription: Box<dyn Subscription>,
        rx: mpsc::Receiver<WatchMessage>,
    ) -> Self {
        Self {
            config,
            manifest_name: reconcile.manifest_name.clone(),
            recursive: reconcile.recursive,
            runner,
            subscription,
            rx,
            state: ControllerState::Idle,
            summary: ControllerSummary::default(),
        }
    }

    /// Subscribe to `input_dir` with `notify` and build a controller around
    /// the resulting event stream.
    pub fn for_directory(
        input_dir: &Path,
        reconcile: &ReconcileConfig,
        config: WatchConfig,
        runner: Arc<dyn PassRunner>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let subscription =
            NotifySubscription::new(input_dir.to_path_buf(), reconcile.scan_mode(), tx)?;
        Ok(Self::new(
            config,
            reconcile,
            runner,
            Box::new(subscription),
            rx,
        ))
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Drive the control loop until `shutdown` is cancelled.
    ///
    /// The first pass runs after the configured initial delay. A failing pass
    /// stops the loop and returns its error. Cancellation never interrupts a
    /// running pass, and a pending debounce never fires after cancellation.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<ControllerSummary> {
        let debounce = self.config.debounce();
        let fallback_period = self.config.fallback_interval();

        let mut deadline = Some(Instant::now() + self.config.initial_delay());
        self.state = ControllerState::PendingTrigger;

        let mut fallback =
            tokio::time::interval_at(Instant::now() + fallback_period, fallback_period);
        fallback.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("watch controller received shutdown");
                    break;
                }

                message = self.rx.recv(), if events_open => match message {
                    Some(message) => {
                        if self.handle_message(message) {
                            deadline = Some(Instant::now() + debounce);
                            self.state = ControllerState::PendingTrigger;
                        }
                    }
                    None => {
                        warn!("watch event stream closed, relying on fallback passes");
                        events_open = false;
                    }
                },

                _ = sleep_until(deadline) => {
                    deadline = None;
                    self.run_pass(Trigger::Debounce).await?;
                }

                _ = fallback.tick() => {
                    deadline = None;
                    self.run_pass(Trigger::Fallback).await?;
                }
            }
        }

        self.state = ControllerState::Idle;
        info!(
            passes = self.summary.passes,
            resubscriptions = self.summary.resubscriptions,
            "watch controller stopped"
        );
        Ok(self.summary)
    }

    async fn run_pass(&mut self, trigger: Trigger) -> Result<()> {
        self.state = ControllerState::Running;
        debug!(?trigger, "starting reconciliation pass");
        self.runner.run_pass().await?;
        self.summary.passes += 1;
        self.state = ControllerState::Idle;
        Ok(())
    }

    /// Returns whether the message should (re)arm the debounce deadline.
    fn handle_message(&mut self, message: WatchMessage) -> bool {
        let event = match message {
            WatchMessage::Event(event) => event,
            WatchMessage::Error(error) => {
                warn!("watch backend error, scheduling a pass: {}", error);
                return true;
            }
        };

        if event.paths.is_empty() || is_noise(&event.kind) {
            return false;
        }
        if event
            .paths
            .iter()
            .all(|path| is_sidecar_name(path, &self.manifest_name))
        {
            trace!("ignoring manifest write {:?}", event.paths);
            return false;
        }

        if self.recursive && self.invalidates_tree(&event.kind, &event.paths) {
            self.resubscribe();
        }
        true
    }

    fn invalidates_tree(&self, kind: &EventKind, paths: &[std::path::PathBuf]) -> bool {
        match kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => true,
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_)) => paths
                .iter()
                .any(|path| path.is_dir() || self.subscription.is_watched(path)),
            EventKind::Remove(_) => paths
                .iter()
                .any(|path| self.subscription.is_watched(path)),
            _ => false,
        }
    }

    fn resubscribe(&mut self) {
        match self.subscription.rebuild() {
            Ok(count) => {
                self.summary.resubscriptions += 1;
                debug!("directory tree changed, re-subscribed {} directories", count);
            }
            Err(err) => warn!("failed to rebuild watch subscription: {}", err),
        }
    }
}

/// Read-only access events carry no change.
fn is_noise(kind: &EventKind) -> bool {
    match kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => false,
        EventKind::Access(_) => true,
        _ => false,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
