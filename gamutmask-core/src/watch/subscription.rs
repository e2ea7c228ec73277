//! `notify` subscriptions feeding the watch controller.
//!
//! A subscription is a set of non-recursive watches keyed by directory path.
//! It is never patched in place: any change to the directory tree rebuilds
//! the whole set from the current tree.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{GamutError, Result};
use crate::scan::ScanMode;

/// Raw message from the watch backend to the control loop.
pub enum WatchMessage {
    Event(Event),
    Error(String),
}

impl fmt::Debug for WatchMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMessage::Event(event) => f
                .debug_struct("WatchMessage::Event")
                .field("kind", &event.kind)
                .field("paths", &event.paths)
                .finish(),
            WatchMessage::Error(message) => f
                .debug_struct("WatchMessage::Error")
                .field("message", message)
                .finish(),
        }
    }
}

/// A rebuildable set of directory watches.
pub trait Subscription: Send {
    /// Tear down every watch and subscribe again against the current tree.
    /// Returns the number of watched directories.
    fn rebuild(&mut self) -> Result<usize>;

    /// Whether `dir` is currently watched.
    fn is_watched(&self, dir: &Path) -> bool;
}

/// Subscription backed by the platform's recommended `notify` watcher.
pub struct NotifySubscription {
    root: PathBuf,
    mode: ScanMode,
    tx: mpsc::Sender<WatchMessage>,
    watcher: Option<RecommendedWatcher>,
    watched: BTreeSet<PathBuf>,
}

impl fmt::Debug for NotifySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifySubscription")
            .field("root", &self.root)
            .field("mode", &self.mode)
            .field("active", &self.watcher.is_some())
            .field("watched_dirs", &self.watched.len())
            .finish()
    }
}

impl NotifySubscription {
    /// Subscribe to `root` and deliver events into `tx`.
    pub fn new(root: PathBuf, mode: ScanMode, tx: mpsc::Sender<WatchMessage>) -> Result<Self> {
        let mut subscription = Self {
            root,
            mode,
            tx,
            watcher: None,
            watched: BTreeSet::new(),
        };
        subscription.rebuild()?;
        Ok(subscription)
    }

    pub fn watched_dirs(&self) -> impl Iterator<Item = &Path> {
        self.watched.iter().map(PathBuf::as_path)
    }

    fn directories(&self) -> Result<Vec<PathBuf>> {
        match self.mode {
            ScanMode::Flat => Ok(vec![self.root.clone()]),
            ScanMode::Recursive => {
                let mut dirs = Vec::new();
                for entry in WalkDir::new(&self.root).follow_links(false) {
                    match entry {
                        Ok(entry) if entry.file_type().is_dir() => {
                            dirs.push(entry.into_path());
                        }
                        Ok(_) => {}
                        Err(err) if err.depth() == 0 => {
                            let source = err
                                .into_io_error()
                                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                            return Err(GamutError::io_at(&self.root, source));
                        }
                        Err(err) => debug!("skipping unwatchable entry: {}", err),
                    }
                }
                Ok(dirs)
            }
        }
    }
}

impl Subscription for NotifySubscription {
    fn rebuild(&mut self) -> Result<usize> {
        // Dropping the old watcher stops its event stream.
        self.watcher = None;
        self.watched.clear();

        let tx = self.tx.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                let message = match res {
                    Ok(event) => WatchMessage::Event(event),
                    Err(err) => WatchMessage::Error(err.to_string()),
                };
                // A full queue already guarantees a pending pass.
                if let Err(TrySendError::Full(dropped)) = tx.try_send(message) {
                    trace!("watch queue full, dropping {:?}", dropped);
                }
            },
            NotifyConfig::default(),
        )?;

        for dir in self.directories()? {
            match watcher.watch(&dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(dir);
                }
                Err(err) if dir == self.root => return Err(GamutError::Watch(err)),
                Err(err) => debug!("could not watch {}: {}", dir.display(), err),
            }
        }

        debug!(
            "watching {} directories under {}",
            self.watched.len(),
            self.root.display()
        );
        self.watcher = Some(watcher);
        Ok(self.watched.len())
    }

    fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }
}
