//! Config Watcher
//!
//! Polls files on a fixed interval and runs a reaction when their content
//! changes. A fingerprint is committed only after its reaction succeeds, so
//! a failed reaction is retried on the next tick.

mod fingerprint;
mod reload;

pub use fingerprint::Fingerprint;
pub use reload::ServiceReaction;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hb_core::error::WatcherReactionError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// What changed in a watched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: PathBuf,
    /// `None` when the file did not exist
    pub old: Option<Fingerprint>,
    pub new: Option<Fingerprint>,
}

/// Reaction to a changed file
#[async_trait]
pub trait Reaction: Send + Sync {
    async fn react(&self, change: &FileChange) -> Result<(), WatcherReactionError>;
}

/// Adapts an async closure into a [`Reaction`]
pub struct FnReaction<F>(pub F);

#[async_trait]
impl<F, Fut> Reaction for FnReaction<F>
where
    F: Fn(FileChange) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WatcherReactionError>> + Send + 'static,
{
    async fn react(&self, change: &FileChange) -> Result<(), WatcherReactionError> {
        (self.0)(change.clone()).await
    }
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Reacted,
    /// Reaction failed; the old fingerprint is kept
    ReactionFailed(String),
    /// File could not be read; nothing changes
    Unreadable(String),
}

/// One polled file and its reaction
pub struct WatchedFile {
    path: PathBuf,
    interval: Duration,
    fingerprint: Option<Fingerprint>,
    reaction: Arc<dyn Reaction>,
}

impl WatchedFile {
    /// Start watching; the file's current content is the baseline.
    pub async fn new(path: impl Into<PathBuf>, interval: Duration, reaction: Arc<dyn Reaction>) -> Self {
        let path = path.into();
        let fingerprint = match Fingerprint::of_file(&path).await {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(path = %path.display(), "Cannot read watched file: {}", e);
                None
            }
        };
        Self {
            path,
            interval,
            fingerprint,
            reaction,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last committed fingerprint
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }

    /// Check once and react if the content changed
    pub async fn poll(&mut self) -> PollOutcome {
        let current = match Fingerprint::of_file(&self.path).await {
            Ok(fp) => fp,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Cannot read watched file: {}", e);
                return PollOutcome::Unreadable(e.to_string());
            }
        };
        if current == self.fingerprint {
            return PollOutcome::Unchanged;
        }

        let change = FileChange {
            path: self.path.clone(),
            old: self.fingerprint.clone(),
            new: current,
        };
        tracing::info!(
            path = %self.path.display(),
            old = ?change.old.as_ref().map(ToString::to_string),
            new = ?change.new.as_ref().map(ToString::to_string),
            "Watched file changed"
        );

        match self.reaction.react(&change).await {
            Ok(()) => {
                self.fingerprint = change.new;
                PollOutcome::Reacted
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Reaction failed, will retry: {}", e);
                PollOutcome::ReactionFailed(e.to_string())
            }
        }
    }

    /// Poll until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll().await;
                }
                _ = cancel.cancelled() => break,
            }
        }
        tracing::debug!(path = %self.path.display(), "Watcher stopped");
    }
}

/// Runs independent poll loops for any number of files
pub struct ConfigWatcher {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ConfigWatcher {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            tasks: Vec::new(),
        }
    }

    /// Watch `path`, calling `reaction` whenever its content changes
    pub fn watch(&mut self, path: &Path, interval: Duration, reaction: Arc<dyn Reaction>) {
        let path = path.to_path_buf();
        let cancel = self.cancel.clone();
        tracing::info!(path = %path.display(), ?interval, "Watching file");
        self.tasks.push(tokio::spawn(async move {
            WatchedFile::new(path, interval, reaction).await.run(cancel).await;
        }));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every loop and wait for them to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        futures::future::join_all(self.tasks).await;
    }
}
