//! Errors surfaced by [`crate::watcher`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    /// `LastEvent`/`Subscribe` called after the actor task has stopped.
    #[error("event watcher actor is not running")]
    ActorGone,

    /// Attempted to register the same watched path or probe name twice
    /// with conflicting configuration. Re-registering the same
    /// configuration is idempotent and not an error.
    #[error("invalid watch registration: {0}")]
    InvalidArgument(String),
}
