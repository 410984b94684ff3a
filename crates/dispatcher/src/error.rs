//! Errors surfaced by [`crate::Dispatcher`].

use sysadm_core::JobId;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatcherError {
    /// A live job already uses this id.
    #[error("job id already in use: {0}")]
    DuplicateId(JobId),

    /// Empty command list after trimming blanks, or an otherwise
    /// malformed submission.
    #[error("invalid arguments: {0}")]
    InvalidArgument(String),

    /// The dispatcher's actor task has gone away; callers should treat
    /// this the same as a process restart (no durable queue).
    #[error("dispatcher actor is not running")]
    ActorGone,
}
