#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sysadm-dispatcher: serializes process execution across named queues,
//! streams incremental logs, and emits job lifecycle events.

pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod queue;
pub mod runner;

pub use classifier::{JobEventClassifier, NoopClassifier};
pub use dispatcher::{spawn, spawn_with_classifier, DispatcherHandle, DispatcherSignal, JobListEntry, QueueSnapshot};
pub use error::DispatcherError;
pub use job::{JobRecord, JobState};
pub use queue::QueuePolicy;
pub use runner::Termination;
