#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sysadm-watcher: log tailing, periodic probes, and the event
//! watcher that fans them into one typed event stream.

pub mod classify;
pub mod error;
pub mod prober;
pub mod tailer;
pub mod watcher;

pub use error::WatcherError;
pub use prober::{Probe, ProbeOutcome, FILE_REFRESH_PROBE_INTERVAL, HEALTH_PROBE_INTERVAL};
pub use watcher::{spawn, EventWatcherHandle, REPLICATION_LOG_TAG};
