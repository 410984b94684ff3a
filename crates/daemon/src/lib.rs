#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Bootstrap wiring for the `sysadmd` binary: an explicit `AppContext`
//! in place of global singletons, an example health probe, and the
//! graceful-shutdown sequence.

pub mod context;
pub mod health_probe;
pub mod shutdown;

pub use context::AppContext;
