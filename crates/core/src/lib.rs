// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sysadm-core: shared ids, clock abstraction, event types, and the
//! config store used by `sysadm-dispatcher` and `sysadm-watcher`.

pub mod macros;

pub mod clock;
pub mod config_store;
pub mod error;
pub mod event;
pub mod ids;

pub use clock::{Clock, FakeClock, SystemClock};
pub use config_store::{ConfigStore, FileConfigStore, MemoryConfigStore};
pub use error::ConfigStoreError;
pub use event::{Event, EventType, Priority};
pub use ids::{JobId, QueueName};
