//! Error types for the config store. Dispatcher/watcher errors live in
//! their own crates; each subsystem surfaces its own error enum.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigStoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
