//! `AppContext` — the explicit, passed-everywhere replacement for
//! process-wide Dispatcher/EventWatcher/ConfigStore singletons.

use std::sync::Arc;
use sysadm_core::{Clock, ConfigStore};
use sysadm_dispatcher::DispatcherHandle;
use sysadm_watcher::EventWatcherHandle;
use tokio::sync::mpsc;

/// Everything a handler needs to drive the dispatcher + event watcher
/// core. No global statics anywhere in this crate; every entry point
/// takes this explicitly.
#[derive(Clone)]
pub struct AppContext {
    pub dispatcher: DispatcherHandle,
    pub watcher: EventWatcherHandle,
    pub config_store: Arc<dyn ConfigStore>,
}

impl AppContext {
    /// Construct the dispatcher and event watcher actors and bundle
    /// their handles. Returns the dispatcher's raw signal stream too, so
    /// the caller can decide how to bridge it into the watcher (done by
    /// [`crate::context::forward_dispatcher_signals`] in the bootstrap binary).
    ///
    /// `pkg` (serial) and `NONE` (parallel) need no explicit
    /// registration: a queue's policy is derived entirely from its
    /// name, so both materialize the first time a job is submitted to
    /// them.
    pub fn bootstrap<C: Clock>(
        clock: C,
        config_store: Arc<dyn ConfigStore>,
    ) -> (Self, mpsc::Receiver<sysadm_dispatcher::DispatcherSignal>) {
        let (dispatcher, signals) = sysadm_dispatcher::spawn(clock.clone());
        let watcher = sysadm_watcher::spawn(clock, config_store.clone());
        (Self { dispatcher, watcher, config_store }, signals)
    }
}

/// Bridge the dispatcher's signal stream into the event watcher's fan-in.
pub fn forward_dispatcher_signals(
    watcher: EventWatcherHandle,
    mut signals: mpsc::Receiver<sysadm_dispatcher::DispatcherSignal>,
) {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            if watcher.ingest_dispatcher_signal(signal).await.is_err() {
                break;
            }
        }
    });
}
