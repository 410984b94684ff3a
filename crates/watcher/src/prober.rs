//! Periodic Prober — invokes a probe function on a fixed schedule and
//! emits its result as an event.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use sysadm_core::config_store::keys;
use sysadm_core::{Clock, ConfigStore, Priority};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default interval for system-health probes.
pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(15 * 60);
/// Default interval for file-refresh probes.
pub const FILE_REFRESH_PROBE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Three consecutive probe failures escalate to a health event.
const ESCALATION_THRESHOLD: u32 = 3;
/// Priority assigned to the escalation event.
const ESCALATION_PRIORITY: u8 = 6;

/// A pluggable domain probe returning a structured result.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn run(&self) -> Result<serde_json::Value, String>;
}

/// What a probe tick produced.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Success { name: String, payload: serde_json::Value },
    /// Emitted once, after `ESCALATION_THRESHOLD` consecutive failures.
    Escalated { name: String, priority: Priority, message: String },
}

/// Spawn the task driving one probe on its schedule. Probes run one at a
/// time; an overrunning probe causes the next tick to be skipped rather
/// than queued.
pub fn spawn<C: Clock>(
    name: String,
    interval: Duration,
    probe: Arc<dyn Probe>,
    store: Arc<dyn ConfigStore>,
    clock: C,
    outcomes: mpsc::Sender<ProbeOutcome>,
    cancel: CancellationToken,
) {
    tokio::spawn(run(name, interval, probe, store, clock, outcomes, cancel));
}

async fn run<C: Clock>(
    name: String,
    interval: Duration,
    probe: Arc<dyn Probe>,
    store: Arc<dyn ConfigStore>,
    clock: C,
    outcomes: mpsc::Sender<ProbeOutcome>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    // A probe that overruns its interval should not fire a backlog of
    // queued ticks once it returns; skip ahead instead.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut consecutive_failures: u32 = 0;
    let last_run_key = keys::probe_last_run(&name);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match probe.run().await {
                    Ok(payload) => {
                        consecutive_failures = 0;
                        if let Err(e) = store.set(&last_run_key, &clock.utc_now().to_rfc3339()) {
                            warn!(probe = %name, error = %e, "failed to persist probe last-run timestamp");
                        }
                        if outcomes.send(ProbeOutcome::Success { name: name.clone(), payload }).await.is_err() {
                            break;
                        }
                    }
                    Err(reason) => {
                        consecutive_failures += 1;
                        warn!(probe = %name, error = %reason, consecutive_failures, "probe failed");
                        if consecutive_failures == ESCALATION_THRESHOLD {
                            let outcome = ProbeOutcome::Escalated {
                                name: name.clone(),
                                priority: Priority::new(ESCALATION_PRIORITY),
                                message: reason,
                            };
                            if outcomes.send(outcome).await.is_err() {
                                break;
                            }
                        } else {
                            debug!(probe = %name, "probe failure swallowed, schedule continues");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "prober_tests.rs"]
mod tests;
