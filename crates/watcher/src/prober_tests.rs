use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use sysadm_core::{MemoryConfigStore, SystemClock};

struct CountingProbe {
    calls: AtomicU32,
}

#[async_trait]
impl Probe for CountingProbe {
    async fn run(&self) -> Result<serde_json::Value, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(serde_json::json!({ "ok": true }))
    }
}

struct AlwaysFailsProbe;

#[async_trait]
impl Probe for AlwaysFailsProbe {
    async fn run(&self) -> Result<serde_json::Value, String> {
        Err("probe unreachable".to_string())
    }
}

#[tokio::test(start_paused = true)]
async fn successful_ticks_emit_events_and_reset_failure_count() {
    let (tx, mut rx) = mpsc::channel(16);
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::default());
    let cancel = CancellationToken::new();
    let probe = Arc::new(CountingProbe { calls: AtomicU32::new(0) });

    spawn("demo".to_string(), Duration::from_secs(10), probe, store.clone(), SystemClock, tx, cancel.clone());

    for _ in 0..3 {
        match rx.recv().await.expect("prober must emit on each tick") {
            ProbeOutcome::Success { name, payload } => {
                assert_eq!(name, "demo");
                assert_eq!(payload, serde_json::json!({ "ok": true }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert!(store.get(&keys::probe_last_run("demo")).is_some());
    cancel.cancel();
}

#[tokio::test(start_paused = true)]
async fn three_consecutive_failures_escalate_once() {
    let (tx, mut rx) = mpsc::channel(16);
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::default());
    let cancel = CancellationToken::new();

    spawn(
        "flaky".to_string(),
        Duration::from_secs(10),
        Arc::new(AlwaysFailsProbe),
        store,
        SystemClock,
        tx,
        cancel.clone(),
    );

    let outcome = rx.recv().await.expect("escalation must eventually arrive");
    match outcome {
        ProbeOutcome::Escalated { name, priority, .. } => {
            assert_eq!(name, "flaky");
            assert_eq!(priority.value(), 6);
        }
        other => panic!("expected an escalation after three failures, got {other:?}"),
    }
    cancel.cancel();
}
