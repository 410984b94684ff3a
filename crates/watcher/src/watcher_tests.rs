use super::*;
use std::io::Write;
use sysadm_core::{JobId, MemoryConfigStore, SystemClock};
use tempfile::tempdir;
use tokio::time::timeout;

async fn recv_event(rx: &mut broadcast::Receiver<Event>) -> Event {
    timeout(Duration::from_secs(3), rx.recv()).await.expect("event must arrive in time").expect("channel open")
}

#[tokio::test]
async fn fire_domain_event_is_broadcast_and_cached() {
    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    let mut rx = handle.subscribe().await.unwrap();

    let event = Event::new(EventType::Health, serde_json::json!({ "probe": "manual" }), chrono::Utc::now());
    handle.fire_domain_event(event.clone()).await.unwrap();

    let received = recv_event(&mut rx).await;
    assert_eq!(received.payload, event.payload);

    let cached = handle.last_event(EventType::Health).await.unwrap();
    assert_eq!(cached.unwrap().payload, event.payload);
}

#[tokio::test]
async fn last_event_of_unknown_type_is_none() {
    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    assert!(handle.last_event(EventType::Dispatcher).await.unwrap().is_none());
}

#[tokio::test]
async fn dispatcher_signals_are_forwarded_as_dispatcher_events() {
    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    let mut rx = handle.subscribe().await.unwrap();

    let id: JobId = "job-1".into();
    handle
        .ingest_dispatcher_signal(sysadm_dispatcher::DispatcherSignal::Starting { id: id.clone() })
        .await
        .unwrap();

    let event = recv_event(&mut rx).await;
    assert_eq!(event.event_type, EventType::Dispatcher);
    assert_eq!(event.payload["process_id"], id.to_string());
}

#[tokio::test]
async fn generic_log_file_emits_raw_text_events() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("generic.log");
    std::fs::write(&path, "").unwrap();

    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    let mut rx = handle.subscribe().await.unwrap();
    handle.register_log_file(path.clone(), "firewall").await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f, "rule reloaded").unwrap();

    let event = recv_event(&mut rx).await;
    assert_eq!(event.event_type, EventType::LogFile("firewall".to_string()));
    assert_eq!(event.payload["text"], "rule reloaded\n");
}

#[tokio::test]
async fn replication_log_classifies_and_follows_per_run_log() {
    let dir = tempdir().unwrap();
    let main_log = dir.path().join("replication.log");
    std::fs::write(&main_log, "").unwrap();
    let run_log = dir.path().join("run-123.log");
    std::fs::write(&run_log, "").unwrap();

    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    let mut rx = handle.subscribe().await.unwrap();
    handle.register_replication_log(main_log.clone()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut f = std::fs::OpenOptions::new().append(true).open(&main_log).unwrap();
    writeln!(f, "Starting replication task, LOGFILE:{} on backup-pool", run_log.display()).unwrap();

    let event = recv_event(&mut rx).await;
    assert_eq!(event.payload["kind"], "replication/started");
    assert_eq!(event.payload["payload"]["pool"], "backup-pool");

    // The per-run log should now be tailed too.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut run_f = std::fs::OpenOptions::new().append(true).open(&run_log).unwrap();
    writeln!(run_f, "estimated size is 1000 bytes").unwrap();
    writeln!(run_f, "500 bytes transferred so far").unwrap();

    let progress_event = recv_event(&mut rx).await;
    assert_eq!(progress_event.payload["kind"], "replication/progress");
    assert_eq!(progress_event.payload["payload"]["current_bytes"], 500);
}

#[tokio::test(start_paused = true)]
async fn probe_outcomes_become_health_events() {
    struct AlwaysOk;
    #[async_trait::async_trait]
    impl prober::Probe for AlwaysOk {
        async fn run(&self) -> Result<serde_json::Value, String> {
            Ok(serde_json::json!({ "hostname": "box1" }))
        }
    }

    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    let mut rx = handle.subscribe().await.unwrap();
    handle.register_probe("health", Duration::from_secs(1), Arc::new(AlwaysOk)).await.unwrap();

    let event = recv_event(&mut rx).await;
    assert_eq!(event.event_type, EventType::Health);
    assert_eq!(event.payload["probe"], "health");
}

#[tokio::test]
async fn registering_the_same_log_twice_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("dup.log");
    std::fs::write(&path, "").unwrap();

    let handle = spawn(SystemClock, Arc::new(MemoryConfigStore::default()));
    handle.register_log_file(path.clone(), "dup").await.unwrap();
    handle.register_log_file(path.clone(), "dup").await.unwrap();

    let mut rx = handle.subscribe().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f, "one line").unwrap();

    let _first = recv_event(&mut rx).await;
    // A second tailer on the same path would have produced a duplicate event.
    let second = timeout(Duration::from_millis(300), rx.recv()).await;
    assert!(second.is_err(), "registration must be idempotent, not double-tailed");
}
