use super::*;
use crate::error::DispatcherError;
use std::time::Duration;
use sysadm_core::SystemClock;
use tokio::time::timeout;

async fn drain_until_terminal(signals: &mut mpsc::Receiver<DispatcherSignal>, id: &JobId) {
    loop {
        match timeout(Duration::from_secs(5), signals.recv()).await {
            Ok(Some(DispatcherSignal::Update { id: signal_id, event })) if &signal_id == id => {
                if event.payload.get("state").and_then(|v| v.as_str()) == Some("finished") {
                    return;
                }
            }
            Ok(Some(_)) => continue,
            _ => panic!("dispatcher closed before job {id} finished"),
        }
    }
}

#[tokio::test]
async fn duplicate_submit_is_rejected() {
    let (handle, _signals) = spawn(SystemClock);
    let id: JobId = "dup".into();
    handle.submit("NONE".into(), id.clone(), vec!["true".into()], None).await.unwrap();
    let err = handle.submit("NONE".into(), id, vec!["true".into()], None).await.unwrap_err();
    assert!(matches!(err, DispatcherError::DuplicateId(_)));
}

#[tokio::test]
async fn empty_command_list_is_rejected() {
    let (handle, _signals) = spawn(SystemClock);
    let err = handle.submit("NONE".into(), "job".into(), vec![], None).await.unwrap_err();
    assert!(matches!(err, DispatcherError::InvalidArgument(_)));
}

/// Two jobs on a serial queue run one after another, never concurrently.
#[tokio::test]
async fn serial_queue_runs_jobs_one_at_a_time() {
    let (handle, mut signals) = spawn(SystemClock);
    let a: JobId = "a".into();
    let b: JobId = "b".into();
    handle.submit("pkg".into(), a.clone(), vec!["sleep 0.1".into()], None).await.unwrap();
    handle.submit("pkg".into(), b.clone(), vec!["true".into()], None).await.unwrap();

    drain_until_terminal(&mut signals, &a).await;
    // b must not have been marked active before a finished.
    assert!(!handle.is_active(a).await.unwrap());
    drain_until_terminal(&mut signals, &b).await;
    assert!(!handle.is_active(b).await.unwrap());
}

/// Jobs on the `NONE` queue run concurrently — total wall time for
/// two 150ms sleeps stays well under their sum.
#[tokio::test]
async fn parallel_queue_runs_jobs_concurrently() {
    let (handle, mut signals) = spawn(SystemClock);
    let a: JobId = "pa".into();
    let b: JobId = "pb".into();
    let start = tokio::time::Instant::now();
    handle.submit("NONE".into(), a.clone(), vec!["sleep 0.15".into()], None).await.unwrap();
    handle.submit("NONE".into(), b.clone(), vec!["sleep 0.15".into()], None).await.unwrap();

    drain_until_terminal(&mut signals, &a).await;
    drain_until_terminal(&mut signals, &b).await;
    assert!(start.elapsed() < Duration::from_millis(1500));
}

/// A failing command in the middle of a chain stops the remaining
/// commands and the job reports success=false.
#[tokio::test]
async fn failing_command_stops_the_chain() {
    let (handle, mut signals) = spawn(SystemClock);
    let id: JobId = "chain".into();
    handle
        .submit("NONE".into(), id.clone(), vec!["true".into(), "false".into(), "echo never".into()], None)
        .await
        .unwrap();

    loop {
        match timeout(Duration::from_secs(5), signals.recv()).await {
            Ok(Some(DispatcherSignal::Update { id: signal_id, event })) if signal_id == id => {
                if event.payload.get("state").and_then(|v| v.as_str()) == Some("finished") {
                    assert_eq!(event.payload.get("success").and_then(|v| v.as_bool()), Some(false));
                    let exit_codes = event.payload.get("exit_codes").unwrap().as_object().unwrap();
                    assert!(!exit_codes.contains_key("echo never"));
                    return;
                }
            }
            Ok(Some(_)) => continue,
            _ => panic!("dispatcher closed before job finished"),
        }
    }
}

/// Killing a running job produces a terminal event within the
/// cancellation grace period.
#[tokio::test]
async fn kill_produces_terminal_event_within_grace_period() {
    let (handle, mut signals) = spawn(SystemClock);
    let id: JobId = "killme".into();
    handle.submit("NONE".into(), id.clone(), vec!["sleep 60".into()], None).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let killed = handle.kill(vec![id.clone()]).await.unwrap();
    assert_eq!(killed, vec![id.clone()]);

    let start = tokio::time::Instant::now();
    drain_until_terminal(&mut signals, &id).await;
    assert!(start.elapsed() < Duration::from_secs(11));
}

#[tokio::test]
async fn kill_of_unknown_id_is_a_noop() {
    let (handle, _signals) = spawn(SystemClock);
    let killed = handle.kill(vec!["ghost".into()]).await.unwrap();
    assert!(killed.is_empty());
}

#[tokio::test]
async fn list_reports_serial_position() {
    let (handle, mut signals) = spawn(SystemClock);
    let a: JobId = "lp-a".into();
    let b: JobId = "lp-b".into();
    handle.submit("pkg".into(), a.clone(), vec!["sleep 0.2".into()], None).await.unwrap();
    handle.submit("pkg".into(), b.clone(), vec!["true".into()], None).await.unwrap();

    // Give the scheduler a tick to start `a`.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let snapshot = handle.list().await.unwrap();
    let pkg = snapshot.iter().find(|q| q.name.as_str() == "pkg").unwrap();
    let b_entry = pkg.jobs.iter().find(|j| j.id == b).unwrap();
    assert_eq!(b_entry.position, Some(1));

    drain_until_terminal(&mut signals, &a).await;
    drain_until_terminal(&mut signals, &b).await;
}
