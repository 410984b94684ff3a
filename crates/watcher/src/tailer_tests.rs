use super::*;
use std::io::Write;
use sysadm_core::MemoryConfigStore;
use tempfile::tempdir;
use tokio::time::{sleep, timeout};

async fn recv_chunk(rx: &mut mpsc::Receiver<String>) -> Option<String> {
    timeout(Duration::from_secs(3), rx.recv()).await.ok().flatten()
}

#[tokio::test]
async fn fresh_attach_starts_at_eof_and_delivers_new_appends() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replication.log");
    std::fs::write(&path, "hello\n").unwrap();

    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::default());
    let cancel = CancellationToken::new();
    let mut rx = tail(path.clone(), store, cancel.clone());

    // give the tailer time to compute its starting offset before we append
    sleep(Duration::from_millis(50)).await;
    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f, "world").unwrap();

    let chunk = recv_chunk(&mut rx).await.expect("appended bytes must be delivered");
    assert_eq!(chunk, "world\n");
    cancel.cancel();
}

#[tokio::test]
async fn restart_resumes_from_stored_offset_without_duplicating() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replication.log");
    std::fs::write(&path, "hello\n").unwrap();

    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::default());
    let cancel = CancellationToken::new();
    {
        let mut rx = tail(path.clone(), store.clone(), cancel.clone());
        sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        // drain anything buffered before dropping
        let _ = timeout(Duration::from_millis(100), rx.recv()).await;
    }

    let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(f, "world").unwrap();

    let cancel2 = CancellationToken::new();
    let mut rx = tail(path, store, cancel2.clone());
    let chunk = recv_chunk(&mut rx).await.expect("resumed tailer must see the appended line");
    assert_eq!(chunk, "world\n");
    assert!(!chunk.contains("hello"));
    cancel2.cancel();
}

#[tokio::test]
async fn truncation_is_treated_as_rotation_and_read_from_start() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("replication.log");
    std::fs::write(&path, "a very long first line that will be truncated away\n").unwrap();

    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::default());
    let cancel = CancellationToken::new();
    let mut rx = tail(path.clone(), store, cancel.clone());
    sleep(Duration::from_millis(50)).await;

    // Simulate log rotation: replace with a short new file.
    std::fs::write(&path, "new\n").unwrap();

    let chunk = recv_chunk(&mut rx).await.expect("rotated file content must be delivered");
    assert_eq!(chunk, "new\n");
    cancel.cancel();
}
