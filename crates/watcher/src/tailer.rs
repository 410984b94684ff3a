//! Log Tailer — follows a file for appends, surviving rotation and
//! restarts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use sysadm_core::config_store::keys;
use sysadm_core::ConfigStore;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Polling safety net for filesystems where `notify` is unreliable.
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Start tailing `path`, delivering newly-appended byte blocks on the
/// returned channel until `cancel` fires. Offset/creation-time bookkeeping
/// is persisted to `store` so a restart resumes correctly.
pub fn tail(
    path: PathBuf,
    store: Arc<dyn ConfigStore>,
    cancel: CancellationToken,
) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(run(path, store, cancel, tx));
    rx
}

async fn run(path: PathBuf, store: Arc<dyn ConfigStore>, cancel: CancellationToken, tx: mpsc::Sender<String>) {
    let key_str = path.to_string_lossy().into_owned();
    let offset_key = keys::tail_offset(&key_str);
    let ctime_key = keys::tail_ctime(&key_str);

    let mut offset = initial_offset(&path, &store, &offset_key, &ctime_key).await;

    let (notify_tx, mut notify_rx) = mpsc::channel(16);
    let watcher = path.parent().map(|parent| spawn_watcher(parent, notify_tx));
    // Keep the watcher alive for the duration of this task even though we
    // only consume its channel; dropping it would stop delivery.
    let _watcher = watcher;

    let mut poll_timer = tokio::time::interval(POLL_INTERVAL);
    poll_timer.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = poll_timer.tick() => {
                offset = read_new_bytes(&path, &store, &offset_key, &ctime_key, offset, &tx).await;
            }
            event = notify_rx.recv() => {
                if event.is_some() {
                    offset = read_new_bytes(&path, &store, &offset_key, &ctime_key, offset, &tx).await;
                }
            }
        }
    }
}

fn spawn_watcher(parent: &Path, notify_tx: mpsc::Sender<()>) -> Option<notify::RecommendedWatcher> {
    use notify::{RecursiveMode, Watcher};
    let mut watcher = match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if res.is_ok() {
            let _ = notify_tx.blocking_send(());
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            warn!(path = %parent.display(), error = %e, "failed to start file watcher, relying on polling");
            return None;
        }
    };
    if let Err(e) = watcher.watch(parent, RecursiveMode::NonRecursive) {
        warn!(path = %parent.display(), error = %e, "failed to watch directory, relying on polling");
        return None;
    }
    Some(watcher)
}

/// Determine the byte offset to resume from on attach: from the stored
/// offset if the file's creation time matches what was last observed,
/// from the current end-of-file otherwise (first attach, or the file
/// was rotated since the store was last written).
async fn initial_offset(
    path: &Path,
    store: &Arc<dyn ConfigStore>,
    offset_key: &str,
    ctime_key: &str,
) -> u64 {
    let Ok(metadata) = tokio::fs::metadata(path).await else {
        return 0;
    };
    let current_ctime = ctime_token(&metadata);

    match (store.get(offset_key), store.get(ctime_key)) {
        (Some(offset), Some(stored_ctime)) if stored_ctime == current_ctime => {
            offset.parse().unwrap_or(0)
        }
        _ => {
            let end = metadata.len();
            persist(store, offset_key, ctime_key, end, &current_ctime);
            end
        }
    }
}

/// Read any bytes appended since `offset`, sending them as one chunk if
/// non-empty, and persist the new offset. Detects rotation (file
/// replaced with a shorter one) by comparing creation time and length.
async fn read_new_bytes(
    path: &Path,
    store: &Arc<dyn ConfigStore>,
    offset_key: &str,
    ctime_key: &str,
    offset: u64,
    tx: &mpsc::Sender<String>,
) -> u64 {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(_) => {
            debug!(path = %path.display(), "tailed file missing, waiting for reappearance");
            return offset;
        }
    };

    let current_ctime = ctime_token(&metadata);
    let stored_ctime = store.get(ctime_key);
    let rotated = stored_ctime.as_deref().is_some_and(|c| c != current_ctime) || metadata.len() < offset;
    let start = if rotated { 0 } else { offset };

    if metadata.len() <= start {
        persist(store, offset_key, ctime_key, start, &current_ctime);
        return start;
    }

    let mut file = match tokio::fs::File::open(path).await {
        Ok(f) => f,
        Err(_) => return start,
    };
    if file.seek(std::io::SeekFrom::Start(start)).await.is_err() {
        return start;
    }

    let mut buf = Vec::new();
    if file.read_to_end(&mut buf).await.is_err() {
        return start;
    }

    let new_offset = start + buf.len() as u64;
    persist(store, offset_key, ctime_key, new_offset, &current_ctime);

    if !buf.is_empty() {
        let text = String::from_utf8_lossy(&buf).into_owned();
        let _ = tx.send(text).await;
    }
    new_offset
}

fn persist(store: &Arc<dyn ConfigStore>, offset_key: &str, ctime_key: &str, offset: u64, ctime: &str) {
    if let Err(e) = store.set(offset_key, &offset.to_string()) {
        warn!(error = %e, "failed to persist tail offset");
    }
    if let Err(e) = store.set(ctime_key, ctime) {
        warn!(error = %e, "failed to persist tail ctime");
    }
}

fn ctime_token(metadata: &std::fs::Metadata) -> String {
    metadata
        .created()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "tailer_tests.rs"]
mod tests;
