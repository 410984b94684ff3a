//! Graceful shutdown sequence.

use crate::context::AppContext;
use std::time::Duration;
use sysadm_dispatcher::{DispatcherHandle, JobState};
use tracing::{info, warn};

/// Global deadline for the whole shutdown sequence; the child-process
/// grace period is enforced inside the runner itself.
const GLOBAL_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Wait for Ctrl-C or SIGTERM.
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler, falling back to Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Ask every active job to cancel and wait for terminal events, bounded
/// by [`GLOBAL_SHUTDOWN_DEADLINE`].
pub async fn graceful_shutdown(ctx: &AppContext) {
    info!("shutdown signal received, cancelling active jobs");

    let Ok(snapshot) = ctx.dispatcher.list().await else {
        return;
    };
    let active_ids: Vec<_> = snapshot
        .into_iter()
        .flat_map(|q| q.jobs.into_iter())
        .filter(|j| j.state != JobState::Finished)
        .map(|j| j.id)
        .collect();

    if active_ids.is_empty() {
        return;
    }

    let _ = ctx.dispatcher.kill(active_ids.clone()).await;
    let deadline = tokio::time::Instant::now() + GLOBAL_SHUTDOWN_DEADLINE;
    for id in active_ids {
        let _ = tokio::time::timeout_at(deadline, wait_until_inactive(&ctx.dispatcher, id)).await;
    }
}

async fn wait_until_inactive(dispatcher: &DispatcherHandle, id: sysadm_core::JobId) {
    loop {
        match dispatcher.is_active(id.clone()).await {
            Ok(true) => tokio::time::sleep(POLL_INTERVAL).await,
            _ => return,
        }
    }
}
