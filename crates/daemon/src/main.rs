//! sysadmd — bootstrap binary demonstrating the dispatcher + event
//! watcher core end to end.
//!
//! The REST/WebSocket transport, auth, and the rest of the collaborator
//! surface are out of scope and not implemented here; this binary only
//! wires the core up and exercises its interfaces.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use sysadm_core::{ConfigStore, FileConfigStore, SystemClock};
use sysadm_daemon::context::{self, AppContext};
use sysadm_daemon::health_probe::ExampleHealthProbe;
use sysadm_daemon::shutdown;
use sysadm_watcher::HEALTH_PROBE_INTERVAL;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sysadmd", about = "Job dispatcher and event watcher core")]
struct Args {
    /// Directory holding the config store's persisted state.
    #[arg(long, default_value = "./state")]
    state_dir: PathBuf,

    /// Log level used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let config_path = args.state_dir.join("config.json");
    let config_store: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::open(config_path));

    let (ctx, dispatcher_signals) = AppContext::bootstrap(SystemClock, config_store);
    context::forward_dispatcher_signals(ctx.watcher.clone(), dispatcher_signals);

    if let Err(e) = ctx.watcher.register_probe("health", HEALTH_PROBE_INTERVAL, Arc::new(ExampleHealthProbe)).await {
        warn!(error = %e, "failed to register health probe");
    }

    info!(state_dir = %args.state_dir.display(), "sysadmd started");
    shutdown::wait_for_shutdown_signal().await;
    shutdown::graceful_shutdown(&ctx).await;
    info!("sysadmd shut down cleanly");
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
