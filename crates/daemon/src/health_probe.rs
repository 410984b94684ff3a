//! Example system-health probe wired into the event watcher at startup.
//!
//! A real deployment would read `zpool status`/`freebsd-update`/`pkg
//! audit`-equivalent collaborators here; those are out of scope, so
//! this probe reports a static, always-healthy sample to demonstrate
//! the wiring end to end.

use async_trait::async_trait;
use sysadm_watcher::classify::{health_priority, HealthSample, PoolHealth};
use sysadm_watcher::Probe;

pub struct ExampleHealthProbe;

#[async_trait]
impl Probe for ExampleHealthProbe {
    async fn run(&self) -> Result<serde_json::Value, String> {
        let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
        let sample = HealthSample {
            pool_health: vec![("tank".to_string(), PoolHealth { healthy: true, capacity_percent: 42 })],
            updates_available: false,
            reboot_required: false,
            hostname_changed: false,
        };
        let priority = health_priority(&sample);
        Ok(serde_json::json!({ "hostname": hostname, "priority": priority, "display": priority }))
    }
}
