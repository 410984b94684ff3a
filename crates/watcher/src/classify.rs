//! Line classifiers for tailed logs, and the system-health priority
//! formula.
//!
//! This module pattern-matches on free-form English log lines written
//! by an external tool. That is an upstream contract, not something to
//! harden against here: if the tool's wording changes, the classifier
//! silently stops recognizing it. Keep it small and easy to patch.

use serde_json::json;
use sysadm_core::Priority;

/// A domain event synthesized from one classified log line.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedEvent {
    pub kind: &'static str,
    pub payload: serde_json::Value,
    /// Set when the line names another log file the watcher should
    /// begin tailing (the per-run replication log).
    pub follow_up_tail: Option<String>,
}

/// Classify one line of the replication/snapshot log.
/// Returns `None` for unrecognized lines — they are dropped.
pub fn classify_replication_line(line: &str) -> Option<ClassifiedEvent> {
    if let Some(rest) = line.trim().strip_prefix("creating snapshot ") {
        return Some(ClassifiedEvent {
            kind: "snapshot/created",
            payload: json!({ "snapshot": rest.trim() }),
            follow_up_tail: None,
        });
    }

    if let Some(rest) = line.trim().strip_prefix("Starting replication") {
        let pool = rest.rsplit("on ").next().map(str::trim).unwrap_or_default();
        return Some(ClassifiedEvent {
            kind: "replication/started",
            payload: json!({ "pool": pool }),
            follow_up_tail: extract_logfile(line),
        });
    }

    if line.trim_start().starts_with("finished replication task") {
        let pool = line.rsplit("-> ").next().map(str::trim).unwrap_or_default();
        return Some(ClassifiedEvent {
            kind: "replication/finished",
            payload: json!({ "pool": pool }),
            follow_up_tail: None,
        });
    }

    if line.trim_start().starts_with("FAILED replication") {
        let pool = line
            .split("->")
            .nth(1)
            .map(|s| s.split("LOGFILE:").next().unwrap_or(s).trim())
            .unwrap_or_default();
        return Some(ClassifiedEvent {
            kind: "replication/failed",
            payload: json!({ "pool": pool, "logfile": extract_logfile(line) }),
            follow_up_tail: None,
        });
    }

    None
}

fn extract_logfile(line: &str) -> Option<String> {
    line.split("LOGFILE:").nth(1).map(|rest| rest.trim().to_string())
}

/// Running byte counters for a per-run replication log.
/// Emits a throttled `replication/progress` event only when `current`
/// changes, parsed from "estimated size is …" and tabular progress lines.
#[derive(Debug, Clone, Default)]
pub struct ReplicationProgress {
    pub total_bytes: Option<u64>,
    pub current_bytes: Option<u64>,
}

impl ReplicationProgress {
    /// Feed one line of the per-run log. Returns a progress event only
    /// when `current_bytes` actually changed.
    pub fn observe(&mut self, line: &str) -> Option<ClassifiedEvent> {
        if let Some(rest) = line.trim().strip_prefix("estimated size is ") {
            self.total_bytes = parse_byte_count(rest.trim());
            return None;
        }

        if let Some(bytes) = parse_progress_line(line) {
            if self.current_bytes != Some(bytes) {
                self.current_bytes = Some(bytes);
                return Some(ClassifiedEvent {
                    kind: "replication/progress",
                    payload: json!({ "current_bytes": bytes, "total_bytes": self.total_bytes }),
                    follow_up_tail: None,
                });
            }
        }
        None
    }
}

fn parse_byte_count(text: &str) -> Option<u64> {
    text.split_whitespace().next()?.parse().ok()
}

/// Tabular progress lines look like `<count> bytes transferred ...`; we
/// only need the leading numeric field.
fn parse_progress_line(line: &str) -> Option<u64> {
    let trimmed = line.trim();
    let first = trimmed.split_whitespace().next()?;
    first.parse().ok()
}

/// Health probe inputs.
#[derive(Debug, Clone, Default)]
pub struct HealthSample {
    pub pool_health: Vec<(String, PoolHealth)>,
    pub updates_available: bool,
    pub reboot_required: bool,
    pub hostname_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub healthy: bool,
    pub capacity_percent: u8,
}

/// Priority is the max of the applicable contributions.
pub fn health_priority(sample: &HealthSample) -> Priority {
    let mut priority = 0u8;
    if sample.pool_health.iter().any(|(_, h)| !h.healthy) {
        priority = priority.max(9);
    }
    if sample.pool_health.iter().any(|(_, h)| h.capacity_percent > 90) {
        priority = priority.max(6);
    }
    if sample.updates_available {
        priority = priority.max(2);
    }
    if sample.reboot_required {
        priority = priority.max(9);
    }
    if sample.hostname_changed {
        priority = priority.max(3);
    }
    Priority::new(priority)
}
