//! Pluggable post-processing hook for terminal job updates.
//!
//! The dispatcher core has no knowledge of package managers, jails, or
//! firewalls; callers that do can install a classifier that inspects a
//! finished job's command text and exit codes and optionally synthesize
//! a friendlier domain event. When a classifier declines (returns
//! `None`), the dispatcher falls back to emitting the raw job log.

use crate::job::JobRecord;
use sysadm_core::JobId;

pub trait JobEventClassifier: Send + Sync {
    /// Inspect a finished job and optionally produce a domain-specific
    /// event payload in place of the raw log.
    fn classify(&self, id: &JobId, record: &JobRecord) -> Option<serde_json::Value>;
}

/// Default classifier: never overrides, always falls back to the raw log.
pub struct NoopClassifier;

impl JobEventClassifier for NoopClassifier {
    fn classify(&self, _id: &JobId, _record: &JobRecord) -> Option<serde_json::Value> {
        None
    }
}
