//! Queue — a named scheduling lane.

use serde::{Deserialize, Serialize};
use sysadm_core::{JobId, QueueName};

/// `serial`: at most one job running at a time, FIFO in submission
/// order. `parallel`: unbounded concurrency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    Serial,
    Parallel,
}

impl QueuePolicy {
    /// The distinguished `NONE` queue is always parallel.
    pub fn for_queue(name: &QueueName) -> Self {
        if name.is_none() {
            QueuePolicy::Parallel
        } else {
            QueuePolicy::Serial
        }
    }
}

/// Submission-ordered list of job ids belonging to one queue. Finished
/// jobs are not removed here when they finish — the dispatcher's
/// retention sweep removes them from both the job table and every
/// queue's order after the retention window, so a finished job briefly
/// remains visible via `List`.
#[derive(Debug, Clone)]
pub struct Queue {
    pub policy: QueuePolicy,
    pub order: Vec<JobId>,
}

impl Queue {
    pub fn new(policy: QueuePolicy) -> Self {
        Self { policy, order: Vec::new() }
    }
}
