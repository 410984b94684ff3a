//! Job — a named ordered sequence of commands executed by a Runner,
//! with an incremental log.

use crate::runner::{self, RunnerEvent, Termination};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use sysadm_core::{Clock, JobId, QueueName};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Job state: monotonic `pending -> running -> finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Finished,
}

sysadm_core::simple_display! {
    JobState {
        Pending => "pending",
        Running => "running",
        Finished => "finished",
    }
}

/// How often a progress update is emitted while a command is actively
/// writing output.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);
/// How often an idle liveness ping is emitted while a job sits pending
/// in its queue.
pub const IDLE_PING_INTERVAL: Duration = Duration::from_secs(2);

/// Computes the log/exit_codes map key for `commands[index]`, appending
/// a disambiguating `#index` suffix when the same command string
/// appears more than once in the job.
pub fn command_key(commands: &[String], index: usize) -> String {
    let cmd = &commands[index];
    let occurrences = commands.iter().filter(|c| *c == cmd).count();
    if occurrences > 1 {
        format!("{cmd}#{index}")
    } else {
        cmd.clone()
    }
}

/// A point-in-time snapshot of a job, suitable for `Dispatcher::List`
/// and for the terminal event's full-log payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub queue: QueueName,
    pub commands: Vec<String>,
    pub workdir: Option<PathBuf>,
    pub state: JobState,
    pub current: Option<usize>,
    pub log: HashMap<String, String>,
    pub exit_codes: HashMap<String, i32>,
    pub time_submitted: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_finished: Option<DateTime<Utc>>,
    pub success: bool,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        queue: QueueName,
        commands: Vec<String>,
        workdir: Option<PathBuf>,
        time_submitted: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            queue,
            commands,
            workdir,
            state: JobState::Pending,
            current: None,
            log: HashMap::new(),
            exit_codes: HashMap::new(),
            time_submitted,
            time_started: None,
            time_finished: None,
            success: false,
        }
    }
}

/// Update published by a running job. Progress carries only the delta
/// since the last progress update; terminal carries the full record so
/// late subscribers can reconstruct state.
#[derive(Debug, Clone)]
pub enum JobUpdate {
    Progress { id: JobId, command_key: String, delta: String },
    /// An idle liveness ping while the job is pending in its queue.
    IdlePing { id: JobId },
    /// Published once, right as the job transitions from pending to
    /// running, so the dispatcher's own job table reflects the
    /// transition instead of only learning about it via `Terminal`.
    Started { id: JobId, time_started: DateTime<Utc> },
    Terminal(Box<JobRecord>),
}

/// Handle used by the dispatcher to control a job task once spawned.
pub struct JobHandle {
    pub start: Option<oneshot::Sender<()>>,
    pub cancel: CancellationToken,
}

/// Spawn the background task driving one job's lifecycle: idle pings
/// while pending, sequential command execution once started, progress
/// updates, and a final terminal update.
///
/// Returns a [`JobHandle`] the caller uses to release the job to run
/// (`start`) and to request cancellation (`cancel`).
pub fn spawn_job(
    mut record: JobRecord,
    updates: mpsc::Sender<JobUpdate>,
    clock: impl Clock,
) -> JobHandle {
    let (start_tx, start_rx) = oneshot::channel();
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    tokio::spawn(async move {
        if !wait_for_start(&record.id, start_rx, &updates, &task_cancel).await {
            // Killed while still pending: a valid short prefix of
            // [pending, running, finished].
            record.state = JobState::Finished;
            record.time_finished = Some(clock.utc_now());
            record.success = false;
            info!(job_id = %record.id, "job killed before it started running");
            let _ = updates.send(JobUpdate::Terminal(Box::new(record))).await;
            return;
        }

        record.state = JobState::Running;
        let time_started = clock.utc_now();
        record.time_started = Some(time_started);
        info!(job_id = %record.id, "job starting");
        let _ = updates.send(JobUpdate::Started { id: record.id.clone(), time_started }).await;

        let killed = run_commands(&mut record, &updates, &task_cancel).await;

        record.state = JobState::Finished;
        record.current = None;
        record.time_finished = Some(clock.utc_now());
        record.success = !killed
            && record
                .commands
                .iter()
                .enumerate()
                .all(|(i, _)| record.exit_codes.get(&command_key(&record.commands, i)) == Some(&0));

        info!(job_id = %record.id, success = record.success, "job finished");
        let _ = updates.send(JobUpdate::Terminal(Box::new(record))).await;
    });

    JobHandle { start: Some(start_tx), cancel }
}

async fn wait_for_start(
    id: &JobId,
    mut start_rx: oneshot::Receiver<()>,
    updates: &mpsc::Sender<JobUpdate>,
    cancel: &CancellationToken,
) -> bool {
    let mut ping = tokio::time::interval(IDLE_PING_INTERVAL);
    ping.tick().await; // first tick fires immediately; skip it
    loop {
        tokio::select! {
            result = &mut start_rx => {
                return result.is_ok();
            }
            _ = cancel.cancelled() => {
                return false;
            }
            _ = ping.tick() => {
                let _ = updates.send(JobUpdate::IdlePing { id: id.clone() }).await;
            }
        }
    }
}

/// Runs `record.commands` in order, stopping at the first failure —
/// remaining commands are skipped. Returns `true` if the job was
/// killed via cancellation.
async fn run_commands(
    record: &mut JobRecord,
    updates: &mpsc::Sender<JobUpdate>,
    cancel: &CancellationToken,
) -> bool {
    for index in 0..record.commands.len() {
        record.current = Some(index);
        let key = command_key(&record.commands, index);
        let command = record.commands[index].clone();

        let mut rx = runner::run(command, record.workdir.clone(), cancel.clone());
        let mut pending_delta = String::new();
        let mut flush_timer = tokio::time::interval(PROGRESS_INTERVAL);
        flush_timer.tick().await;

        let termination = loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(RunnerEvent::Chunk(text)) => {
                            record.log.entry(key.clone()).or_default().push_str(&text);
                            pending_delta.push_str(&text);
                        }
                        Some(RunnerEvent::Completed(termination)) => break termination,
                        None => break Termination::SpawnFailure("runner channel closed".to_string()),
                    }
                }
                _ = flush_timer.tick() => {
                    if !pending_delta.is_empty() {
                        let _ = updates.send(JobUpdate::Progress {
                            id: record.id.clone(),
                            command_key: key.clone(),
                            delta: std::mem::take(&mut pending_delta),
                        }).await;
                    }
                }
            }
        };

        if !pending_delta.is_empty() {
            let _ = updates
                .send(JobUpdate::Progress { id: record.id.clone(), command_key: key.clone(), delta: pending_delta })
                .await;
        }

        let killed = cancel.is_cancelled();
        let exit_code = if killed { -1 } else { termination.exit_code() };
        record.exit_codes.insert(key, exit_code);
        debug!(job_id = %record.id, command = index, exit_code, "command finished");

        if killed {
            return true;
        }
        if !termination.normal_termination() || exit_code != 0 {
            return false;
        }
    }
    false
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
