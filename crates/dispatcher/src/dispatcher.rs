//! Dispatcher — owns named queues of Jobs, enforces queue policy, and
//! emits job lifecycle events.
//!
//! All mutable state is confined to a single actor task; callers talk
//! to it only through [`DispatcherHandle`] — no shared mutable state,
//! no callbacks into another task's memory.

use crate::classifier::{JobEventClassifier, NoopClassifier};
use crate::error::DispatcherError;
use crate::job::{self, JobRecord, JobState, JobUpdate};
use crate::queue::{Queue, QueuePolicy};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysadm_core::{Clock, Event, EventType, JobId, QueueName};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Jobs finish and linger, visible to `List`, for this long before the
/// retention sweep releases them.
pub const FINISHED_RETENTION: Duration = Duration::from_secs(60);

/// Scheduler-tick safety-net period. Submissions and job terminal
/// updates trigger an immediate reschedule; this interval exists only
/// to coalesce bursts and catch anything missed, without depending on
/// exact timing for correctness.
const SCHEDULER_TICK: Duration = Duration::from_millis(30);
const RETENTION_SWEEP: Duration = Duration::from_secs(1);

/// A job entry as listed by `Dispatcher::List`.
#[derive(Debug, Clone)]
pub struct JobListEntry {
    pub id: JobId,
    pub commands: Vec<String>,
    pub state: JobState,
    /// Position within a serial queue (0 = running or next to run). `None` for parallel queues.
    pub position: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub name: QueueName,
    pub policy: QueuePolicy,
    pub jobs: Vec<JobListEntry>,
}

enum DispatcherMsg {
    Submit {
        queue: QueueName,
        id: JobId,
        commands: Vec<String>,
        workdir: Option<PathBuf>,
        reply: oneshot::Sender<Result<JobId, DispatcherError>>,
    },
    List {
        reply: oneshot::Sender<Vec<QueueSnapshot>>,
    },
    Kill {
        ids: Vec<JobId>,
        reply: oneshot::Sender<Vec<JobId>>,
    },
    IsActive {
        id: JobId,
        reply: oneshot::Sender<bool>,
    },
}

/// Cheaply-cloneable handle to a running dispatcher actor.
#[derive(Clone)]
pub struct DispatcherHandle {
    inbox: mpsc::Sender<DispatcherMsg>,
}

impl DispatcherHandle {
    pub async fn submit(
        &self,
        queue: QueueName,
        id: JobId,
        commands: Vec<String>,
        workdir: Option<PathBuf>,
    ) -> Result<JobId, DispatcherError> {
        let (reply, rx) = oneshot::channel();
        self.inbox
            .send(DispatcherMsg::Submit { queue, id, commands, workdir, reply })
            .await
            .map_err(|_| DispatcherError::ActorGone)?;
        rx.await.map_err(|_| DispatcherError::ActorGone)?
    }

    pub async fn list(&self) -> Result<Vec<QueueSnapshot>, DispatcherError> {
        let (reply, rx) = oneshot::channel();
        self.inbox.send(DispatcherMsg::List { reply }).await.map_err(|_| DispatcherError::ActorGone)?;
        rx.await.map_err(|_| DispatcherError::ActorGone)
    }

    /// Returns the subset of `ids` that were found and asked to cancel;
    /// unknown ids are silently omitted.
    pub async fn kill(&self, ids: Vec<JobId>) -> Result<Vec<JobId>, DispatcherError> {
        let (reply, rx) = oneshot::channel();
        self.inbox.send(DispatcherMsg::Kill { ids, reply }).await.map_err(|_| DispatcherError::ActorGone)?;
        rx.await.map_err(|_| DispatcherError::ActorGone)
    }

    pub async fn is_active(&self, id: JobId) -> Result<bool, DispatcherError> {
        let (reply, rx) = oneshot::channel();
        self.inbox.send(DispatcherMsg::IsActive { id, reply }).await.map_err(|_| DispatcherError::ActorGone)?;
        rx.await.map_err(|_| DispatcherError::ActorGone)
    }
}

struct JobEntry {
    record: JobRecord,
    handle: job::JobHandle,
    /// Set once the job reaches `finished`; drives the retention sweep.
    finished_since: Option<std::time::Instant>,
}

/// Events the dispatcher forwards to the event watcher.
#[derive(Debug, Clone)]
pub enum DispatcherSignal {
    Starting { id: JobId },
    Update { id: JobId, event: Event },
}

struct DispatcherActor<C: Clock> {
    jobs: HashMap<JobId, JobEntry>,
    queues: HashMap<QueueName, Queue>,
    clock: C,
    classifier: Arc<dyn JobEventClassifier>,
    job_updates_tx: mpsc::Sender<JobUpdate>,
    signals: mpsc::Sender<DispatcherSignal>,
    started: std::collections::HashSet<JobId>,
}

/// Spawn the dispatcher actor task and return a handle plus the stream
/// of signals to forward to the event watcher.
pub fn spawn<C: Clock>(clock: C) -> (DispatcherHandle, mpsc::Receiver<DispatcherSignal>) {
    spawn_with_classifier(clock, Arc::new(NoopClassifier))
}

pub fn spawn_with_classifier<C: Clock>(
    clock: C,
    classifier: Arc<dyn JobEventClassifier>,
) -> (DispatcherHandle, mpsc::Receiver<DispatcherSignal>) {
    let (inbox_tx, inbox_rx) = mpsc::channel(256);
    let (job_updates_tx, job_updates_rx) = mpsc::channel(256);
    let (signals_tx, signals_rx) = mpsc::channel(256);

    let actor = DispatcherActor {
        jobs: HashMap::new(),
        queues: HashMap::new(),
        clock,
        classifier,
        job_updates_tx,
        signals: signals_tx,
        started: std::collections::HashSet::new(),
    };

    tokio::spawn(actor.run(inbox_rx, job_updates_rx));
    (DispatcherHandle { inbox: inbox_tx }, signals_rx)
}

impl<C: Clock> DispatcherActor<C> {
    async fn run(mut self, mut inbox: mpsc::Receiver<DispatcherMsg>, mut job_updates: mpsc::Receiver<JobUpdate>) {
        let mut ticker = tokio::time::interval(SCHEDULER_TICK);
        let mut retention = tokio::time::interval(RETENTION_SWEEP);
        loop {
            tokio::select! {
                msg = inbox.recv() => {
                    match msg {
                        Some(msg) => self.handle_msg(msg).await,
                        None => break,
                    }
                }
                update = job_updates.recv() => {
                    match update {
                        Some(update) => self.handle_job_update(update).await,
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    self.schedule_all().await;
                }
                _ = retention.tick() => {
                    self.sweep_finished();
                }
            }
        }
    }

    async fn handle_msg(&mut self, msg: DispatcherMsg) {
        match msg {
            DispatcherMsg::Submit { queue, id, commands, workdir, reply } => {
                let result = self.submit(queue, id, commands, workdir);
                let _ = reply.send(result);
                self.schedule_all().await;
            }
            DispatcherMsg::List { reply } => {
                let _ = reply.send(self.list());
            }
            DispatcherMsg::Kill { ids, reply } => {
                let killed = self.kill(ids);
                let _ = reply.send(killed);
            }
            DispatcherMsg::IsActive { id, reply } => {
                let active = self.jobs.get(&id).map(|e| e.record.state != JobState::Finished).unwrap_or(false);
                let _ = reply.send(active);
            }
        }
    }

    fn submit(
        &mut self,
        queue: QueueName,
        id: JobId,
        commands: Vec<String>,
        workdir: Option<PathBuf>,
    ) -> Result<JobId, DispatcherError> {
        let trimmed: Vec<String> = commands.into_iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect();
        if trimmed.is_empty() {
            return Err(DispatcherError::InvalidArgument("command list is empty".to_string()));
        }
        if self.jobs.contains_key(&id) {
            return Err(DispatcherError::DuplicateId(id));
        }

        let record = JobRecord::new(id.clone(), queue.clone(), trimmed, workdir, self.clock.utc_now());
        let handle = job::spawn_job(record.clone(), self.job_updates_tx.clone(), self.clock.clone());

        self.jobs.insert(id.clone(), JobEntry { record, handle, finished_since: None });
        self.queues.entry(queue).or_insert_with_key(|q| Queue::new(QueuePolicy::for_queue(q))).order.push(id.clone());

        info!(job_id = %id, "job submitted");
        Ok(id)
    }

    fn list(&self) -> Vec<QueueSnapshot> {
        self.queues
            .iter()
            .map(|(name, queue)| {
                let jobs = queue
                    .order
                    .iter()
                    .filter_map(|id| self.jobs.get(id).map(|entry| (id, entry)))
                    .enumerate()
                    .map(|(position, (id, entry))| JobListEntry {
                        id: id.clone(),
                        commands: entry.record.commands.clone(),
                        state: entry.record.state,
                        position: matches!(queue.policy, QueuePolicy::Serial).then_some(position),
                    })
                    .collect();
                QueueSnapshot { name: name.clone(), policy: queue.policy, jobs }
            })
            .collect()
    }

    fn kill(&mut self, ids: Vec<JobId>) -> Vec<JobId> {
        let mut accepted = Vec::new();
        for id in ids {
            if let Some(entry) = self.jobs.get(&id) {
                entry.handle.cancel.cancel();
                accepted.push(id);
            }
        }
        accepted
    }

    async fn handle_job_update(&mut self, update: JobUpdate) {
        match update {
            JobUpdate::Started { id, time_started } => {
                if let Some(entry) = self.jobs.get_mut(&id) {
                    entry.record.state = JobState::Running;
                    entry.record.time_started = Some(time_started);
                    entry.record.current = Some(0);
                }
            }
            JobUpdate::IdlePing { id } => {
                let payload = serde_json::json!({ "process_id": id.to_string(), "state": "pending", "ping": true });
                let _ = self
                    .signals
                    .send(DispatcherSignal::Update { id, event: self.wrap_event(payload) })
                    .await;
            }
            JobUpdate::Progress { id, command_key, delta } => {
                if self.started.insert(id.clone()) {
                    let _ = self.signals.send(DispatcherSignal::Starting { id: id.clone() }).await;
                }
                let payload = serde_json::json!({
                    "process_id": id.to_string(),
                    "state": "running",
                    "command": command_key,
                    "delta": delta,
                });
                let _ = self.signals.send(DispatcherSignal::Update { id, event: self.wrap_event(payload) }).await;
            }
            JobUpdate::Terminal(record) => {
                let id = record.id.clone();
                if self.started.insert(id.clone()) {
                    let _ = self.signals.send(DispatcherSignal::Starting { id: id.clone() }).await;
                }
                self.started.remove(&id);

                if let Some(entry) = self.jobs.get_mut(&id) {
                    entry.record = (*record).clone();
                    entry.finished_since = Some(std::time::Instant::now());
                }

                let payload = self.classifier.classify(&id, &record).unwrap_or_else(|| {
                    serde_json::json!({
                        "process_id": id.to_string(),
                        "state": "finished",
                        "success": record.success,
                        "log": record.log,
                        "exit_codes": record.exit_codes,
                    })
                });
                let _ = self.signals.send(DispatcherSignal::Update { id, event: self.wrap_event(payload) }).await;

                debug!("job terminal update forwarded");
                self.schedule_all().await;
            }
        }
    }

    fn wrap_event(&self, payload: serde_json::Value) -> Event {
        Event::new(EventType::Dispatcher, payload, self.clock.utc_now())
    }

    async fn schedule_all(&mut self) {
        let names: Vec<QueueName> = self.queues.keys().cloned().collect();
        for name in names {
            self.schedule_queue(&name);
        }
    }

    /// Start the serial head if idle, or start every pending job on a
    /// parallel queue.
    fn schedule_queue(&mut self, name: &QueueName) {
        let Some(queue) = self.queues.get(name) else { return };
        match queue.policy {
            QueuePolicy::Serial => {
                let mut any_running = false;
                let mut to_start = None;
                for id in &queue.order {
                    let Some(entry) = self.jobs.get(id) else { continue };
                    match entry.record.state {
                        JobState::Running => {
                            any_running = true;
                            break;
                        }
                        JobState::Pending => {
                            to_start = Some(id.clone());
                            break;
                        }
                        JobState::Finished => continue,
                    }
                }
                if !any_running {
                    if let Some(id) = to_start {
                        self.start_job(&id);
                    }
                }
            }
            QueuePolicy::Parallel => {
                let pending: Vec<JobId> = queue
                    .order
                    .iter()
                    .filter(|id| self.jobs.get(*id).map(|e| e.record.state == JobState::Pending).unwrap_or(false))
                    .cloned()
                    .collect();
                for id in pending {
                    self.start_job(&id);
                }
            }
        }
    }

    fn start_job(&mut self, id: &JobId) {
        if let Some(entry) = self.jobs.get_mut(id) {
            if let Some(start) = entry.handle.start.take() {
                if start.send(()).is_err() {
                    warn!(job_id = %id, "job task gone before it could be started");
                }
            }
        }
    }

    /// Retain finished jobs for a fixed window after their terminal
    /// event, then release them.
    fn sweep_finished(&mut self) {
        let now = std::time::Instant::now();
        let expired: Vec<JobId> = self
            .jobs
            .iter()
            .filter_map(|(id, entry)| {
                entry
                    .finished_since
                    .filter(|since| now.duration_since(*since) >= FINISHED_RETENTION)
                    .map(|_| id.clone())
            })
            .collect();

        for id in &expired {
            self.jobs.remove(id);
        }
        if !expired.is_empty() {
            for queue in self.queues.values_mut() {
                queue.order.retain(|id| !expired.contains(id));
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
