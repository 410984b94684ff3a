//! Event Watcher — fans tailed log files, periodic probes, and
//! dispatcher signals into one typed event stream with a "last event
//! per type" cache.

use crate::classify::{self, ClassifiedEvent, ReplicationProgress};
use crate::error::WatcherError;
use crate::prober::{self, Probe, ProbeOutcome};
use crate::tailer;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use sysadm_core::{Clock, ConfigStore, Event, EventType};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const BROADCAST_CAPACITY: usize = 256;

/// The tag used for the reference replication/snapshot log's events.
pub const REPLICATION_LOG_TAG: &str = "replication";

enum WatcherMsg {
    Subscribe(oneshot::Sender<broadcast::Receiver<Event>>),
    LastEvent(EventType, oneshot::Sender<Option<Event>>),
    RegisterLogFile { path: PathBuf, tag: String },
    RegisterReplicationLog { path: PathBuf },
    RegisterProbe { name: String, interval: Duration, probe: Arc<dyn Probe> },
    FireDomainEvent(Event),
    TailChunk { path: PathBuf, text: String },
    ProbeOutcome(ProbeOutcome),
    DispatcherSignal(sysadm_dispatcher::DispatcherSignal),
}

/// Cheaply-cloneable handle to a running event watcher actor.
#[derive(Clone)]
pub struct EventWatcherHandle {
    inbox: mpsc::Sender<WatcherMsg>,
}

impl EventWatcherHandle {
    /// Hot stream of events in emission order; no replay.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<Event>, WatcherError> {
        let (reply, rx) = oneshot::channel();
        self.inbox.send(WatcherMsg::Subscribe(reply)).await.map_err(|_| WatcherError::ActorGone)?;
        rx.await.map_err(|_| WatcherError::ActorGone)
    }

    pub async fn last_event(&self, event_type: EventType) -> Result<Option<Event>, WatcherError> {
        let (reply, rx) = oneshot::channel();
        self.inbox.send(WatcherMsg::LastEvent(event_type, reply)).await.map_err(|_| WatcherError::ActorGone)?;
        rx.await.map_err(|_| WatcherError::ActorGone)
    }

    /// Attach a tailer to a generic log file, emitting raw chunks as
    /// `logfile:<tag>` events. Idempotent per path.
    pub async fn register_log_file(&self, path: PathBuf, tag: impl Into<String>) -> Result<(), WatcherError> {
        self.inbox
            .send(WatcherMsg::RegisterLogFile { path, tag: tag.into() })
            .await
            .map_err(|_| WatcherError::ActorGone)
    }

    /// Attach a tailer to the reference replication/snapshot log, wired
    /// to [`classify::classify_replication_line`].
    pub async fn register_replication_log(&self, path: PathBuf) -> Result<(), WatcherError> {
        self.inbox.send(WatcherMsg::RegisterReplicationLog { path }).await.map_err(|_| WatcherError::ActorGone)
    }

    pub async fn register_probe(
        &self,
        name: impl Into<String>,
        interval: Duration,
        probe: Arc<dyn Probe>,
    ) -> Result<(), WatcherError> {
        self.inbox
            .send(WatcherMsg::RegisterProbe { name: name.into(), interval, probe })
            .await
            .map_err(|_| WatcherError::ActorGone)
    }

    /// Synchronous "fire domain event" entry point for subsystems outside
    /// the dispatcher/tailer/prober triad.
    pub async fn fire_domain_event(&self, event: Event) -> Result<(), WatcherError> {
        self.inbox.send(WatcherMsg::FireDomainEvent(event)).await.map_err(|_| WatcherError::ActorGone)
    }

    /// Forward one dispatcher signal into the watcher's event stream.
    pub async fn ingest_dispatcher_signal(
        &self,
        signal: sysadm_dispatcher::DispatcherSignal,
    ) -> Result<(), WatcherError> {
        self.inbox.send(WatcherMsg::DispatcherSignal(signal)).await.map_err(|_| WatcherError::ActorGone)
    }
}

/// What a registered tailed path should do with its chunks.
enum LogKind {
    /// Generic file: emit raw chunks as `logfile:<tag>` events.
    Generic { tag: String },
    /// The reference replication/snapshot log: pattern-match each line.
    ReplicationMain,
    /// A per-run replication log discovered from a "Starting replication" line.
    ReplicationRun(ReplicationProgress),
}

struct EventWatcherActor<C: Clock> {
    clock: C,
    store: Arc<dyn ConfigStore>,
    self_tx: mpsc::Sender<WatcherMsg>,
    broadcast_tx: broadcast::Sender<Event>,
    last_events: HashMap<EventType, Event>,
    logs: HashMap<PathBuf, LogKind>,
    registered_probes: HashSet<String>,
    tail_cancels: Vec<CancellationToken>,
    probe_cancels: Vec<CancellationToken>,
}

/// Spawn the event watcher actor and return a handle.
pub fn spawn<C: Clock>(clock: C, store: Arc<dyn ConfigStore>) -> EventWatcherHandle {
    let (inbox_tx, inbox_rx) = mpsc::channel(256);
    let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);

    let actor = EventWatcherActor {
        clock,
        store,
        self_tx: inbox_tx.clone(),
        broadcast_tx,
        last_events: HashMap::new(),
        logs: HashMap::new(),
        registered_probes: HashSet::new(),
        tail_cancels: Vec::new(),
        probe_cancels: Vec::new(),
    };

    tokio::spawn(actor.run(inbox_rx));
    EventWatcherHandle { inbox: inbox_tx }
}

impl<C: Clock> EventWatcherActor<C> {
    async fn run(mut self, mut inbox: mpsc::Receiver<WatcherMsg>) {
        while let Some(msg) = inbox.recv().await {
            self.handle(msg).await;
        }
        for cancel in self.tail_cancels.drain(..) {
            cancel.cancel();
        }
        for cancel in self.probe_cancels.drain(..) {
            cancel.cancel();
        }
    }

    async fn handle(&mut self, msg: WatcherMsg) {
        match msg {
            WatcherMsg::Subscribe(reply) => {
                let _ = reply.send(self.broadcast_tx.subscribe());
            }
            WatcherMsg::LastEvent(event_type, reply) => {
                let _ = reply.send(self.last_events.get(&event_type).cloned());
            }
            WatcherMsg::RegisterLogFile { path, tag } => {
                if !self.logs.contains_key(&path) {
                    self.logs.insert(path.clone(), LogKind::Generic { tag });
                    self.spawn_tail(path);
                }
            }
            WatcherMsg::RegisterReplicationLog { path } => {
                if !self.logs.contains_key(&path) {
                    self.logs.insert(path.clone(), LogKind::ReplicationMain);
                    self.spawn_tail(path);
                }
            }
            WatcherMsg::RegisterProbe { name, interval, probe } => {
                if self.registered_probes.insert(name.clone()) {
                    let cancel = CancellationToken::new();
                    self.probe_cancels.push(cancel.clone());
                    let (tx, mut rx) = mpsc::channel(16);
                    prober::spawn(name, interval, probe, self.store.clone(), self.clock.clone(), tx, cancel);
                    let self_tx = self.self_tx.clone();
                    tokio::spawn(async move {
                        while let Some(outcome) = rx.recv().await {
                            if self_tx.send(WatcherMsg::ProbeOutcome(outcome)).await.is_err() {
                                break;
                            }
                        }
                    });
                }
            }
            WatcherMsg::FireDomainEvent(event) => self.emit(event),
            WatcherMsg::TailChunk { path, text } => self.handle_tail_chunk(path, text),
            WatcherMsg::ProbeOutcome(outcome) => self.handle_probe_outcome(outcome),
            WatcherMsg::DispatcherSignal(signal) => self.handle_dispatcher_signal(signal),
        }
    }

    fn spawn_tail(&mut self, path: PathBuf) {
        let cancel = CancellationToken::new();
        self.tail_cancels.push(cancel.clone());
        let mut rx = tailer::tail(path.clone(), self.store.clone(), cancel);
        let self_tx = self.self_tx.clone();
        tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if self_tx.send(WatcherMsg::TailChunk { path: path.clone(), text }).await.is_err() {
                    break;
                }
            }
        });
    }

    fn handle_tail_chunk(&mut self, path: PathBuf, text: String) {
        // Collect everything this chunk produces before touching `self.logs`
        // or `self.emit` again, so the mutable borrow of the matched
        // `LogKind` never overlaps a call back into `self`.
        let mut classified_events = Vec::new();
        let mut raw_events = Vec::new();
        let mut to_register = Vec::new();

        match self.logs.get_mut(&path) {
            None => {
                debug!(path = %path.display(), "chunk from an unregistered tailer, dropping");
                return;
            }
            Some(LogKind::Generic { tag }) => {
                raw_events.push((tag.clone(), text));
            }
            Some(LogKind::ReplicationRun(progress)) => {
                for line in text.lines() {
                    if let Some(classified) = progress.observe(line) {
                        classified_events.push(classified);
                    }
                }
            }
            Some(LogKind::ReplicationMain) => {
                for line in text.lines() {
                    if let Some(classified) = classify::classify_replication_line(line) {
                        if let Some(follow_up) = &classified.follow_up_tail {
                            let run_path = PathBuf::from(follow_up);
                            if !self.logs.contains_key(&run_path) {
                                to_register.push(run_path);
                            }
                        }
                        classified_events.push(classified);
                    }
                }
            }
        }

        for (tag, text) in raw_events {
            let event = Event::new(EventType::LogFile(tag), serde_json::json!({ "text": text }), self.clock.utc_now());
            self.emit(event);
        }
        for classified in classified_events {
            let event = self.wrap_classified(classified);
            self.emit(event);
        }
        for run_path in to_register {
            self.logs.insert(run_path.clone(), LogKind::ReplicationRun(ReplicationProgress::default()));
            self.spawn_tail(run_path);
        }
    }

    fn wrap_classified(&self, classified: ClassifiedEvent) -> Event {
        Event::new(
            EventType::LogFile(REPLICATION_LOG_TAG.to_string()),
            serde_json::json!({ "kind": classified.kind, "payload": classified.payload }),
            self.clock.utc_now(),
        )
    }

    fn handle_probe_outcome(&mut self, outcome: ProbeOutcome) {
        let event = match outcome {
            ProbeOutcome::Success { name, payload } => {
                Event::new(EventType::Health, serde_json::json!({ "probe": name, "result": payload }), self.clock.utc_now())
            }
            ProbeOutcome::Escalated { name, priority, message } => Event::new(
                EventType::Health,
                serde_json::json!({ "probe": name, "priority": priority, "display": priority, "message": message }),
                self.clock.utc_now(),
            ),
        };
        self.emit(event);
    }

    fn handle_dispatcher_signal(&mut self, signal: sysadm_dispatcher::DispatcherSignal) {
        let payload = match &signal {
            sysadm_dispatcher::DispatcherSignal::Starting { id } => {
                serde_json::json!({ "process_id": id.to_string(), "state": "starting" })
            }
            sysadm_dispatcher::DispatcherSignal::Update { id, event } => {
                let mut payload = event.payload.clone();
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("process_id".to_string(), serde_json::json!(id.to_string()));
                }
                payload
            }
        };
        self.emit(Event::new(EventType::Dispatcher, payload, self.clock.utc_now()));
    }

    fn emit(&mut self, event: Event) {
        self.last_events.insert(event.event_type.clone(), event.clone());
        let _ = self.broadcast_tx.send(event);
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
