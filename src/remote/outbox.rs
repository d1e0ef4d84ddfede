//! Fire-and-forget push queue.
//!
//! Local saves return as soon as the record is on disk; the outbox hands the
//! record to a background worker that pushes it to the mirror, retrying
//! transient failures with exponential backoff. Each record's last known
//! outcome is kept so callers can tell a confirmed push from a pending or
//! failed one. Only the newest queued version of a record decides its
//! status; an older push finishing late leaves it `Pending`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use backoff::future::retry;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::RetryPolicy;
use crate::remote::RemoteMirror;
use crate::types::{Sprint, StandupEntry, Team, User};

#[derive(Clone, Debug, PartialEq)]
pub enum PushRequest {
    Entry(StandupEntry),
    Sprint(Sprint),
    Teams(Vec<Team>),
    Users(Vec<User>),
}

impl PushRequest {
    pub fn key(&self) -> RecordKey {
        match self {
            PushRequest::Entry(entry) => RecordKey::Entry(entry.id.clone()),
            PushRequest::Sprint(sprint) => RecordKey::Sprint(sprint.id.clone()),
            PushRequest::Teams(_) => RecordKey::Teams,
            PushRequest::Users(_) => RecordKey::Users,
        }
    }
}

/// Identifies what a push covers. Team and user pushes always carry the
/// whole collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Entry(String),
    Sprint(String),
    Teams,
    Users,
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Entry(id) => write!(f, "entry:{id}"),
            RecordKey::Sprint(id) => write!(f, "sprint:{id}"),
            RecordKey::Teams => write!(f, "teams"),
            RecordKey::Users => write!(f, "users"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PushStatus {
    Pending,
    Confirmed,
    Failed(String),
}

enum Command {
    Push(u64, PushRequest),
    Flush(oneshot::Sender<()>),
}

/// Last known outcome per record, plus the generation of the newest push
/// queued for it.
#[derive(Default)]
struct Tracker {
    statuses: HashMap<RecordKey, PushStatus>,
    latest: HashMap<RecordKey, u64>,
    next: u64,
}

impl Tracker {
    fn queued(&mut self, key: RecordKey) -> u64 {
        self.next += 1;
        self.latest.insert(key.clone(), self.next);
        self.statuses.insert(key, PushStatus::Pending);
        self.next
    }

    /// Records the outcome of push `generation`. Ignored unless it is the
    /// newest push of `key`.
    fn finished(&mut self, key: &RecordKey, generation: u64, status: PushStatus) -> bool {
        if self.latest.get(key) != Some(&generation) {
            return false;
        }
        self.statuses.insert(key.clone(), status);
        true
    }
}

type StatusMap = Arc<Mutex<Tracker>>;

#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Command>,
    statuses: StatusMap,
    enabled: bool,
}

impl Outbox {
    /// Starts the push worker. It runs until every `Outbox` handle is dropped.
    pub fn spawn(mirror: Arc<RemoteMirror>, policy: RetryPolicy) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let statuses: StatusMap = Arc::default();
        let enabled = mirror.remote_enabled();
        let worker = tokio::spawn(run_worker(mirror, policy, rx, statuses.clone()));
        (
            Self {
                tx,
                statuses,
                enabled,
            },
            worker,
        )
    }

    /// Queues a push. A no-op while the remote is disabled.
    pub fn enqueue(&self, request: PushRequest) {
        if !self.enabled {
            return;
        }
        let key = request.key();
        let generation = lock(&self.statuses).queued(key.clone());
        if self.tx.send(Command::Push(generation, request)).is_err() {
            warn!(record = %key, "push worker has stopped, dropping push");
            lock(&self.statuses).finished(
                &key,
                generation,
                PushStatus::Failed("push worker stopped".into()),
            );
        }
    }

    pub fn status(&self, key: &RecordKey) -> Option<PushStatus> {
        lock(&self.statuses).statuses.get(key).cloned()
    }

    pub fn statuses(&self) -> HashMap<RecordKey, PushStatus> {
        lock(&self.statuses).statuses.clone()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.statuses)
            .statuses
            .values()
            .filter(|s| **s == PushStatus::Pending)
            .count()
    }

    /// Waits until everything queued before this call has been attempted.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// [`flush`](Self::flush) bounded by `limit`. Returns `false` when time
    /// ran out; whatever is still queued keeps its `Pending` status.
    pub async fn flush_within(&self, limit: Duration) -> bool {
        tokio::time::timeout(limit, self.flush()).await.is_ok()
    }
}

fn lock(statuses: &StatusMap) -> MutexGuard<'_, Tracker> {
    statuses.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_worker(
    mirror: Arc<RemoteMirror>,
    policy: RetryPolicy,
    mut rx: mpsc::UnboundedReceiver<Command>,
    statuses: StatusMap,
) {
    debug!("push worker started");
    while let Some(command) = rx.recv().await {
        let (generation, request) = match command {
            Command::Push(generation, request) => (generation, request),
            Command::Flush(done) => {
                let _ = done.send(());
                continue;
            }
        };

        let key = request.key();
        let (mirror, request, label) = (&mirror, &request, &key);
        let outcome = retry(policy.backoff(), || async move {
            mirror.push(request).await.map_err(|err| {
                if err.is_transient() {
                    debug!(record = %label, error = %err, "push failed, retrying");
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })
        })
        .await;

        let status = match outcome {
            Ok(()) => {
                debug!(record = %key, "push confirmed");
                PushStatus::Confirmed
            }
            Err(err) => {
                warn!(record = %key, error = %err, "push failed");
                PushStatus::Failed(err.to_string())
            }
        };
        if !lock(&statuses).finished(&key, generation, status) {
            debug!(record = %key, generation, "newer push queued, status left pending");
        }
    }
    info!("push worker stopped");
}
