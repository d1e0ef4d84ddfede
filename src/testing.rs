//! In-process doubles for the backend and the realtime transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{MirrorError, MirrorResult};
use crate::realtime::transport::{
    Channel, ChannelMessage, ChannelSpec, ChannelStatus, RealtimeTransport,
};
use crate::remote::RemoteBackend;
use crate::types::Sprint;

pub fn sample_sprint(id: &str, active: bool) -> Sprint {
    Sprint {
        id: id.to_string(),
        team_id: "development".into(),
        name: format!("Sprint {id}"),
        start_date: "2024-01-01".into(),
        end_date: "2024-01-14".into(),
        goals: vec!["Ship onboarding".into()],
        backlog_items: vec![],
        task_breakdown: vec![],
        capacity_planning: None,
        risks: None,
        notes: None,
        is_active: active,
    }
}

/// Tables held in memory, keyed by name.
#[derive(Default)]
pub struct MockBackend {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    select_failures: Mutex<HashMap<String, MirrorError>>,
    upsert_failures: Mutex<Option<(usize, MirrorError)>>,
    select_gate: Mutex<Option<Arc<Semaphore>>>,
    selects: AtomicUsize,
    upserts: AtomicUsize,
}

impl MockBackend {
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert_rows(&self, table: &str, rows: Vec<Value>) {
        self.tables
            .lock()
            .unwrap()
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Every read of `table` fails with `err`.
    pub fn fail_table(&self, table: &str, err: MirrorError) {
        self.select_failures
            .lock()
            .unwrap()
            .insert(table.to_string(), err);
    }

    /// The next `times` upserts fail with `err`.
    pub fn fail_upserts(&self, times: usize, err: MirrorError) {
        *self.upsert_failures.lock().unwrap() = Some((times, err));
    }

    /// Full-table reads block until the returned semaphore hands out a
    /// permit per read. Each read is counted before it blocks.
    pub fn hold_selects(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.select_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn select_calls(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_select(&self, table: &str) -> MirrorResult<()> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.check_failure(table)
    }

    fn check_failure(&self, table: &str) -> MirrorResult<()> {
        match self.select_failures.lock().unwrap().get(table) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteBackend for MockBackend {
    async fn select_all(&self, table: &str) -> MirrorResult<Vec<Value>> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        let gate = self.select_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        self.check_failure(table)?;
        Ok(self.rows(table))
    }

    async fn select_eq(&self, table: &str, column: &str, value: &str) -> MirrorResult<Vec<Value>> {
        self.check_select(table)?;
        Ok(self
            .rows(table)
            .into_iter()
            .filter(|row| row.get(column).and_then(Value::as_str) == Some(value))
            .collect())
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &str) -> MirrorResult<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.upsert_failures.lock().unwrap();
            if let Some((remaining, err)) = failures.as_mut() {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(err.clone());
                }
            }
        }

        let mut tables = self.tables.lock().unwrap();
        let stored = tables.entry(table.to_string()).or_default();
        for row in rows {
            let key = row.get(on_conflict).cloned();
            match stored.iter_mut().find(|r| r.get(on_conflict).cloned() == key) {
                Some(existing) => *existing = row,
                None => stored.push(row),
            }
        }
        Ok(())
    }
}

/// How the next subscription attempt behaves.
#[derive(Clone, Debug)]
pub enum SubscribeOutcome {
    /// Hands back a live channel the test can drive.
    Open,
    /// The attempt itself fails.
    Fail(MirrorError),
}

/// Records every subscription and keeps the sending side of the newest
/// channel so tests can push statuses and change events through it.
pub struct MockTransport {
    outcome: Mutex<SubscribeOutcome>,
    subscribes: AtomicUsize,
    specs: Mutex<Vec<ChannelSpec>>,
    sender: Mutex<Option<mpsc::UnboundedSender<ChannelMessage>>>,
    token: Mutex<Option<CancellationToken>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self {
            outcome: Mutex::new(SubscribeOutcome::Open),
            subscribes: AtomicUsize::new(0),
            specs: Mutex::new(Vec::new()),
            sender: Mutex::new(None),
            token: Mutex::new(None),
        }
    }
}

impl MockTransport {
    pub fn failing(err: MirrorError) -> Self {
        let transport = Self::default();
        *transport.outcome.lock().unwrap() = SubscribeOutcome::Fail(err);
        transport
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn specs(&self) -> Vec<ChannelSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn send_status(&self, status: ChannelStatus) {
        self.send(ChannelMessage::Status(status));
    }

    pub fn send(&self, message: ChannelMessage) {
        if let Some(tx) = self.sender.lock().unwrap().as_ref() {
            let _ = tx.send(message);
        }
    }

    /// Ends the message stream as a dropped connection would.
    pub fn drop_stream(&self) {
        self.sender.lock().unwrap().take();
    }

    /// Whether the newest channel has been closed by its owner.
    pub fn channel_closed(&self) -> bool {
        self.token
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn subscribe(&self, spec: &ChannelSpec) -> MirrorResult<Channel> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());
        if let SubscribeOutcome::Fail(err) = &*self.outcome.lock().unwrap() {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        *self.sender.lock().unwrap() = Some(tx);
        *self.token.lock().unwrap() = Some(token.clone());
        Ok(Channel::new(rx, token, None))
    }
}
