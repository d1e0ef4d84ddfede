//! Channel abstraction between the sync controller and the push-notification
//! service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MirrorResult;
use crate::remote::tables;

/// One `postgres_changes` filter: every event on one table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFilter {
    pub event: String,
    pub schema: String,
    pub table: String,
}

impl TableFilter {
    pub fn all_events(table: &str) -> Self {
        Self {
            event: "*".to_string(),
            schema: "public".to_string(),
            table: table.to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    pub topic: String,
    pub filters: Vec<TableFilter>,
}

impl ChannelSpec {
    /// A channel watching the four mirrored tables.
    pub fn mirrored_tables(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            filters: tables::MIRRORED
                .iter()
                .map(|t| TableFilter::all_events(t))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError(String),
    TimedOut,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    Other,
}

impl ChangeKind {
    pub fn parse(kind: &str) -> Self {
        match kind.to_ascii_uppercase().as_str() {
            "INSERT" => ChangeKind::Insert,
            "UPDATE" => ChangeKind::Update,
            "DELETE" => ChangeKind::Delete,
            _ => ChangeKind::Other,
        }
    }
}

/// A row changed in one of the watched tables. The row itself is ignored;
/// any change triggers a full pull.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: String,
    pub kind: ChangeKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelMessage {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

/// Closes a channel: cancels its connection task and waits for it briefly.
pub struct ChannelCloser {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChannelCloser {
    /// Errors while closing are logged and otherwise ignored.
    pub async fn close(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(Duration::from_secs(2), task).await {
                Ok(Ok(())) => debug!("realtime channel closed"),
                Ok(Err(err)) => warn!(error = %err, "realtime channel task failed while closing"),
                Err(_) => warn!("realtime channel did not close in time"),
            }
        }
    }
}

impl Drop for ChannelCloser {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// A live subscription: a stream of statuses and change events plus the
/// means to close it.
pub struct Channel {
    pub messages: mpsc::UnboundedReceiver<ChannelMessage>,
    pub closer: ChannelCloser,
}

impl Channel {
    pub fn new(
        messages: mpsc::UnboundedReceiver<ChannelMessage>,
        token: CancellationToken,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            messages,
            closer: ChannelCloser { token, task },
        }
    }
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Opens a channel. The first status message arrives on the channel
    /// itself; `Err` means the attempt could not even start.
    async fn subscribe(&self, spec: &ChannelSpec) -> MirrorResult<Channel>;
}
