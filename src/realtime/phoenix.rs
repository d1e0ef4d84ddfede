//! Realtime transport over the backend's Phoenix-channels websocket.
//!
//! One socket per subscription. The connection task joins the topic with a
//! `postgres_changes` filter per table, keeps the socket alive with
//! heartbeats, translates incoming frames into [`ChannelMessage`]s and sends
//! `phx_leave` when the channel is closed.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at, sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RemoteConfig, SyncSettings};
use crate::error::{MirrorError, MirrorResult};
use crate::realtime::transport::{
    ChangeEvent, ChangeKind, Channel, ChannelMessage, ChannelSpec, ChannelStatus,
    RealtimeTransport,
};

const JOIN_REF: &str = "1";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhoenixFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixFrame {
    fn new(topic: &str, event: &str, payload: Value, reference: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            reference: Some(reference),
        }
    }

    fn to_message(&self) -> MirrorResult<Message> {
        Ok(Message::text(serde_json::to_string(self)?))
    }
}

/// `https://x.supabase.co` becomes
/// `wss://x.supabase.co/realtime/v1/websocket?apikey=<key>&vsn=1.0.0`.
pub fn socket_url(config: &RemoteConfig) -> String {
    let base = config.url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("wss://{base}")
    };
    format!("{base}/realtime/v1/websocket?apikey={}&vsn=1.0.0", config.key)
}

pub fn join_frame(spec: &ChannelSpec) -> PhoenixFrame {
    PhoenixFrame::new(
        &spec.topic,
        "phx_join",
        json!({
            "config": {
                "broadcast": { "self": false },
                "presence": { "key": "" },
                "postgres_changes": spec.filters,
            }
        }),
        JOIN_REF.to_string(),
    )
}

fn reason(payload: &Value, fallback: &str) -> String {
    payload
        .pointer("/response/reason")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

/// Maps one incoming frame to what the sync controller cares about.
/// Frames for other topics, heartbeat replies and unknown events map to
/// `None`.
pub fn interpret_frame(frame: &PhoenixFrame, topic: &str) -> Option<ChannelMessage> {
    if frame.topic != topic {
        return None;
    }
    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => {
            match frame.payload.get("status").and_then(Value::as_str) {
                Some("ok") => Some(ChannelMessage::Status(ChannelStatus::Subscribed)),
                _ => Some(ChannelMessage::Status(ChannelStatus::ChannelError(reason(
                    &frame.payload,
                    "join rejected",
                )))),
            }
        }
        "phx_error" => Some(ChannelMessage::Status(ChannelStatus::ChannelError(
            "channel error".to_string(),
        ))),
        "phx_close" => Some(ChannelMessage::Status(ChannelStatus::Closed)),
        "system" if frame.payload.get("status").and_then(Value::as_str) == Some("error") => {
            Some(ChannelMessage::Status(ChannelStatus::ChannelError(reason(
                &frame.payload,
                "subscription error",
            ))))
        }
        "postgres_changes" => {
            let data = frame.payload.get("data")?;
            let table = data.get("table")?.as_str()?.to_string();
            let kind = data
                .get("type")
                .and_then(Value::as_str)
                .map(ChangeKind::parse)
                .unwrap_or(ChangeKind::Other);
            Some(ChannelMessage::Change(ChangeEvent { table, kind }))
        }
        _ => None,
    }
}

pub struct PhoenixTransport {
    socket_url: String,
    join_timeout: Duration,
    heartbeat_interval: Duration,
}

impl PhoenixTransport {
    pub fn new(config: &RemoteConfig, settings: &SyncSettings) -> Self {
        Self {
            socket_url: socket_url(config),
            join_timeout: settings.join_timeout,
            heartbeat_interval: settings.heartbeat_interval,
        }
    }
}

#[async_trait]
impl RealtimeTransport for PhoenixTransport {
    async fn subscribe(&self, spec: &ChannelSpec) -> MirrorResult<Channel> {
        let (socket, _response) = connect_async(self.socket_url.as_str())
            .await
            .map_err(|e| MirrorError::Realtime(format!("Failed to connect to realtime: {e}")))?;
        let (mut write, mut read) = socket.split();

        write
            .send(join_frame(spec).to_message()?)
            .await
            .map_err(|e| MirrorError::Realtime(format!("Failed to join {}: {e}", spec.topic)))?;
        info!(topic = %spec.topic, "joining realtime channel");

        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let topic = spec.topic.clone();
        let join_timeout = self.join_timeout;
        let heartbeat_every = self.heartbeat_interval;

        let task = tokio::spawn(async move {
            let join_deadline = sleep(join_timeout);
            tokio::pin!(join_deadline);
            let mut joined = false;
            let mut heartbeat = interval_at(Instant::now() + heartbeat_every, heartbeat_every);
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let leave = PhoenixFrame::new(&topic, "phx_leave", json!({}), next_ref.to_string());
                        if let Ok(message) = leave.to_message() {
                            let _ = write.send(message).await;
                        }
                        let _ = write.close().await;
                        debug!(topic = %topic, "left realtime channel");
                        break;
                    }
                    _ = &mut join_deadline, if !joined => {
                        warn!(topic = %topic, "realtime join timed out");
                        let _ = tx.send(ChannelMessage::Status(ChannelStatus::TimedOut));
                        break;
                    }
                    _ = heartbeat.tick() => {
                        let beat = PhoenixFrame::new("phoenix", "heartbeat", json!({}), next_ref.to_string());
                        next_ref += 1;
                        let sent = match beat.to_message() {
                            Ok(message) => write.send(message).await.map_err(|e| e.to_string()),
                            Err(e) => Err(e.to_string()),
                        };
                        if let Err(err) = sent {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::ChannelError(err)));
                            break;
                        }
                    }
                    incoming = read.next() => match incoming {
                        Some(Ok(Message::Text(text))) => {
                            let frame = match serde_json::from_str::<PhoenixFrame>(text.as_str()) {
                                Ok(frame) => frame,
                                Err(err) => {
                                    debug!(error = %err, "ignoring unreadable realtime frame");
                                    continue;
                                }
                            };
                            let Some(message) = interpret_frame(&frame, &topic) else {
                                continue;
                            };
                            let terminal = match &message {
                                ChannelMessage::Status(ChannelStatus::Subscribed) => {
                                    joined = true;
                                    false
                                }
                                ChannelMessage::Status(_) => true,
                                ChannelMessage::Change(_) => false,
                            };
                            if tx.send(message).is_err() || terminal {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::Closed));
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(err)) => {
                            let _ = tx.send(ChannelMessage::Status(ChannelStatus::ChannelError(err.to_string())));
                            break;
                        }
                    }
                }
            }
        });

        Ok(Channel::new(rx, token, Some(task)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: Value) -> PhoenixFrame {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn socket_url_switches_scheme_and_carries_key() {
        let config = RemoteConfig {
            url: "https://abc.supabase.co".into(),
            key: "anon".into(),
        };
        assert_eq!(
            socket_url(&config),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let local = RemoteConfig {
            url: "http://localhost:54321/".into(),
            key: "k".into(),
        };
        assert!(socket_url(&local).starts_with("ws://localhost:54321/realtime/v1/websocket"));
    }

    #[test]
    fn join_frame_lists_every_table_filter() {
        let spec = ChannelSpec::mirrored_tables("realtime:bricktrack");
        let value = serde_json::to_value(join_frame(&spec)).unwrap();
        assert_eq!(value["event"], "phx_join");
        assert_eq!(value["ref"], "1");
        let filters = value["payload"]["config"]["postgres_changes"].as_array().unwrap();
        assert_eq!(filters.len(), 4);
        assert_eq!(filters[0]["table"], "bt_entries");
        assert_eq!(filters[0]["event"], "*");
    }

    #[test]
    fn join_replies_become_statuses() {
        let topic = "realtime:bricktrack";
        let ok = frame(json!({
            "topic": topic, "event": "phx_reply", "ref": "1",
            "payload": {"status": "ok", "response": {}}
        }));
        assert_eq!(
            interpret_frame(&ok, topic),
            Some(ChannelMessage::Status(ChannelStatus::Subscribed))
        );

        let rejected = frame(json!({
            "topic": topic, "event": "phx_reply", "ref": "1",
            "payload": {"status": "error", "response": {"reason": "unauthorized"}}
        }));
        assert_eq!(
            interpret_frame(&rejected, topic),
            Some(ChannelMessage::Status(ChannelStatus::ChannelError(
                "unauthorized".into()
            )))
        );

        let closed = frame(json!({"topic": topic, "event": "phx_close", "ref": null, "payload": {}}));
        assert_eq!(
            interpret_frame(&closed, topic),
            Some(ChannelMessage::Status(ChannelStatus::Closed))
        );
    }

    #[test]
    fn change_frames_name_their_table() {
        let topic = "realtime:bricktrack";
        let change = frame(json!({
            "topic": topic,
            "event": "postgres_changes",
            "ref": null,
            "payload": {"ids": [1], "data": {"table": "bt_sprints", "type": "UPDATE", "schema": "public"}}
        }));
        assert_eq!(
            interpret_frame(&change, topic),
            Some(ChannelMessage::Change(ChangeEvent {
                table: "bt_sprints".into(),
                kind: ChangeKind::Update,
            }))
        );
    }

    #[test]
    fn heartbeat_replies_and_other_topics_are_ignored() {
        let topic = "realtime:bricktrack";
        let heartbeat = frame(json!({
            "topic": "phoenix", "event": "phx_reply", "ref": "2",
            "payload": {"status": "ok", "response": {}}
        }));
        assert_eq!(interpret_frame(&heartbeat, topic), None);

        let later_reply = frame(json!({
            "topic": topic, "event": "phx_reply", "ref": "7",
            "payload": {"status": "ok", "response": {}}
        }));
        assert_eq!(interpret_frame(&later_reply, topic), None);
    }
}
