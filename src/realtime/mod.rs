//! Realtime listener: keeps the Local Store current while the app runs.
//!
//! A [`RealtimeSync`] session subscribes one channel covering the four
//! mirrored tables. Any change on any of them triggers a full pull. While the
//! channel is unavailable a fixed-interval poller pulls instead; the poller
//! and a subscribed channel never run at the same time.
//!
//! Pulls are funnelled through a single puller task, so at most one pull is
//! in flight and a burst of notifications collapses into one follow-up pull.
//! Once the session is stopped, a pull still fetching is dropped without
//! touching the store.

pub mod phoenix;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RemoteConfig, SyncSettings};
use crate::remote::RemoteMirror;
use crate::storage::LocalStore;
use phoenix::PhoenixTransport;
use transport::{Channel, ChannelMessage, ChannelSpec, ChannelStatus, RealtimeTransport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Connecting,
    Subscribed,
    /// The channel failed, timed out or closed; the poller is running.
    Fallback,
}

struct RealtimeHandle {
    token: CancellationToken,
    driver: JoinHandle<()>,
    puller: JoinHandle<()>,
}

pub struct RealtimeSync {
    mirror: Arc<RemoteMirror>,
    store: Arc<LocalStore>,
    transport: Option<Arc<dyn RealtimeTransport>>,
    settings: SyncSettings,
    state: Arc<watch::Sender<SyncState>>,
    pulls: Arc<watch::Sender<u64>>,
    active: Option<RealtimeHandle>,
}

impl RealtimeSync {
    pub fn new(
        mirror: Arc<RemoteMirror>,
        store: Arc<LocalStore>,
        transport: Option<Arc<dyn RealtimeTransport>>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            mirror,
            store,
            transport,
            settings,
            state: Arc::new(watch::Sender::new(SyncState::Idle)),
            pulls: Arc::new(watch::Sender::new(0)),
            active: None,
        }
    }

    /// Wires the websocket transport when the remote is configured.
    pub fn from_config(
        config: Option<&RemoteConfig>,
        mirror: Arc<RemoteMirror>,
        store: Arc<LocalStore>,
        settings: SyncSettings,
    ) -> Self {
        let transport = config.map(|c| {
            Arc::new(PhoenixTransport::new(c, &settings)) as Arc<dyn RealtimeTransport>
        });
        Self::new(mirror, store, transport, settings)
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Number of pulls written to the store by this session object.
    pub fn subscribe_pulls(&self) -> watch::Receiver<u64> {
        self.pulls.subscribe()
    }

    pub fn fallback_active(&self) -> bool {
        self.state() == SyncState::Fallback
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Pulls once, opens the channel and starts the puller. Does nothing
    /// while the remote is disabled or a session is already running.
    pub async fn start(&mut self) {
        if !self.mirror.remote_enabled() {
            debug!("remote sync disabled, realtime not started");
            return;
        }
        if self.active.is_some() {
            debug!("realtime sync already running");
            return;
        }

        let token = CancellationToken::new();
        let wake = Arc::new(Notify::new());
        let puller = tokio::spawn(run_puller(
            self.mirror.clone(),
            self.store.clone(),
            wake.clone(),
            token.clone(),
            self.pulls.clone(),
        ));
        // initial pull, so the session starts from the remote copy
        wake.notify_one();

        self.state.send_replace(SyncState::Connecting);
        let spec = ChannelSpec::mirrored_tables(&self.settings.channel_topic);
        let channel = match &self.transport {
            Some(transport) => match transport.subscribe(&spec).await {
                Ok(channel) => Some(channel),
                Err(err) => {
                    warn!(topic = %spec.topic, error = %err, "realtime subscription failed");
                    None
                }
            },
            None => {
                warn!("no realtime transport configured");
                None
            }
        };

        let driver = Driver {
            mirror: self.mirror.clone(),
            state: self.state.clone(),
            wake,
            token: token.clone(),
            poll_interval: self.settings.fallback_poll_interval,
            poller: None,
        };
        let driver = tokio::spawn(driver.run(channel));
        info!(topic = %spec.topic, "realtime sync started");

        self.active = Some(RealtimeHandle {
            token,
            driver,
            puller,
        });
    }

    /// Closes the channel and stops the poller and puller. Safe to call when
    /// nothing is running.
    pub async fn stop(&mut self) {
        let Some(handle) = self.active.take() else {
            return;
        };
        handle.token.cancel();
        if let Err(err) = handle.driver.await {
            warn!(error = %err, "realtime driver ended abnormally");
        }
        if let Err(err) = handle.puller.await {
            warn!(error = %err, "realtime puller ended abnormally");
        }
        self.state.send_replace(SyncState::Idle);
        info!("realtime sync stopped");
    }
}

impl Drop for RealtimeSync {
    fn drop(&mut self) {
        if let Some(handle) = &self.active {
            handle.token.cancel();
        }
    }
}

struct Poller {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl Poller {
    fn spawn(
        mirror: Arc<RemoteMirror>,
        wake: Arc<Notify>,
        period: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let token = parent.child_token();
        let cancelled = token.clone();
        let task = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticks.tick() => {
                        if mirror.remote_enabled() {
                            debug!("fallback poll");
                            wake.notify_one();
                        }
                    }
                }
            }
        });
        Self { token, task }
    }

    async fn stop(self) {
        self.token.cancel();
        if let Err(err) = self.task.await {
            warn!(error = %err, "fallback poller ended abnormally");
        }
    }
}

/// Owns the channel and the poller, and turns channel messages into state
/// changes and pull requests.
struct Driver {
    mirror: Arc<RemoteMirror>,
    state: Arc<watch::Sender<SyncState>>,
    wake: Arc<Notify>,
    token: CancellationToken,
    poll_interval: Duration,
    poller: Option<Poller>,
}

impl Driver {
    async fn run(mut self, channel: Option<Channel>) {
        match channel {
            Some(Channel {
                mut messages,
                closer,
            }) => {
                loop {
                    tokio::select! {
                        _ = self.token.cancelled() => break,
                        message = messages.recv() => match message {
                            Some(ChannelMessage::Status(ChannelStatus::Subscribed)) => {
                                self.on_subscribed().await;
                            }
                            Some(ChannelMessage::Status(status)) => {
                                warn!(?status, "realtime channel unavailable");
                                self.enter_fallback();
                            }
                            Some(ChannelMessage::Change(change)) => {
                                debug!(table = %change.table, kind = ?change.kind, "remote change");
                                self.wake.notify_one();
                            }
                            None => {
                                self.enter_fallback();
                                self.token.cancelled().await;
                                break;
                            }
                        }
                    }
                }
                closer.close().await;
            }
            None => {
                self.enter_fallback();
                self.token.cancelled().await;
            }
        }

        if let Some(poller) = self.poller.take() {
            poller.stop().await;
        }
    }

    async fn on_subscribed(&mut self) {
        info!("realtime channel subscribed");
        if let Some(poller) = self.poller.take() {
            debug!("stopping fallback poller");
            poller.stop().await;
        }
        self.state.send_replace(SyncState::Subscribed);
    }

    fn enter_fallback(&mut self) {
        if self.poller.is_none() {
            info!(
                every_secs = self.poll_interval.as_secs(),
                "falling back to periodic pulls"
            );
            self.poller = Some(Poller::spawn(
                self.mirror.clone(),
                self.wake.clone(),
                self.poll_interval,
                &self.token,
            ));
        }
        self.state.send_replace(SyncState::Fallback);
    }
}

async fn run_puller(
    mirror: Arc<RemoteMirror>,
    store: Arc<LocalStore>,
    wake: Arc<Notify>,
    token: CancellationToken,
    pulls: Arc<watch::Sender<u64>>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = wake.notified() => {}
        }

        let snapshot = tokio::select! {
            _ = token.cancelled() => break,
            snapshot = mirror.fetch_all() => snapshot,
        };
        if token.is_cancelled() {
            debug!("realtime stopped during pull, discarding result");
            break;
        }
        if let Some(snapshot) = snapshot {
            let summary = mirror.apply_snapshot(&store, snapshot);
            info!(?summary, "pulled remote changes");
        }
        pulls.send_modify(|count| *count += 1);
    }
}
