use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::config::FeedConfig;
use crate::wallet::registry::{Subscription, SubscriptionRegistry};

use super::backoff::ReconnectPolicy;
use super::messages::{parse_feed_message, ControlMessage};
use super::router::EventRouter;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Reconnect attempts exhausted; needs an external restart.
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }
}

/// Cloneable front for the connector. Subscription changes land in the registry
/// first, so a change made while disconnected is replayed on the next connect.
#[derive(Clone)]
pub struct StreamHandle {
    registry: Arc<SubscriptionRegistry>,
    commands: mpsc::UnboundedSender<ControlMessage>,
    state: watch::Receiver<ConnectionState>,
    events: Arc<Vec<String>>,
}

impl StreamHandle {
    pub fn subscribe(&self, address: &str, chains: &BTreeSet<String>) -> Subscription {
        let subscription = self.registry.add(address, chains);
        let msg = ControlMessage::subscribe(address, subscription.chains.iter().cloned(), &self.events);
        if self.commands.send(msg).is_err() {
            tracing::debug!(wallet = %address, "Feed connector not running, subscription kept in registry");
        }
        subscription
    }

    pub fn unsubscribe(&self, address: &str) -> Option<Subscription> {
        let removed = self.registry.remove(address);
        if self.commands.send(ControlMessage::unsubscribe(address)).is_err() {
            tracing::debug!(wallet = %address, "Feed connector not running, unsubscribe is local only");
        }
        removed
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }
}

enum SessionEnd {
    Shutdown,
    Dropped(String),
}

/// Owns the single feed connection: connect, replay subscriptions, route
/// events, and reconnect with backoff until the attempt ceiling.
pub struct StreamConnector {
    url: String,
    api_key: Option<String>,
    policy: ReconnectPolicy,
    connect_timeout: Duration,
    events: Arc<Vec<String>>,
    registry: Arc<SubscriptionRegistry>,
    commands: mpsc::UnboundedReceiver<ControlMessage>,
    state: watch::Sender<ConnectionState>,
    router: EventRouter,
}

impl StreamConnector {
    pub fn new(
        config: &FeedConfig,
        registry: Arc<SubscriptionRegistry>,
        router: EventRouter,
    ) -> (Self, StreamHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let events = Arc::new(config.events.clone());

        let connector = Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            policy: ReconnectPolicy::new(
                Duration::from_millis(config.reconnect_base_ms),
                config.max_reconnect_attempts,
            ),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            events: events.clone(),
            registry: registry.clone(),
            commands: command_rx,
            state: state_tx,
            router,
        };
        let handle = StreamHandle {
            registry,
            commands: command_tx,
            state: state_rx,
            events,
        };
        (connector, handle)
    }

    /// Run until shutdown (`Ok`) or until reconnect attempts are exhausted (`Err`).
    /// Attempts are strictly sequential.
    pub async fn run(mut self, shutdown: CancellationToken) -> eyre::Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                self.set_state(ConnectionState::Disconnected);
                return Ok(());
            }

            self.set_state(ConnectionState::Connecting);
            match self.connect().await {
                Ok(ws) => {
                    attempt = 0;
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(url = %self.url, "Connected to feed");

                    match self.session(ws, &shutdown).await {
                        SessionEnd::Shutdown => {
                            self.set_state(ConnectionState::Disconnected);
                            tracing::info!("Shutdown received, feed connection closed");
                            return Ok(());
                        }
                        SessionEnd::Dropped(reason) => {
                            tracing::warn!(url = %self.url, reason = %reason, "Feed connection lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, attempt, error = %e, "Feed connect failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);

            let Some(delay) = self.policy.delay_for(attempt) else {
                self.set_state(ConnectionState::Failed);
                tracing::error!(
                    url = %self.url,
                    attempts = attempt,
                    "Feed reconnect attempts exhausted, giving up"
                );
                return Err(eyre::eyre!(
                    "Feed reconnect attempts exhausted after {} attempts",
                    attempt
                ));
            };
            attempt += 1;

            tracing::info!(
                attempt,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting to feed"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => {
                    self.set_state(ConnectionState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn connect(&self) -> eyre::Result<WsStream> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| eyre::eyre!("Invalid feed URL '{}': {}", self.url, e))?;

        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| eyre::eyre!("Invalid feed API key header: {}", e))?;
            request.headers_mut().insert("x-api-key", value);
        }

        let (ws, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                eyre::eyre!(
                    "Feed connect timed out after {}ms",
                    self.connect_timeout.as_millis()
                )
            })?
            .map_err(|e| eyre::eyre!("Feed connect to '{}' failed: {}", self.url, e))?;

        Ok(ws)
    }

    async fn session(&mut self, ws: WsStream, shutdown: &CancellationToken) -> SessionEnd {
        let (mut sink, mut frames) = ws.split();

        // Anything queued while disconnected is already reflected in the registry.
        let mut stale = 0usize;
        while self.commands.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            tracing::debug!(stale, "Discarded queued control messages before replay");
        }

        let subscriptions = self.registry.list_active();
        for sub in &subscriptions {
            let msg = ControlMessage::subscribe(&sub.address, sub.chains.iter().cloned(), &self.events);
            if let Err(e) = send_control(&mut sink, &msg).await {
                return SessionEnd::Dropped(e.to_string());
            }
        }
        tracing::info!(wallets = subscriptions.len(), "Replayed feed subscriptions");

        let mut commands_open = true;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }
                cmd = self.commands.recv(), if commands_open => match cmd {
                    Some(msg) => {
                        if let Err(e) = send_control(&mut sink, &msg).await {
                            return SessionEnd::Dropped(e.to_string());
                        }
                        tracing::debug!(wallet = %msg.address(), "Sent feed control message");
                    }
                    None => commands_open = false,
                },
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.dispatch(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = sink.send(Message::Pong(payload)).await {
                            return SessionEnd::Dropped(format!("pong failed: {}", e));
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Dropped(format!("closed by server: {:?}", frame));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                    None => return SessionEnd::Dropped("stream ended".to_string()),
                },
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match parse_feed_message(text) {
            Ok(Some(event)) => {
                if let Err(e) = self.router.route(event) {
                    tracing::error!(error = %e, "Dropping feed event");
                }
            }
            Ok(None) => tracing::debug!("Ignoring unhandled feed frame"),
            Err(e) => tracing::warn!(error = %e, "Skipping malformed feed frame"),
        }
    }
}

async fn send_control(sink: &mut WsSink, msg: &ControlMessage) -> eyre::Result<()> {
    let text = msg.to_json()?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| eyre::eyre!("Failed to send control message for {}: {}", msg.address(), e))
}
