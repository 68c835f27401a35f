//! Live-update connection with state management and auto-reconnect.

use std::sync::Arc;

use classroom_shared::{ClientCommand, Envelope, RecordId, ServerEvent};
use futures_channel::mpsc::{unbounded, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::registry::{Listener, SubscriptionRegistry};
use crate::config::ClientConfig;

/// Connection state for the live-update socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(self, ConnectionState::Connecting)
    }
}

/// Observable status of a [`LiveClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveStatus {
    pub state: ConnectionState,
    /// Automatic reconnect attempts since the last successful connect.
    pub reconnect_attempts: u32,
    /// The reconnect budget is spent; nothing happens until `connect` is called.
    pub exhausted: bool,
}

/// Client for the portal's live-update socket.
///
/// Owns one connection at a time plus the registry inbound events are
/// dispatched to. Cloning yields another handle onto the same client. All
/// operations are fire-and-forget: failures are logged and only show up as
/// status transitions.
#[derive(Clone)]
pub struct LiveClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    registry: SubscriptionRegistry,
    status: watch::Sender<LiveStatus>,
    session: Mutex<Session>,
}

/// Mutable connection bookkeeping.
///
/// `generation` is bumped by every manual `connect` and every `disconnect`;
/// background tasks compare it against the value they were started with and
/// stand down when it moved.
struct Session {
    generation: u64,
    credential: Option<String>,
    outbound: Option<UnboundedSender<Envelope>>,
    policy: ReconnectPolicy,
}

impl LiveClient {
    pub fn new(endpoint: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        let (status, _) = watch::channel(LiveStatus::default());
        Self {
            inner: Arc::new(Inner {
                endpoint: endpoint.into(),
                registry: SubscriptionRegistry::new(),
                status,
                session: Mutex::new(Session {
                    generation: 0,
                    credential: None,
                    outbound: None,
                    policy: ReconnectPolicy::new(reconnect),
                }),
            }),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.ws_url.clone(), config.reconnect.clone())
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    pub fn status(&self) -> LiveStatus {
        self.inner.status.borrow().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.status.borrow().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Receiver that observes every status transition.
    pub fn watch_status(&self) -> watch::Receiver<LiveStatus> {
        self.inner.status.subscribe()
    }

    /// Open the connection using `credential` as the bearer token.
    ///
    /// Does nothing for an empty credential. Replaces any existing connection
    /// and restores the full reconnect budget. Must be called from within a
    /// tokio runtime.
    pub fn connect(&self, credential: &str) {
        if credential.is_empty() {
            tracing::debug!("no credential, live connection not started");
            return;
        }

        let url = match connect_url(&self.inner.endpoint, credential) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(endpoint = %self.inner.endpoint, error = %e, "invalid live-update endpoint");
                return;
            }
        };

        let generation = {
            let mut session = self.inner.session.lock();
            session.generation += 1;
            session.credential = Some(credential.to_string());
            // Dropping the sender ends the previous connection's writer.
            session.outbound = None;
            session.policy.reset();
            self.inner.status.send_modify(|status| {
                status.state = ConnectionState::Connecting;
                status.reconnect_attempts = 0;
                status.exhausted = false;
            });
            session.generation
        };

        self.spawn_session(generation, url);
    }

    /// Close the connection and drop every listener. Idempotent.
    pub fn disconnect(&self) {
        let was_open = {
            let mut session = self.inner.session.lock();
            session.generation += 1;
            session.credential = None;
            session.policy.reset();
            self.inner.status.send_replace(LiveStatus::default());
            session.outbound.take().is_some()
        };
        self.inner.registry.clear();
        if was_open {
            tracing::info!(endpoint = %self.inner.endpoint, "live connection closed");
        }
    }

    /// Send `{type, payload}` if connected; silently dropped otherwise.
    pub fn send(&self, event_type: &str, payload: Value) {
        self.send_envelope(Envelope::new(event_type, payload));
    }

    pub fn send_command(&self, command: &ClientCommand) {
        match command.to_envelope() {
            Ok(envelope) => self.send_envelope(envelope),
            Err(e) => tracing::error!(?command, error = %e, "failed to encode command"),
        }
    }

    fn send_envelope(&self, envelope: Envelope) {
        let session = self.inner.session.lock();
        let connected = self.inner.status.borrow().state.is_connected();
        match session.outbound.as_ref() {
            Some(sender) if connected => {
                if sender.unbounded_send(envelope).is_err() {
                    tracing::debug!("live connection closing, message dropped");
                }
            }
            _ => tracing::debug!(
                event_type = %envelope.event_type,
                "not connected, message dropped"
            ),
        }
    }

    /// Register a listener for an event type.
    pub fn on(&self, event_type: &str, listener: Listener) {
        self.inner.registry.subscribe(event_type, listener);
    }

    /// Remove a listener previously passed to [`LiveClient::on`].
    pub fn off(&self, event_type: &str, listener: &Listener) {
        self.inner.registry.unsubscribe(event_type, listener);
    }

    pub fn subscribe_assignment(&self, assignment_id: RecordId) {
        self.send_command(&ClientCommand::SubscribeAssignment { assignment_id });
    }

    pub fn unsubscribe_assignment(&self, assignment_id: RecordId) {
        self.send_command(&ClientCommand::UnsubscribeAssignment { assignment_id });
    }

    pub fn subscribe_attendance(&self, subject_id: RecordId) {
        self.send_command(&ClientCommand::SubscribeAttendance { subject_id });
    }

    pub fn unsubscribe_attendance(&self, subject_id: RecordId) {
        self.send_command(&ClientCommand::UnsubscribeAttendance { subject_id });
    }

    /// Inbound path: decode a text frame and dispatch it.
    ///
    /// Frames that fail to decode are logged and dropped without touching the
    /// connection state.
    pub(crate) fn handle_text(&self, text: &str) -> usize {
        match ServerEvent::parse(text) {
            Ok(event) => self.inner.registry.dispatch(event.event_type(), &event),
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed live-update frame");
                0
            }
        }
    }

    fn spawn_session(&self, generation: u64, url: Url) {
        let client = self.clone();
        tokio::spawn(async move { client.run_session(generation, url).await });
    }

    async fn run_session(self, generation: u64, url: Url) {
        let endpoint = self.inner.endpoint.clone();
        let ws_stream = match connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                tracing::warn!(%endpoint, error = %e, "live connection failed");
                self.connection_lost(generation);
                return;
            }
        };

        let (sender, mut receiver) = unbounded::<Envelope>();
        {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                tracing::debug!(%endpoint, "connection superseded before it opened");
                return;
            }
            session.outbound = Some(sender);
            session.policy.reset();
            self.inner.status.send_modify(|status| {
                status.state = ConnectionState::Connected;
                status.reconnect_attempts = 0;
                status.exhausted = false;
            });
        }
        tracing::info!(%endpoint, "live connection established");

        let (mut write, mut read) = ws_stream.split();

        // Writer: drains outbound envelopes until the sender is dropped, then
        // closes the socket.
        let mut writer = tokio::spawn(async move {
            while let Some(envelope) = receiver.next().await {
                match envelope.to_json() {
                    Ok(json) => {
                        tracing::trace!(%json, "sending");
                        if let Err(e) = write.send(Message::text(json)).await {
                            tracing::warn!(error = %e, "live send failed");
                            return;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "serialize failed"),
                }
            }
            let _ = write.close().await;
        });

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        tracing::trace!(text = %text.as_str(), "received");
                        self.handle_text(text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // ping/pong are answered by tungstenite; binary is not part of the protocol
                    }
                    Some(Err(e)) => {
                        tracing::warn!(%endpoint, error = %e, "live read error");
                        break;
                    }
                },
                _ = &mut writer => break,
            }
        }
        writer.abort();

        let unexpected = {
            let mut session = self.inner.session.lock();
            if session.generation == generation {
                session.outbound = None;
                self.inner
                    .status
                    .send_modify(|status| status.state = ConnectionState::Disconnected);
                true
            } else {
                false
            }
        };
        if unexpected {
            tracing::info!(%endpoint, "live connection dropped");
            self.connection_lost(generation);
        }
    }

    /// Apply the reconnection policy after an unexpected close or failed open.
    fn connection_lost(&self, generation: u64) {
        let (delay, attempt, max_attempts) = {
            let mut session = self.inner.session.lock();
            if session.generation != generation {
                return;
            }
            let delay = session.policy.next_delay();
            let attempt = session.policy.attempts();
            let max_attempts = session.policy.config().max_attempts;
            self.inner.status.send_modify(|status| {
                status.state = ConnectionState::Disconnected;
                status.reconnect_attempts = attempt;
                status.exhausted = delay.is_none();
            });
            (delay, attempt, max_attempts)
        };

        let Some(delay) = delay else {
            tracing::warn!(
                endpoint = %self.inner.endpoint,
                max_attempts,
                "max reconnection attempts reached, live updates stopped"
            );
            return;
        };

        tracing::info!(
            endpoint = %self.inner.endpoint,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        let client = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            client.resume(generation);
        });
    }

    /// Fire a scheduled reconnect, unless the client was disconnected or
    /// reconnected by hand in the meantime.
    fn resume(&self, generation: u64) {
        let url = {
            let session = self.inner.session.lock();
            let state = self.inner.status.borrow().state;
            if session.generation != generation || state != ConnectionState::Disconnected {
                tracing::debug!("scheduled reconnect cancelled");
                return;
            }
            let Some(credential) = session.credential.as_deref() else {
                return;
            };
            match connect_url(&self.inner.endpoint, credential) {
                Ok(url) => url,
                Err(e) => {
                    tracing::error!(error = %e, "invalid live-update endpoint");
                    return;
                }
            }
        };
        self.inner
            .status
            .send_modify(|status| status.state = ConnectionState::Connecting);
        self.spawn_session(generation, url);
    }
}

impl std::fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveClient")
            .field("endpoint", &self.inner.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

/// Endpoint with the credential attached as the `token` query parameter.
fn connect_url(endpoint: &str, credential: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(endpoint)?;
    url.query_pairs_mut().append_pair("token", credential);
    Ok(url)
}
