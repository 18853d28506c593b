// libs/telemedicine-cell/src/services/signaling.rs
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::TelemedicineError;
use crate::models::{ChatMessage, EnvelopeKind, SignalEnvelope};
use crate::services::transport::{EnvelopeSink, RealtimeTransport, SubscriptionId};

pub type EnvelopeHandler = Arc<dyn Fn(&SignalEnvelope) + Send + Sync>;

/// Returned by `SignalingChannel::on`; pass it to `off` to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

pub fn validate_room_id(room_id: &str) -> Result<(), TelemedicineError> {
    static ROOM_ID: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = ROOM_ID.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").ok());

    let valid = pattern.as_ref().is_some_and(|regex| regex.is_match(room_id));

    if valid {
        Ok(())
    } else {
        Err(TelemedicineError::ValidationError(format!(
            "Invalid room id '{}': expected 1-128 characters of [A-Za-z0-9_-]",
            room_id
        )))
    }
}

#[derive(Default)]
struct HandlerRegistry {
    next_token: u64,
    handlers: Vec<(HandlerToken, EnvelopeKind, EnvelopeHandler)>,
}

impl HandlerRegistry {
    fn snapshot(&self, kind: EnvelopeKind) -> Vec<EnvelopeHandler> {
        self.handlers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, h)| Arc::clone(h))
            .collect()
    }
}

// Puts the link back to `Idle` if a `connect` future is dropped while subscribing.
struct PendingConnect<'a> {
    link: &'a Mutex<Link>,
}

impl PendingConnect<'_> {
    fn settle(self) {
        std::mem::forget(self);
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*link, Link::Connecting { .. }) {
            debug!("Connect abandoned while subscribing, back to idle");
            *link = Link::Idle;
        }
    }
}

enum Link {
    Idle,
    Connecting { room_id: String },
    Connected { room_id: String, subscription: SubscriptionId },
    Disconnected,
}

impl Link {
    fn state(&self) -> ChannelState {
        match self {
            Link::Idle => ChannelState::Idle,
            Link::Connecting { .. } => ChannelState::Connecting,
            Link::Connected { .. } => ChannelState::Connected,
            Link::Disconnected => ChannelState::Disconnected,
        }
    }
}

/// Bridges one room of a realtime transport to typed `signal` and `chat` streams.
///
/// Lifecycle is `Idle -> Connecting -> Connected -> Disconnected`. A failed or
/// timed-out subscribe returns the channel to `Idle`; `Disconnected` is terminal.
/// Envelopes reach only the handlers registered when they are delivered; nothing
/// is buffered for handlers registered later.
pub struct SignalingChannel {
    transport: Arc<dyn RealtimeTransport>,
    instance_id: Uuid,
    participant_id: String,
    connect_timeout: Duration,
    // Serializes connect/disconnect; never held by senders.
    lifecycle: tokio::sync::Mutex<()>,
    link: Mutex<Link>,
    closed: Arc<AtomicBool>,
    handlers: Arc<RwLock<HandlerRegistry>>,
}

impl fmt::Debug for SignalingChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingChannel")
            .field("instance_id", &self.instance_id)
            .field("participant_id", &self.participant_id)
            .field("state", &self.state())
            .field("room_id", &self.room_id())
            .finish()
    }
}

impl SignalingChannel {
    pub fn new(transport: Arc<dyn RealtimeTransport>, participant_id: impl Into<String>) -> Self {
        Self {
            transport,
            instance_id: Uuid::new_v4(),
            participant_id: participant_id.into(),
            connect_timeout: AppConfig::default().connect_timeout(),
            lifecycle: tokio::sync::Mutex::new(()),
            link: Mutex::new(Link::Idle),
            closed: Arc::new(AtomicBool::new(false)),
            handlers: Arc::new(RwLock::new(HandlerRegistry::default())),
        }
    }

    pub fn from_config(
        transport: Arc<dyn RealtimeTransport>,
        participant_id: impl Into<String>,
        config: &AppConfig,
    ) -> Self {
        Self::new(transport, participant_id).with_connect_timeout(config.connect_timeout())
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    /// Stamped on every outgoing envelope as its `origin`.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn state(&self) -> ChannelState {
        self.link.lock().unwrap_or_else(PoisonError::into_inner).state()
    }

    pub fn room_id(&self) -> Option<String> {
        match &*self.link.lock().unwrap_or_else(PoisonError::into_inner) {
            Link::Connecting { room_id } | Link::Connected { room_id, .. } => Some(room_id.clone()),
            Link::Idle | Link::Disconnected => None,
        }
    }

    fn set_link(&self, link: Link) {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = link;
    }

    // ==============================================================================
    // HANDLER REGISTRATION
    // ==============================================================================

    pub fn on<F>(&self, kind: EnvelopeKind, handler: F) -> HandlerToken
    where
        F: Fn(&SignalEnvelope) + Send + Sync + 'static,
    {
        let mut registry = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        registry.next_token += 1;
        let token = HandlerToken(registry.next_token);
        registry.handlers.push((token, kind, Arc::new(handler)));
        token
    }

    /// Registers a handler receiving the opaque payload of each `signal` envelope.
    pub fn on_signal<F>(&self, handler: F) -> HandlerToken
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.on(EnvelopeKind::Signal, move |envelope| handler(&envelope.payload))
    }

    /// Registers a handler receiving each decoded chat message.
    pub fn on_chat<F>(&self, handler: F) -> HandlerToken
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.on(EnvelopeKind::Chat, move |envelope| match envelope.chat_message() {
            Some(message) => handler(&message),
            None => warn!("Dropping chat envelope with malformed payload"),
        })
    }

    pub fn off(&self, token: HandlerToken) -> bool {
        let mut registry = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        let before = registry.handlers.len();
        registry.handlers.retain(|(t, _, _)| *t != token);
        registry.handlers.len() != before
    }

    pub fn handler_count(&self, kind: EnvelopeKind) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .count()
    }

    fn dispatch_sink(&self) -> EnvelopeSink {
        let handlers = Arc::clone(&self.handlers);
        let closed = Arc::clone(&self.closed);
        let own_id = self.instance_id;

        Arc::new(move |envelope: SignalEnvelope| {
            if closed.load(Ordering::Acquire) {
                return;
            }
            // The transport echoes our own broadcasts back to us.
            if envelope.origin == Some(own_id) {
                trace!("Ignoring self-originated {} envelope", envelope.kind);
                return;
            }

            let targets = handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot(envelope.kind);

            if targets.is_empty() {
                trace!("No {} handler registered, envelope dropped", envelope.kind);
            }
            for handler in targets {
                handler(&envelope);
            }
        })
    }

    // ==============================================================================
    // LIFECYCLE
    // ==============================================================================

    /// Subscribes to `room_id`. Calling it again for the same room is a no-op.
    #[instrument(skip(self), fields(participant = %self.participant_id))]
    pub async fn connect(&self, room_id: &str) -> Result<(), TelemedicineError> {
        validate_room_id(room_id)?;
        let _guard = self.lifecycle.lock().await;

        match &*self.link.lock().unwrap_or_else(PoisonError::into_inner) {
            Link::Connected { room_id: connected, .. } if connected == room_id => {
                debug!("Already connected to room {}", room_id);
                return Ok(());
            }
            Link::Connected { room_id: connected, .. } => {
                return Err(TelemedicineError::RoomMismatch {
                    connected: connected.clone(),
                    requested: room_id.to_string(),
                });
            }
            Link::Disconnected => return Err(TelemedicineError::ChannelClosed),
            Link::Idle | Link::Connecting { .. } => {}
        }

        self.set_link(Link::Connecting {
            room_id: room_id.to_string(),
        });
        let pending = PendingConnect { link: &self.link };

        let subscribe = self.transport.subscribe(room_id, self.dispatch_sink());
        let outcome = timeout(self.connect_timeout, subscribe).await;
        pending.settle();

        match outcome {
            Ok(Ok(subscription)) => {
                self.set_link(Link::Connected {
                    room_id: room_id.to_string(),
                    subscription,
                });
                info!("Connected to room {} (subscription {})", room_id, subscription);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_link(Link::Idle);
                warn!("Subscribe to room {} failed: {}", room_id, e);
                Err(TelemedicineError::SubscribeFailed {
                    room_id: room_id.to_string(),
                    message: e.to_string(),
                })
            }
            Err(_) => {
                self.set_link(Link::Idle);
                warn!(
                    "Subscribe to room {} timed out after {:?}",
                    room_id, self.connect_timeout
                );
                Err(TelemedicineError::ConnectTimeout {
                    room_id: room_id.to_string(),
                    timeout_secs: self.connect_timeout.as_secs(),
                })
            }
        }
    }

    /// Unsubscribes. No-op when never connected or already disconnected.
    #[instrument(skip(self), fields(participant = %self.participant_id))]
    pub async fn disconnect(&self) {
        let _guard = self.lifecycle.lock().await;

        let previous = {
            let mut link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
            match &*link {
                Link::Connected { .. } => std::mem::replace(&mut *link, Link::Disconnected),
                _ => {
                    debug!("Disconnect on a channel that is not connected, ignoring");
                    return;
                }
            }
        };

        self.closed.store(true, Ordering::Release);

        if let Link::Connected { room_id, subscription } = previous {
            if let Err(e) = self.transport.unsubscribe(subscription).await {
                warn!("Failed to unsubscribe {} from room {}: {}", subscription, room_id, e);
            }
            info!("Disconnected from room {}", room_id);
        }
    }

    // ==============================================================================
    // SENDING
    // ==============================================================================

    pub async fn send_signal(&self, payload: Value) -> Result<(), TelemedicineError> {
        self.send(SignalEnvelope::signal(payload)).await
    }

    pub async fn send_chat(&self, message: ChatMessage) -> Result<(), TelemedicineError> {
        self.ensure_open()?;
        let envelope = SignalEnvelope::chat(&message).map_err(|e| TelemedicineError::SendFailed {
            kind: EnvelopeKind::Chat,
            message: e.to_string(),
        })?;
        self.send(envelope).await
    }

    fn ensure_open(&self) -> Result<String, TelemedicineError> {
        match &*self.link.lock().unwrap_or_else(PoisonError::into_inner) {
            Link::Connected { room_id, .. } => Ok(room_id.clone()),
            _ => Err(TelemedicineError::ChannelClosed),
        }
    }

    async fn send(&self, envelope: SignalEnvelope) -> Result<(), TelemedicineError> {
        let room_id = self.ensure_open()?;
        let kind = envelope.kind;
        let envelope = envelope
            .with_sender(self.participant_id.clone())
            .with_origin(self.instance_id);

        self.transport
            .broadcast(&room_id, envelope)
            .await
            .map_err(|e| {
                warn!("Broadcast of {} envelope to room {} failed: {}", kind, room_id, e);
                TelemedicineError::SendFailed {
                    kind,
                    message: e.to_string(),
                }
            })
    }
}
