// libs/telemedicine-cell/src/services/transport.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::models::SignalEnvelope;

/// Receives every envelope broadcast to the room a subscription is bound to.
pub type EnvelopeSink = Arc<dyn Fn(SignalEnvelope) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Room {room_id} is full ({limit} subscribers)")]
    RoomFull { room_id: String, limit: usize },

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Unknown subscription {0}")]
    UnknownSubscription(SubscriptionId),
}

/// Named-channel publish/subscribe primitive the signaling adapter runs on.
///
/// Fan-out is transport-defined; `RoomHub` delivers to every subscription of the
/// room, the sender's own included.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe(
        &self,
        room_id: &str,
        sink: EnvelopeSink,
    ) -> Result<SubscriptionId, TransportError>;

    async fn broadcast(&self, room_id: &str, envelope: SignalEnvelope)
        -> Result<(), TransportError>;

    async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError>;
}

struct Subscriber {
    id: SubscriptionId,
    sink: EnvelopeSink,
}

#[derive(Default)]
struct HubState {
    rooms: HashMap<String, Vec<Subscriber>>,
    index: HashMap<SubscriptionId, String>,
}

/// In-process realtime transport shared by every room relay of the server.
pub struct RoomHub {
    state: Arc<RwLock<HubState>>,
    max_subscribers_per_room: usize,
}

impl RoomHub {
    pub fn new(max_subscribers_per_room: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(HubState::default())),
            max_subscribers_per_room,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.realtime_max_subscribers_per_room)
    }

    pub async fn active_rooms(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.rooms.keys().cloned().collect()
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn subscriber_count(&self, room_id: &str) -> usize {
        let state = self.state.read().await;
        state.rooms.get(room_id).map_or(0, Vec::len)
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new(AppConfig::default().realtime_max_subscribers_per_room)
    }
}

impl Clone for RoomHub {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            max_subscribers_per_room: self.max_subscribers_per_room,
        }
    }
}

#[async_trait]
impl RealtimeTransport for RoomHub {
    async fn subscribe(
        &self,
        room_id: &str,
        sink: EnvelopeSink,
    ) -> Result<SubscriptionId, TransportError> {
        let mut state = self.state.write().await;

        let occupied = state.rooms.get(room_id).map_or(0, Vec::len);
        if occupied >= self.max_subscribers_per_room {
            return Err(TransportError::RoomFull {
                room_id: room_id.to_string(),
                limit: self.max_subscribers_per_room,
            });
        }

        let id = SubscriptionId::new();
        state
            .rooms
            .entry(room_id.to_string())
            .or_default()
            .push(Subscriber { id, sink });
        state.index.insert(id, room_id.to_string());

        debug!("Subscription {} joined room {} ({} subscribers)", id, room_id, occupied + 1);
        Ok(id)
    }

    async fn broadcast(
        &self,
        room_id: &str,
        envelope: SignalEnvelope,
    ) -> Result<(), TransportError> {
        // Sinks run outside the lock so a handler may touch the hub again.
        let sinks: Vec<EnvelopeSink> = {
            let state = self.state.read().await;
            state
                .rooms
                .get(room_id)
                .map(|subs| subs.iter().map(|s| Arc::clone(&s.sink)).collect())
                .unwrap_or_default()
        };

        debug!(
            "Broadcasting {} envelope to {} subscribers of room {}",
            envelope.kind,
            sinks.len(),
            room_id
        );

        for sink in sinks {
            sink(envelope.clone());
        }

        Ok(())
    }

    async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError> {
        let mut state = self.state.write().await;

        let room_id = state
            .index
            .remove(&subscription)
            .ok_or(TransportError::UnknownSubscription(subscription))?;

        let now_empty = match state.rooms.get_mut(&room_id) {
            Some(subs) => {
                subs.retain(|s| s.id != subscription);
                subs.is_empty()
            }
            None => false,
        };

        if now_empty {
            state.rooms.remove(&room_id);
            debug!("Room {} has no subscribers left, removed", room_id);
        }

        debug!("Subscription {} left room {}", subscription, room_id);
        Ok(())
    }
}
