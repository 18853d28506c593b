// libs/telemedicine-cell/src/services/relay.rs
use std::fmt;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::json;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::{ChatMessage, ClientFrame, EnvelopeKind, SignalEnvelope};
use crate::services::signaling::SignalingChannel;

/// Envelopes held for a socket that is not keeping up. Further ones are dropped.
pub const RELAY_BUFFER: usize = 64;

/// Pumps one participant's socket frames into a signaling channel and the
/// room's envelopes back out to the socket.
pub struct RoomRelay {
    channel: SignalingChannel,
    envelopes: mpsc::Receiver<SignalEnvelope>,
    sender_name: String,
}

impl RoomRelay {
    pub fn new(channel: SignalingChannel, sender_name: impl Into<String>) -> Self {
        Self::with_capacity(channel, sender_name, RELAY_BUFFER)
    }

    pub fn with_capacity(
        channel: SignalingChannel,
        sender_name: impl Into<String>,
        capacity: usize,
    ) -> Self {
        let (envelope_tx, envelopes) = mpsc::channel(capacity);

        for kind in [EnvelopeKind::Signal, EnvelopeKind::Chat] {
            let tx = envelope_tx.clone();
            channel.on(kind, move |envelope| match tx.try_send(envelope.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(dropped)) => {
                    warn!("Relay queue full, dropping {} envelope", dropped.kind);
                }
                Err(TrySendError::Closed(_)) => {}
            });
        }

        Self {
            channel,
            envelopes,
            sender_name: sender_name.into(),
        }
    }

    pub fn channel(&self) -> &SignalingChannel {
        &self.channel
    }

    /// Joins `room_id` and relays until the socket closes or the outbound side
    /// fails, then leaves the room.
    pub async fn run<S, R, E>(mut self, room_id: String, mut outbound: S, mut inbound: R)
    where
        S: Sink<Message> + Unpin,
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        if let Err(e) = self.channel.connect(&room_id).await {
            warn!(
                "Relay for {} could not join room {}: {}",
                self.channel.participant_id(),
                room_id,
                e
            );
            let frame = json!({ "type": "error", "message": e.to_string() }).to_string();
            let _ = outbound.send(Message::Text(frame.into())).await;
            let _ = outbound.send(Message::Close(None)).await;
            return;
        }

        loop {
            tokio::select! {
                delivered = self.envelopes.recv() => {
                    let Some(envelope) = delivered else { break };
                    match serde_json::to_string(&envelope) {
                        Ok(json) => {
                            if outbound.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to serialize envelope: {}", e),
                    }
                }

                frame = inbound.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => self.forward(text.as_str()).await,
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            debug!("WebSocket receive error: {}", e);
                            break;
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        self.channel.disconnect().await;
        debug!(
            "Relay for {} in room {} closed",
            self.channel.participant_id(),
            room_id
        );
    }

    async fn forward(&self, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Ignoring malformed client frame: {}", e);
                return;
            }
        };

        let result = match frame {
            ClientFrame::Signal { payload } => self.channel.send_signal(payload).await,
            ClientFrame::Chat { text } => {
                self.channel
                    .send_chat(ChatMessage::from_sender(text, self.sender_name.as_str()))
                    .await
            }
        };

        if let Err(e) = result {
            warn!("Failed to forward client frame: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::RoomHub;
    use futures::channel::mpsc as socket;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    const ROOM: &str = "consultation_6f1c2a4e-8a55-4b8e-9a8e-1f0f6b1f9c11";

    type Inbound = socket::UnboundedSender<Result<Message, String>>;
    type Outbound = socket::UnboundedReceiver<Message>;

    fn spawn_relay(
        hub: &Arc<RoomHub>,
        participant: &str,
        name: &str,
    ) -> (Inbound, Outbound, tokio::task::JoinHandle<()>) {
        let (in_tx, in_rx) = socket::unbounded();
        let (out_tx, out_rx) = socket::unbounded();
        let relay = RoomRelay::new(SignalingChannel::new(hub.clone(), participant), name);
        let task = tokio::spawn(relay.run(ROOM.to_string(), out_tx, in_rx));
        (in_tx, out_rx, task)
    }

    async fn wait_for_subscribers(hub: &RoomHub, expected: usize) {
        for _ in 0..100 {
            if hub.subscriber_count(ROOM).await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room never reached {} subscribers", expected);
    }

    async fn next_json(outbound: &mut Outbound) -> Value {
        let message = tokio::time::timeout(Duration::from_secs(1), outbound.next())
            .await
            .unwrap()
            .unwrap();
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_frame_reaches_other_participant() {
        let hub = Arc::new(RoomHub::new(4));
        let (_patient_in, mut patient_out, _patient) = spawn_relay(&hub, "patient-1", "Sam");
        wait_for_subscribers(&hub, 1).await;
        let (doctor_in, _doctor_out, _doctor) = spawn_relay(&hub, "doctor-1", "Dr. Lee");
        wait_for_subscribers(&hub, 2).await;

        doctor_in
            .unbounded_send(Ok(Message::Text(
                json!({ "type": "chat", "text": "hello" }).to_string().into(),
            )))
            .unwrap();

        let envelope = next_json(&mut patient_out).await;
        assert_eq!(envelope["kind"], "chat");
        assert_eq!(envelope["sender_id"], "doctor-1");
        assert_eq!(envelope["payload"]["text"], "hello");
        assert_eq!(envelope["payload"]["sender_name"], "Dr. Lee");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_ignored() {
        let hub = Arc::new(RoomHub::new(4));
        let (_patient_in, mut patient_out, _patient) = spawn_relay(&hub, "patient-1", "Sam");
        wait_for_subscribers(&hub, 1).await;
        let (doctor_in, _doctor_out, _doctor) = spawn_relay(&hub, "doctor-1", "Dr. Lee");
        wait_for_subscribers(&hub, 2).await;

        doctor_in
            .unbounded_send(Ok(Message::Text("{not json".into())))
            .unwrap();
        doctor_in
            .unbounded_send(Ok(Message::Text(
                json!({ "type": "signal", "payload": { "type": "offer" } }).to_string().into(),
            )))
            .unwrap();

        let envelope = next_json(&mut patient_out).await;
        assert_eq!(envelope["kind"], "signal");
        assert_eq!(envelope["payload"]["type"], "offer");
    }

    #[tokio::test]
    async fn test_closed_socket_leaves_room() {
        let hub = Arc::new(RoomHub::new(4));
        let (doctor_in, _doctor_out, doctor) = spawn_relay(&hub, "doctor-1", "Dr. Lee");
        wait_for_subscribers(&hub, 1).await;

        drop(doctor_in);

        tokio::time::timeout(Duration::from_secs(1), doctor)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hub.subscriber_count(ROOM).await, 0);
    }

    #[tokio::test]
    async fn test_failed_join_sends_error_and_close() {
        let hub = Arc::new(RoomHub::new(1));
        let occupant = SignalingChannel::new(hub.clone(), "doctor-1");
        occupant.connect(ROOM).await.unwrap();

        let (_patient_in, mut patient_out, patient) = spawn_relay(&hub, "patient-1", "Sam");
        patient.await.unwrap();

        let error = next_json(&mut patient_out).await;
        assert_eq!(error["type"], "error");
        assert!(matches!(patient_out.next().await, Some(Message::Close(None))));
        assert_eq!(hub.subscriber_count(ROOM).await, 1);
    }

    #[tokio::test]
    async fn test_slow_socket_queue_is_capped() {
        let hub = Arc::new(RoomHub::new(4));
        let mut relay =
            RoomRelay::with_capacity(SignalingChannel::new(hub.clone(), "patient-1"), "Sam", 3);
        relay.channel().connect(ROOM).await.unwrap();

        let doctor = SignalingChannel::new(hub.clone(), "doctor-1");
        doctor.connect(ROOM).await.unwrap();
        for n in 0..10 {
            doctor.send_signal(json!({ "n": n })).await.unwrap();
        }

        let mut queued = Vec::new();
        while let Ok(envelope) = relay.envelopes.try_recv() {
            queued.push(envelope.payload["n"].clone());
        }
        assert_eq!(queued, vec![json!(0), json!(1), json!(2)]);
    }
}
