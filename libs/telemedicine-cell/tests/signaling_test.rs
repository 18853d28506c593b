use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use mockall::mock;
use serde_json::{json, Value};

use telemedicine_cell::models::{ChatMessage, EnvelopeKind, SignalEnvelope};
use telemedicine_cell::services::{
    ChannelState, EnvelopeSink, RealtimeTransport, RoomHub, SignalingChannel, SubscriptionId,
    TransportError,
};
use telemedicine_cell::TelemedicineError;

mock! {
    pub Transport {}

    #[async_trait]
    impl RealtimeTransport for Transport {
        async fn subscribe(&self, room_id: &str, sink: EnvelopeSink) -> Result<SubscriptionId, TransportError>;
        async fn broadcast(&self, room_id: &str, envelope: SignalEnvelope) -> Result<(), TransportError>;
        async fn unsubscribe(&self, subscription: SubscriptionId) -> Result<(), TransportError>;
    }
}

/// Never completes a subscribe.
struct StallingTransport;

#[async_trait]
impl RealtimeTransport for StallingTransport {
    async fn subscribe(&self, _: &str, _: EnvelopeSink) -> Result<SubscriptionId, TransportError> {
        std::future::pending().await
    }

    async fn broadcast(&self, _: &str, _: SignalEnvelope) -> Result<(), TransportError> {
        Ok(())
    }

    async fn unsubscribe(&self, _: SubscriptionId) -> Result<(), TransportError> {
        Ok(())
    }
}

fn collect_signals(channel: &SignalingChannel) -> Arc<Mutex<Vec<Value>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    channel.on_signal(move |payload| sink.lock().unwrap().push(payload.clone()));
    received
}

fn connected_mock() -> MockTransport {
    let mut transport = MockTransport::new();
    transport
        .expect_subscribe()
        .times(1)
        .returning(|_, _| Ok(SubscriptionId::new()));
    transport
}

#[tokio::test]
async fn test_late_handler_does_not_see_earlier_envelopes() {
    let hub = Arc::new(RoomHub::new(4));
    let doctor = SignalingChannel::new(hub.clone(), "doctor-1");
    let patient = SignalingChannel::new(hub.clone(), "patient-1");

    doctor.connect("room-a").await.unwrap();
    patient.connect("room-a").await.unwrap();

    doctor.send_signal(json!({ "type": "offer", "sdp": "v=0" })).await.unwrap();

    let received = collect_signals(&patient);
    assert!(received.lock().unwrap().is_empty());

    doctor.send_signal(json!({ "type": "candidate" })).await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["type"], "candidate");
}

#[tokio::test]
async fn test_own_envelopes_are_not_dispatched_back() {
    let hub = Arc::new(RoomHub::new(4));
    let doctor = SignalingChannel::new(hub.clone(), "doctor-1");
    let patient = SignalingChannel::new(hub.clone(), "patient-1");

    let doctor_seen = collect_signals(&doctor);
    let patient_seen = collect_signals(&patient);

    doctor.connect("room-a").await.unwrap();
    patient.connect("room-a").await.unwrap();

    doctor.send_signal(json!({ "type": "offer" })).await.unwrap();

    assert!(doctor_seen.lock().unwrap().is_empty());
    assert_eq!(patient_seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_same_participant_on_two_devices_hears_both() {
    let hub = Arc::new(RoomHub::new(4));
    let laptop = SignalingChannel::new(hub.clone(), "doctor-1");
    let phone = SignalingChannel::new(hub.clone(), "doctor-1");
    assert_ne!(laptop.instance_id(), phone.instance_id());

    laptop.connect("room-a").await.unwrap();
    phone.connect("room-a").await.unwrap();

    let on_laptop = collect_signals(&laptop);
    let on_phone = collect_signals(&phone);

    laptop.send_signal(json!({ "type": "offer" })).await.unwrap();
    phone.send_signal(json!({ "type": "answer" })).await.unwrap();

    let on_phone = on_phone.lock().unwrap();
    assert_eq!(on_phone.len(), 1);
    assert_eq!(on_phone[0]["type"], "offer");

    let on_laptop = on_laptop.lock().unwrap();
    assert_eq!(on_laptop.len(), 1);
    assert_eq!(on_laptop[0]["type"], "answer");
}

#[tokio::test]
async fn test_chat_and_signal_streams_are_separate() {
    let hub = Arc::new(RoomHub::new(4));
    let doctor = SignalingChannel::new(hub.clone(), "doctor-1");
    let patient = SignalingChannel::new(hub.clone(), "patient-1");

    let chats = Arc::new(Mutex::new(Vec::new()));
    let chat_sink = Arc::clone(&chats);
    patient.on_chat(move |message| chat_sink.lock().unwrap().push(message.clone()));
    let signals = collect_signals(&patient);

    doctor.connect("room-a").await.unwrap();
    patient.connect("room-a").await.unwrap();

    doctor
        .send_chat(ChatMessage::from_sender("Can you hear me?", "Dr. Lee"))
        .await
        .unwrap();

    assert!(signals.lock().unwrap().is_empty());
    let chats = chats.lock().unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].text, "Can you hear me?");
    assert_eq!(chats[0].sender_name.as_deref(), Some("Dr. Lee"));
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let hub = Arc::new(RoomHub::new(4));
    let sender = SignalingChannel::new(hub.clone(), "doctor-1");
    let elsewhere = SignalingChannel::new(hub.clone(), "patient-2");
    let seen = collect_signals(&elsewhere);

    sender.connect("room-a").await.unwrap();
    elsewhere.connect("room-b").await.unwrap();

    sender.send_signal(json!({})).await.unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_send_after_disconnect_fails_without_transport_call() {
    let mut transport = connected_mock();
    transport.expect_unsubscribe().times(1).returning(|_| Ok(()));
    transport.expect_broadcast().times(0);

    let channel = SignalingChannel::new(Arc::new(transport), "doctor-1");
    channel.connect("room-a").await.unwrap();
    channel.disconnect().await;

    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert_matches!(
        channel.send_signal(json!({ "type": "offer" })).await,
        Err(TelemedicineError::ChannelClosed)
    );
    assert_matches!(
        channel.send_chat(ChatMessage::new("hello")).await,
        Err(TelemedicineError::ChannelClosed)
    );

    // Repeated disconnects are no-ops; reconnecting needs a new channel.
    channel.disconnect().await;
    assert_matches!(channel.connect("room-a").await, Err(TelemedicineError::ChannelClosed));
}

#[tokio::test]
async fn test_send_before_connect_fails() {
    let mut transport = MockTransport::new();
    transport.expect_broadcast().times(0);
    transport.expect_unsubscribe().times(0);

    let channel = SignalingChannel::new(Arc::new(transport), "doctor-1");
    assert_eq!(channel.state(), ChannelState::Idle);
    assert_matches!(channel.send_signal(json!({})).await, Err(TelemedicineError::ChannelClosed));

    channel.disconnect().await;
    assert_eq!(channel.state(), ChannelState::Idle);
}

#[tokio::test]
async fn test_broadcast_failure_surfaces_as_send_failed() {
    let mut transport = connected_mock();
    transport
        .expect_broadcast()
        .times(1)
        .returning(|_, _| Err(TransportError::Unavailable("socket reset".to_string())));

    let channel = SignalingChannel::new(Arc::new(transport), "doctor-1");
    channel.connect("room-a").await.unwrap();

    let err = channel.send_signal(json!({})).await.unwrap_err();
    assert_matches!(err, TelemedicineError::SendFailed { kind: EnvelopeKind::Signal, .. });
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[tokio::test]
async fn test_outgoing_envelopes_carry_sender() {
    let mut transport = connected_mock();
    transport
        .expect_broadcast()
        .times(1)
        .withf(|_, envelope| {
            envelope.kind == EnvelopeKind::Chat
                && envelope.sender_id.as_deref() == Some("patient-1")
                && envelope.origin.is_some()
        })
        .returning(|_, _| Ok(()));

    let channel = SignalingChannel::new(Arc::new(transport), "patient-1");
    channel.connect("room-a").await.unwrap();
    channel.send_chat(ChatMessage::new("hi")).await.unwrap();
}

#[tokio::test]
async fn test_refused_subscribe_returns_to_idle() {
    let hub = Arc::new(RoomHub::new(1));
    let occupant = SignalingChannel::new(hub.clone(), "doctor-1");
    occupant.connect("room-a").await.unwrap();

    let channel = SignalingChannel::new(hub.clone(), "patient-1");
    let err = channel.connect("room-a").await.unwrap_err();

    assert_matches!(err, TelemedicineError::SubscribeFailed { ref room_id, .. } if room_id == "room-a");
    assert!(err.is_retryable());
    assert_eq!(channel.state(), ChannelState::Idle);
    assert_eq!(channel.room_id(), None);

    occupant.disconnect().await;
    channel.connect("room-a").await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);
}

#[tokio::test]
async fn test_connect_times_out() {
    let channel = SignalingChannel::new(Arc::new(StallingTransport), "doctor-1")
        .with_connect_timeout(Duration::from_millis(50));

    assert_matches!(
        channel.connect("room-a").await,
        Err(TelemedicineError::ConnectTimeout { .. })
    );
    assert_eq!(channel.state(), ChannelState::Idle);
}

#[tokio::test]
async fn test_abandoned_connect_returns_to_idle() {
    let channel = SignalingChannel::new(Arc::new(StallingTransport), "doctor-1")
        .with_connect_timeout(Duration::from_secs(60));

    let abandoned = tokio::time::timeout(Duration::from_millis(20), channel.connect("room-a")).await;

    assert!(abandoned.is_err());
    assert_eq!(channel.state(), ChannelState::Idle);
    assert_eq!(channel.room_id(), None);
}

#[tokio::test]
async fn test_connect_is_idempotent_per_room() {
    let hub = Arc::new(RoomHub::new(4));
    let channel = SignalingChannel::new(hub.clone(), "doctor-1");

    channel.connect("room-a").await.unwrap();
    channel.connect("room-a").await.unwrap();
    assert_eq!(hub.subscriber_count("room-a").await, 1);

    assert_matches!(
        channel.connect("room-b").await,
        Err(TelemedicineError::RoomMismatch { .. })
    );
    assert_eq!(channel.room_id().as_deref(), Some("room-a"));
}

#[tokio::test]
async fn test_concurrent_connects_share_one_subscription() {
    let hub = Arc::new(RoomHub::new(4));
    let channel = SignalingChannel::new(hub.clone(), "doctor-1");

    let (first, second) = tokio::join!(channel.connect("room-a"), channel.connect("room-a"));
    assert!(first.is_ok());
    assert!(second.is_ok());
    assert_eq!(hub.subscriber_count("room-a").await, 1);
}

#[tokio::test]
async fn test_invalid_room_id_is_rejected_before_subscribing() {
    let mut transport = MockTransport::new();
    transport.expect_subscribe().times(0);

    let channel = SignalingChannel::new(Arc::new(transport), "doctor-1");
    assert_matches!(
        channel.connect("room a/b").await,
        Err(TelemedicineError::ValidationError(_))
    );
    assert_eq!(channel.state(), ChannelState::Idle);
}

#[tokio::test]
async fn test_handlers_accumulate_and_can_be_removed() {
    let hub = Arc::new(RoomHub::new(4));
    let doctor = SignalingChannel::new(hub.clone(), "doctor-1");
    let patient = SignalingChannel::new(hub.clone(), "patient-1");

    let first = Arc::new(Mutex::new(0));
    let second = Arc::new(Mutex::new(0));
    let (f, s) = (Arc::clone(&first), Arc::clone(&second));
    let token = patient.on(EnvelopeKind::Signal, move |_| *f.lock().unwrap() += 1);
    patient.on(EnvelopeKind::Signal, move |_| *s.lock().unwrap() += 1);
    assert_eq!(patient.handler_count(EnvelopeKind::Signal), 2);

    doctor.connect("room-a").await.unwrap();
    patient.connect("room-a").await.unwrap();

    doctor.send_signal(json!({})).await.unwrap();
    assert!(patient.off(token));
    assert!(!patient.off(token));
    doctor.send_signal(json!({})).await.unwrap();

    assert_eq!(*first.lock().unwrap(), 1);
    assert_eq!(*second.lock().unwrap(), 2);
    assert_eq!(patient.handler_count(EnvelopeKind::Signal), 1);
}

#[tokio::test]
async fn test_disconnect_releases_room() {
    let hub = Arc::new(RoomHub::new(4));
    let channel = SignalingChannel::new(hub.clone(), "doctor-1");

    channel.connect("room-a").await.unwrap();
    assert_eq!(hub.room_count().await, 1);

    channel.disconnect().await;
    assert_eq!(hub.room_count().await, 0);
    assert!(hub.active_rooms().await.is_empty());
}
