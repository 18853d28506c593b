// libs/telemedicine-cell/src/lib.rs
//! # Telemedicine Cell
//!
//! Signaling and scheduling logic behind live doctor/patient consultations.
//!
//! ## Features
//!
//! - **Signaling Channel**: typed `signal` and `chat` streams over one room of a
//!   realtime publish/subscribe transport
//! - **Eligibility**: clock-injected join-window rules (15 minutes early to 30
//!   minutes late, plus the `is_now` override)
//! - **Session View**: upcoming/past lists, tab selection and session start
//! - **Room Relay**: WebSocket endpoint bridging browsers onto the in-process `RoomHub`
//! - **Reconnect Supervisor**: bounded, jittered retries of a failed connect
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Telemedicine Cell                   |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  HTTP and WebSocket handlers     |
//! |  router.rs       |  Route definitions               |
//! |  state.rs        |  Shared handler state            |
//! |  models.rs       |  Data structures & DTOs          |
//! |  error.rs        |  Cell error taxonomy             |
//! |  services/       |  Business logic layer            |
//! |    transport.rs  |  RealtimeTransport + RoomHub     |
//! |    signaling.rs  |  SignalingChannel adapter        |
//! |    relay.rs      |  Socket <-> channel pump         |
//! |    eligibility.rs|  Join-window evaluator           |
//! |    session_view.rs| Telemedicine screen control     |
//! |    consultation.rs| Backend consultation records    |
//! |    supervisor.rs |  Reconnect with backoff          |
//! +-----------------------------------------------------+
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /telemedicine/health` - Health check
//! - `GET /telemedicine/consultations` - Upcoming and past cards for the caller
//! - `POST /telemedicine/consultations` - Book a consultation
//! - `GET /telemedicine/consultations/{id}/eligibility` - Join-window report
//! - `POST /telemedicine/consultations/{id}/start` - Live session route
//! - `PATCH /telemedicine/consultations/{id}/status` - Complete or cancel
//! - `GET /telemedicine/rooms/consultation_{id}/ws?token=...` - Signaling relay (participants only)
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use telemedicine_cell::services::{RoomHub, SignalingChannel};
//!
//! # async fn example() -> Result<(), telemedicine_cell::TelemedicineError> {
//! let hub = Arc::new(RoomHub::new(16));
//! let channel = SignalingChannel::new(hub, "participant-1");
//!
//! channel.on_chat(|message| println!("chat: {}", message.text));
//! channel.connect("consultation-room").await?;
//! channel.send_signal(serde_json::json!({ "type": "offer" })).await?;
//! channel.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use error::TelemedicineError;
pub use models::{
    ChatMessage, Consultation, ConsultationStatus, ConsultationTab, EnvelopeKind,
    LiveSessionRoute, SignalEnvelope,
};

pub use services::{
    ConsultationService, EligibilityEvaluator, ReconnectSupervisor, RoomHub, SignalingChannel,
    TelemedicineSessionView,
};

pub use router::telemedicine_routes;
pub use state::TelemedicineState;
