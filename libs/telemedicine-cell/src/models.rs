// libs/telemedicine-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CONSULTATION MODELS
// ==============================================================================

const ROOM_PREFIX: &str = "consultation_";

/// A booked telemedicine consultation as stored by the hosted backend.
///
/// `scheduled_date` and `scheduled_time` are local wall-clock values; the record
/// carries no timezone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Consultation {
    pub id: Uuid,
    pub doctor_id: String,
    pub patient_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: ConsultationStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Manual override: joinable immediately regardless of the time window.
    #[serde(default)]
    pub is_now: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Consultation {
    pub fn scheduled_at(&self) -> NaiveDateTime {
        self.scheduled_date.and_time(self.scheduled_time)
    }

    /// Realtime room both participants join for this consultation.
    pub fn room_id(&self) -> String {
        format!("{}{}", ROOM_PREFIX, self.id)
    }

    /// Inverse of `room_id`. `None` for rooms not named after a consultation.
    pub fn id_from_room(room_id: &str) -> Option<Uuid> {
        room_id
            .strip_prefix(ROOM_PREFIX)
            .and_then(|id| Uuid::parse_str(id).ok())
    }

    /// True when `participant_id` is the doctor or the patient of this consultation.
    pub fn involves(&self, participant_id: &str) -> bool {
        self.doctor_id == participant_id || self.patient_id == participant_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl ConsultationStatus {
    pub fn valid_transitions(&self) -> &'static [ConsultationStatus] {
        match self {
            ConsultationStatus::Scheduled => {
                &[ConsultationStatus::Completed, ConsultationStatus::Cancelled]
            }
            // Terminal states
            ConsultationStatus::Completed | ConsultationStatus::Cancelled => &[],
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

impl fmt::Display for ConsultationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsultationStatus::Scheduled => write!(f, "scheduled"),
            ConsultationStatus::Completed => write!(f, "completed"),
            ConsultationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// SIGNALING MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeKind {
    Signal,
    Chat,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeKind::Signal => write!(f, "signal"),
            EnvelopeKind::Chat => write!(f, "chat"),
        }
    }
}

/// Tagged unit exchanged over a room channel. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalEnvelope {
    pub kind: EnvelopeKind,
    /// Opaque media-layer negotiation data for `signal`, a `ChatMessage` for `chat`.
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    /// Channel instance that broadcast the envelope. One participant may hold
    /// several channels in a room (two devices, a reconnect).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Uuid>,
    pub sent_at: DateTime<Utc>,
}

impl SignalEnvelope {
    pub fn new(kind: EnvelopeKind, payload: Value) -> Self {
        Self {
            kind,
            payload,
            sender_id: None,
            origin: None,
            sent_at: Utc::now(),
        }
    }

    pub fn signal(payload: Value) -> Self {
        Self::new(EnvelopeKind::Signal, payload)
    }

    pub fn chat(message: &ChatMessage) -> Result<Self, serde_json::Error> {
        Ok(Self::new(EnvelopeKind::Chat, serde_json::to_value(message)?))
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>) -> Self {
        self.sender_id = Some(sender_id.into());
        self
    }

    pub fn with_origin(mut self, origin: Uuid) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Decodes the payload of a `chat` envelope.
    pub fn chat_message(&self) -> Option<ChatMessage> {
        if self.kind != EnvelopeKind::Chat {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_name: None,
        }
    }

    pub fn from_sender(text: impl Into<String>, sender_name: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_name: Some(sender_name.into()),
        }
    }
}

/// Frames a relay client sends over the room WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Signal { payload: Value },
    Chat { text: String },
}

// ==============================================================================
// SESSION VIEW MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationTab {
    #[default]
    Upcoming,
    Past,
}

/// Where the live session screen sends the user back to when it closes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReturnLocation {
    Telemedicine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveSessionRoute {
    pub consultation_id: Uuid,
    /// Signaling room the live session screen joins.
    pub room_id: String,
    pub return_to: ReturnLocation,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConsultationCard {
    pub consultation: Consultation,
    pub joinable: bool,
    pub relative_time: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EligibilityReport {
    pub consultation_id: Uuid,
    pub is_today: bool,
    pub minutes_until: i64,
    pub can_join: bool,
    pub is_now: bool,
    pub joinable: bool,
    pub relative_time: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Non-fatal, user-visible message (toast).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

// ==============================================================================
// API REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConsultationRequest {
    pub doctor_id: String,
    pub patient_id: String,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: NaiveTime,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ConsultationStatus,
    pub summary: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConsultationListResponse {
    pub selected_tab: ConsultationTab,
    pub upcoming: Vec<ConsultationCard>,
    pub past: Vec<ConsultationCard>,
}
