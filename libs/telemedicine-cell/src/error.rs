use thiserror::Error;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{ConsultationStatus, EnvelopeKind};

#[derive(Error, Debug)]
pub enum TelemedicineError {
    #[error("Channel is closed")]
    ChannelClosed,

    #[error("Failed to subscribe to room {room_id}: {message}")]
    SubscribeFailed { room_id: String, message: String },

    #[error("Failed to send {kind} envelope: {message}")]
    SendFailed { kind: EnvelopeKind, message: String },

    #[error("Consultation not found: {0}")]
    ConsultationNotFound(Uuid),

    #[error("Connecting to room {room_id} timed out after {timeout_secs} seconds")]
    ConnectTimeout { room_id: String, timeout_secs: u64 },

    #[error("Channel is bound to room {connected}, cannot connect to {requested}")]
    RoomMismatch { connected: String, requested: String },

    #[error("Invalid consultation status transition from {from} to {to}")]
    InvalidStatusTransition {
        from: ConsultationStatus,
        to: ConsultationStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl TelemedicineError {
    /// Transient transport failures a caller may retry on the same channel.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TelemedicineError::SubscribeFailed { .. } | TelemedicineError::ConnectTimeout { .. }
        )
    }
}

impl From<TelemedicineError> for AppError {
    fn from(err: TelemedicineError) -> Self {
        match err {
            TelemedicineError::ConsultationNotFound(id) => {
                AppError::NotFound(format!("Consultation {} not found", id))
            }
            TelemedicineError::ValidationError(message) => AppError::ValidationError(message),
            TelemedicineError::InvalidStatusTransition { .. }
            | TelemedicineError::ChannelClosed
            | TelemedicineError::RoomMismatch { .. } => AppError::Conflict(err.to_string()),
            TelemedicineError::SubscribeFailed { .. } | TelemedicineError::SendFailed { .. } => {
                AppError::Transport(err.to_string())
            }
            TelemedicineError::ConnectTimeout { .. } => AppError::Timeout(err.to_string()),
            TelemedicineError::DatabaseError(message) => AppError::Database(message),
            TelemedicineError::SerializationError(e) => AppError::BadRequest(e.to_string()),
        }
    }
}
