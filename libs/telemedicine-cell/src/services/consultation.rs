// libs/telemedicine-cell/src/services/consultation.rs
use std::sync::Arc;

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::error::TelemedicineError;
use crate::models::{Consultation, ConsultationStatus, CreateConsultationRequest};

pub const MIN_DURATION_MINUTES: i32 = 5;
pub const MAX_DURATION_MINUTES: i32 = 240;

/// Consultation records in the hosted backend.
pub struct ConsultationService {
    supabase: Arc<SupabaseClient>,
}

impl ConsultationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: Arc::new(SupabaseClient::new(config)),
        }
    }

    pub fn with_client(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Every consultation where `participant_id` is the doctor or the patient,
    /// earliest first.
    #[instrument(skip(self, auth_token))]
    pub async fn list_for_participant(
        &self,
        participant_id: &str,
        auth_token: &str,
    ) -> Result<Vec<Consultation>, TelemedicineError> {
        validate_participant_id(participant_id)?;

        let path = format!(
            "/rest/v1/consultations?or=(patient_id.eq.{id},doctor_id.eq.{id})&order=scheduled_date.asc,scheduled_time.asc",
            id = participant_id
        );

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?;

        debug!("Fetched {} consultations for participant {}", rows.len(), participant_id);
        parse_rows(rows)
    }

    #[instrument(skip(self, auth_token))]
    pub async fn get(
        &self,
        consultation_id: Uuid,
        auth_token: &str,
    ) -> Result<Consultation, TelemedicineError> {
        let path = format!("/rest/v1/consultations?id=eq.{}", consultation_id);

        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?;

        parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(TelemedicineError::ConsultationNotFound(consultation_id))
    }

    #[instrument(skip(self, request, auth_token), fields(doctor = %request.doctor_id, patient = %request.patient_id))]
    pub async fn create(
        &self,
        request: CreateConsultationRequest,
        auth_token: &str,
    ) -> Result<Consultation, TelemedicineError> {
        validate_create_request(&request)?;

        let body = json!({
            "doctor_id": request.doctor_id,
            "patient_id": request.patient_id,
            "scheduled_date": request.scheduled_date,
            "scheduled_time": request.scheduled_time,
            "duration_minutes": request.duration_minutes,
            "status": ConsultationStatus::Scheduled,
            "notes": request.notes,
            "is_now": false,
        });

        let rows: Vec<Value> = self
            .supabase
            .request(Method::POST, "/rest/v1/consultations", Some(auth_token), Some(body))
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?;

        let consultation = parse_rows(rows)?.into_iter().next().ok_or_else(|| {
            TelemedicineError::DatabaseError("Backend returned no row for created consultation".to_string())
        })?;

        info!(
            "Created consultation {} on {} at {}",
            consultation.id, consultation.scheduled_date, consultation.scheduled_time
        );
        Ok(consultation)
    }

    #[instrument(skip(self, summary, auth_token))]
    pub async fn update_status(
        &self,
        consultation_id: Uuid,
        status: ConsultationStatus,
        summary: Option<String>,
        auth_token: &str,
    ) -> Result<Consultation, TelemedicineError> {
        let current = self.get(consultation_id, auth_token).await?;
        validate_status_transition(current.status, status)?;

        let mut body = json!({
            "status": status,
            "updated_at": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(summary) = summary {
            body["summary"] = json!(summary);
        }

        let path = format!("/rest/v1/consultations?id=eq.{}", consultation_id);
        let rows: Vec<Value> = self
            .supabase
            .request(Method::PATCH, &path, Some(auth_token), Some(body))
            .await
            .map_err(|e| TelemedicineError::DatabaseError(e.to_string()))?;

        let updated = parse_rows(rows)?
            .into_iter()
            .next()
            .ok_or(TelemedicineError::ConsultationNotFound(consultation_id))?;

        info!(
            "Consultation {} moved from {} to {}",
            consultation_id, current.status, updated.status
        );
        Ok(updated)
    }
}

pub fn validate_status_transition(
    from: ConsultationStatus,
    to: ConsultationStatus,
) -> Result<(), TelemedicineError> {
    if from.valid_transitions().contains(&to) {
        Ok(())
    } else {
        warn!("Rejected consultation status transition {} -> {}", from, to);
        Err(TelemedicineError::InvalidStatusTransition { from, to })
    }
}

pub fn validate_create_request(request: &CreateConsultationRequest) -> Result<(), TelemedicineError> {
    if request.doctor_id.trim().is_empty() || request.patient_id.trim().is_empty() {
        return Err(TelemedicineError::ValidationError(
            "Both doctor_id and patient_id are required".to_string(),
        ));
    }

    validate_participant_id(&request.doctor_id)?;
    validate_participant_id(&request.patient_id)?;

    if request.doctor_id == request.patient_id {
        return Err(TelemedicineError::ValidationError(
            "Doctor and patient must be different participants".to_string(),
        ));
    }

    if !(MIN_DURATION_MINUTES..=MAX_DURATION_MINUTES).contains(&request.duration_minutes) {
        return Err(TelemedicineError::ValidationError(format!(
            "Duration must be between {} and {} minutes",
            MIN_DURATION_MINUTES, MAX_DURATION_MINUTES
        )));
    }

    Ok(())
}

// Ids are interpolated into the PostgREST filter, so keep them to a safe alphabet.
fn validate_participant_id(participant_id: &str) -> Result<(), TelemedicineError> {
    let valid = !participant_id.is_empty()
        && participant_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(TelemedicineError::ValidationError(format!(
            "Invalid participant id '{}'",
            participant_id
        )))
    }
}

fn parse_rows(rows: Vec<Value>) -> Result<Vec<Consultation>, TelemedicineError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|e| {
                TelemedicineError::DatabaseError(format!("Failed to parse consultation: {}", e))
            })
        })
        .collect()
}
