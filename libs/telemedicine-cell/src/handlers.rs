// libs/telemedicine-cell/src/handlers.rs
use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Utc;
use futures::StreamExt;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::jwt::validate_token;

use crate::models::{
    Consultation, ConsultationListResponse, ConsultationTab, CreateConsultationRequest,
    EligibilityReport, LiveSessionRoute, UpdateStatusRequest,
};
use crate::services::signaling::validate_room_id;
use crate::services::{EligibilityEvaluator, RoomRelay};
use crate::state::TelemedicineState;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct ListConsultationsQuery {
    pub tab: Option<ConsultationTab>,
}

#[derive(Debug, Deserialize)]
pub struct RoomSocketQuery {
    pub token: Option<String>,
}

fn verify_access(consultation: &Consultation, user: &User) -> Result<(), AppError> {
    if consultation.involves(&user.id) || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Auth("Not authorized for this consultation".to_string()))
    }
}

// ==============================================================================
// HEALTH
// ==============================================================================

pub async fn telemedicine_health_check(
    State(state): State<TelemedicineState>,
) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "telemedicine-cell",
        "backend_configured": state.config.is_configured(),
        "active_rooms": state.hub.room_count().await,
        "timestamp": Utc::now().to_rfc3339()
    }))
}

// ==============================================================================
// CONSULTATION HANDLERS
// ==============================================================================

/// Upcoming and past consultation cards for the caller.
#[axum::debug_handler]
pub async fn list_consultations(
    State(state): State<TelemedicineState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ListConsultationsQuery>,
) -> Result<Json<ConsultationListResponse>, AppError> {
    let mut view = state.session_view_for(&user);
    view.refresh(&state.consultations, auth.token()).await?;

    if let Some(tab) = query.tab {
        view.select_tab(tab);
    }

    Ok(Json(ConsultationListResponse {
        selected_tab: view.selected_tab(),
        upcoming: view.cards_for(ConsultationTab::Upcoming),
        past: view.cards_for(ConsultationTab::Past),
    }))
}

#[axum::debug_handler]
pub async fn create_consultation(
    State(state): State<TelemedicineState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateConsultationRequest>,
) -> Result<(StatusCode, Json<Consultation>), AppError> {
    let books_for_self = request.doctor_id == user.id || request.patient_id == user.id;
    if !books_for_self && !user.is_admin() {
        return Err(AppError::Auth(
            "Consultations can only be booked by one of their participants".to_string(),
        ));
    }

    let consultation = state.consultations.create(request, auth.token()).await?;

    Ok((StatusCode::CREATED, Json(consultation)))
}

#[axum::debug_handler]
pub async fn get_consultation_eligibility(
    State(state): State<TelemedicineState>,
    Path(consultation_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<EligibilityReport>, AppError> {
    let consultation = state.consultations.get(consultation_id, auth.token()).await?;
    verify_access(&consultation, &user)?;

    let evaluator = EligibilityEvaluator::from_clock(state.clock.as_ref());
    Ok(Json(evaluator.report(&consultation)))
}

/// Resolves the live session route for one of the caller's consultations.
#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<TelemedicineState>,
    Path(consultation_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<LiveSessionRoute>, AppError> {
    let mut view = state.session_view_for(&user);
    view.refresh(&state.consultations, auth.token()).await?;

    let route = view.start_session(consultation_id)?;
    Ok(Json(route))
}

#[axum::debug_handler]
pub async fn update_consultation_status(
    State(state): State<TelemedicineState>,
    Path(consultation_id): Path<Uuid>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Consultation>, AppError> {
    let token = auth.token();

    let consultation = state.consultations.get(consultation_id, token).await?;
    verify_access(&consultation, &user)?;

    let updated = state
        .consultations
        .update_status(consultation_id, request.status, request.summary, token)
        .await?;

    Ok(Json(updated))
}

// ==============================================================================
// ROOM RELAY
// ==============================================================================

/// Upgrades to a WebSocket bound to one consultation's signaling room.
///
/// Room ids have the form `consultation_<uuid>`; only that consultation's
/// participants (or an admin) may join. Browsers cannot set headers on a
/// WebSocket handshake, so the bearer token travels in the `token` query
/// parameter.
pub async fn room_socket(
    State(state): State<TelemedicineState>,
    Path(room_id): Path<String>,
    Query(query): Query<RoomSocketQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, AppError> {
    validate_room_id(&room_id)?;
    let consultation_id = Consultation::id_from_room(&room_id).ok_or_else(|| {
        AppError::ValidationError(format!("Room '{}' does not name a consultation", room_id))
    })?;

    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Auth("Missing token".to_string()))?;
    let user = validate_token(&token, &state.config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    let consultation = state.consultations.get(consultation_id, &token).await?;
    verify_access(&consultation, &user)?;

    let ws = ws.map_err(|e| AppError::BadRequest(e.to_string()))?;

    info!("User {} opening relay for room {}", user.id, room_id);
    let relay = RoomRelay::new(state.channel_for(&user), user.display_name());
    Ok(ws
        .on_upgrade(move |socket| {
            let (outbound, inbound) = socket.split();
            relay.run(room_id, outbound, inbound)
        })
        .into_response())
}
