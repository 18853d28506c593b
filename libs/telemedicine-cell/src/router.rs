// libs/telemedicine-cell/src/router.rs
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::*;
use crate::state::TelemedicineState;

pub fn telemedicine_routes(state: TelemedicineState) -> Router {
    // Public routes. The room socket authenticates from its query string.
    let public_routes = Router::new()
        .route("/health", get(telemedicine_health_check))
        .route("/rooms/{room_id}/ws", get(room_socket));

    let protected_routes = Router::new()
        .route("/consultations", get(list_consultations).post(create_consultation))
        .route(
            "/consultations/{consultation_id}/eligibility",
            get(get_consultation_eligibility),
        )
        .route("/consultations/{consultation_id}/start", post(start_consultation))
        .route(
            "/consultations/{consultation_id}/status",
            patch(update_consultation_status),
        )
        .layer(middleware::from_fn_with_state(
            state.config.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
