use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use shared_config::AppConfig;
use telemedicine_cell::router::telemedicine_routes;
use telemedicine_cell::state::TelemedicineState;

pub fn create_router(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Telemedicine API is running!" }))
        .nest("/telemedicine", telemedicine_routes(TelemedicineState::new(config)))
}
