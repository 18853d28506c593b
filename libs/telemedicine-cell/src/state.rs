// libs/telemedicine-cell/src/state.rs
use std::sync::Arc;

use shared_config::AppConfig;
use shared_models::auth::User;

use crate::services::{
    Clock, ConsultationService, RealtimeTransport, RoomHub, SignalingChannel, SystemClock,
    TelemedicineSessionView,
};

/// Shared by every handler of the cell.
#[derive(Clone)]
pub struct TelemedicineState {
    pub config: Arc<AppConfig>,
    pub hub: Arc<RoomHub>,
    pub consultations: Arc<ConsultationService>,
    pub clock: Arc<dyn Clock>,
}

impl TelemedicineState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            hub: Arc::new(RoomHub::from_config(&config)),
            consultations: Arc::new(ConsultationService::new(&config)),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn transport(&self) -> Arc<dyn RealtimeTransport> {
        self.hub.clone()
    }

    pub fn session_view_for(&self, user: &User) -> TelemedicineSessionView {
        TelemedicineSessionView::new(user.id.clone(), self.transport(), Arc::clone(&self.clock))
            .with_connect_timeout(self.config.connect_timeout())
    }

    pub fn channel_for(&self, user: &User) -> SignalingChannel {
        SignalingChannel::from_config(self.transport(), user.id.clone(), &self.config)
    }
}
