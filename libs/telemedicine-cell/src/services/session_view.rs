// libs/telemedicine-cell/src/services/session_view.rs
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::TelemedicineError;
use crate::models::{
    Consultation, ConsultationCard, ConsultationStatus, ConsultationTab, LiveSessionRoute,
    Notice, ReturnLocation,
};
use crate::services::consultation::ConsultationService;
use crate::services::eligibility::{Clock, EligibilityEvaluator};
use crate::services::signaling::SignalingChannel;
use crate::services::transport::RealtimeTransport;

/// Control logic behind the telemedicine screen of one signed-in participant.
///
/// Owns the participant's consultation lists and, while the screen is open,
/// exactly one `SignalingChannel`.
pub struct TelemedicineSessionView {
    participant_id: String,
    transport: Arc<dyn RealtimeTransport>,
    clock: Arc<dyn Clock>,
    connect_timeout: Duration,
    upcoming: Vec<Consultation>,
    past: Vec<Consultation>,
    cancelled: Vec<Consultation>,
    selected_tab: ConsultationTab,
    channel: Option<SignalingChannel>,
    notices: Vec<Notice>,
}

impl TelemedicineSessionView {
    pub fn new(
        participant_id: impl Into<String>,
        transport: Arc<dyn RealtimeTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            transport,
            clock,
            connect_timeout: AppConfig::default().connect_timeout(),
            upcoming: Vec::new(),
            past: Vec::new(),
            cancelled: Vec::new(),
            selected_tab: ConsultationTab::default(),
            channel: None,
            notices: Vec::new(),
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    // ==============================================================================
    // LISTS
    // ==============================================================================

    /// Replaces the held lists. Scheduled go to `upcoming`, completed to `past`;
    /// cancelled are kept aside and shown in neither.
    pub fn load(&mut self, consultations: Vec<Consultation>) {
        let mut upcoming = Vec::new();
        let mut past = Vec::new();
        let mut cancelled = Vec::new();

        for consultation in consultations {
            match consultation.status {
                ConsultationStatus::Scheduled => upcoming.push(consultation),
                ConsultationStatus::Completed => past.push(consultation),
                ConsultationStatus::Cancelled => cancelled.push(consultation),
            }
        }

        upcoming.sort_by_key(Consultation::scheduled_at);
        past.sort_by_key(|c| std::cmp::Reverse(c.scheduled_at()));

        debug!(
            "Loaded {} upcoming, {} past, {} cancelled consultations",
            upcoming.len(),
            past.len(),
            cancelled.len()
        );

        self.upcoming = upcoming;
        self.past = past;
        self.cancelled = cancelled;
    }

    /// Reloads from the backend. On failure the held lists stay as they were.
    pub async fn refresh(
        &mut self,
        service: &ConsultationService,
        auth_token: &str,
    ) -> Result<(), TelemedicineError> {
        match service
            .list_for_participant(&self.participant_id, auth_token)
            .await
        {
            Ok(consultations) => {
                self.load(consultations);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load consultations for {}: {}", self.participant_id, e);
                self.notices
                    .push(Notice::error("Could not load your consultations. Please try again."));
                Err(e)
            }
        }
    }

    pub fn upcoming(&self) -> &[Consultation] {
        &self.upcoming
    }

    pub fn past(&self) -> &[Consultation] {
        &self.past
    }

    pub fn cancelled(&self) -> &[Consultation] {
        &self.cancelled
    }

    pub fn selected_tab(&self) -> ConsultationTab {
        self.selected_tab
    }

    pub fn select_tab(&mut self, tab: ConsultationTab) {
        self.selected_tab = tab;
    }

    pub fn displayed(&self) -> &[Consultation] {
        self.list(self.selected_tab)
    }

    fn list(&self, tab: ConsultationTab) -> &[Consultation] {
        match tab {
            ConsultationTab::Upcoming => &self.upcoming,
            ConsultationTab::Past => &self.past,
        }
    }

    pub fn find(&self, consultation_id: Uuid) -> Option<&Consultation> {
        self.upcoming
            .iter()
            .chain(self.past.iter())
            .find(|c| c.id == consultation_id)
    }

    // ==============================================================================
    // ELIGIBILITY
    // ==============================================================================

    pub fn evaluator(&self) -> EligibilityEvaluator {
        EligibilityEvaluator::from_clock(self.clock.as_ref())
    }

    pub fn is_joinable(&self, consultation: &Consultation) -> bool {
        self.evaluator().is_joinable(consultation)
    }

    /// Cards for the selected tab.
    pub fn cards(&self) -> Vec<ConsultationCard> {
        self.cards_for(self.selected_tab)
    }

    pub fn cards_for(&self, tab: ConsultationTab) -> Vec<ConsultationCard> {
        let evaluator = self.evaluator();

        self.list(tab)
            .iter()
            .map(|consultation| ConsultationCard {
                joinable: evaluator.is_joinable(consultation),
                relative_time: evaluator
                    .format_relative(consultation.scheduled_date, consultation.scheduled_time),
                consultation: consultation.clone(),
            })
            .collect()
    }

    /// Route handed to the live session screen. Fails without changing state when
    /// the consultation is not one of the held ones.
    pub fn start_session(
        &mut self,
        consultation_id: Uuid,
    ) -> Result<LiveSessionRoute, TelemedicineError> {
        let Some(consultation) = self.find(consultation_id) else {
            warn!("Start requested for unknown consultation {}", consultation_id);
            self.notices
                .push(Notice::error("This consultation is no longer available."));
            return Err(TelemedicineError::ConsultationNotFound(consultation_id));
        };

        info!("Starting live session for consultation {}", consultation_id);
        Ok(LiveSessionRoute {
            consultation_id,
            room_id: consultation.room_id(),
            return_to: ReturnLocation::Telemedicine,
        })
    }

    // ==============================================================================
    // SIGNALING
    // ==============================================================================

    /// Opens the view's signaling channel for `room_id`. Entering the room the
    /// view is already in is a no-op.
    pub async fn enter(&mut self, room_id: &str) -> Result<&SignalingChannel, TelemedicineError> {
        if let Some(current) = self.channel.as_ref().and_then(SignalingChannel::room_id) {
            if current != room_id {
                return Err(TelemedicineError::RoomMismatch {
                    connected: current,
                    requested: room_id.to_string(),
                });
            }
        }

        let channel = match self.channel.take() {
            Some(channel) => channel,
            None => SignalingChannel::new(Arc::clone(&self.transport), self.participant_id.clone())
                .with_connect_timeout(self.connect_timeout),
        };

        if let Err(e) = channel.connect(room_id).await {
            warn!("Could not enter room {}: {}", room_id, e);
            self.notices
                .push(Notice::error("Could not connect to the consultation room."));
            return Err(e);
        }

        Ok(self.channel.insert(channel))
    }

    pub fn channel(&self) -> Option<&SignalingChannel> {
        self.channel.as_ref()
    }

    /// Disconnects and drops the channel. Safe to call when never entered.
    pub async fn leave(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.disconnect().await;
            self.notices.push(Notice::info("You left the consultation room."));
        }
    }

    // ==============================================================================
    // NOTICES
    // ==============================================================================

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
