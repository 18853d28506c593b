// libs/telemedicine-cell/src/services/mod.rs

pub mod consultation;
pub mod eligibility;
pub mod relay;
pub mod session_view;
pub mod signaling;
pub mod supervisor;
pub mod transport;

pub use consultation::ConsultationService;
pub use eligibility::{Clock, EligibilityEvaluator, FixedClock, SystemClock};
pub use relay::{RoomRelay, RELAY_BUFFER};
pub use session_view::TelemedicineSessionView;
pub use signaling::{ChannelState, HandlerToken, SignalingChannel};
pub use supervisor::{ReconnectPolicy, ReconnectSupervisor};
pub use transport::{EnvelopeSink, RealtimeTransport, RoomHub, SubscriptionId, TransportError};
