//! Turn sequencing: listen -> process -> speak

pub mod events;
pub mod state;
pub mod turn;

pub use events::{EventSink, RequestId, SessionId, TurnEvent, TurnNotification, UtteranceId};
pub use state::{ControlState, EndReason, SharedTurnState, TurnSnapshot, TurnState};
pub use turn::VoiceTurnController;
