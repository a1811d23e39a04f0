//! Controller inputs and outputs
//!
//! Every user action and every capability callback is a [`TurnEvent`]
//! delivered through one channel, so the controller sees a single ordered
//! stream.

use crate::controller::state::{ControlState, EndReason, TurnState};
use crate::messages::Message;
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::fmt;

macro_rules! turn_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub fn new(value: u64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

turn_id!(
    /// One recognition session
    SessionId,
    "session"
);
turn_id!(
    /// One response generation request
    RequestId,
    "request"
);
turn_id!(
    /// One synthesized utterance
    UtteranceId,
    "utterance"
);

/// Everything the controller reacts to
#[derive(Clone, Debug, PartialEq)]
pub enum TurnEvent {
    // User actions
    /// Microphone pressed while not listening
    StartListening,
    /// Microphone pressed while listening
    StopListening,
    /// Microphone button without caring about the current state
    ToggleListening,
    /// Cut off the assistant's speech
    StopSpeaking,
    /// Speaker button; only acts while speaking
    ToggleSpeaking,
    /// Clear the transcript and return to idle
    Reset,
    /// Stop everything and end the event loop
    Shutdown,

    // Recognition callbacks
    TranscriptReady { session: SessionId, text: String },
    ListeningEnded { session: SessionId },
    RecognitionFailed { session: SessionId, reason: String },
    /// Posted by the session loop when the listen deadline passes
    ListenTimedOut { session: SessionId },

    // Response generation callbacks
    ResponseReady { request: RequestId, text: String },
    ResponseFailed { request: RequestId, error: ParleyError },

    // Synthesis callbacks
    SpeechEnded { utterance: UtteranceId },
    SpeechFailed { utterance: UtteranceId, reason: String },
}

impl TurnEvent {
    /// Whether the event comes from the user rather than a capability
    pub fn is_user_action(&self) -> bool {
        matches!(
            self,
            TurnEvent::StartListening
                | TurnEvent::StopListening
                | TurnEvent::ToggleListening
                | TurnEvent::StopSpeaking
                | TurnEvent::ToggleSpeaking
                | TurnEvent::Reset
                | TurnEvent::Shutdown
        )
    }
}

/// Observable effects of a transition
#[derive(Clone, Debug, PartialEq)]
pub enum TurnNotification {
    StateChanged { from: TurnState, to: TurnState },
    MessageAdded(Message),
    ListeningEnded(EndReason),
    ControlsChanged(ControlState),
    Error(ParleyError),
}

/// Cloneable handle for posting events to the controller
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Sender<TurnEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<TurnEvent>) -> Self {
        Self { tx }
    }

    /// Create a bounded event channel
    pub fn channel(capacity: usize) -> (Self, Receiver<TurnEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self::new(tx), rx)
    }

    pub fn post(&self, event: TurnEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|e| ParleyError::ChannelError(format!("Failed to post event: {}", e)))
    }

    /// Post without blocking; fails when the queue is full
    pub fn try_post(&self, event: TurnEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => ParleyError::ChannelError("Event queue is full".to_string()),
            TrySendError::Disconnected(_) => {
                ParleyError::ChannelError("Event loop has stopped".to_string())
            }
        })
    }
}
