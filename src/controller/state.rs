//! Turn state and the snapshots front-ends read
//!
//! A single [`TurnState`] value replaces separate listening/speaking/
//! processing flags, so two of them can never be active at once.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Phase of the current conversational turn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnState {
    /// Waiting for the user
    #[default]
    Idle,
    /// Recognition session running
    Listening,
    /// Waiting for the response generator
    Processing,
    /// Assistant reply being played
    Speaking,
}

impl TurnState {
    pub fn is_idle(&self) -> bool {
        matches!(self, TurnState::Idle)
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, TurnState::Listening)
    }

    pub fn is_processing(&self) -> bool {
        matches!(self, TurnState::Processing)
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self, TurnState::Speaking)
    }

    /// Status line shown under the controls
    pub fn status_text(&self) -> &'static str {
        match self {
            TurnState::Idle => "Tap to speak",
            TurnState::Listening => "Listening...",
            TurnState::Processing => "Processing...",
            TurnState::Speaking => "Speaking...",
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "Idle"),
            TurnState::Listening => write!(f, "Listening"),
            TurnState::Processing => write!(f, "Processing"),
            TurnState::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Why a recognition session ended without a transcript
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndReason {
    /// The user stopped listening
    Cancelled,
    /// The recognizer finished without hearing anything
    NoSpeech,
    /// The listen deadline passed
    TimedOut,
    /// The recognizer reported an error
    Failed,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::Cancelled => write!(f, "cancelled"),
            EndReason::NoSpeech => write!(f, "no speech"),
            EndReason::TimedOut => write!(f, "timed out"),
            EndReason::Failed => write!(f, "failed"),
        }
    }
}

/// Which controls a front-end should enable
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControlState {
    /// Microphone button usable
    pub mic_enabled: bool,
    /// Speaker button usable (only while speaking)
    pub speaker_enabled: bool,
    pub status: &'static str,
}

/// Point-in-time view of the controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnSnapshot {
    pub state: TurnState,
    pub controls: ControlState,
    pub message_count: usize,
}

impl Default for TurnSnapshot {
    fn default() -> Self {
        Self {
            state: TurnState::Idle,
            controls: ControlState {
                mic_enabled: false,
                speaker_enabled: false,
                status: TurnState::Idle.status_text(),
            },
            message_count: 0,
        }
    }
}

/// Thread-safe shared snapshot, written by the session loop
#[derive(Clone, Default)]
pub struct SharedTurnState {
    inner: Arc<RwLock<TurnSnapshot>>,
}

impl SharedTurnState {
    pub fn new(snapshot: TurnSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.inner.read().clone()
    }

    pub fn set(&self, snapshot: TurnSnapshot) {
        *self.inner.write() = snapshot;
    }

    pub fn state(&self) -> TurnState {
        self.inner.read().state
    }

    pub fn is_listening(&self) -> bool {
        self.inner.read().state.is_listening()
    }

    pub fn is_speaking(&self) -> bool {
        self.inner.read().state.is_speaking()
    }

    pub fn is_idle(&self) -> bool {
        self.inner.read().state.is_idle()
    }
}
