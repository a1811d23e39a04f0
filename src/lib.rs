//! Parley - voice chat core
//!
//! A microphone action starts speech recognition, the recognized text is
//! appended to the transcript, a response is generated and read back through
//! speech synthesis. The [`controller::VoiceTurnController`] sequences that
//! turn so that listening and speaking never overlap.

pub mod config;
pub mod console;
pub mod controller;
pub mod messages;
pub mod responder;
pub mod session;
pub mod speech;

use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub use config::ParleyConfig;
pub use controller::{ControlState, TurnEvent, TurnNotification, TurnState, VoiceTurnController};
pub use messages::{Message, Role, Transcript};
pub use session::{SessionHandle, VoiceSession};

/// Host capabilities the controller depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Speech-to-text
    Recognition,
    /// Text-to-speech
    Synthesis,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Recognition => write!(f, "speech recognition"),
            Capability::Synthesis => write!(f, "speech synthesis"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParleyError {
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(Capability),

    #[error("Capture error: {0}")]
    CaptureError(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("Response error: {0}")]
    ResponseError(String),

    #[error("Response timed out after {0:?}")]
    ResponseTimeout(Duration),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IOError(String),
}

impl From<std::io::Error> for ParleyError {
    fn from(e: std::io::Error) -> Self {
        ParleyError::IOError(e.to_string())
    }
}

impl ParleyError {
    /// Check if this error is recoverable
    ///
    /// Recoverable errors end the current turn only; the user may simply try
    /// again. The others disable a control or need a restart.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // The platform will not grow a capability mid-session
            ParleyError::UnsupportedCapability(_) => false,
            ParleyError::CaptureError(_) => true,
            ParleyError::SynthesisError(_) => true,
            ParleyError::ResponseError(_) => true,
            ParleyError::ResponseTimeout(_) => true,
            ParleyError::ChannelError(_) => false,
            ParleyError::ConfigError(_) => false,
            ParleyError::IOError(_) => false,
        }
    }

    /// Get a user-friendly description
    pub fn user_message(&self) -> String {
        match self {
            ParleyError::UnsupportedCapability(capability) => {
                format!("This device does not support {}.", capability)
            }
            ParleyError::CaptureError(_) => {
                "Speech recognition failed. Please try again.".to_string()
            }
            ParleyError::SynthesisError(_) => {
                "Playback failed. The response is shown as text.".to_string()
            }
            ParleyError::ResponseError(_) | ParleyError::ResponseTimeout(_) => {
                "No response could be generated. Please try again.".to_string()
            }
            ParleyError::ChannelError(_) => {
                "Internal communication error. Please restart the application.".to_string()
            }
            ParleyError::ConfigError(_) => {
                "Configuration error. Please check settings.".to_string()
            }
            ParleyError::IOError(_) => "File system error occurred.".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;
