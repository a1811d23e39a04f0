//! Speech-to-text capability seam
//!
//! The host platform owns the microphone stream and end-of-utterance
//! detection. The controller only starts and stops single-utterance
//! sessions and consumes the events a session posts back.

use crate::controller::{EventSink, SessionId};
use crate::Result;
use serde::Deserialize;
use std::time::Duration;

/// Settings applied to every recognition session
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// BCP 47 language tag
    pub locale: String,

    /// Keep capturing after the first utterance
    pub continuous: bool,

    /// Deliver partial hypotheses before the final transcript
    pub interim_results: bool,

    /// Give up on a session that produced nothing after this long
    pub max_listen_ms: Option<u64>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            continuous: false,
            interim_results: false,
            max_listen_ms: None,
        }
    }
}

impl RecognitionConfig {
    pub fn max_listen(&self) -> Option<Duration> {
        self.max_listen_ms.map(Duration::from_millis)
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    pub fn with_max_listen(mut self, limit: Duration) -> Self {
        self.max_listen_ms = Some(limit.as_millis() as u64);
        self
    }
}

/// Platform speech recognizer
///
/// `start` begins a session tagged with `session`. The implementation later
/// posts `TranscriptReady`, `ListeningEnded` or `RecognitionFailed` for that
/// session through `sink`.
pub trait SpeechRecognizer: Send {
    /// Whether the host provides speech recognition at all
    fn is_supported(&self) -> bool;

    fn start(&mut self, session: SessionId, config: &RecognitionConfig, sink: &EventSink)
        -> Result<()>;

    /// Cancel the active session; safe to call when none is active
    fn stop(&mut self);
}

/// Failure reasons reported by recognition hosts
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    LanguageNotSupported,
    Other(String),
}

impl RecognitionErrorKind {
    pub fn parse(reason: &str) -> Self {
        match reason.trim().to_ascii_lowercase().as_str() {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        }
    }

    /// Retrying cannot help: permission denied or service unavailable
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::NotAllowed | Self::ServiceNotAllowed | Self::LanguageNotSupported
        )
    }
}
