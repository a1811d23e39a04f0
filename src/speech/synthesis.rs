//! Text-to-speech capability seam

use crate::controller::{EventSink, UtteranceId};
use crate::Result;
use serde::Deserialize;

const DEFAULT_RATE: f32 = 1.0;
const DEFAULT_PITCH: f32 = 1.0;
const DEFAULT_VOLUME: f32 = 1.0;

/// Per-utterance playback settings
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct SpeechOptions {
    /// Substring of the voice name to use (case-insensitive)
    pub voice: Option<String>,

    /// Speaking rate (1.0 = normal)
    pub rate: f32,

    /// Pitch (1.0 = normal)
    pub pitch: f32,

    /// Volume (0.0 to 1.0)
    pub volume: f32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            voice: None,
            rate: DEFAULT_RATE,
            pitch: DEFAULT_PITCH,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl SpeechOptions {
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    /// Replace unset values with the defaults
    ///
    /// Hosts treat zero as "not given", so zero, negative and non-finite
    /// values fall back to 1.0.
    pub fn normalized(&self) -> Self {
        fn or_default(value: f32, default: f32) -> f32 {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                default
            }
        }

        Self {
            voice: self.voice.clone().filter(|v| !v.trim().is_empty()),
            rate: or_default(self.rate, DEFAULT_RATE),
            pitch: or_default(self.pitch, DEFAULT_PITCH),
            volume: or_default(self.volume, DEFAULT_VOLUME),
        }
    }
}

/// First voice whose name contains `query`, ignoring case
pub fn select_voice<'a>(voices: &'a [String], query: &str) -> Option<&'a str> {
    let query = query.to_lowercase();
    voices
        .iter()
        .find(|name| name.to_lowercase().contains(&query))
        .map(String::as_str)
}

/// Platform speech synthesizer
///
/// At most one utterance is active: `speak` cancels whatever is playing
/// before starting. Each utterance ends with exactly one `SpeechEnded` or
/// `SpeechFailed` posted through `sink`, except after `stop`, which
/// guarantees nothing.
pub trait SpeechSynthesizer: Send {
    /// Whether the host provides speech synthesis at all
    fn is_supported(&self) -> bool;

    /// Names of the installed voices
    fn voices(&self) -> Vec<String> {
        Vec::new()
    }

    fn speak(
        &mut self,
        utterance: UtteranceId,
        text: &str,
        options: &SpeechOptions,
        sink: &EventSink,
    ) -> Result<()>;

    /// Cancel the in-flight utterance immediately
    fn stop(&mut self);
}
