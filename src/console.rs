//! Terminal stand-ins for the host speech capabilities
//!
//! Typed lines play the role of recognized speech, and "speaking" prints the
//! reply and waits roughly as long as reading it aloud would take.

use crate::controller::{EventSink, SessionId, TurnEvent, UtteranceId};
use crate::speech::{
    select_voice, RecognitionConfig, SpeechOptions, SpeechRecognizer, SpeechSynthesizer,
};
use crate::{ParleyError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Commands understood by the terminal front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// `:mic` - toggle listening
    Mic,
    /// `:hush` - stop speaking
    Hush,
    /// `:reset` - clear the conversation
    Reset,
    /// `:quit`
    Quit,
    /// Anything else is heard as speech
    Speech(String),
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            ":mic" | ":m" => ConsoleCommand::Mic,
            ":hush" | ":h" => ConsoleCommand::Hush,
            ":reset" => ConsoleCommand::Reset,
            ":quit" | ":q" => ConsoleCommand::Quit,
            text => ConsoleCommand::Speech(text.to_string()),
        }
    }
}

type ActiveSession = Arc<Mutex<Option<(SessionId, EventSink)>>>;

/// Recognizer fed by typed lines
pub struct ConsoleRecognizer {
    active: ActiveSession,
}

/// Feeding side of a [`ConsoleRecognizer`]
#[derive(Clone)]
pub struct ConsoleFeed {
    active: ActiveSession,
}

impl ConsoleRecognizer {
    pub fn new() -> (Self, ConsoleFeed) {
        let active: ActiveSession = Arc::new(Mutex::new(None));
        (
            Self {
                active: active.clone(),
            },
            ConsoleFeed { active },
        )
    }
}

impl ConsoleFeed {
    /// Deliver a heard line to the active session
    ///
    /// Returns false when no session is listening.
    pub fn deliver(&self, text: &str) -> Result<bool> {
        let Some((session, sink)) = self.active.lock().take() else {
            return Ok(false);
        };
        sink.post(TurnEvent::TranscriptReady {
            session,
            text: text.to_string(),
        })?;
        sink.post(TurnEvent::ListeningEnded { session })?;
        Ok(true)
    }

    pub fn is_listening(&self) -> bool {
        self.active.lock().is_some()
    }
}

impl SpeechRecognizer for ConsoleRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(
        &mut self,
        session: SessionId,
        config: &RecognitionConfig,
        sink: &EventSink,
    ) -> Result<()> {
        debug!("Console listening ({}, {})", session, config.locale);
        *self.active.lock() = Some((session, sink.clone()));
        Ok(())
    }

    fn stop(&mut self) {
        self.active.lock().take();
    }
}

/// Synthesizer that prints replies and simulates playback time
pub struct ConsoleSynthesizer {
    /// Utterance allowed to report completion; 0 when none
    current: Arc<AtomicU64>,
    words_per_minute: f32,
    voices: Vec<String>,
}

impl ConsoleSynthesizer {
    pub fn new(words_per_minute: f32) -> Self {
        Self {
            current: Arc::new(AtomicU64::new(0)),
            words_per_minute,
            voices: vec!["Console Default".to_string(), "Console Narrator".to_string()],
        }
    }

    /// Playback time for `text` at `rate`
    pub fn duration_for(&self, text: &str, rate: f32) -> Duration {
        let words = text.split_whitespace().count() as f32;
        let per_minute = (self.words_per_minute * rate).max(1.0);
        Duration::from_secs_f32(words * 60.0 / per_minute)
    }
}

impl Default for ConsoleSynthesizer {
    fn default() -> Self {
        Self::new(180.0)
    }
}

impl SpeechSynthesizer for ConsoleSynthesizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<String> {
        self.voices.clone()
    }

    fn speak(
        &mut self,
        utterance: UtteranceId,
        text: &str,
        options: &SpeechOptions,
        sink: &EventSink,
    ) -> Result<()> {
        let options = options.normalized();
        let voice = match &options.voice {
            Some(query) => select_voice(&self.voices, query).unwrap_or("Console Default"),
            None => "Console Default",
        };

        // Replaces whatever was playing
        self.current.store(utterance.value(), Ordering::SeqCst);
        println!("assistant ({})> {}", voice, text);

        let duration = self.duration_for(text, options.rate);
        let current = Arc::clone(&self.current);
        let sink = sink.clone();
        thread::Builder::new()
            .name("parley-console-speech".to_string())
            .spawn(move || {
                thread::sleep(duration);
                if current
                    .compare_exchange(utterance.value(), 0, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    if let Err(e) = sink.post(TurnEvent::SpeechEnded { utterance }) {
                        warn!("Could not report end of {}: {}", utterance, e);
                    }
                }
            })
            .map_err(|e| ParleyError::SynthesisError(e.to_string()))?;

        Ok(())
    }

    fn stop(&mut self) {
        self.current.store(0, Ordering::SeqCst);
    }
}
