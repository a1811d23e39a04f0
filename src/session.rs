//! Voice chat session: the controller's event loop
//!
//! The session wires the pieces together:
//! - capabilities and the response pipeline post events into one channel
//! - a dedicated thread feeds those events to the controller in order
//! - front-ends send user actions and read state through [`SessionHandle`]

use crate::config::ParleyConfig;
use crate::controller::{
    ControlState, EventSink, SessionId, SharedTurnState, TurnEvent, TurnNotification,
    TurnSnapshot, TurnState, VoiceTurnController,
};
use crate::messages::Transcript;
use crate::responder::{PlaceholderResponder, ResponseGenerator, ResponsePipeline};
use crate::speech::{SpeechRecognizer, SpeechSynthesizer};
use crate::{ParleyError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Handle for driving the session from a front-end or a test
#[derive(Clone)]
pub struct SessionHandle {
    sink: EventSink,
    notification_rx: Receiver<TurnNotification>,
    state: SharedTurnState,
    transcript: Transcript,
}

impl SessionHandle {
    pub fn send(&self, event: TurnEvent) -> Result<()> {
        self.sink.post(event)
    }

    /// Microphone button
    pub fn toggle_listening(&self) -> Result<()> {
        self.send(TurnEvent::ToggleListening)
    }

    pub fn start_listening(&self) -> Result<()> {
        self.send(TurnEvent::StartListening)
    }

    pub fn stop_listening(&self) -> Result<()> {
        self.send(TurnEvent::StopListening)
    }

    /// Speaker button
    pub fn toggle_speaking(&self) -> Result<()> {
        self.send(TurnEvent::ToggleSpeaking)
    }

    pub fn stop_speaking(&self) -> Result<()> {
        self.send(TurnEvent::StopSpeaking)
    }

    /// Clear the conversation
    pub fn reset(&self) -> Result<()> {
        self.send(TurnEvent::Reset)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(TurnEvent::Shutdown)
    }

    /// Sink for capabilities that post events outside a controller call
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn try_recv_notification(&self) -> Option<TurnNotification> {
        self.notification_rx.try_recv().ok()
    }

    pub fn recv_notification_timeout(&self, timeout: Duration) -> Result<TurnNotification> {
        self.notification_rx
            .recv_timeout(timeout)
            .map_err(|e| ParleyError::ChannelError(format!("No notification: {}", e)))
    }

    pub fn notifications(&self) -> Receiver<TurnNotification> {
        self.notification_rx.clone()
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        self.state.snapshot()
    }

    pub fn state(&self) -> TurnState {
        self.state.state()
    }

    pub fn controls(&self) -> ControlState {
        self.state.snapshot().controls
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }
}

pub struct VoiceSession {
    controller: VoiceTurnController,
    event_rx: Receiver<TurnEvent>,
    pipeline: Option<ResponsePipeline>,
    state: SharedTurnState,
    max_listen: Option<Duration>,
    /// Session being timed and when it started
    listening_since: Option<(SessionId, Instant)>,
}

impl VoiceSession {
    /// Create a session that answers with the placeholder responder
    pub fn new(
        config: ParleyConfig,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    ) -> Result<(Self, SessionHandle)> {
        let generator = Arc::new(PlaceholderResponder::from_config(&config.responder));
        Self::with_generator(config, recognizer, synthesizer, generator)
    }

    pub fn with_generator(
        config: ParleyConfig,
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
        generator: Arc<dyn ResponseGenerator>,
    ) -> Result<(Self, SessionHandle)> {
        config.validate()?;

        let (sink, event_rx) = EventSink::channel(config.channel_buffer_size);
        let (notification_tx, notification_rx) = bounded(config.channel_buffer_size);
        let transcript = Transcript::new();

        let pipeline = ResponsePipeline::new(config.responder.clone(), generator, sink.clone());

        let controller = VoiceTurnController::new(
            recognizer,
            synthesizer,
            Box::new(pipeline.handle()),
            sink.clone(),
        )
        .with_transcript(transcript.clone())
        .with_recognition_config(config.recognition.clone())
        .with_speech_options(config.synthesis.clone())
        .with_notifications(notification_tx);

        let state = SharedTurnState::new(controller.snapshot());

        let handle = SessionHandle {
            sink,
            notification_rx,
            state: state.clone(),
            transcript,
        };

        let session = Self {
            controller,
            event_rx,
            pipeline: Some(pipeline),
            state,
            max_listen: config.recognition.max_listen(),
            listening_since: None,
        };

        Ok((session, handle))
    }

    /// Start the response worker and the event loop
    ///
    /// This consumes the session and returns join handles for both threads.
    pub fn start(mut self) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::new();

        if let Some(pipeline) = self.pipeline.take() {
            handles.push(pipeline.start_worker()?);
            info!("Response pipeline started");
        }

        let event_loop = thread::Builder::new()
            .name("parley-turns".to_string())
            .spawn(move || self.run())?;
        handles.push(event_loop);

        Ok(handles)
    }

    fn run(mut self) {
        info!("Voice session started");
        let mut shut_down = false;

        loop {
            let event = match self.listen_deadline() {
                Some((session, deadline)) => match self.event_rx.recv_deadline(deadline) {
                    Ok(event) => event,
                    Err(RecvTimeoutError::Timeout) => TurnEvent::ListenTimedOut { session },
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.event_rx.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            shut_down = matches!(event, TurnEvent::Shutdown);
            self.controller.handle(event);
            self.state.set(self.controller.snapshot());
            self.track_listening();

            if shut_down {
                break;
            }
        }

        if !shut_down {
            warn!("Event channel closed without shutdown");
            self.controller.handle(TurnEvent::Shutdown);
            self.state.set(self.controller.snapshot());
        }
        info!("Voice session stopped");
    }

    fn track_listening(&mut self) {
        match self.controller.listening_session() {
            Some(session) => {
                if self.listening_since.map(|(s, _)| s) != Some(session) {
                    self.listening_since = Some((session, Instant::now()));
                }
            }
            None => self.listening_since = None,
        }
    }

    fn listen_deadline(&self) -> Option<(SessionId, Instant)> {
        let limit = self.max_listen?;
        self.listening_since
            .map(|(session, since)| (session, since + limit))
    }
}
