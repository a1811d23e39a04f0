//! Voice turn controller
//!
//! Sequences listen -> process -> speak for one turn at a time. All inputs
//! arrive through [`VoiceTurnController::handle`], and each call runs one
//! synchronous transition.
//!
//! Capability events carry the id of the session, request or utterance that
//! produced them. Only the id the controller is currently waiting on is
//! accepted, so callbacks from cancelled operations are dropped.

use crate::controller::events::{
    EventSink, RequestId, SessionId, TurnEvent, TurnNotification, UtteranceId,
};
use crate::controller::state::{ControlState, EndReason, TurnSnapshot, TurnState};
use crate::messages::{Message, Transcript};
use crate::responder::ResponseDispatcher;
use crate::speech::{
    RecognitionConfig, RecognitionErrorKind, SpeechOptions, SpeechRecognizer, SpeechSynthesizer,
};
use crate::{Capability, ParleyError};
use crossbeam_channel::{Sender, TrySendError};
use tracing::{debug, error, info, warn};

pub struct VoiceTurnController {
    state: TurnState,
    transcript: Transcript,

    recognizer: Option<Box<dyn SpeechRecognizer>>,
    synthesizer: Option<Box<dyn SpeechSynthesizer>>,
    responder: Box<dyn ResponseDispatcher>,

    /// Where capabilities post their callbacks
    sink: EventSink,
    notifications: Option<Sender<TurnNotification>>,

    recognition: RecognitionConfig,
    speech: SpeechOptions,

    /// Set after a permanent capture error (permission denied etc.)
    mic_blocked: bool,

    next_id: u64,
    session: Option<SessionId>,
    request: Option<RequestId>,
    utterance: Option<UtteranceId>,
}

impl VoiceTurnController {
    /// Create a controller around the injected capabilities
    ///
    /// `None` stands for a capability the platform does not offer.
    pub fn new(
        recognizer: Option<Box<dyn SpeechRecognizer>>,
        synthesizer: Option<Box<dyn SpeechSynthesizer>>,
        responder: Box<dyn ResponseDispatcher>,
        sink: EventSink,
    ) -> Self {
        Self {
            state: TurnState::Idle,
            transcript: Transcript::new(),
            recognizer,
            synthesizer,
            responder,
            sink,
            notifications: None,
            recognition: RecognitionConfig::default(),
            speech: SpeechOptions::default(),
            mic_blocked: false,
            next_id: 0,
            session: None,
            request: None,
            utterance: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn with_recognition_config(mut self, config: RecognitionConfig) -> Self {
        self.recognition = config;
        self
    }

    pub fn with_speech_options(mut self, options: SpeechOptions) -> Self {
        self.speech = options.normalized();
        self
    }

    pub fn with_notifications(mut self, tx: Sender<TurnNotification>) -> Self {
        self.notifications = Some(tx);
        self
    }

    // === Queries ===

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_listening(&self) -> bool {
        self.state.is_listening()
    }

    pub fn is_speaking(&self) -> bool {
        self.state.is_speaking()
    }

    pub fn is_processing(&self) -> bool {
        self.state.is_processing()
    }

    /// Session currently listening, if any
    pub fn listening_session(&self) -> Option<SessionId> {
        self.session.filter(|_| self.state.is_listening())
    }

    pub fn recognition_supported(&self) -> bool {
        self.recognizer.as_ref().is_some_and(|r| r.is_supported())
    }

    pub fn synthesis_supported(&self) -> bool {
        self.synthesizer.as_ref().is_some_and(|s| s.is_supported())
    }

    pub fn controls(&self) -> ControlState {
        ControlState {
            mic_enabled: self.recognition_supported() && !self.mic_blocked,
            speaker_enabled: self.state.is_speaking(),
            status: self.state.status_text(),
        }
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            state: self.state,
            controls: self.controls(),
            message_count: self.transcript.len(),
        }
    }

    // === Event entry point ===

    pub fn handle(&mut self, event: TurnEvent) {
        debug!("{} <- {:?}", self.state, event);

        match event {
            TurnEvent::StartListening => self.start_listening(),
            TurnEvent::StopListening => self.stop_listening(),
            TurnEvent::ToggleListening => {
                if self.state.is_listening() {
                    self.stop_listening();
                } else {
                    self.start_listening();
                }
            }
            TurnEvent::StopSpeaking | TurnEvent::ToggleSpeaking => self.stop_speaking(),
            TurnEvent::Reset => self.reset(),
            TurnEvent::Shutdown => self.shutdown(),

            TurnEvent::TranscriptReady { session, text } => self.on_transcript(session, text),
            TurnEvent::ListeningEnded { session } => {
                if self.accepts_session(session) {
                    self.end_listening(EndReason::NoSpeech);
                }
            }
            TurnEvent::ListenTimedOut { session } => {
                if self.accepts_session(session) {
                    if let Some(recognizer) = self.recognizer.as_mut() {
                        recognizer.stop();
                    }
                    self.end_listening(EndReason::TimedOut);
                }
            }
            TurnEvent::RecognitionFailed { session, reason } => {
                self.on_recognition_failed(session, reason)
            }

            TurnEvent::ResponseReady { request, text } => self.on_response(request, text),
            TurnEvent::ResponseFailed { request, error } => {
                if self.accepts_request(request) {
                    error!("Response generation failed: {}", error);
                    self.request = None;
                    self.set_state(TurnState::Idle);
                    self.notify(TurnNotification::Error(error));
                }
            }

            TurnEvent::SpeechEnded { utterance } => {
                if self.accepts_utterance(utterance) {
                    self.utterance = None;
                    self.set_state(TurnState::Idle);
                }
            }
            TurnEvent::SpeechFailed { utterance, reason } => {
                if self.accepts_utterance(utterance) {
                    error!("Speech synthesis error: {}", reason);
                    self.utterance = None;
                    self.set_state(TurnState::Idle);
                    self.notify(TurnNotification::Error(ParleyError::SynthesisError(reason)));
                }
            }
        }
    }

    // === User actions ===

    fn start_listening(&mut self) {
        if self.state.is_listening() {
            debug!("Already listening");
            return;
        }

        if !self.recognition_supported() {
            warn!("Speech recognition is not supported on this platform");
            self.notify(TurnNotification::Error(ParleyError::UnsupportedCapability(
                Capability::Recognition,
            )));
            return;
        }

        if self.mic_blocked {
            warn!("Microphone disabled after a permanent capture error");
            return;
        }

        // The mic must never hear the assistant: cut speech off first
        match self.state {
            TurnState::Speaking => {
                if let Some(synthesizer) = self.synthesizer.as_mut() {
                    synthesizer.stop();
                }
                self.utterance = None;
                debug!("Speech cancelled for new listening session");
            }
            TurnState::Processing => {
                if let Some(request) = self.request.take() {
                    self.responder.cancel(request);
                    debug!("Abandoned {} for new listening session", request);
                }
            }
            TurnState::Idle | TurnState::Listening => {}
        }

        let session = SessionId::new(self.next_id());
        let started = match self.recognizer.as_mut() {
            Some(recognizer) => recognizer.start(session, &self.recognition, &self.sink),
            None => Err(ParleyError::UnsupportedCapability(Capability::Recognition)),
        };

        match started {
            Ok(()) => {
                self.session = Some(session);
                self.set_state(TurnState::Listening);
            }
            Err(e) => {
                error!("Speech recognition failed to start: {}", e);
                self.session = None;
                self.set_state(TurnState::Idle);
                self.notify(TurnNotification::Error(e));
            }
        }
    }

    fn stop_listening(&mut self) {
        if !self.state.is_listening() {
            debug!("Not listening, nothing to stop");
            return;
        }

        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.end_listening(EndReason::Cancelled);
    }

    fn stop_speaking(&mut self) {
        if !self.state.is_speaking() {
            debug!("Not speaking, nothing to stop");
            return;
        }

        if let Some(synthesizer) = self.synthesizer.as_mut() {
            synthesizer.stop();
        }
        self.utterance = None;
        self.set_state(TurnState::Idle);
    }

    fn reset(&mut self) {
        self.cancel_active();
        self.transcript.clear();
        info!("Conversation reset");
    }

    fn shutdown(&mut self) {
        self.cancel_active();
        self.responder.shutdown();
        info!("Voice turn controller shut down");
    }

    /// Stop whatever capability is active and return to idle
    fn cancel_active(&mut self) {
        match self.state {
            TurnState::Listening => {
                if let Some(recognizer) = self.recognizer.as_mut() {
                    recognizer.stop();
                }
            }
            TurnState::Processing => {
                if let Some(request) = self.request {
                    self.responder.cancel(request);
                }
            }
            TurnState::Speaking => {
                if let Some(synthesizer) = self.synthesizer.as_mut() {
                    synthesizer.stop();
                }
            }
            TurnState::Idle => {}
        }

        self.session = None;
        self.request = None;
        self.utterance = None;
        self.set_state(TurnState::Idle);
    }

    // === Capability events ===

    fn on_transcript(&mut self, session: SessionId, text: String) {
        if !self.accepts_session(session) {
            return;
        }

        let text = text.trim();
        if text.is_empty() {
            debug!("Empty transcript, still listening");
            return;
        }

        let message = Message::user(text);
        self.transcript.push(message.clone());
        self.session = None;
        self.set_state(TurnState::Processing);
        self.notify(TurnNotification::MessageAdded(message));

        let request = RequestId::new(self.next_id());
        match self.responder.request(request, text) {
            Ok(()) => self.request = Some(request),
            Err(e) => {
                error!("Could not request a response: {}", e);
                self.set_state(TurnState::Idle);
                self.notify(TurnNotification::Error(e));
            }
        }
    }

    fn on_recognition_failed(&mut self, session: SessionId, reason: String) {
        if !self.accepts_session(session) {
            return;
        }

        let kind = RecognitionErrorKind::parse(&reason);
        error!("Speech recognition error: {} ({:?})", reason, kind);
        self.end_listening(EndReason::Failed);
        self.notify(TurnNotification::Error(ParleyError::CaptureError(reason)));

        if kind.is_permanent() && !self.mic_blocked {
            warn!("Disabling microphone for this session");
            self.mic_blocked = true;
            self.notify(TurnNotification::ControlsChanged(self.controls()));
        }
    }

    fn on_response(&mut self, request: RequestId, text: String) {
        if !self.accepts_request(request) {
            return;
        }
        self.request = None;

        let message = Message::assistant(text);
        self.transcript.push(message.clone());
        self.notify(TurnNotification::MessageAdded(message.clone()));

        if !self.synthesis_supported() {
            debug!("Speech synthesis unsupported, reply shown as text only");
            self.set_state(TurnState::Idle);
            return;
        }

        let utterance = UtteranceId::new(self.next_id());
        let spoken = match self.synthesizer.as_mut() {
            Some(synthesizer) => {
                synthesizer.speak(utterance, message.content(), &self.speech, &self.sink)
            }
            None => Err(ParleyError::UnsupportedCapability(Capability::Synthesis)),
        };

        match spoken {
            Ok(()) => {
                self.utterance = Some(utterance);
                self.set_state(TurnState::Speaking);
            }
            Err(e) => {
                error!("Speech synthesis failed: {}", e);
                self.set_state(TurnState::Idle);
                self.notify(TurnNotification::Error(e));
            }
        }
    }

    // === Helpers ===

    fn end_listening(&mut self, reason: EndReason) {
        info!("Listening ended: {}", reason);
        self.session = None;
        self.set_state(TurnState::Idle);
        self.notify(TurnNotification::ListeningEnded(reason));
    }

    fn accepts_session(&self, session: SessionId) -> bool {
        let current = self.state.is_listening() && self.session == Some(session);
        if !current {
            debug!("Ignoring stale event for {}", session);
        }
        current
    }

    fn accepts_request(&self, request: RequestId) -> bool {
        let current = self.state.is_processing() && self.request == Some(request);
        if !current {
            debug!("Ignoring stale event for {}", request);
        }
        current
    }

    fn accepts_utterance(&self, utterance: UtteranceId) -> bool {
        let current = self.state.is_speaking() && self.utterance == Some(utterance);
        if !current {
            debug!("Ignoring stale event for {}", utterance);
        }
        current
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn set_state(&mut self, to: TurnState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!("Turn state: {} -> {}", from, to);
        self.notify(TurnNotification::StateChanged { from, to });
    }

    fn notify(&self, notification: TurnNotification) {
        if let Some(tx) = &self.notifications {
            match tx.try_send(notification) {
                Ok(()) => {}
                Err(TrySendError::Full(n)) => warn!("Notification queue full, dropping {:?}", n),
                Err(TrySendError::Disconnected(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Role;
    use crate::Result;
    use crossbeam_channel::{unbounded, Receiver};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        RecognizerStart(SessionId),
        RecognizerStop,
        Speak(UtteranceId, String),
        SynthStop,
        Request(RequestId, String),
        Cancel(RequestId),
    }

    type Log = Arc<Mutex<Vec<Call>>>;

    struct FakeRecognizer {
        log: Log,
        supported: bool,
        fail_start: bool,
    }

    impl SpeechRecognizer for FakeRecognizer {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn start(
            &mut self,
            session: SessionId,
            _: &RecognitionConfig,
            _: &EventSink,
        ) -> Result<()> {
            if self.fail_start {
                return Err(ParleyError::CaptureError("busy".to_string()));
            }
            self.log.lock().push(Call::RecognizerStart(session));
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().push(Call::RecognizerStop);
        }
    }

    struct FakeSynthesizer {
        log: Log,
        supported: bool,
    }

    impl SpeechSynthesizer for FakeSynthesizer {
        fn is_supported(&self) -> bool {
            self.supported
        }

        fn speak(
            &mut self,
            utterance: UtteranceId,
            text: &str,
            _: &SpeechOptions,
            _: &EventSink,
        ) -> Result<()> {
            self.log.lock().push(Call::Speak(utterance, text.to_string()));
            Ok(())
        }

        fn stop(&mut self) {
            self.log.lock().push(Call::SynthStop);
        }
    }

    struct FakeResponder {
        log: Log,
    }

    impl ResponseDispatcher for FakeResponder {
        fn request(&self, request: RequestId, prompt: &str) -> Result<()> {
            self.log.lock().push(Call::Request(request, prompt.to_string()));
            Ok(())
        }

        fn cancel(&self, request: RequestId) {
            self.log.lock().push(Call::Cancel(request));
        }
    }

    struct Harness {
        controller: VoiceTurnController,
        log: Log,
        notifications: Receiver<TurnNotification>,
        _events: Receiver<TurnEvent>,
    }

    impl Harness {
        fn new(recognition: bool, synthesis: bool) -> Self {
            let log: Log = Arc::new(Mutex::new(Vec::new()));
            let (sink, events) = EventSink::channel(16);
            let (tx, notifications) = unbounded();
            let controller = VoiceTurnController::new(
                Some(Box::new(FakeRecognizer {
                    log: log.clone(),
                    supported: recognition,
                    fail_start: false,
                })),
                Some(Box::new(FakeSynthesizer {
                    log: log.clone(),
                    supported: synthesis,
                })),
                Box::new(FakeResponder { log: log.clone() }),
                sink,
            )
            .with_notifications(tx);

            Self {
                controller,
                log,
                notifications,
                _events: events,
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.log.lock().clone()
        }

        fn last_session(&self) -> SessionId {
            self.calls()
                .iter()
                .rev()
                .find_map(|c| match c {
                    Call::RecognizerStart(s) => Some(*s),
                    _ => None,
                })
                .expect("no recognition session started")
        }

        fn last_request(&self) -> RequestId {
            self.calls()
                .iter()
                .rev()
                .find_map(|c| match c {
                    Call::Request(r, _) => Some(*r),
                    _ => None,
                })
                .expect("no response requested")
        }

        fn last_utterance(&self) -> UtteranceId {
            self.calls()
                .iter()
                .rev()
                .find_map(|c| match c {
                    Call::Speak(u, _) => Some(*u),
                    _ => None,
                })
                .expect("nothing spoken")
        }

        fn drain_notifications(&self) -> Vec<TurnNotification> {
            self.notifications.try_iter().collect()
        }

        /// Drive one turn up to Speaking
        fn speak_reply(&mut self, heard: &str) {
            self.controller.handle(TurnEvent::StartListening);
            let session = self.last_session();
            self.controller.handle(TurnEvent::TranscriptReady {
                session,
                text: heard.to_string(),
            });
            let request = self.last_request();
            self.controller.handle(TurnEvent::ResponseReady {
                request,
                text: format!("reply to {}", heard),
            });
        }
    }

    #[test]
    fn test_full_turn() {
        let mut h = Harness::new(true, true);
        assert!(h.controller.state().is_idle());

        h.controller.handle(TurnEvent::StartListening);
        assert!(h.controller.is_listening());

        let session = h.last_session();
        h.controller.handle(TurnEvent::TranscriptReady {
            session,
            text: "hello".to_string(),
        });
        assert!(h.controller.is_processing());
        let messages = h.controller.transcript().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), Role::User);
        assert_eq!(messages[0].content(), "hello");

        let request = h.last_request();
        h.controller.handle(TurnEvent::ResponseReady {
            request,
            text: "I heard you say: \"hello\".".to_string(),
        });
        assert!(h.controller.is_speaking());
        assert_eq!(h.controller.transcript().len(), 2);
        assert_eq!(
            h.controller.transcript().last().unwrap().role(),
            Role::Assistant
        );

        let utterance = h.last_utterance();
        h.controller.handle(TurnEvent::SpeechEnded { utterance });
        assert!(h.controller.state().is_idle());
    }

    #[test]
    fn test_unsupported_recognition_is_noop() {
        let mut h = Harness::new(false, true);
        h.controller.handle(TurnEvent::StartListening);

        assert!(h.controller.state().is_idle());
        assert!(h.controller.transcript().is_empty());
        assert!(h.calls().is_empty());
        assert!(!h.controller.controls().mic_enabled);
        assert!(h.drain_notifications().contains(&TurnNotification::Error(
            ParleyError::UnsupportedCapability(Capability::Recognition)
        )));
    }

    #[test]
    fn test_missing_recognizer_is_unsupported() {
        let (sink, _events) = EventSink::channel(4);
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let mut controller =
            VoiceTurnController::new(None, None, Box::new(FakeResponder { log }), sink);
        controller.handle(TurnEvent::ToggleListening);
        assert!(controller.state().is_idle());
        assert!(!controller.recognition_supported());
        assert!(!controller.synthesis_supported());
    }

    #[test]
    fn test_start_while_speaking_cancels_speech_first() {
        let mut h = Harness::new(true, true);
        h.speak_reply("hello");
        assert!(h.controller.is_speaking());
        h.log.lock().clear();
        h.drain_notifications();

        h.controller.handle(TurnEvent::StartListening);

        let calls = h.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], Call::SynthStop);
        assert!(matches!(calls[1], Call::RecognizerStart(_)));
        assert!(h.controller.is_listening());

        // Direct transition, never through Idle
        assert_eq!(
            h.drain_notifications(),
            vec![TurnNotification::StateChanged {
                from: TurnState::Speaking,
                to: TurnState::Listening
            }]
        );
    }

    #[test]
    fn test_start_listening_is_idempotent() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let once = (h.controller.state(), h.calls());

        h.controller.handle(TurnEvent::StartListening);
        assert_eq!((h.controller.state(), h.calls()), once);
    }

    #[test]
    fn test_stop_listening_records_nothing() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();

        h.controller.handle(TurnEvent::StopListening);
        assert!(h.controller.state().is_idle());
        assert!(h.calls().contains(&Call::RecognizerStop));

        // A late transcript from the cancelled session is ignored
        h.controller.handle(TurnEvent::TranscriptReady {
            session,
            text: "too late".to_string(),
        });
        assert!(h.controller.state().is_idle());
        assert!(h.controller.transcript().is_empty());
        assert!(h
            .drain_notifications()
            .contains(&TurnNotification::ListeningEnded(EndReason::Cancelled)));
    }

    #[test]
    fn test_toggle_listening() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::ToggleListening);
        assert!(h.controller.is_listening());
        h.controller.handle(TurnEvent::ToggleListening);
        assert!(h.controller.state().is_idle());
    }

    #[test]
    fn test_transcript_rejected_when_not_listening() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::TranscriptReady {
            session: SessionId::new(1),
            text: "unsolicited".to_string(),
        });
        assert!(h.controller.state().is_idle());
        assert!(h.controller.transcript().is_empty());
    }

    #[test]
    fn test_blank_transcript_keeps_listening() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();

        h.controller.handle(TurnEvent::TranscriptReady {
            session,
            text: "   ".to_string(),
        });
        assert!(h.controller.is_listening());
        assert!(h.controller.transcript().is_empty());

        h.controller.handle(TurnEvent::ListeningEnded { session });
        assert!(h.controller.state().is_idle());
        assert!(h
            .drain_notifications()
            .contains(&TurnNotification::ListeningEnded(EndReason::NoSpeech)));
    }

    #[test]
    fn test_listen_timeout_stops_recognizer() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();

        h.controller.handle(TurnEvent::ListenTimedOut { session });
        assert!(h.controller.state().is_idle());
        assert_eq!(h.calls().last(), Some(&Call::RecognizerStop));
        assert!(h
            .drain_notifications()
            .contains(&TurnNotification::ListeningEnded(EndReason::TimedOut)));
    }

    #[test]
    fn test_capture_error_returns_to_idle() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();

        h.controller.handle(TurnEvent::RecognitionFailed {
            session,
            reason: "network".to_string(),
        });
        assert!(h.controller.state().is_idle());
        assert!(h.controller.transcript().is_empty());
        assert!(h.controller.controls().mic_enabled);

        h.controller.handle(TurnEvent::StartListening);
        assert!(h.controller.is_listening());
    }

    #[test]
    fn test_permanent_capture_error_disables_mic() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();

        h.controller.handle(TurnEvent::RecognitionFailed {
            session,
            reason: "not-allowed".to_string(),
        });
        assert!(!h.controller.controls().mic_enabled);

        h.controller.handle(TurnEvent::StartListening);
        assert!(h.controller.state().is_idle());
    }

    #[test]
    fn test_recognizer_start_failure() {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let (sink, _events) = EventSink::channel(4);
        let mut controller = VoiceTurnController::new(
            Some(Box::new(FakeRecognizer {
                log: log.clone(),
                supported: true,
                fail_start: true,
            })),
            None,
            Box::new(FakeResponder { log }),
            sink,
        );
        controller.handle(TurnEvent::StartListening);
        assert!(controller.state().is_idle());
    }

    #[test]
    fn test_synthesis_unsupported_goes_idle() {
        let mut h = Harness::new(true, false);
        h.speak_reply("hello");

        assert!(h.controller.state().is_idle());
        assert_eq!(h.controller.transcript().len(), 2);
        assert!(!h.calls().iter().any(|c| matches!(c, Call::Speak(..))));
    }

    #[test]
    fn test_assistant_message_appended_before_speaking() {
        let mut h = Harness::new(true, true);
        h.speak_reply("hello");

        let spoken = h
            .calls()
            .iter()
            .find_map(|c| match c {
                Call::Speak(_, text) => Some(text.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(h.controller.transcript().last().unwrap().content(), spoken);
    }

    #[test]
    fn test_response_failure_returns_to_idle() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();
        h.controller.handle(TurnEvent::TranscriptReady {
            session,
            text: "hello".to_string(),
        });
        let request = h.last_request();

        h.controller.handle(TurnEvent::ResponseFailed {
            request,
            error: ParleyError::ResponseError("backend down".to_string()),
        });
        assert!(h.controller.state().is_idle());
        assert_eq!(h.controller.transcript().len(), 1);
    }

    #[test]
    fn test_start_while_processing_abandons_response() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::StartListening);
        let session = h.last_session();
        h.controller.handle(TurnEvent::TranscriptReady {
            session,
            text: "hello".to_string(),
        });
        let request = h.last_request();

        h.controller.handle(TurnEvent::StartListening);
        assert!(h.controller.is_listening());
        assert!(h.calls().contains(&Call::Cancel(request)));

        // The abandoned reply must not start speech over the mic
        h.controller.handle(TurnEvent::ResponseReady {
            request,
            text: "late".to_string(),
        });
        assert!(h.controller.is_listening());
        assert_eq!(h.controller.transcript().len(), 1);
    }

    #[test]
    fn test_speech_error_keeps_assistant_message() {
        let mut h = Harness::new(true, true);
        h.speak_reply("hello");
        let utterance = h.last_utterance();

        h.controller.handle(TurnEvent::SpeechFailed {
            utterance,
            reason: "audio-busy".to_string(),
        });
        assert!(h.controller.state().is_idle());
        assert_eq!(h.controller.transcript().len(), 2);
    }

    #[test]
    fn test_stop_speaking() {
        let mut h = Harness::new(true, true);
        h.speak_reply("hello");
        let utterance = h.last_utterance();

        h.controller.handle(TurnEvent::StopSpeaking);
        assert!(h.controller.state().is_idle());
        assert_eq!(h.calls().last(), Some(&Call::SynthStop));

        // A late completion for the cancelled utterance changes nothing
        h.controller.handle(TurnEvent::StartListening);
        h.controller.handle(TurnEvent::SpeechEnded { utterance });
        assert!(h.controller.is_listening());
    }

    #[test]
    fn test_toggle_speaking_when_not_speaking_is_noop() {
        let mut h = Harness::new(true, true);
        h.controller.handle(TurnEvent::ToggleSpeaking);
        assert!(h.controller.state().is_idle());
        assert!(h.calls().is_empty());
    }

    #[test]
    fn test_reset_clears_transcript() {
        let mut h = Harness::new(true, true);
        h.speak_reply("hello");
        h.controller.handle(TurnEvent::Reset);

        assert!(h.controller.state().is_idle());
        assert!(h.controller.transcript().is_empty());
        assert_eq!(h.calls().last(), Some(&Call::SynthStop));
    }

    #[test]
    fn test_never_listening_and_speaking() {
        let mut h = Harness::new(true, true);
        let actions = [
            TurnEvent::StartListening,
            TurnEvent::ToggleSpeaking,
            TurnEvent::StopListening,
            TurnEvent::ToggleListening,
            TurnEvent::StartListening,
            TurnEvent::StopSpeaking,
            TurnEvent::ToggleListening,
        ];

        for round in 0..3 {
            h.speak_reply(&format!("round {}", round));
            for action in actions.iter().cloned() {
                h.controller.handle(action);
            }
        }

        // No completion is ever delivered, so only a stop ends an utterance
        let mut playing: Option<UtteranceId> = None;
        let mut starts = 0;
        for call in h.calls() {
            match call {
                Call::Speak(utterance, _) => playing = Some(utterance),
                Call::SynthStop => playing = None,
                Call::RecognizerStart(session) => {
                    starts += 1;
                    assert_eq!(playing, None, "{} started over an utterance", session);
                }
                _ => {}
            }
        }
        assert!(starts > 3);
    }
}
