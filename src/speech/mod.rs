//! Host speech capabilities
//!
//! Both capabilities are injected into the controller at construction and
//! may report themselves unsupported at runtime.

pub mod recognition;
pub mod synthesis;

pub use recognition::{RecognitionConfig, RecognitionErrorKind, SpeechRecognizer};
pub use synthesis::{select_voice, SpeechOptions, SpeechSynthesizer};
