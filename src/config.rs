//! Configuration for a voice chat session
//!
//! Collects the recognition, synthesis and responder settings in one place.
//! Every field has a default, so a TOML file only needs the values it
//! changes.

use crate::responder::ResponderConfig;
use crate::speech::{RecognitionConfig, SpeechOptions};
use crate::{ParleyError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ParleyConfig {
    pub recognition: RecognitionConfig,

    pub synthesis: SpeechOptions,

    pub responder: ResponderConfig,

    /// Capacity of the controller's event and notification channels
    pub channel_buffer_size: usize,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            recognition: RecognitionConfig::default(),
            synthesis: SpeechOptions::default(),
            responder: ResponderConfig::default(),
            channel_buffer_size: 100,
        }
    }
}

impl ParleyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParleyError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ParleyConfig = toml::from_str(content)
            .map_err(|e| ParleyError::ConfigError(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_recognition(mut self, recognition: RecognitionConfig) -> Self {
        self.recognition = recognition;
        self
    }

    pub fn with_synthesis(mut self, synthesis: SpeechOptions) -> Self {
        self.synthesis = synthesis;
        self
    }

    pub fn with_responder(mut self, responder: ResponderConfig) -> Self {
        self.responder = responder;
        self
    }

    /// Abandon recognition sessions that hear nothing for this long
    pub fn with_max_listen(mut self, limit: Duration) -> Self {
        self.recognition = self.recognition.with_max_listen(limit);
        self
    }

    pub fn with_channel_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer_size = size;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.recognition.locale.trim().is_empty() {
            return Err(ParleyError::ConfigError("Recognition locale is required".to_string()));
        }
        if self.recognition.max_listen_ms == Some(0) {
            return Err(ParleyError::ConfigError(
                "max_listen_ms must be greater than zero".to_string(),
            ));
        }

        let speech = &self.synthesis;
        if !(speech.rate > 0.0 && speech.rate <= 10.0) {
            return Err(ParleyError::ConfigError(format!(
                "Speech rate {} out of range (0, 10]",
                speech.rate
            )));
        }
        if !(speech.pitch > 0.0 && speech.pitch <= 2.0) {
            return Err(ParleyError::ConfigError(format!(
                "Speech pitch {} out of range (0, 2]",
                speech.pitch
            )));
        }
        // Zero reads as unset and would play at full volume
        if !(speech.volume > 0.0 && speech.volume <= 1.0) {
            return Err(ParleyError::ConfigError(format!(
                "Speech volume {} out of range (0, 1]",
                speech.volume
            )));
        }

        if self.responder.timeout_ms == 0 {
            return Err(ParleyError::ConfigError(
                "Responder timeout must be greater than zero".to_string(),
            ));
        }
        if self.channel_buffer_size == 0 {
            return Err(ParleyError::ConfigError(
                "channel_buffer_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
