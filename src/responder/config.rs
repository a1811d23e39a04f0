//! Response generation settings

use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TEMPLATE: &str = "I heard you say: \"{text}\". This is a placeholder response. Please integrate with your preferred AI service.";

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResponderConfig {
    /// Delay before the placeholder reply resolves
    pub latency_ms: u64,

    /// A turn whose response takes longer than this is abandoned
    pub timeout_ms: u64,

    /// Placeholder reply; `{text}` is replaced with the user's words
    pub template: String,

    /// Pending command queue size
    pub queue_size: usize,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            latency_ms: 1500,
            timeout_ms: 30_000,
            template: DEFAULT_TEMPLATE.to_string(),
            queue_size: 16,
        }
    }
}

impl ResponderConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }
}
