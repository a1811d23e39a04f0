//! Response generators
//!
//! The controller only needs "eventually text, or an error". The
//! placeholder echoes the user after a fixed delay; a real backend
//! implements [`ResponseGenerator`] the same way.

use crate::responder::config::ResponderConfig;
use crate::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tracing::debug;

pub trait ResponseGenerator: Send + Sync {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String>>;
}

/// Fixed-latency echo reply
#[derive(Clone, Debug)]
pub struct PlaceholderResponder {
    latency: Duration,
    template: String,
}

impl PlaceholderResponder {
    pub fn new(latency: Duration, template: impl Into<String>) -> Self {
        Self {
            latency,
            template: template.into(),
        }
    }

    pub fn from_config(config: &ResponderConfig) -> Self {
        Self::new(config.latency(), config.template.clone())
    }

    pub fn render(&self, prompt: &str) -> String {
        self.template.replace("{text}", prompt)
    }
}

impl Default for PlaceholderResponder {
    fn default() -> Self {
        Self::from_config(&ResponderConfig::default())
    }
}

impl ResponseGenerator for PlaceholderResponder {
    fn generate(&self, prompt: String) -> BoxFuture<'static, Result<String>> {
        let reply = self.render(&prompt);
        let latency = self.latency;
        async move {
            debug!("Placeholder reply in {:?}", latency);
            tokio::time::sleep(latency).await;
            Ok(reply)
        }
        .boxed()
    }
}
