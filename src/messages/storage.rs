use super::types::{Message, Role};
use crate::{ParleyError, Result};
use parking_lot::RwLock;
use std::sync::Arc;

/// Ordered, append-only message list for one session
///
/// Clones share the same list, so a front-end can render while the
/// controller appends.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Arc<RwLock<Vec<Message>>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn push(&self, message: Message) {
        self.messages.write().push(message);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.read().clone()
    }

    pub fn last(&self) -> Option<Message> {
        self.messages.read().last().cloned()
    }

    /// Latest message spoken by the user
    pub fn last_user(&self) -> Option<Message> {
        self.messages
            .read()
            .iter()
            .rev()
            .find(|m| m.role() == Role::User)
            .cloned()
    }

    /// Session reset only; turns never remove messages.
    pub fn clear(&self) {
        self.messages.write().clear();
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&*self.messages.read())
            .map_err(|e| ParleyError::IOError(format!("Failed to export transcript: {}", e)))
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}
