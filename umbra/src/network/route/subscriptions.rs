// Copyright (c) 2024 Botho Foundation

//! Default in-process recipient registry.

use super::collaborators::{ConnectionHandler, RecipientRegistry};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use umbra_wire::RecipientId;

/// Handlers registered by local logic, one per recipient.
#[derive(Default)]
pub struct Subscriptions {
    handlers: RwLock<HashMap<RecipientId, Arc<dyn ConnectionHandler>>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl RecipientRegistry for Subscriptions {
    fn subscribe(&self, recipient: RecipientId, handler: Arc<dyn ConnectionHandler>) -> bool {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&recipient) {
            return false;
        }
        handlers.insert(recipient, handler);
        true
    }

    fn unsubscribe(&self, recipient: &RecipientId) {
        self.handlers.write().remove(recipient);
    }

    fn handler(&self, recipient: &RecipientId) -> Option<Arc<dyn ConnectionHandler>> {
        self.handlers.read().get(recipient).cloned()
    }
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriptions")
            .field("recipients", &self.handlers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}
