//! Client event bus
//!
//! Other parts of the host publish [`ClientEvent`]s here. Listeners are
//! invoked synchronously, in registration order, from the publishing call.
//! A listener that needs to do async work queues it itself (the analytics
//! service does exactly that).

use std::sync::{Arc, RwLock};

use crate::types::ClientEvent;

/// Receiver of client events.
///
/// Called from the publisher's context; must not block.
pub trait ClientEventListener: Send + Sync {
    fn handle(&self, event: &ClientEvent);
}

/// In-process pub/sub bus for client events
#[derive(Default)]
pub struct ClientEventManager {
    listeners: RwLock<Vec<Arc<dyn ClientEventListener>>>,
}

impl ClientEventManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every event published after this call
    pub fn register_listener(&self, listener: Arc<dyn ClientEventListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    /// Publish an event to all registered listeners
    pub fn log_event(&self, event: &ClientEvent) {
        // Clone the list so a listener may register another without deadlocking
        let listeners: Vec<Arc<dyn ClientEventListener>> = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        tracing::trace!(
            event_type = ?event.event_type,
            originator = event.event_originator.as_str(),
            listeners = listeners.len(),
            "Client event published"
        );

        for listener in listeners {
            listener.handle(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        match self.listeners.read() {
            Ok(listeners) => listeners.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
