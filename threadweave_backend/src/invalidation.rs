//! Cache invalidation hooks fired after successful mutations.
//!
//! The topic is an opaque token supplied by the caller (typically the path of
//! the rendered view). Services pass it through untouched.

use std::sync::Arc;
use tokio::sync::broadcast;

pub trait InvalidationSignal: Send + Sync {
    fn notify(&self, topic: &str);
}

pub type SharedSignal = Arc<dyn InvalidationSignal>;

/// Drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSignal;

impl InvalidationSignal for NoopSignal {
    fn notify(&self, _topic: &str) {}
}

/// Records notifications in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingSignal;

impl InvalidationSignal for LoggingSignal {
    fn notify(&self, topic: &str) {
        tracing::info!(topic, "invalidation requested");
    }
}

/// Fans topics out to any number of subscribers (render caches, SSE
/// bridges, tests). Notifying with no live subscriber is not an error.
#[derive(Debug, Clone)]
pub struct BroadcastSignal {
    sender: broadcast::Sender<String>,
}

impl BroadcastSignal {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSignal {
    fn default() -> Self {
        Self::new(64)
    }
}

impl InvalidationSignal for BroadcastSignal {
    fn notify(&self, topic: &str) {
        let delivered = self.sender.send(topic.to_string()).unwrap_or(0);
        tracing::debug!(topic, delivered, "invalidation broadcast");
    }
}
