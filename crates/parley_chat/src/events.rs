//! Conversation events for presentation adapters.
//!
//! The orchestrator never touches a display surface. It pushes events on an
//! unbounded channel; whatever renders the conversation consumes them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::trace;

use crate::orchestrator::TurnState;
use crate::types::{Mode, Turn};

/// Something a renderer may want to show
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    /// A turn was appended to the message log
    TurnAppended(Turn),
    /// The typing indicator was shown or hidden
    Typing(bool),
    /// A block was appended to the trace area
    Trace(String),
    /// The selection mode changed
    ModeChanged(Mode),
    /// The orchestrator moved to another state
    StateChanged(TurnState),
}

/// Optional sender half of the event channel
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<ConversationEvent>>,
}

impl EventSink {
    /// A sink that drops every event
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Create a connected sink and its receiving end
    pub fn channel() -> (Self, UnboundedReceiver<ConversationEvent>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    pub fn emit(&self, event: ConversationEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                trace!("event receiver dropped");
            }
        }
    }
}

/// Shared "someone is typing" flag
#[derive(Debug, Clone, Default)]
pub struct TypingIndicator {
    visible: Arc<AtomicBool>,
}

impl TypingIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Show the indicator until the returned guard is dropped
    pub fn show(&self, sink: &EventSink) -> TypingGuard {
        self.visible.store(true, Ordering::SeqCst);
        sink.emit(ConversationEvent::Typing(true));
        TypingGuard {
            visible: Arc::clone(&self.visible),
            sink: sink.clone(),
        }
    }
}

/// Hides the typing indicator when dropped, on every exit path.
#[must_use = "the indicator is hidden as soon as the guard is dropped"]
pub struct TypingGuard {
    visible: Arc<AtomicBool>,
    sink: EventSink,
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.visible.store(false, Ordering::SeqCst);
        self.sink.emit(ConversationEvent::Typing(false));
    }
}
