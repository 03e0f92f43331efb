//! Terminal rendering of conversation events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use parley_chat::{Author, ConversationEvent, Turn};

/// Prints conversation events as they arrive
pub struct TerminalRenderer {
    show_trace: Arc<AtomicBool>,
    echo_user: bool,
}

impl TerminalRenderer {
    pub fn new(show_trace: bool) -> Self {
        Self {
            show_trace: Arc::new(AtomicBool::new(show_trace)),
            echo_user: false,
        }
    }

    /// Also print the user's own messages (the REPL already shows them)
    pub fn echo_user(mut self, enabled: bool) -> Self {
        self.echo_user = enabled;
        self
    }

    /// Shared switch for the trace area
    pub fn trace_toggle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.show_trace)
    }

    /// Render events until every sender is gone
    pub fn spawn(self, mut events: UnboundedReceiver<ConversationEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Some(text) = self.format(&event) {
                    println!("{}", text);
                }
            }
        })
    }

    pub fn format(&self, event: &ConversationEvent) -> Option<String> {
        match event {
            ConversationEvent::TurnAppended(turn) => self.format_turn(turn),
            ConversationEvent::Typing(true) => Some("⏳ ...".to_string()),
            ConversationEvent::Typing(false) => None,
            ConversationEvent::Trace(block) => {
                if !self.show_trace.load(Ordering::Relaxed) {
                    return None;
                }
                let lines: Vec<String> = block.lines().map(|line| format!("   │ {}", line)).collect();
                Some(lines.join("\n"))
            }
            ConversationEvent::ModeChanged(mode) => Some(format!("🔀 Mode: {}", mode)),
            ConversationEvent::StateChanged(_) => None,
        }
    }

    fn format_turn(&self, turn: &Turn) -> Option<String> {
        match &turn.author {
            Author::User if !self.echo_user => None,
            Author::User => Some(format!("🧑 You: {}", turn.text)),
            Author::System => Some(format!("⚠️  {}", turn.text)),
            Author::Agent(agent) => Some(format!("💬 {}: {}", agent.name, turn.text)),
            Author::Dispatcher(dispatcher) => Some(format!("🧭 {}: {}", dispatcher.name, turn.text)),
        }
    }
}
