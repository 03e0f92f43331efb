//! Error types for the chat system.

use thiserror::Error;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Chat system errors
#[derive(Error, Debug)]
pub enum ChatError {
    /// The agent roster could not be fetched, or came back empty
    #[error("Agent roster unavailable: {0}")]
    RosterUnavailable(String),

    /// The requested agent is not selectable right now
    #[error("Invalid agent selection: {0}")]
    InvalidAgentSelection(String),

    /// Transport failure or malformed body on a roster/reset call
    #[error("Service unreachable: {0}")]
    ServiceUnreachable(String),

    /// The dispatcher did not produce a usable agent
    #[error("Dispatch failed: {0}")]
    DispatchFailed(String),

    /// The chat exchange failed
    #[error("Chat failed: {0}")]
    ChatFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Short machine-friendly label, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RosterUnavailable(_) => "roster_unavailable",
            Self::InvalidAgentSelection(_) => "invalid_agent_selection",
            Self::ServiceUnreachable(_) => "service_unreachable",
            Self::DispatchFailed(_) => "dispatch_failed",
            Self::ChatFailed(_) => "chat_failed",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
