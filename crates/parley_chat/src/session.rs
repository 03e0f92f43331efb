//! Session state: roster, dispatcher identity, mode and current agent.
//!
//! The state is a plain owned container. It never talks to the network and
//! never appends turns; the orchestrator drives it and reports the outcome.

use crate::error::{ChatError, ChatResult};
use crate::types::{Agent, AgentList, AgentRef, Mode};

/// What a reset request addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetScope {
    /// Only the conversation with this agent
    Agent(String),
    /// Every conversation, dispatcher included
    All,
}

impl ResetScope {
    /// `(agent_id, reset_all)` as sent on the wire
    pub fn as_request(&self) -> (Option<&str>, bool) {
        match self {
            Self::Agent(id) => (Some(id.as_str()), false),
            Self::All => (None, true),
        }
    }
}

/// Client-side view of the current session
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    mode: Mode,
    roster: Vec<Agent>,
    current: Option<Agent>,
    dispatcher: Option<AgentRef>,
    character_dispatcher: Option<AgentRef>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn roster(&self) -> &[Agent] {
        &self.roster
    }

    /// Selected agent; only meaningful in manual mode
    pub fn current_agent(&self) -> Option<&Agent> {
        self.current.as_ref()
    }

    pub fn dispatcher(&self) -> Option<&AgentRef> {
        self.dispatcher.as_ref()
    }

    pub fn character_dispatcher(&self) -> Option<&AgentRef> {
        self.character_dispatcher.as_ref()
    }

    pub fn is_initialized(&self) -> bool {
        !self.roster.is_empty()
    }

    /// Dispatcher reference, or a placeholder before the roster is loaded
    pub fn dispatcher_or_default(&self) -> AgentRef {
        self.dispatcher
            .clone()
            .unwrap_or_else(|| AgentRef::new("dispatcher", "Dispatcher"))
    }

    pub fn find(&self, agent_id: &str) -> Option<&Agent> {
        self.roster.iter().find(|a| a.id == agent_id)
    }

    /// Replace the roster wholesale and select its first entry.
    ///
    /// An empty roster leaves the previous state untouched.
    pub fn install_roster(&mut self, list: AgentList) -> ChatResult<Agent> {
        let first = list
            .agents
            .first()
            .cloned()
            .ok_or_else(|| ChatError::RosterUnavailable("service returned no agents".to_string()))?;

        self.roster = list.agents;
        self.dispatcher = list.dispatcher;
        self.character_dispatcher = list.character_dispatcher;
        self.current = Some(first.clone());
        Ok(first)
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Select a roster agent. Only valid in manual mode.
    pub fn select(&mut self, agent_id: &str) -> ChatResult<Agent> {
        if self.mode != Mode::Manual {
            return Err(ChatError::InvalidAgentSelection(
                "agents can only be picked in manual mode".to_string(),
            ));
        }

        let agent = self
            .find(agent_id)
            .cloned()
            .ok_or_else(|| ChatError::InvalidAgentSelection(format!("unknown agent id: {}", agent_id)))?;

        self.current = Some(agent.clone());
        Ok(agent)
    }

    /// Scope of a reset issued right now.
    ///
    /// Automatic mode always resets everything.
    pub fn reset_scope(&self) -> ChatResult<ResetScope> {
        match self.mode {
            Mode::Automatic => Ok(ResetScope::All),
            Mode::Manual => self
                .current
                .as_ref()
                .map(|a| ResetScope::Agent(a.id.clone()))
                .ok_or_else(|| ChatError::InvalidAgentSelection("no agent selected".to_string())),
        }
    }
}
