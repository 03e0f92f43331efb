//! Core types for the conversation client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a turn in the message log
pub type TurnId = String;

/// A selectable agent, as listed by the service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Agent {
    /// Opaque identifier, unique within a session
    pub id: String,
    /// Display name
    pub name: String,
    /// Free-text description of the agent's role
    #[serde(default)]
    pub description: String,
    /// How eager the agent is to speak up (1-10), when the service reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaking_willingness: Option<u8>,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            speaking_willingness: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A lightweight `{id, name}` reference, used for dispatchers and reply authors
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AgentRef {
    pub id: String,
    pub name: String,
}

impl AgentRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl From<&Agent> for AgentRef {
    fn from(agent: &Agent) -> Self {
        Self::new(&agent.id, &agent.name)
    }
}

/// How the responding agent is chosen
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The user picks the agent
    #[default]
    Manual,
    /// The dispatcher picks the agent for every message
    Automatic,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Self::Manual => Self::Automatic,
            Self::Automatic => Self::Manual,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Automatic => write!(f, "automatic"),
        }
    }
}

/// Who wrote a turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Author {
    User,
    System,
    Agent(AgentRef),
    Dispatcher(AgentRef),
}

impl Author {
    /// Label shown next to the turn
    pub fn display_name(&self) -> &str {
        match self {
            Self::User => "You",
            Self::System => "System",
            Self::Agent(agent) | Self::Dispatcher(agent) => &agent.name,
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System)
    }
}

/// Kind carried by a next-speaker directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpeakerKind {
    Agent,
    User,
    /// Anything else the service sends; always terminal
    Other(String),
}

impl From<String> for SpeakerKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "agent" => Self::Agent,
            "user" => Self::User,
            _ => Self::Other(value),
        }
    }
}

impl From<SpeakerKind> for String {
    fn from(kind: SpeakerKind) -> Self {
        match kind {
            SpeakerKind::Agent => "agent".to_string(),
            SpeakerKind::User => "user".to_string(),
            SpeakerKind::Other(value) => value,
        }
    }
}

/// Service hint naming who should talk next
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextSpeaker {
    #[serde(rename = "type")]
    pub kind: SpeakerKind,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl NextSpeaker {
    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            kind: SpeakerKind::Agent,
            id: Some(id.into()),
            name: None,
        }
    }

    pub fn user() -> Self {
        Self {
            kind: SpeakerKind::User,
            id: Some("user".to_string()),
            name: None,
        }
    }

    /// The agent to continue with, if this directive asks for one.
    ///
    /// An `agent` directive without an id is treated as terminal.
    pub fn continuation_target(&self) -> Option<&str> {
        match self.kind {
            SpeakerKind::Agent => self.id.as_deref().filter(|id| !id.is_empty()),
            _ => None,
        }
    }
}

/// The message that was fed to the next-speaker detector
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputMessage {
    #[serde(default)]
    pub character_name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Diagnostic payload attached to a chat reply
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugInfo {
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub full_response: Option<String>,
    #[serde(default)]
    pub current_speaker: Option<AgentRef>,
    #[serde(default)]
    pub input_message: Option<InputMessage>,
}

/// Optional data trailing a turn
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatcher_analysis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_speaker: Option<NextSpeaker>,
}

/// One entry in the message log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub id: TurnId,
    pub author: Author,
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: TurnMeta,
}

impl Turn {
    fn new(author: Author, text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            author,
            text: text.into(),
            created_at: Utc::now(),
            meta: TurnMeta::default(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Author::User, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Author::System, text)
    }

    pub fn agent(agent: AgentRef, text: impl Into<String>) -> Self {
        Self::new(Author::Agent(agent), text)
    }

    pub fn dispatcher(dispatcher: AgentRef, text: impl Into<String>) -> Self {
        Self::new(Author::Dispatcher(dispatcher), text)
    }

    pub fn with_meta(mut self, meta: TurnMeta) -> Self {
        self.meta = meta;
        self
    }
}

/// Roster and dispatcher identities returned by `GET /agents`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentList {
    pub agents: Vec<Agent>,
    /// Dispatcher identity; a service may run without one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<AgentRef>,
    /// Next-speaker detector, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_dispatcher: Option<AgentRef>,
}

/// Outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub selected_agent: AgentRef,
    pub dispatcher_analysis: Option<String>,
}

/// Decoded `POST /chat` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatReply {
    pub response: String,
    pub agent: AgentRef,
    #[serde(default)]
    pub next_speaker: Option<NextSpeaker>,
    #[serde(default)]
    pub dispatcher_analysis: Option<String>,
    #[serde(default)]
    pub debug_info: Option<DebugInfo>,
}

impl ChatReply {
    pub fn new(agent: AgentRef, response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            agent,
            next_speaker: None,
            dispatcher_analysis: None,
            debug_info: None,
        }
    }

    pub fn with_next_speaker(mut self, next: NextSpeaker) -> Self {
        self.next_speaker = Some(next);
        self
    }

    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.dispatcher_analysis = Some(analysis.into());
        self
    }

    pub fn with_debug(mut self, debug: DebugInfo) -> Self {
        self.debug_info = Some(debug);
        self
    }
}

/// Decoded `POST /dispatch_next_speaker` response
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextSpeakerVerdict {
    #[serde(default)]
    pub next_speaker: Option<NextSpeaker>,
    #[serde(default)]
    pub dispatcher_analysis: Option<String>,
    #[serde(default)]
    pub debug_info: Option<DebugInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("hello");
        assert_eq!(turn.author, Author::User);
        assert_eq!(turn.text, "hello");
        assert_eq!(turn.meta, TurnMeta::default());

        let alice = AgentRef::new("a1", "Alice");
        let turn = Turn::agent(alice.clone(), "hi");
        assert_eq!(turn.author.display_name(), "Alice");
        assert_ne!(turn.id, Turn::agent(alice, "hi").id);
    }

    #[test]
    fn test_mode_toggle() {
        assert_eq!(Mode::default(), Mode::Manual);
        assert_eq!(Mode::Manual.toggled(), Mode::Automatic);
        assert_eq!(Mode::Automatic.toggled(), Mode::Manual);
        assert_eq!(Mode::Automatic.to_string(), "automatic");
    }

    #[test]
    fn test_next_speaker_kinds() {
        let next: NextSpeaker =
            serde_json::from_str(r#"{"type": "agent", "id": "a2", "name": "Bob"}"#).unwrap();
        assert_eq!(next.continuation_target(), Some("a2"));

        let next: NextSpeaker =
            serde_json::from_str(r#"{"type": "user", "id": "user", "name": "User"}"#).unwrap();
        assert_eq!(next.kind, SpeakerKind::User);
        assert_eq!(next.continuation_target(), None);

        let next: NextSpeaker = serde_json::from_str(r#"{"type": "narrator"}"#).unwrap();
        assert_eq!(next.kind, SpeakerKind::Other("narrator".to_string()));
        assert_eq!(next.continuation_target(), None);
    }

    #[test]
    fn test_agent_directive_without_id_is_terminal() {
        let next: NextSpeaker = serde_json::from_str(r#"{"type": "agent"}"#).unwrap();
        assert_eq!(next.continuation_target(), None);

        let next: NextSpeaker = serde_json::from_str(r#"{"type": "agent", "id": ""}"#).unwrap();
        assert_eq!(next.continuation_target(), None);
    }

    #[test]
    fn test_chat_reply_tolerates_missing_and_null_fields() {
        let reply: ChatReply = serde_json::from_str(
            r#"{"response": "hi", "agent": {"id": "a1", "name": "Alice"},
                "next_speaker": null, "dispatcher_analysis": null}"#,
        )
        .unwrap();
        assert_eq!(reply.response, "hi");
        assert!(reply.next_speaker.is_none());
        assert!(reply.debug_info.is_none());
    }

    #[test]
    fn test_debug_info_partial_payload() {
        let info: DebugInfo = serde_json::from_str(
            r#"{"analysis": "next is Bob", "input_message": {"character_name": "Alice"}}"#,
        )
        .unwrap();
        assert_eq!(info.analysis.as_deref(), Some("next is Bob"));
        assert!(info.full_response.is_none());
        assert_eq!(
            info.input_message.unwrap().character_name.as_deref(),
            Some("Alice")
        );
    }

    #[test]
    fn test_agent_list_with_extra_fields() {
        let list: AgentList = serde_json::from_str(
            r#"{
                "agents": [
                    {"id": "a1", "name": "Detective", "description": "Finds clues", "speaking_willingness": 5},
                    {"id": "a2", "name": "Witness"}
                ],
                "dispatcher": {"id": "d", "name": "Router", "description": "picks agents"},
                "character_dispatcher": {"id": "cd", "name": "Next speaker"}
            }"#,
        )
        .unwrap();
        assert_eq!(list.agents.len(), 2);
        assert_eq!(list.agents[0].speaking_willingness, Some(5));
        assert_eq!(list.agents[1].description, "");
        assert_eq!(list.dispatcher.unwrap().name, "Router");
        assert!(list.character_dispatcher.is_some());
    }
}
