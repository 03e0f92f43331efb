//! Turn orchestrator.
//!
//! Owns the session state, the message log and the trace area, and is the
//! only writer of all three. One exchange runs at a time: `&mut self` on
//! every transition rules out overlapping submissions.
//!
//! ```text
//!            user message
//!   Idle ──────────────────▶ AwaitingDispatch ──▶ AwaitingChat
//!    ▲   (manual) ───────────────────────────────▶     │
//!    │                                                  ▼
//!    └──────── no next agent / failure ◀──── AwaitingContinuation ⟲
//! ```
//!
//! Delayed continuations carry the generation token that was current when
//! the exchange started; cancelling bumps the generation so a pending
//! continuation stops without touching state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::client::{ChatRequest, NextSpeakerRequest, ServiceClient};
use crate::config::OrchestratorConfig;
use crate::error::{ChatError, ChatResult};
use crate::events::{ConversationEvent, EventSink, TypingIndicator};
use crate::log::MessageLog;
use crate::session::{ResetScope, SessionState};
use crate::trace::{TraceLog, TracePresenter};
use crate::types::{
    Agent, AgentRef, Author, ChatReply, Mode, NextSpeaker, NextSpeakerVerdict, SpeakerKind, Turn,
    TurnMeta,
};

const AUTOMATIC_ANNOUNCEMENT: &str =
    "Smart selection is on. I'll pick the most suitable agent for each of your questions.";
const MANUAL_ANNOUNCEMENT: &str = "Back to manual selection. Pick the agent you want to talk to.";
const CHOOSING_NOTICE: &str = "Choosing the best agent to answer you...";
const SELECT_AGENT_FIRST: &str = "Please select an agent first.";
const RESET_DONE: &str = "Conversation reset.";
const ROSTER_ERROR: &str = "Unable to load the agent list. Please try again later.";
const DISPATCH_ERROR: &str = "Something went wrong while choosing an agent. Please try again later.";
const CHAT_ERROR: &str = "Sorry, something went wrong. Please try again later.";
const RESET_ERROR: &str = "Failed to reset the conversation. Please try again later.";
const DETECTION_ERROR: &str = "Unable to detect the next speaker. Please try again later.";
const CYCLE_NOTICE: &str = "Automatic conversation stopped: the agents started going in circles.";

fn greeting(name: &str) -> String {
    format!("I'm {}. How can I help you?", name)
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TurnState {
    #[default]
    Idle,
    /// Waiting for the dispatcher (automatic mode only)
    AwaitingDispatch,
    /// Waiting for an agent reply to the user's message
    AwaitingChat,
    /// Running an automatic continuation turn
    AwaitingContinuation,
}

/// Why a continuation chain ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainEnd {
    /// The last reply named no next speaker
    NoNextSpeaker,
    /// The service handed the floor back to the user
    HandedToUser,
    /// `max_chain_depth` continuations were issued
    DepthLimit,
    /// A speaker handed off to the same agent a second time
    Cycle,
    /// A continuation call failed
    ContinuationFailed,
    /// The chain was cancelled while pending
    Cancelled,
}

/// Result of one user-submitted exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Blank input, nothing happened
    Ignored,
    /// Manual mode with no current agent
    NoAgentSelected,
    /// Dispatch or chat failed; an error turn was appended
    Failed { kind: &'static str },
    /// The agent replied, possibly followed by automatic turns
    Completed { continuations: usize, end: ChainEnd },
}

/// Cancels pending continuations from outside the orchestrator
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    generation: Arc<AtomicU64>,
    wake: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    fn token(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

/// Conversation state machine over a `ServiceClient`
pub struct TurnOrchestrator<C: ServiceClient> {
    client: C,
    config: OrchestratorConfig,
    session: SessionState,
    log: MessageLog,
    trace: TraceLog,
    typing: TypingIndicator,
    sink: EventSink,
    state: TurnState,
    cancel: CancelHandle,
}

impl<C: ServiceClient> TurnOrchestrator<C> {
    pub fn new(client: C, config: OrchestratorConfig) -> Self {
        Self {
            client,
            config,
            session: SessionState::new(),
            log: MessageLog::new(),
            trace: TraceLog::new(),
            typing: TypingIndicator::new(),
            sink: EventSink::disconnected(),
            state: TurnState::Idle,
            cancel: CancelHandle::default(),
        }
    }

    /// Forward conversation events to `sink`
    pub fn with_events(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn typing(&self) -> &TypingIndicator {
        &self.typing
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Fetch the roster and greet with the first agent.
    ///
    /// On failure the error is also surfaced as a system turn and the
    /// orchestrator stays usable.
    pub async fn initialize(&mut self) -> ChatResult<()> {
        let fetched = {
            let _typing = self.typing.show(&self.sink);
            self.client.list_agents().await
        };

        match fetched.and_then(|list| self.session.install_roster(list)) {
            Ok(agent) => {
                info!(agents = self.session.roster().len(), current = %agent.id, "roster loaded");
                self.append(Turn::agent(AgentRef::from(&agent), greeting(&agent.name)));
                Ok(())
            }
            Err(err) => {
                let err = ChatError::RosterUnavailable(match err {
                    ChatError::RosterUnavailable(msg) => msg,
                    other => other.to_string(),
                });
                self.surface_error(&err, ROSTER_ERROR);
                Err(err)
            }
        }
    }

    /// Switch selection mode and announce who is responsible now.
    pub fn set_mode(&mut self, mode: Mode) {
        self.session.set_mode(mode);
        info!(%mode, "mode changed");
        self.sink.emit(ConversationEvent::ModeChanged(mode));

        let announcement = match mode {
            Mode::Automatic => Turn::dispatcher(self.session.dispatcher_or_default(), AUTOMATIC_ANNOUNCEMENT),
            Mode::Manual => Turn::system(MANUAL_ANNOUNCEMENT),
        };
        self.append(announcement);
    }

    pub fn toggle_mode(&mut self) -> Mode {
        let mode = self.session.mode().toggled();
        self.set_mode(mode);
        mode
    }

    /// Pick the agent to talk to in manual mode.
    pub fn select_agent(&mut self, agent_id: &str) -> ChatResult<Agent> {
        match self.session.select(agent_id) {
            Ok(agent) => {
                info!(agent = %agent.id, "agent selected");
                self.append(Turn::agent(AgentRef::from(&agent), greeting(&agent.name)));
                Ok(agent)
            }
            Err(err) => {
                let text = match self.session.mode() {
                    Mode::Automatic => "Agents can only be picked in manual mode.".to_string(),
                    Mode::Manual => format!("There is no agent with id '{}'.", agent_id),
                };
                self.surface_error(&err, &text);
                Err(err)
            }
        }
    }

    /// Clear server-side history for the current scope, then greet again.
    pub async fn reset(&mut self) -> ChatResult<ResetScope> {
        let scope = match self.session.reset_scope() {
            Ok(scope) => scope,
            Err(err) => {
                self.surface_error(&err, SELECT_AGENT_FIRST);
                return Err(err);
            }
        };

        let result = {
            let (agent_id, reset_all) = scope.as_request();
            let _typing = self.typing.show(&self.sink);
            self.client.reset_conversation(agent_id, reset_all).await
        };

        match result {
            Ok(()) => {
                info!(?scope, "conversation reset");
                self.append(Turn::system(RESET_DONE));
                self.greet_active_speaker();
                Ok(scope)
            }
            Err(err) => {
                self.surface_error(&err, RESET_ERROR);
                Err(err)
            }
        }
    }

    /// Run one user exchange, including any automatic continuation chain.
    pub async fn send_message(&mut self, text: &str) -> ExchangeOutcome {
        let message = text.trim();
        if message.is_empty() {
            return ExchangeOutcome::Ignored;
        }

        let token = self.cancel.token();
        let outcome = self.exchange(message, token).await;
        self.transition(TurnState::Idle);
        info!(?outcome, "exchange finished");
        outcome
    }

    /// Ask the next-speaker detector about the latest agent turn.
    ///
    /// Purely diagnostic: the verdict goes to the trace area, the log only
    /// gains a turn if the call fails.
    pub async fn probe_next_speaker(&mut self) -> ChatResult<NextSpeakerVerdict> {
        let last = self.log.iter().rev().find_map(|turn| match &turn.author {
            Author::Agent(agent) => Some((agent.clone(), turn.text.clone())),
            _ => None,
        });
        let Some((speaker, message)) = last else {
            let err = ChatError::InvalidAgentSelection("no agent has spoken yet".to_string());
            self.surface_error(&err, "No agent has spoken yet.");
            return Err(err);
        };

        let request = NextSpeakerRequest {
            character_name: speaker.name,
            character_message: message,
            current_speaker_id: Some(speaker.id),
        };
        let result = {
            let _typing = self.typing.show(&self.sink);
            self.client.dispatch_next_speaker(&request).await
        };

        match result {
            Ok(verdict) => {
                self.push_trace(TracePresenter::detection_headline(
                    verdict.dispatcher_analysis.as_deref(),
                ));
                if let Some(info) = &verdict.debug_info {
                    self.push_trace(TracePresenter::render_debug(info));
                }
                Ok(verdict)
            }
            Err(err) => {
                self.surface_error(&err, DETECTION_ERROR);
                Err(err)
            }
        }
    }

    async fn exchange(&mut self, message: &str, token: u64) -> ExchangeOutcome {
        self.append(Turn::user(message));

        let request = match self.session.mode() {
            Mode::Automatic => {
                self.append(Turn::dispatcher(self.session.dispatcher_or_default(), CHOOSING_NOTICE));
                self.transition(TurnState::AwaitingDispatch);

                let dispatched = {
                    let _typing = self.typing.show(&self.sink);
                    self.client.dispatch(message).await
                };
                let dispatch = match dispatched {
                    Ok(dispatch) => dispatch,
                    Err(err) => {
                        self.surface_error(&err, DISPATCH_ERROR);
                        return ExchangeOutcome::Failed { kind: err.kind() };
                    }
                };

                debug!(agent = %dispatch.selected_agent.id, "dispatcher selected agent");
                self.push_trace(TracePresenter::routing_headline(
                    dispatch.dispatcher_analysis.as_deref(),
                ));
                ChatRequest::new(message, dispatch.selected_agent.id)
                    .smart_mode(true)
                    .auto_continue(true)
            }
            Mode::Manual => {
                let current = self.session.current_agent().map(|a| a.id.clone());
                let Some(agent_id) = current else {
                    self.append(Turn::system(SELECT_AGENT_FIRST));
                    return ExchangeOutcome::NoAgentSelected;
                };
                ChatRequest::new(message, agent_id).auto_continue(true)
            }
        };

        self.transition(TurnState::AwaitingChat);
        let chatted = {
            let _typing = self.typing.show(&self.sink);
            self.client.chat(&request).await
        };
        let reply = match chatted {
            Ok(reply) => reply,
            Err(err) => {
                self.surface_error(&err, CHAT_ERROR);
                return ExchangeOutcome::Failed { kind: err.kind() };
            }
        };

        let speaker = reply.agent.id.clone();
        let next = self.record_reply(reply);
        let (continuations, end) = self.run_chain(token, speaker, next).await;
        ExchangeOutcome::Completed { continuations, end }
    }

    async fn run_chain(
        &mut self,
        token: u64,
        mut speaker: String,
        mut next: Option<NextSpeaker>,
    ) -> (usize, ChainEnd) {
        let mut handoffs: HashSet<(String, String)> = HashSet::new();
        let mut continuations = 0;

        loop {
            let target = match next.as_ref() {
                Some(directive) => match directive.continuation_target() {
                    Some(id) => id.to_string(),
                    None if directive.kind == SpeakerKind::User => {
                        return (continuations, ChainEnd::HandedToUser)
                    }
                    None => return (continuations, ChainEnd::NoNextSpeaker),
                },
                None => return (continuations, ChainEnd::NoNextSpeaker),
            };

            let max_depth = self.config.max_chain_depth;
            if max_depth > 0 && continuations >= max_depth {
                warn!(max_depth, "continuation chain hit its depth limit");
                self.append(Turn::system(format!(
                    "Automatic conversation stopped after {} agent turns.",
                    max_depth
                )));
                return (continuations, ChainEnd::DepthLimit);
            }

            if self.config.stop_on_cycle && !handoffs.insert((speaker.clone(), target.clone())) {
                warn!(from = %speaker, to = %target, "continuation cycle detected");
                self.append(Turn::system(CYCLE_NOTICE));
                return (continuations, ChainEnd::Cycle);
            }

            self.transition(TurnState::AwaitingContinuation);
            if !self.wait_for_continuation(token).await {
                debug!(target = %target, "pending continuation cancelled");
                return (continuations, ChainEnd::Cancelled);
            }

            let request = ChatRequest::new(self.config.continuation_prompt.clone(), &target)
                .auto_continue(true);
            let result = {
                let _typing = self.typing.show(&self.sink);
                self.client.chat(&request).await
            };

            if self.is_stale(token) {
                debug!(target = %target, "dropping reply of a cancelled continuation");
                return (continuations, ChainEnd::Cancelled);
            }

            let reply = match result {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(error = %err, target = %target, "continuation failed, ending chain");
                    return (continuations, ChainEnd::ContinuationFailed);
                }
            };

            continuations += 1;
            speaker = reply.agent.id.clone();
            next = self.record_reply(reply);
        }
    }

    async fn wait_for_continuation(&self, token: u64) -> bool {
        if self.is_stale(token) {
            return false;
        }

        let wake = Arc::clone(&self.cancel.wake);
        tokio::select! {
            _ = tokio::time::sleep(self.config.continuation_delay()) => {}
            _ = wake.notified() => {}
        }
        !self.is_stale(token)
    }

    fn is_stale(&self, token: u64) -> bool {
        self.cancel.token() != token
    }

    /// Append an agent reply and render its diagnostics.
    fn record_reply(&mut self, reply: ChatReply) -> Option<NextSpeaker> {
        let ChatReply {
            response,
            agent,
            next_speaker,
            dispatcher_analysis,
            debug_info,
        } = reply;

        let headline = next_speaker
            .as_ref()
            .map(|_| TracePresenter::detection_headline(dispatcher_analysis.as_deref()));
        let debug_block = debug_info.as_ref().map(TracePresenter::render_debug);

        let meta = TurnMeta {
            dispatcher_analysis,
            debug_info,
            next_speaker: next_speaker.clone(),
        };
        self.append(Turn::agent(agent, response).with_meta(meta));

        if let Some(headline) = headline {
            self.push_trace(headline);
        }
        if let Some(block) = debug_block {
            self.push_trace(block);
        }
        next_speaker
    }

    fn greet_active_speaker(&mut self) {
        let turn = match self.session.mode() {
            Mode::Automatic => {
                let dispatcher = self.session.dispatcher_or_default();
                let text = greeting(&dispatcher.name);
                Turn::dispatcher(dispatcher, text)
            }
            Mode::Manual => match self.session.current_agent() {
                Some(agent) => Turn::agent(AgentRef::from(agent), greeting(&agent.name)),
                None => return,
            },
        };
        self.append(turn);
    }

    fn append(&mut self, turn: Turn) {
        self.sink.emit(ConversationEvent::TurnAppended(turn.clone()));
        self.log.append(turn);
    }

    fn push_trace(&mut self, entry: String) {
        self.sink.emit(ConversationEvent::Trace(entry.clone()));
        self.trace.push(entry);
    }

    fn surface_error(&mut self, err: &ChatError, text: &str) {
        warn!(error = %err, kind = err.kind(), "recovered conversation error");
        self.append(Turn::system(text));
    }

    fn transition(&mut self, next: TurnState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "turn state");
            self.state = next;
            self.sink.emit(ConversationEvent::StateChanged(next));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockServiceClient;
    use crate::types::{AgentList, DebugInfo};

    fn alice() -> AgentRef {
        AgentRef::new("a1", "Alice")
    }

    fn bob() -> AgentRef {
        AgentRef::new("a2", "Bob")
    }

    fn carol() -> AgentRef {
        AgentRef::new("a3", "Carol")
    }

    fn roster() -> AgentList {
        AgentList {
            agents: vec![
                Agent::new("a1", "Alice").with_description("detective"),
                Agent::new("a2", "Bob").with_description("suspect"),
                Agent::new("a3", "Carol").with_description("witness"),
            ],
            dispatcher: Some(AgentRef::new("d", "Router")),
            character_dispatcher: None,
        }
    }

    fn orchestrator(client: MockServiceClient) -> TurnOrchestrator<MockServiceClient> {
        TurnOrchestrator::new(client, OrchestratorConfig::default().with_delay_ms(0))
    }

    async fn ready(client: MockServiceClient) -> TurnOrchestrator<MockServiceClient> {
        let mut orch = orchestrator(client.with_roster(roster()));
        orch.initialize().await.unwrap();
        orch.client().clear_calls();
        orch
    }

    #[tokio::test]
    async fn test_initialize_selects_first_agent() {
        let mut orch = orchestrator(MockServiceClient::new().with_roster(roster()));
        orch.initialize().await.unwrap();

        assert_eq!(orch.session().current_agent().unwrap().id, "a1");
        assert_eq!(orch.log().len(), 1);
        let greeting = orch.log().last().unwrap();
        assert_eq!(greeting.author, Author::Agent(alice()));
        assert!(greeting.text.contains("Alice"));
        assert!(!orch.typing().is_visible());
    }

    #[tokio::test]
    async fn test_initialize_failure_is_surfaced() {
        let mut orch = orchestrator(MockServiceClient::new());

        let err = orch.initialize().await.unwrap_err();
        assert!(matches!(err, ChatError::RosterUnavailable(_)));
        assert_eq!(orch.log().len(), 1);
        assert!(orch.log().last().unwrap().author.is_system());
        assert!(!orch.typing().is_visible());

        // Still usable: a message is answered with a hint instead of a crash
        assert_eq!(orch.send_message("hello").await, ExchangeOutcome::NoAgentSelected);
        assert!(!orch.client().was_called("chat"));
    }

    #[tokio::test]
    async fn test_initialize_empty_roster() {
        let empty = AgentList {
            agents: vec![],
            dispatcher: Some(AgentRef::new("d", "Router")),
            character_dispatcher: None,
        };
        let mut orch = orchestrator(MockServiceClient::new().with_roster(empty));

        assert!(matches!(
            orch.initialize().await,
            Err(ChatError::RosterUnavailable(_))
        ));
        assert_eq!(orch.log().system_count(), 1);
        assert!(orch.session().current_agent().is_none());
    }

    #[tokio::test]
    async fn test_mode_toggle_announces_without_network() {
        let mut orch = ready(MockServiceClient::new()).await;
        let mark = orch.log().len();

        orch.set_mode(Mode::Automatic);
        let added = orch.log().since(mark);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].author, Author::Dispatcher(AgentRef::new("d", "Router")));

        let mark = orch.log().len();
        assert_eq!(orch.toggle_mode(), Mode::Manual);
        let added = orch.log().since(mark);
        assert_eq!(added.len(), 1);
        assert!(added[0].author.is_system());

        assert_eq!(orch.client().call_count(), 0);
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_manual_round_trip() {
        let client = MockServiceClient::new().add_reply(ChatReply::new(alice(), "hi"));
        let mut orch = ready(client).await;
        let mark = orch.log().len();

        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 0, end: ChainEnd::NoNextSpeaker }
        );

        let added = orch.log().since(mark);
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].author, Author::User);
        assert_eq!(added[0].text, "hello");
        assert_eq!(added[1].author, Author::Agent(alice()));
        assert_eq!(added[1].text, "hi");

        let calls = orch.client().get_method_calls("chat");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].agent_id.as_deref(), Some("a1"));
        assert!(calls[0].auto_continue);
        assert!(!calls[0].smart_mode);

        // No diagnostics in the reply, so nothing reaches the trace area
        assert!(orch.trace().is_empty());
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(!orch.typing().is_visible());
    }

    #[tokio::test]
    async fn test_single_continuation() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "hi").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "hello from Bob"));
        let mut orch = ready(client).await;
        let mark = orch.log().len();

        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 1, end: ChainEnd::NoNextSpeaker }
        );

        let calls = orch.client().get_method_calls("chat");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].agent_id.as_deref(), Some("a2"));
        assert_eq!(
            calls[1].message.as_deref(),
            Some(orch.config().continuation_prompt.as_str())
        );
        assert!(calls[1].auto_continue);

        let authors: Vec<_> = orch.log().since(mark).iter().map(|t| t.author.clone()).collect();
        assert_eq!(authors, vec![Author::User, Author::Agent(alice()), Author::Agent(bob())]);
    }

    #[tokio::test]
    async fn test_long_chain_follows_same_contract() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "one").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "two").with_next_speaker(NextSpeaker::agent("a3")))
            .add_reply(ChatReply::new(carol(), "three").with_next_speaker(NextSpeaker::agent("a1")))
            .add_reply(ChatReply::new(alice(), "four"));
        let mut orch = ready(client).await;
        let mark = orch.log().len();

        let outcome = orch.send_message("start").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 3, end: ChainEnd::NoNextSpeaker }
        );

        let targets: Vec<_> = orch
            .client()
            .get_method_calls("chat")
            .into_iter()
            .map(|c| c.agent_id.unwrap())
            .collect();
        assert_eq!(targets, vec!["a1", "a2", "a3", "a1"]);

        let texts: Vec<_> = orch.log().since(mark).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["start", "one", "two", "three", "four"]);
        assert_eq!(orch.client().pending(), 0);
    }

    #[tokio::test]
    async fn test_handed_back_to_user() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "your turn").with_next_speaker(NextSpeaker::user()));
        let mut orch = ready(client).await;

        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 0, end: ChainEnd::HandedToUser }
        );
        assert_eq!(orch.client().get_method_calls("chat").len(), 1);
    }

    #[tokio::test]
    async fn test_automatic_round_trip() {
        let client = MockServiceClient::new()
            .add_dispatch(bob(), Some("Bob knows the alibi"))
            .add_reply(ChatReply::new(bob(), "I was home"));
        let mut orch = ready(client).await;
        orch.set_mode(Mode::Automatic);
        let mark = orch.log().len();

        let outcome = orch.send_message("where were you?").await;
        assert!(matches!(outcome, ExchangeOutcome::Completed { continuations: 0, .. }));

        let chat = &orch.client().get_method_calls("chat")[0];
        assert_eq!(chat.agent_id.as_deref(), Some("a2"));
        assert!(chat.smart_mode);
        assert!(chat.auto_continue);

        let added = orch.log().since(mark);
        assert_eq!(added.len(), 3);
        assert_eq!(added[0].author, Author::User);
        assert!(matches!(added[1].author, Author::Dispatcher(_)));
        assert_eq!(added[2].author, Author::Agent(bob()));

        // Routing analysis is shown even though nobody follows up
        assert_eq!(orch.trace().len(), 1);
        assert!(orch.trace().entries()[0].contains("Bob knows the alibi"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_aborts_before_chat() {
        let client = MockServiceClient::new()
            .fail_dispatch("dispatcher down")
            .add_reply(ChatReply::new(alice(), "never sent"));
        let mut orch = ready(client).await;
        orch.set_mode(Mode::Automatic);
        let mark = orch.log().len();

        let outcome = orch.send_message("hello").await;
        assert_eq!(outcome, ExchangeOutcome::Failed { kind: "dispatch_failed" });

        assert!(!orch.client().was_called("chat"));
        let errors = orch.log().since(mark).iter().filter(|t| t.author.is_system()).count();
        assert_eq!(errors, 1);
        assert!(!orch.typing().is_visible());
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_chat_failure_is_surfaced() {
        let client = MockServiceClient::new().fail_chat("boom");
        let mut orch = ready(client).await;
        let mark = orch.log().len();

        let outcome = orch.send_message("hello").await;
        assert_eq!(outcome, ExchangeOutcome::Failed { kind: "chat_failed" });

        let added = orch.log().since(mark);
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].author, Author::User);
        assert!(added[1].author.is_system());
        assert!(!orch.typing().is_visible());
    }

    #[tokio::test]
    async fn test_continuation_failure_stops_silently() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "hi").with_next_speaker(NextSpeaker::agent("a2")))
            .fail_chat("Bob unavailable");
        let mut orch = ready(client).await;
        let mark = orch.log().len();

        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 0, end: ChainEnd::ContinuationFailed }
        );

        // Already-appended turns stay, no error turn for the continuation
        let added = orch.log().since(mark);
        assert_eq!(added.len(), 2);
        assert_eq!(added[1].text, "hi");
        assert!(!orch.typing().is_visible());
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_depth_limit_ends_chain() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "1").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "2").with_next_speaker(NextSpeaker::agent("a1")))
            .add_reply(ChatReply::new(alice(), "3").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "never"));
        let config = OrchestratorConfig::default()
            .with_delay_ms(0)
            .with_max_chain_depth(2)
            .with_cycle_detection(false);
        let mut orch = TurnOrchestrator::new(client.with_roster(roster()), config);
        orch.initialize().await.unwrap();

        let outcome = orch.send_message("go").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 2, end: ChainEnd::DepthLimit }
        );
        assert_eq!(orch.client().get_method_calls("chat").len(), 3);
        assert!(orch.log().last().unwrap().author.is_system());
    }

    #[tokio::test]
    async fn test_cycle_detection_ends_chain() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "1").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "2").with_next_speaker(NextSpeaker::agent("a1")))
            .add_reply(ChatReply::new(alice(), "3").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "never"));
        let mut orch = ready(client).await;

        let outcome = orch.send_message("go").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 2, end: ChainEnd::Cycle }
        );
        assert_eq!(orch.client().pending(), 1);
        assert_eq!(orch.log().last().unwrap().text, CYCLE_NOTICE);
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_continuation() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "hi").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "too late"));
        let config = OrchestratorConfig::default().with_delay_ms(60_000);
        let mut orch = TurnOrchestrator::new(client.with_roster(roster()), config);
        orch.initialize().await.unwrap();

        let handle = orch.cancel_handle();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            handle.cancel();
        });

        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 0, end: ChainEnd::Cancelled }
        );
        assert_eq!(orch.client().get_method_calls("chat").len(), 1);
        assert_eq!(orch.state(), TurnState::Idle);
    }

    /// Delegates to a mock but cancels the chain while the `nth` chat call
    /// is still in flight.
    struct CancelDuringChat {
        inner: MockServiceClient,
        handle: parking_lot::Mutex<Option<CancelHandle>>,
        nth: usize,
    }

    #[async_trait::async_trait]
    impl ServiceClient for CancelDuringChat {
        async fn list_agents(&self) -> ChatResult<AgentList> {
            self.inner.list_agents().await
        }

        async fn reset_conversation(&self, agent_id: Option<&str>, reset_all: bool) -> ChatResult<()> {
            self.inner.reset_conversation(agent_id, reset_all).await
        }

        async fn dispatch(&self, message: &str) -> ChatResult<crate::types::Dispatch> {
            self.inner.dispatch(message).await
        }

        async fn chat(&self, request: &ChatRequest) -> ChatResult<ChatReply> {
            let reply = self.inner.chat(request).await;
            if self.inner.get_method_calls("chat").len() == self.nth {
                let handle = self.handle.lock().clone();
                if let Some(handle) = handle {
                    handle.cancel();
                }
            }
            reply
        }

        async fn dispatch_next_speaker(&self, request: &NextSpeakerRequest) -> ChatResult<NextSpeakerVerdict> {
            self.inner.dispatch_next_speaker(request).await
        }
    }

    #[tokio::test]
    async fn test_cancel_during_continuation_drops_reply() {
        let inner = MockServiceClient::new()
            .with_roster(roster())
            .add_reply(ChatReply::new(alice(), "hi").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "dropped").with_next_speaker(NextSpeaker::agent("a3")))
            .add_reply(ChatReply::new(carol(), "never asked"));
        let client = CancelDuringChat {
            inner: inner.clone(),
            handle: parking_lot::Mutex::new(None),
            nth: 2,
        };
        let mut orch = TurnOrchestrator::new(client, OrchestratorConfig::default().with_delay_ms(0));
        *orch.client().handle.lock() = Some(orch.cancel_handle());
        orch.initialize().await.unwrap();
        let mark = orch.log().len();

        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 0, end: ChainEnd::Cancelled }
        );

        let texts: Vec<_> = orch.log().since(mark).iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "hi"]);
        assert_eq!(inner.get_method_calls("chat").len(), 2);
        assert_eq!(inner.pending(), 1);
        assert!(!orch.typing().is_visible());
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_cancel_before_exchange_does_not_affect_it() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "hi").with_next_speaker(NextSpeaker::agent("a2")))
            .add_reply(ChatReply::new(bob(), "still here"));
        let mut orch = ready(client).await;

        orch.cancel_handle().cancel();
        let outcome = orch.send_message("hello").await;
        assert_eq!(
            outcome,
            ExchangeOutcome::Completed { continuations: 1, end: ChainEnd::NoNextSpeaker }
        );
    }

    #[tokio::test]
    async fn test_reset_scoping() {
        let mut orch = ready(MockServiceClient::new()).await;

        assert_eq!(orch.reset().await.unwrap(), ResetScope::Agent("a1".to_string()));
        orch.set_mode(Mode::Automatic);
        assert_eq!(orch.reset().await.unwrap(), ResetScope::All);

        let calls = orch.client().get_method_calls("reset_conversation");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].agent_id.as_deref(), Some("a1"));
        assert!(!calls[0].reset_all);
        assert_eq!(calls[1].agent_id, None);
        assert!(calls[1].reset_all);

        // Confirmation followed by the dispatcher's greeting
        let turns = orch.log().turns();
        let n = turns.len();
        assert_eq!(turns[n - 2].text, RESET_DONE);
        assert!(matches!(turns[n - 1].author, Author::Dispatcher(_)));
    }

    #[tokio::test]
    async fn test_reset_failure_is_surfaced() {
        let mut orch = ready(MockServiceClient::new().fail_reset("offline")).await;
        let mark = orch.log().len();

        assert!(matches!(orch.reset().await, Err(ChatError::ServiceUnreachable(_))));
        let added = orch.log().since(mark);
        assert_eq!(added.len(), 1);
        assert!(added[0].author.is_system());
        assert!(!orch.typing().is_visible());
    }

    #[tokio::test]
    async fn test_select_agent() {
        let mut orch = ready(MockServiceClient::new()).await;

        let agent = orch.select_agent("a3").unwrap();
        assert_eq!(agent.name, "Carol");
        assert_eq!(orch.log().last().unwrap().author, Author::Agent(carol()));

        let mark = orch.log().len();
        assert!(matches!(
            orch.select_agent("ghost"),
            Err(ChatError::InvalidAgentSelection(_))
        ));
        assert_eq!(orch.session().current_agent().unwrap().id, "a3");
        assert_eq!(orch.log().since(mark).len(), 1);

        orch.set_mode(Mode::Automatic);
        assert!(orch.select_agent("a1").is_err());
        assert_eq!(orch.client().call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_message_ignored() {
        let mut orch = ready(MockServiceClient::new()).await;
        let before = orch.log().len();

        assert_eq!(orch.send_message("   ").await, ExchangeOutcome::Ignored);
        assert_eq!(orch.log().len(), before);
        assert_eq!(orch.client().call_count(), 0);
    }

    #[tokio::test]
    async fn test_debug_info_reaches_trace() {
        let debug = DebugInfo {
            analysis: Some("Bob was accused".to_string()),
            full_response: Some("Bob".to_string()),
            ..DebugInfo::default()
        };
        let client = MockServiceClient::new().add_reply(
            ChatReply::new(alice(), "Bob did it")
                .with_next_speaker(NextSpeaker::user())
                .with_analysis("Bob was accused")
                .with_debug(debug.clone()),
        );
        let mut orch = ready(client).await;

        orch.send_message("who did it?").await;

        assert_eq!(orch.trace().len(), 2);
        assert!(orch.trace().entries()[0].contains("Next speaker detection"));
        assert!(orch.trace().entries()[1].contains("Bob was accused"));
        assert_eq!(orch.log().last().unwrap().meta.debug_info, Some(debug));
    }

    #[tokio::test]
    async fn test_probe_next_speaker() {
        let client = MockServiceClient::new()
            .add_reply(ChatReply::new(alice(), "Carol, what did you see?"))
            .add_verdict(NextSpeakerVerdict {
                next_speaker: Some(NextSpeaker::agent("a3")),
                dispatcher_analysis: Some("Carol was addressed".to_string()),
                debug_info: None,
            });
        let mut orch = ready(client).await;
        orch.send_message("ask Carol").await;
        let before = orch.log().len();

        let verdict = orch.probe_next_speaker().await.unwrap();
        assert_eq!(verdict.next_speaker.unwrap().continuation_target(), Some("a3"));
        assert_eq!(orch.log().len(), before);
        assert!(orch.trace().entries()[0].contains("Carol was addressed"));

        let call = &orch.client().get_method_calls("dispatch_next_speaker")[0];
        assert_eq!(call.agent_id.as_deref(), Some("a1"));
        assert_eq!(call.message.as_deref(), Some("Carol, what did you see?"));
    }

    #[tokio::test]
    async fn test_probe_without_agent_turn() {
        let mut orch = orchestrator(MockServiceClient::new());
        assert!(orch.probe_next_speaker().await.is_err());
        assert!(!orch.client().was_called("dispatch_next_speaker"));
        assert_eq!(orch.log().system_count(), 1);
    }

    #[tokio::test]
    async fn test_events_follow_log_order() {
        let (sink, mut rx) = EventSink::channel();
        let client = MockServiceClient::new()
            .with_roster(roster())
            .add_reply(ChatReply::new(alice(), "hi"));
        let mut orch = orchestrator(client).with_events(sink);
        orch.initialize().await.unwrap();
        orch.send_message("hello").await;

        let mut turns = Vec::new();
        let mut typing = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                ConversationEvent::TurnAppended(turn) => turns.push(turn.text),
                ConversationEvent::Typing(visible) => typing.push(visible),
                _ => {}
            }
        }

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[1], "hello");
        assert_eq!(turns[2], "hi");
        assert_eq!(typing, vec![true, false, true, false]);
    }
}
