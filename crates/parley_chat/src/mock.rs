//! Mock service client for testing.
//!
//! Provides a scriptable implementation of the `ServiceClient` trait that
//! records every call, so orchestrator behavior can be verified without a
//! running chat service.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::client::{ChatRequest, NextSpeakerRequest, ServiceClient};
use crate::error::{ChatError, ChatResult};
use crate::types::{AgentList, AgentRef, ChatReply, Dispatch, NextSpeakerVerdict};

/// Scripted outcome for a dispatch or chat call.
#[derive(Debug, Clone)]
pub enum MockOutcome<T> {
    Reply(T),
    Fail(String),
}

/// Captured call information for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCall {
    pub method: String,
    pub agent_id: Option<String>,
    pub message: Option<String>,
    pub smart_mode: bool,
    pub auto_continue: bool,
    pub reset_all: bool,
}

impl CapturedCall {
    fn new(method: &str) -> Self {
        Self {
            method: method.to_string(),
            agent_id: None,
            message: None,
            smart_mode: false,
            auto_continue: false,
            reset_all: false,
        }
    }
}

/// Mock chat service.
///
/// Dispatch and chat outcomes are consumed in order; an exhausted script
/// fails the call.
#[derive(Clone, Default)]
pub struct MockServiceClient {
    roster: Arc<RwLock<Option<AgentList>>>,
    reset_failure: Arc<RwLock<Option<String>>>,
    dispatches: Arc<RwLock<VecDeque<MockOutcome<Dispatch>>>>,
    replies: Arc<RwLock<VecDeque<MockOutcome<ChatReply>>>>,
    verdicts: Arc<RwLock<VecDeque<NextSpeakerVerdict>>>,
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl MockServiceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the roster returned by `list_agents`.
    pub fn with_roster(self, roster: AgentList) -> Self {
        *self.roster.write() = Some(roster);
        self
    }

    /// Make `reset_conversation` fail.
    pub fn fail_reset(self, message: impl Into<String>) -> Self {
        *self.reset_failure.write() = Some(message.into());
        self
    }

    /// Queue a successful dispatch selecting `agent`.
    pub fn add_dispatch(self, agent: AgentRef, analysis: Option<&str>) -> Self {
        self.dispatches.write().push_back(MockOutcome::Reply(Dispatch {
            selected_agent: agent,
            dispatcher_analysis: analysis.map(str::to_string),
        }));
        self
    }

    /// Queue a failing dispatch.
    pub fn fail_dispatch(self, message: impl Into<String>) -> Self {
        self.dispatches.write().push_back(MockOutcome::Fail(message.into()));
        self
    }

    /// Queue a chat reply.
    pub fn add_reply(self, reply: ChatReply) -> Self {
        self.replies.write().push_back(MockOutcome::Reply(reply));
        self
    }

    /// Queue a failing chat call.
    pub fn fail_chat(self, message: impl Into<String>) -> Self {
        self.replies.write().push_back(MockOutcome::Fail(message.into()));
        self
    }

    /// Queue a next-speaker verdict.
    pub fn add_verdict(self, verdict: NextSpeakerVerdict) -> Self {
        self.verdicts.write().push_back(verdict);
        self
    }

    /// Clear all captured calls.
    pub fn clear_calls(&self) {
        self.captured_calls.write().clear();
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.captured_calls.read().len()
    }

    /// Check if a specific method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.captured_calls.read().iter().any(|c| c.method == method)
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Chat and dispatch outcomes not consumed yet.
    pub fn pending(&self) -> usize {
        self.replies.read().len() + self.dispatches.read().len()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }
}

#[async_trait]
impl ServiceClient for MockServiceClient {
    async fn list_agents(&self) -> ChatResult<AgentList> {
        self.record_call(CapturedCall::new("list_agents"));
        let roster = self.roster.read().clone();
        roster.ok_or_else(|| ChatError::ServiceUnreachable("mock roster not configured".to_string()))
    }

    async fn reset_conversation(&self, agent_id: Option<&str>, reset_all: bool) -> ChatResult<()> {
        self.record_call(CapturedCall {
            agent_id: agent_id.map(str::to_string),
            reset_all,
            ..CapturedCall::new("reset_conversation")
        });
        let failure = self.reset_failure.read().clone();
        match failure {
            Some(msg) => Err(ChatError::ServiceUnreachable(msg)),
            None => Ok(()),
        }
    }

    async fn dispatch(&self, message: &str) -> ChatResult<Dispatch> {
        self.record_call(CapturedCall {
            message: Some(message.to_string()),
            ..CapturedCall::new("dispatch")
        });
        let next = self.dispatches.write().pop_front();
        match next {
            Some(MockOutcome::Reply(dispatch)) => Ok(dispatch),
            Some(MockOutcome::Fail(msg)) => Err(ChatError::DispatchFailed(msg)),
            None => Err(ChatError::DispatchFailed("no scripted dispatch".to_string())),
        }
    }

    async fn chat(&self, request: &ChatRequest) -> ChatResult<ChatReply> {
        self.record_call(CapturedCall {
            agent_id: Some(request.agent_id.clone()),
            message: Some(request.message.clone()),
            smart_mode: request.smart_mode,
            auto_continue: request.auto_continue,
            ..CapturedCall::new("chat")
        });
        let next = self.replies.write().pop_front();
        match next {
            Some(MockOutcome::Reply(reply)) => Ok(reply),
            Some(MockOutcome::Fail(msg)) => Err(ChatError::ChatFailed(msg)),
            None => Err(ChatError::ChatFailed("no scripted reply".to_string())),
        }
    }

    async fn dispatch_next_speaker(&self, request: &NextSpeakerRequest) -> ChatResult<NextSpeakerVerdict> {
        self.record_call(CapturedCall {
            agent_id: request.current_speaker_id.clone(),
            message: Some(request.character_message.clone()),
            ..CapturedCall::new("dispatch_next_speaker")
        });
        let next = self.verdicts.write().pop_front();
        Ok(next.unwrap_or_default())
    }
}
