//! Remote service client.
//!
//! Thin typed wrapper over the chat service's JSON endpoints. Responses are
//! decoded once here; callers never see untyped JSON. No call is retried.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{ChatError, ChatResult};
use crate::types::{AgentList, AgentRef, ChatReply, Dispatch, NextSpeakerVerdict};

/// Body of `POST /chat`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub smart_mode: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_continue: bool,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent_id: agent_id.into(),
            smart_mode: false,
            auto_continue: false,
        }
    }

    pub fn smart_mode(mut self, enabled: bool) -> Self {
        self.smart_mode = enabled;
        self
    }

    pub fn auto_continue(mut self, enabled: bool) -> Self {
        self.auto_continue = enabled;
        self
    }
}

/// Body of `POST /dispatch_next_speaker`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NextSpeakerRequest {
    pub character_name: String,
    pub character_message: String,
    pub current_speaker_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ResetRequest<'a> {
    agent_id: Option<&'a str>,
    reset_all: bool,
}

#[derive(Debug, Serialize)]
struct DispatchRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    #[serde(default)]
    selected_agent: Option<AgentRef>,
    #[serde(default)]
    dispatcher_analysis: Option<String>,
}

/// Operations the orchestrator needs from the chat service.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Fetch the selectable roster and the dispatcher identity.
    async fn list_agents(&self) -> ChatResult<AgentList>;

    /// Clear server-side history for one agent, or for everything.
    async fn reset_conversation(&self, agent_id: Option<&str>, reset_all: bool) -> ChatResult<()>;

    /// Ask the dispatcher which agent should answer `message`.
    async fn dispatch(&self, message: &str) -> ChatResult<Dispatch>;

    /// Exchange one message with an agent.
    async fn chat(&self, request: &ChatRequest) -> ChatResult<ChatReply>;

    /// Ask the next-speaker detector who should follow an agent's message.
    async fn dispatch_next_speaker(&self, request: &NextSpeakerRequest) -> ChatResult<NextSpeakerVerdict>;
}

/// `ServiceClient` over HTTP.
pub struct HttpServiceClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpServiceClient {
    pub fn new(config: &ClientConfig) -> ChatResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, String> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {}: {}", status, body));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, String> {
        debug!(path, "GET");
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;
        Self::read_json(response).await
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response, String> {
        debug!(path, "POST");
        self.client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))
    }

    async fn post_json<R: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<R, String> {
        let response = self.post(path, body).await?;
        Self::read_json(response).await
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    async fn list_agents(&self) -> ChatResult<AgentList> {
        self.get_json("/agents")
            .await
            .map_err(ChatError::ServiceUnreachable)
    }

    async fn reset_conversation(&self, agent_id: Option<&str>, reset_all: bool) -> ChatResult<()> {
        let response = self
            .post("/reset_conversation", &ResetRequest { agent_id, reset_all })
            .await
            .map_err(ChatError::ServiceUnreachable)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::ServiceUnreachable(format!("HTTP {}: {}", status, body)));
        }
        Ok(())
    }

    async fn dispatch(&self, message: &str) -> ChatResult<Dispatch> {
        let response: DispatchResponse = self
            .post_json("/dispatch", &DispatchRequest { message })
            .await
            .map_err(ChatError::DispatchFailed)?;

        let selected_agent = response
            .selected_agent
            .ok_or_else(|| ChatError::DispatchFailed("dispatcher selected no agent".to_string()))?;

        Ok(Dispatch {
            selected_agent,
            dispatcher_analysis: response.dispatcher_analysis,
        })
    }

    async fn chat(&self, request: &ChatRequest) -> ChatResult<ChatReply> {
        self.post_json("/chat", request)
            .await
            .map_err(ChatError::ChatFailed)
    }

    async fn dispatch_next_speaker(&self, request: &NextSpeakerRequest) -> ChatResult<NextSpeakerVerdict> {
        self.post_json("/dispatch_next_speaker", request)
            .await
            .map_err(ChatError::DispatchFailed)
    }
}
