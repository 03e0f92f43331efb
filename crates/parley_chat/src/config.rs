//! Client and orchestrator configuration.
//!
//! Everything is optional in the TOML file; missing keys fall back to the
//! defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, ChatResult};

/// Default service address (the chat service's development server)
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5000";

/// Prompt sent to an agent that continues the conversation on its own
pub const DEFAULT_CONTINUATION_PROMPT: &str = "Please reply to the conversation above.";

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the chat service
    pub base_url: String,
    /// Per-request timeout in seconds (0 = no timeout)
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 60,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

/// Turn orchestration tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Pause before an automatic continuation turn, in milliseconds
    pub continuation_delay_ms: u64,
    /// Maximum automatic turns after one user message (0 = unbounded)
    pub max_chain_depth: usize,
    /// Stop a chain when a speaker hands off to the same agent twice
    pub stop_on_cycle: bool,
    /// Text sent to continuing agents in place of a user message
    pub continuation_prompt: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            continuation_delay_ms: 1000,
            max_chain_depth: 8,
            stop_on_cycle: true,
            continuation_prompt: DEFAULT_CONTINUATION_PROMPT.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn continuation_delay(&self) -> Duration {
        Duration::from_millis(self.continuation_delay_ms)
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.continuation_delay_ms = ms;
        self
    }

    pub fn with_max_chain_depth(mut self, depth: usize) -> Self {
        self.max_chain_depth = depth;
        self
    }

    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.stop_on_cycle = enabled;
        self
    }
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParleyConfig {
    pub client: ClientConfig,
    pub orchestrator: OrchestratorConfig,
}

impl ParleyConfig {
    pub fn from_toml_str(content: &str) -> ChatResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> ChatResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.client.base_url = url;
        }
        self
    }
}
