//! # parley_chat - Multi-agent conversation front end
//!
//! This crate drives a conversation with a remote multi-agent chat service:
//! - Manual mode: the user picks which agent answers
//! - Automatic mode: a dispatcher agent routes each message
//! - Agents may hand the floor to each other through delayed continuations
//! - Dispatcher reasoning and per-turn debug data go to a separate trace area
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐  events   ┌─────────────────┐
//! │ TurnOrchestrator│──────────▶│    Renderer     │
//! └───┬────────┬────┘           └─────────────────┘
//!     │        │
//!     ▼        ▼
//! ┌────────┐ ┌──────────────┐   ┌─────────────────┐
//! │ Session│ │ MessageLog + │   │  ServiceClient  │──▶ HTTP service
//! │  State │ │   TraceLog   │   │ (http / mock)   │
//! └────────┘ └──────────────┘   └─────────────────┘
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod log;
pub mod session;
pub mod client;
pub mod mock;
pub mod events;
pub mod trace;
pub mod orchestrator;

pub use types::*;
pub use error::*;
pub use config::*;
pub use log::*;
pub use session::*;
pub use client::*;
pub use mock::*;
pub use events::*;
pub use trace::*;
pub use orchestrator::*;
