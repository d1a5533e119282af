//! # switchboard
//!
//! Multi-provider LLM orchestration: automatic failover and retry, spend
//! governance, semantic response caching, and bounded conversation memory.
//!
//! ## Request lifecycle
//!
//! ```text
//!   prompt
//!     │
//!     ▼
//!  ┌──────────────┐  hit   ┌─────────────┐
//!  │ SemanticCache├───────▶│   caller    │
//!  └──────┬───────┘        └─────────────┘
//!         │ miss
//!         ▼
//!  ┌──────────────┐   ┌─────────┐   ┌───────────────┐
//!  │ Conversation │──▶│ Routing │──▶│ BudgetGovernor│
//!  └──────────────┘   └─────────┘   └──────┬────────┘
//!                                          ▼
//!                          ┌────────────────────────────┐
//!                          │ execute_with_fallback      │
//!                          │ (providers × retries)      │
//!                          └────────────────────────────┘
//! ```
//!
//! ## Modules
//! - `provider`: backend adapter contract + OpenAI-compatible client
//! - `orchestrator`: the engine composing everything above
//! - `conversation`: bounded multi-turn history with token accounting
//! - `budget`: rolling-window usage and cost ceilings
//! - `cache`: embedding-keyed response cache
//! - `routing`: keyword-based model selection
//! - `tools`: function-calling capability

pub mod budget;
pub mod cache;
pub mod conversation;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod routing;
pub mod tools;

pub use error::{OrchestratorError, ProviderError, ToolError};
pub use orchestrator::{Analytics, ChatRequest, Orchestrator, RequestRecord};
pub use provider::{
    ChatResponse, ChatStream, GenerationParams, Message, Provider, Role, WireMessage,
};
