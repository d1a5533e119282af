//! Error taxonomy for the orchestration engine.
//!
//! Two layers: [`ProviderError`] covers failures inside a single backend
//! call and is absorbed by failover/retry, while [`OrchestratorError`] is
//! what the engine surfaces to its caller once no recovery is left.

use thiserror::Error;

use crate::budget::BudgetError;

/// Failure of a single backend call.
///
/// Every variant is transient from the engine's viewpoint: the failover
/// loop retries and advances to the next provider, and only converts to
/// [`OrchestratorError::AllProvidersFailed`] once the whole provider list
/// is exhausted.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("api error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse provider response: {0}")]
    Parse(String),

    #[error("stream interrupted: {0}")]
    Stream(String),
}

/// Failure raised by a tool during call resolution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments for tool {tool}: {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("tool {tool} failed: {message}")]
    Execution { tool: String, message: String },
}

/// Terminal errors surfaced to the orchestrator's caller.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The request would cross a configured spend ceiling. Raised before
    /// any provider is called; nothing has been spent.
    #[error("budget exceeded: {0}")]
    BudgetExceeded(#[from] BudgetError),

    /// Every registered provider was tried (retries included) and none
    /// served the request.
    #[error("all providers failed; check connectivity and API keys")]
    AllProvidersFailed,

    /// The provider list is empty. Distinct from [`Self::AllProvidersFailed`]
    /// so callers can tell misconfiguration from a live outage.
    #[error("no providers registered")]
    NoProvidersRegistered,

    /// A tool failed mid-resolution. The conversation keeps the messages
    /// committed before the failure; nothing is rolled back.
    #[error(transparent)]
    Tool(#[from] ToolError),
}
