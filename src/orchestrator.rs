//! Orchestration engine: the end-to-end request lifecycle.
//!
//! Composes the conversation window, budget governor, semantic cache,
//! routing policy, and registered providers into one pipeline:
//!
//! ```text
//! request → cache probe → conversation append → route → budget check
//!         → execute-with-fallback (failover × retry)
//!         → optional tool-call round → conversation commit
//!         → cache store → usage record → analytics append
//! ```
//!
//! Provider trials are strictly sequential. One orchestrator instance
//! assumes a single logical caller; concurrent callers must serialize
//! externally.

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;

use crate::budget::{BudgetConfig, BudgetGovernor, BudgetUsage};
use crate::cache::{CacheConfig, CacheStats, Embedder, SemanticCache};
use crate::conversation::{Conversation, ConversationConfig, ConversationStats, WindowAdvice};
use crate::error::OrchestratorError;
use crate::provider::{ChatResponse, GenerationParams, Provider, Role, WireMessage};
use crate::routing;
use crate::tools::ToolRegistry;

/// Priority assigned by [`Orchestrator::register`] when none is given.
pub const DEFAULT_PRIORITY: i32 = 99;

/// One registered provider: adapter handle, priority, call counters.
struct ProviderSlot {
    provider: Arc<dyn Provider>,
    priority: i32,
    attempts: u64,
    successes: u64,
    failures: u64,
}

/// Per-provider counters exposed in the analytics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStats {
    pub name: String,
    pub priority: i32,
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Immutable analytics entry for one completed request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub prompt: String,
    pub model: String,
    pub provider: String,
    pub tokens: u32,
    pub cached: bool,
}

/// Options for a single [`Orchestrator::chat`] call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Explicit model; routed from the prompt when absent.
    pub model: Option<String>,
    pub use_conversation: bool,
    pub use_cache: bool,
    pub use_tools: bool,
    /// Attempts per provider before failing over. No backoff: a retry
    /// fires immediately.
    pub max_retries: u32,
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self {
            model: None,
            use_conversation: true,
            use_cache: true,
            use_tools: false,
            max_retries: 3,
        }
    }
}

/// Point-in-time view over everything the engine tracks.
#[derive(Debug, Clone, Serialize)]
pub struct Analytics {
    pub total_requests: usize,
    pub providers: Vec<ProviderStats>,
    pub budget: BudgetUsage,
    pub cache: CacheStats,
    pub conversation: ConversationStats,
    pub tools: Vec<String>,
}

/// Multi-provider chat orchestrator with failover, budget governance,
/// semantic caching, and bounded conversation memory.
pub struct Orchestrator {
    providers: Vec<ProviderSlot>,
    budget: BudgetGovernor,
    cache: SemanticCache,
    conversation: Conversation,
    tools: ToolRegistry,
    history: Vec<RequestRecord>,
}

impl Orchestrator {
    /// Default configuration, no embedding capability: the semantic cache
    /// runs disabled until one is supplied via [`Self::with_config`].
    pub fn new() -> Self {
        Self::with_config(
            BudgetConfig::default(),
            ConversationConfig::default(),
            CacheConfig::default(),
            None,
        )
    }

    pub fn with_config(
        budget: BudgetConfig,
        conversation: ConversationConfig,
        cache: CacheConfig,
        embedder: Option<Arc<dyn Embedder>>,
    ) -> Self {
        tracing::info!("orchestrator initialized");
        Self {
            providers: Vec::new(),
            budget: BudgetGovernor::new(budget),
            cache: SemanticCache::new(cache, embedder),
            conversation: Conversation::new(conversation),
            tools: ToolRegistry::new(),
            history: Vec::new(),
        }
    }

    /// Register a provider at [`DEFAULT_PRIORITY`].
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.register_with_priority(provider, DEFAULT_PRIORITY);
    }

    /// Register a provider; lower priority is tried first. Re-registering
    /// an existing name updates its handle and priority but keeps its
    /// counters.
    pub fn register_with_priority(&mut self, provider: Arc<dyn Provider>, priority: i32) {
        tracing::info!("registered provider {} (priority {})", provider.name(), priority);
        if let Some(slot) = self
            .providers
            .iter_mut()
            .find(|s| s.provider.name() == provider.name())
        {
            slot.provider = provider;
            slot.priority = priority;
        } else {
            self.providers.push(ProviderSlot {
                provider,
                priority,
                attempts: 0,
                successes: 0,
                failures: 0,
            });
        }
        self.providers.sort_by_key(|s| s.priority);
    }

    /// Registry of tools available for call resolution.
    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// Execute one chat request through the full pipeline.
    pub async fn chat(
        &mut self,
        prompt: &str,
        request: ChatRequest,
    ) -> Result<ChatResponse, OrchestratorError> {
        // Cache probe: a hit short-circuits the whole pipeline.
        if request.use_cache {
            if let Some(cached) = self.cache.get(prompt).await {
                return Ok(ChatResponse {
                    content: cached,
                    model: "cached".to_string(),
                    provider: "cache".to_string(),
                    tokens_used: 0,
                    cached: true,
                    tool_calls: None,
                });
            }
        }

        // Context prep. The user message is committed here; a downstream
        // failure does not roll it back.
        let messages = if request.use_conversation {
            if self.conversation.push(Role::User, prompt, None) == WindowAdvice::SummarizeSuggested
            {
                tracing::info!("conversation window near capacity, summarization advised");
            }
            self.conversation.to_wire()
        } else {
            vec![WireMessage::user(prompt)]
        };

        let model = request
            .model
            .clone()
            .unwrap_or_else(|| routing::route(prompt).to_string());

        let estimated = estimate_tokens(prompt);
        self.budget.check(estimated, &model)?;

        let mut params = GenerationParams::new(model.clone());
        if request.use_tools && !self.tools.is_empty() {
            params.tools = Some(self.tools.specs());
        }

        let mut response = self
            .execute_with_fallback(&messages, &params, request.max_retries)
            .await?;

        // At most one tool-call resolution round; no recursive chaining.
        if !self.tools.is_empty() {
            if let Some(calls) = response.tool_calls.clone().filter(|c| !c.is_empty()) {
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    results.push(self.tools.execute(call).await?);
                }
                let serialized = serde_json::to_string(&results)
                    .unwrap_or_else(|_| "[]".to_string());
                self.conversation
                    .push(Role::Assistant, response.content.clone(), None);
                self.conversation
                    .push(Role::System, format!("Tool result: {serialized}"), None);
                let messages = self.conversation.to_wire();
                response = self
                    .execute_with_fallback(&messages, &params, request.max_retries)
                    .await?;
            }
        }

        if request.use_conversation {
            self.conversation
                .push(Role::Assistant, response.content.clone(), Some(response.tokens_used));
        }

        if request.use_cache && !response.cached {
            self.cache.put(prompt, &response.content).await;
        }

        self.budget.record(u64::from(response.tokens_used), &model);

        self.history.push(RequestRecord {
            prompt: prompt.to_string(),
            model,
            provider: response.provider.clone(),
            tokens: response.tokens_used,
            cached: response.cached,
        });

        Ok(response)
    }

    /// Try providers in priority order, up to `max_retries` immediate
    /// attempts each, returning the first success.
    ///
    /// Unavailable providers are skipped without consuming attempts.
    /// Transient errors are absorbed here and only convert to
    /// [`OrchestratorError::AllProvidersFailed`] once the list is
    /// exhausted.
    pub async fn execute_with_fallback(
        &mut self,
        messages: &[WireMessage],
        params: &GenerationParams,
        max_retries: u32,
    ) -> Result<ChatResponse, OrchestratorError> {
        if self.providers.is_empty() {
            return Err(OrchestratorError::NoProvidersRegistered);
        }

        for slot in &mut self.providers {
            let name = slot.provider.name().to_string();

            if !slot.provider.is_available().await {
                tracing::warn!("{} unavailable, skipping", name);
                continue;
            }

            for attempt in 1..=max_retries {
                slot.attempts += 1;
                tracing::debug!("attempt {}/{} with {}", attempt, max_retries, name);

                match slot.provider.chat(messages, params).await {
                    Ok(response) => {
                        slot.successes += 1;
                        tracing::info!("{} succeeded on attempt {}", name, attempt);
                        return Ok(response);
                    }
                    Err(e) => {
                        slot.failures += 1;
                        tracing::warn!("{} failed on attempt {}: {}", name, attempt, e);
                    }
                }
            }
            tracing::error!("{} exhausted after {} attempts, failing over", name, max_retries);
        }

        Err(OrchestratorError::AllProvidersFailed)
    }

    /// Streaming chat: fragments are forwarded to the caller as they
    /// arrive while the full text accumulates for the context commit.
    ///
    /// Providers are tried in priority order without a retry budget. A
    /// mid-stream failure abandons that provider — fragments already
    /// delivered are not retracted — and restarts from the next one. The
    /// stream ends with `AllProvidersFailed` only once every provider has
    /// been tried.
    pub fn chat_stream(
        &mut self,
        prompt: &str,
        model: Option<String>,
        use_conversation: bool,
    ) -> BoxStream<'_, Result<String, OrchestratorError>> {
        let prompt = prompt.to_string();
        Box::pin(try_stream! {
            let messages = if use_conversation {
                self.conversation.push(Role::User, prompt.clone(), None);
                self.conversation.to_wire()
            } else {
                vec![WireMessage::user(prompt.clone())]
            };

            let model = model.unwrap_or_else(|| routing::route(&prompt).to_string());
            let params = GenerationParams::new(model);

            let mut succeeded = false;
            for idx in 0..self.providers.len() {
                let provider = self.providers[idx].provider.clone();
                let name = provider.name().to_string();

                if !provider.is_available().await {
                    tracing::warn!("{} unavailable, skipping", name);
                    continue;
                }

                let mut fragments = match provider.stream(&messages, &params).await {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::warn!("{} failed to open stream: {}", name, e);
                        continue;
                    }
                };

                let mut accumulated = String::new();
                let mut failed = false;
                while let Some(fragment) = fragments.next().await {
                    match fragment {
                        Ok(text) => {
                            accumulated.push_str(&text);
                            yield text;
                        }
                        Err(e) => {
                            tracing::warn!("{} failed mid-stream: {}", name, e);
                            failed = true;
                            break;
                        }
                    }
                }

                if !failed {
                    if use_conversation {
                        self.conversation.push(Role::Assistant, accumulated, None);
                    }
                    succeeded = true;
                    break;
                }
                // Delivered fragments stand; restart from the next provider.
            }

            if !succeeded {
                Err(OrchestratorError::AllProvidersFailed)?;
            }
        })
    }

    /// Snapshot of counters, budget usage, cache and conversation state.
    pub fn analytics(&self) -> Analytics {
        Analytics {
            total_requests: self.history.len(),
            providers: self
                .providers
                .iter()
                .map(|s| ProviderStats {
                    name: s.provider.name().to_string(),
                    priority: s.priority,
                    attempts: s.attempts,
                    successes: s.successes,
                    failures: s.failures,
                })
                .collect(),
            budget: self.budget.usage(),
            cache: self.cache.stats(),
            conversation: self.conversation.stats(),
            tools: self.tools.names(),
        }
    }

    /// Completed-request records, oldest first.
    pub fn request_history(&self) -> &[RequestRecord] {
        &self.history
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn reset_conversation(&mut self) {
        self.conversation.clear();
    }

    /// Prepend a system prompt to the conversation window.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.conversation.insert_system_prompt(text);
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// Rough token estimate for budget pre-checks: twice the word count.
/// Actual consumption comes back from the provider and is what gets
/// recorded.
fn estimate_tokens(prompt: &str) -> u64 {
    prompt.split_whitespace().count() as u64 * 2
}
