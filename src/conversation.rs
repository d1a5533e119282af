//! Bounded multi-turn conversation history with token accounting.
//!
//! The window owns its messages: callers append, read, and clear, but a
//! retained message is never mutated. Overflow evicts oldest-first and the
//! running token total always equals the sum of known token counts of the
//! retained messages.

use serde::Serialize;

use crate::provider::{Message, Role, WireMessage};

/// Conversation window configuration.
#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Hard cap on retained messages; appends evict oldest-first past it.
    pub max_messages: usize,
    /// Context window of the target models, in tokens. Informational;
    /// reported in stats.
    pub context_window: u32,
    /// When enabled, appends past 80% of `max_messages` return a
    /// summarize hint. The window never summarizes on its own.
    pub summarize_old_messages: bool,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            context_window: 4096,
            summarize_old_messages: true,
        }
    }
}

/// Advisory returned by [`Conversation::push`]. Callers decide what to do
/// with it; the window itself takes no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowAdvice {
    None,
    /// The window is past 80% of its message limit and summarization of
    /// old messages is enabled.
    SummarizeSuggested,
}

/// Snapshot of conversation state for analytics.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationStats {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub system_messages: usize,
    pub total_tokens: u64,
    pub max_messages: usize,
    pub context_window: u32,
}

/// Ordered per-session message history with token accounting.
#[derive(Debug)]
pub struct Conversation {
    config: ConversationConfig,
    history: Vec<Message>,
    total_tokens: u64,
}

impl Conversation {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            config,
            history: Vec::new(),
            total_tokens: 0,
        }
    }

    /// Append a message, evicting oldest-first while the window is over
    /// its message limit.
    ///
    /// Tokens, when given, are added to the running total on append and
    /// subtracted again when the carrying message is evicted.
    pub fn push(
        &mut self,
        role: Role,
        content: impl Into<String>,
        tokens: Option<u32>,
    ) -> WindowAdvice {
        let message = match tokens {
            Some(t) => Message::with_tokens(role, content, t),
            None => Message::new(role, content),
        };
        if let Some(t) = message.tokens {
            self.total_tokens += u64::from(t);
        }
        self.history.push(message);

        while self.history.len() > self.config.max_messages {
            let removed = self.history.remove(0);
            if let Some(t) = removed.tokens {
                self.total_tokens = self.total_tokens.saturating_sub(u64::from(t));
            }
            tracing::debug!("evicted oldest message from conversation window");
        }

        if self.config.summarize_old_messages
            && self.history.len() as f64 > self.config.max_messages as f64 * 0.8
        {
            WindowAdvice::SummarizeSuggested
        } else {
            WindowAdvice::None
        }
    }

    /// The last `n` messages, or the full history when `n` is `None`.
    pub fn recent(&self, n: Option<usize>) -> &[Message] {
        match n {
            Some(n) if n < self.history.len() => &self.history[self.history.len() - n..],
            _ => &self.history,
        }
    }

    /// Project the history to `{role, content}` pairs for transmission.
    pub fn to_wire(&self) -> Vec<WireMessage> {
        self.history
            .iter()
            .map(|m| WireMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect()
    }

    /// Prepend a system message at position 0, bypassing the normal
    /// append/evict ordering.
    pub fn insert_system_prompt(&mut self, text: impl Into<String>) {
        self.history.insert(0, Message::new(Role::System, text));
        tracing::debug!("system prompt inserted at head of conversation");
    }

    /// Drop all history and reset the token total.
    pub fn clear(&mut self) {
        self.history.clear();
        self.total_tokens = 0;
        tracing::info!("conversation cleared");
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn stats(&self) -> ConversationStats {
        let count = |role: Role| self.history.iter().filter(|m| m.role == role).count();
        ConversationStats {
            total_messages: self.history.len(),
            user_messages: count(Role::User),
            assistant_messages: count(Role::Assistant),
            system_messages: count(Role::System),
            total_tokens: self.total_tokens,
            max_messages: self.config.max_messages,
            context_window: self.config.context_window,
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(ConversationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_window(max_messages: usize) -> Conversation {
        Conversation::new(ConversationConfig {
            max_messages,
            ..ConversationConfig::default()
        })
    }

    #[test]
    fn test_push_never_exceeds_max_messages() {
        let mut convo = small_window(3);
        for i in 0..10 {
            convo.push(Role::User, format!("message {i}"), Some(5));
            assert!(convo.len() <= 3);
        }
        // Oldest messages were evicted; the tail survives in order.
        let contents: Vec<&str> = convo.recent(None).iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["message 7", "message 8", "message 9"]);
    }

    #[test]
    fn test_token_total_tracks_retained_messages() {
        let mut convo = small_window(2);
        convo.push(Role::User, "a", Some(10));
        convo.push(Role::Assistant, "b", Some(20));
        assert_eq!(convo.total_tokens(), 30);

        // Evicts "a" (10 tokens).
        convo.push(Role::User, "c", Some(5));
        assert_eq!(convo.total_tokens(), 25);

        // Messages without counts do not disturb the total.
        convo.push(Role::Assistant, "d", None);
        let known: u64 = convo
            .recent(None)
            .iter()
            .filter_map(|m| m.tokens.map(u64::from))
            .sum();
        assert_eq!(convo.total_tokens(), known);
    }

    #[test]
    fn test_summarize_hint_past_threshold() {
        let mut convo = small_window(10);
        for i in 0..8 {
            let advice = convo.push(Role::User, format!("m{i}"), None);
            assert_eq!(advice, WindowAdvice::None, "no hint at {} messages", i + 1);
        }
        // Ninth message crosses 0.8 * 10.
        assert_eq!(
            convo.push(Role::User, "m8", None),
            WindowAdvice::SummarizeSuggested
        );
    }

    #[test]
    fn test_summarize_hint_disabled() {
        let mut convo = Conversation::new(ConversationConfig {
            max_messages: 4,
            summarize_old_messages: false,
            ..ConversationConfig::default()
        });
        for i in 0..6 {
            assert_eq!(convo.push(Role::User, format!("m{i}"), None), WindowAdvice::None);
        }
    }

    #[test]
    fn test_recent_returns_tail() {
        let mut convo = small_window(10);
        for i in 0..5 {
            convo.push(Role::User, format!("m{i}"), None);
        }
        let last_two = convo.recent(Some(2));
        assert_eq!(last_two.len(), 2);
        assert_eq!(last_two[0].content, "m3");
        assert_eq!(last_two[1].content, "m4");
        assert_eq!(convo.recent(Some(100)).len(), 5);
        assert_eq!(convo.recent(None).len(), 5);
    }

    #[test]
    fn test_to_wire_drops_metadata() {
        let mut convo = small_window(10);
        convo.push(Role::User, "hello", Some(42));
        let wire = convo.to_wire();
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0].role, Role::User);
        assert_eq!(wire[0].content, "hello");
        let json = serde_json::to_value(&wire[0]).unwrap();
        assert!(json.get("tokens").is_none());
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn test_insert_system_prompt_goes_first() {
        let mut convo = small_window(10);
        convo.push(Role::User, "question", None);
        convo.insert_system_prompt("be brief");
        let history = convo.recent(None);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, "be brief");
        assert_eq!(history[1].content, "question");
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut convo = small_window(10);
        convo.push(Role::User, "a", Some(7));
        convo.clear();
        assert!(convo.is_empty());
        assert_eq!(convo.total_tokens(), 0);
    }

    #[test]
    fn test_stats_counts_by_role() {
        let mut convo = small_window(10);
        convo.insert_system_prompt("sys");
        convo.push(Role::User, "u1", Some(3));
        convo.push(Role::Assistant, "a1", Some(4));
        convo.push(Role::User, "u2", None);

        let stats = convo.stats();
        assert_eq!(stats.total_messages, 4);
        assert_eq!(stats.user_messages, 2);
        assert_eq!(stats.assistant_messages, 1);
        assert_eq!(stats.system_messages, 1);
        assert_eq!(stats.total_tokens, 7);
        assert_eq!(stats.max_messages, 10);
    }
}
