//! Keyword-based model routing.
//!
//! A pure function of the prompt text and two static keyword tables. The
//! reasoning table is consulted first, then the simple-task table; the
//! fast tier is the default when neither matches.

/// Model used for reasoning-heavy prompts.
pub const REASONING_MODEL: &str = "deepseek-reasoner";

/// Default model for conversational and simple tasks.
pub const FAST_MODEL: &str = "deepseek-chat";

/// Substrings indicating the prompt needs multi-step reasoning.
const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "reason",
    "explain why",
    "compare",
    "evaluate",
    "which is better",
    "pros and cons",
    "calculate",
    "solve",
    "prove",
    "deduce",
];

/// Substrings indicating a simple transform the fast tier handles well.
const SIMPLE_KEYWORDS: &[&str] = &[
    "translate",
    "summarize",
    "list",
    "enumerate",
    "generate html",
    "json format",
];

/// Select a model for `prompt`. Case-insensitive substring match.
pub fn route(prompt: &str) -> &'static str {
    let lowered = prompt.to_lowercase();

    if REASONING_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        tracing::debug!("routing to {} (reasoning keywords)", REASONING_MODEL);
        return REASONING_MODEL;
    }

    if SIMPLE_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        tracing::debug!("routing to {} (simple-task keywords)", FAST_MODEL);
        return FAST_MODEL;
    }

    tracing::debug!("routing to {} (default)", FAST_MODEL);
    FAST_MODEL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_keywords_route_to_reasoning_tier() {
        assert_eq!(route("Please analyze this dataset"), REASONING_MODEL);
        assert_eq!(route("explain why the sky is blue"), REASONING_MODEL);
        assert_eq!(route("solve 2x + 3 = 7"), REASONING_MODEL);
    }

    #[test]
    fn test_routing_is_case_insensitive() {
        assert_eq!(route("ANALYZE the quarterly numbers"), REASONING_MODEL);
        assert_eq!(route("CoMpArE these two options"), REASONING_MODEL);
        assert_eq!(route("TRANSLATE this to French"), FAST_MODEL);
    }

    #[test]
    fn test_simple_keywords_route_to_fast_tier() {
        assert_eq!(route("translate hello into Spanish"), FAST_MODEL);
        assert_eq!(route("summarize this article"), FAST_MODEL);
    }

    #[test]
    fn test_reasoning_table_wins_over_simple_table() {
        // Matches both tables; the reasoning table is consulted first.
        assert_eq!(route("analyze and summarize this report"), REASONING_MODEL);
    }

    #[test]
    fn test_default_is_fast_tier() {
        assert_eq!(route("hello there"), FAST_MODEL);
        assert_eq!(route(""), FAST_MODEL);
    }
}
