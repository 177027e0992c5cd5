//! Message classification — picks a model tier before the request ever
//! reaches a provider, so trivial messages never pay for a full model call.
//!
//! Five tiers, checked in order: `reflex` short-circuits with a canned
//! reply and never touches a provider; `simple` and `complex` route to the
//! cheap or the extended-context model respectively; `standard` is the
//! default; `voice` is reserved for a future opt-in input channel and is
//! never selected by `classify` itself.

use serde::Serialize;

/// Which model tier a message was routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Reflex,
    Simple,
    Complex,
    Standard,
    Voice,
}

/// Outcome of `classify`: which tier, which model (if any), and whether the
/// reflex tier already has the full reply.
#[derive(Debug, Clone)]
pub struct Classification {
    pub tier: Tier,
    pub model: Option<String>,
    pub response: Option<String>,
    pub extended_context: bool,
}

/// Canned greetings that never need a model round-trip. Matched against the
/// lowercased, trimmed message text.
const REFLEX_TABLE: &[(&str, &str)] = &[
    ("hi", "Hey! What's up?"),
    ("hello", "Hello! How can I help?"),
    ("hey", "Hey there!"),
    ("thanks", "You're welcome."),
    ("thank you", "You're welcome."),
    ("ok", "Got it."),
    ("okay", "Got it."),
    ("yo", "Yo!"),
    ("sup", "Not much, what's up?"),
];

/// Time/schedule-style phrases that route to the fast model without
/// needing the full word-count threshold.
const SIMPLE_PATTERNS: &[&str] = &[
    "what time",
    "what day",
    "what's the date",
    "what is the date",
    "remind me",
    "set a reminder",
    "what's on my schedule",
    "what is on my schedule",
];

/// Phrases signalling the message needs the primary model with more room
/// to reason, regardless of length.
const COMPLEX_PATTERNS: &[&str] = &[
    "analyse",
    "analyze",
    "strategy",
    "compare",
    "summarize",
    "summarise",
    "explain in detail",
    "write a plan",
    "pros and cons",
    "trade-off",
    "tradeoff",
];

/// Classify a message into a routing tier.
///
/// `fast_model` and `primary_model` are the currently configured model IDs
/// for those slots (`fast` may be unset, in which case `simple` falls back
/// to the primary model).
pub fn classify(text: &str, fast_model: Option<&str>, primary_model: &str) -> Classification {
    let normalized = text.trim().to_lowercase();
    let normalized = normalized.trim_end_matches(['.', '!', '?']);

    if let Some((_, reply)) = REFLEX_TABLE.iter().find(|(greeting, _)| *greeting == normalized) {
        return Classification {
            tier: Tier::Reflex,
            model: None,
            response: Some(reply.to_string()),
            extended_context: false,
        };
    }

    let word_count = text.split_whitespace().count();
    let lower = text.to_lowercase();

    if COMPLEX_PATTERNS.iter().any(|p| lower.contains(p)) || word_count > 50 {
        return Classification {
            tier: Tier::Complex,
            model: Some(primary_model.to_string()),
            response: None,
            extended_context: true,
        };
    }

    if SIMPLE_PATTERNS.iter().any(|p| lower.contains(p)) || word_count <= 5 {
        return Classification {
            tier: Tier::Simple,
            model: Some(fast_model.unwrap_or(primary_model).to_string()),
            response: None,
            extended_context: false,
        };
    }

    Classification {
        tier: Tier::Standard,
        model: Some(primary_model.to_string()),
        response: None,
        extended_context: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reflex_matches_exact_greeting() {
        let c = classify("Hi!", Some("fast-model"), "primary-model");
        assert_eq!(c.tier, Tier::Reflex);
        assert!(c.response.is_some());
        assert!(c.model.is_none());
    }

    #[test]
    fn simple_routes_to_fast_model_for_short_message() {
        let c = classify("what's next", Some("fast-model"), "primary-model");
        assert_eq!(c.tier, Tier::Simple);
        assert_eq!(c.model.as_deref(), Some("fast-model"));
    }

    #[test]
    fn simple_falls_back_to_primary_without_fast_model() {
        let c = classify("ping", None, "primary-model");
        assert_eq!(c.tier, Tier::Simple);
        assert_eq!(c.model.as_deref(), Some("primary-model"));
    }

    #[test]
    fn complex_pattern_wins_regardless_of_length() {
        let c = classify("compare these two options", Some("fast-model"), "primary-model");
        assert_eq!(c.tier, Tier::Complex);
        assert!(c.extended_context);
        assert_eq!(c.model.as_deref(), Some("primary-model"));
    }

    #[test]
    fn long_message_without_pattern_is_complex() {
        let long_msg = "word ".repeat(51);
        let c = classify(&long_msg, Some("fast-model"), "primary-model");
        assert_eq!(c.tier, Tier::Complex);
    }

    #[test]
    fn mid_length_plain_message_is_standard() {
        let c = classify(
            "Can you take a look at the file I uploaded yesterday and tell me what's in it",
            Some("fast-model"),
            "primary-model",
        );
        assert_eq!(c.tier, Tier::Standard);
        assert_eq!(c.model.as_deref(), Some("primary-model"));
    }
}
