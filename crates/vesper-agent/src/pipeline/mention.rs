//! Leading agent-mention extraction (`@name:` or `name:`) and re-targeting.
//!
//! This codebase hosts a single [`crate::runtime::AgentRuntime`] per process —
//! there is no multi-agent registry to re-target into. A mention is still
//! parsed and stripped so the agent sees a clean message and addressed-but-
//! unrecognized handles can be logged, but it can only ever resolve back to
//! the one configured identity.

/// Maximum length of a mention handle, in ASCII bytes.
const MAX_HANDLE_LEN: usize = 32;

/// Strip a leading `@name:` or `name:` mention from `content`.
///
/// Returns `(mention, rest)`: `mention` is the handle found (regardless of
/// whether it matches `agent_name`), `rest` is `content` with the matched
/// prefix and any following whitespace removed. When no valid mention is
/// present, returns `(None, content)` unchanged.
pub fn extract_mention<'a>(content: &'a str, agent_name: &str) -> (Option<String>, &'a str) {
    let trimmed = content.trim_start();
    let after_at = trimmed.strip_prefix('@').unwrap_or(trimmed);

    let Some(colon_idx) = after_at.find(':') else {
        return (None, content);
    };
    let candidate = &after_at[..colon_idx];
    if !is_valid_handle(candidate) {
        return (None, content);
    }
    // A real mention is followed by a space or nothing — `https://...`'s
    // `//` right after the colon rules it out as a handle-plus-message.
    let after_colon = &after_at[colon_idx + 1..];
    if !after_colon.is_empty() && !after_colon.starts_with(' ') {
        return (None, content);
    }

    let _ = agent_name;
    let rest = after_at[colon_idx + 1..].trim_start();
    (Some(candidate.to_string()), rest)
}

/// A handle is 1-32 ASCII alphanumeric/`-`/`_` characters — short enough that
/// stray sentence-initial words like "Note:" never pass the length+charset
/// gate by accident as long as they contain punctuation or spaces.
fn is_valid_handle(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.len() <= MAX_HANDLE_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_at_mention() {
        let (mention, rest) = extract_mention("@vesper: hello there", "vesper");
        assert_eq!(mention.as_deref(), Some("vesper"));
        assert_eq!(rest, "hello there");
    }

    #[test]
    fn strips_bare_mention() {
        let (mention, rest) = extract_mention("vesper: what's up", "vesper");
        assert_eq!(mention.as_deref(), Some("vesper"));
        assert_eq!(rest, "what's up");
    }

    #[test]
    fn unrecognized_handle_still_strips() {
        let (mention, rest) = extract_mention("@bob: hey", "vesper");
        assert_eq!(mention.as_deref(), Some("bob"));
        assert_eq!(rest, "hey");
    }

    #[test]
    fn no_mention_passes_through() {
        let (mention, rest) = extract_mention("just a normal message", "vesper");
        assert_eq!(mention, None);
        assert_eq!(rest, "just a normal message");
    }

    #[test]
    fn sentence_with_space_before_colon_is_not_a_mention() {
        let (mention, rest) = extract_mention("one thing : remember to check this", "vesper");
        assert_eq!(mention, None);
        assert_eq!(rest, "one thing : remember to check this");
    }

    #[test]
    fn url_is_not_a_mention() {
        let (mention, rest) = extract_mention("https://example.com/path", "vesper");
        assert_eq!(mention, None);
        assert_eq!(rest, "https://example.com/path");
    }
}
