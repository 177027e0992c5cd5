//! Explicit skill-invocation syntax: `!skill-name <url>`.
//!
//! A skill that declares `invoke` in its frontmatter binds itself to an HTTP
//! endpoint pattern and a host allowlist. A message matching the invocation
//! syntax skips classification and the tool loop entirely — it calls the
//! endpoint directly and returns the response body as the turn's content.

use regex::Regex;
use reqwest::Url;

use crate::tools::skill::SkillEntry;

/// A parsed `!skill-name <url>` invocation.
pub struct SkillInvocation {
    pub skill_name: String,
    pub url: String,
}

/// Parse a message for the explicit invocation syntax. Returns `None` when
/// `content` doesn't open with `!<name> <url>`.
pub fn parse_invocation(content: &str) -> Option<SkillInvocation> {
    let trimmed = content.trim_start();
    let after_bang = trimmed.strip_prefix('!')?;

    let mut parts = after_bang.splitn(2, char::is_whitespace);
    let skill_name = parts.next()?.trim();
    let url = parts.next()?.trim();

    if skill_name.is_empty() || url.is_empty() {
        return None;
    }
    if !skill_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return None;
    }

    Some(SkillInvocation {
        skill_name: skill_name.to_string(),
        url: url.to_string(),
    })
}

/// Execute a matched invocation against its bound skill: validate the target
/// host against the skill's allowlist and the URL path against its declared
/// endpoint regex, then issue the HTTP call and return the response body.
pub async fn execute(invocation: &SkillInvocation, skill: &SkillEntry) -> Result<String, String> {
    let Some(invoke) = &skill.meta.invoke else {
        return Err(format!(
            "skill '{}' has no invocation binding",
            skill.meta.name
        ));
    };

    let url = Url::parse(&invocation.url).map_err(|e| format!("invalid url: {e}"))?;

    let host = url.host_str().ok_or("url has no host")?;
    if !invoke.allowed_hosts.iter().any(|h| h == host) {
        return Err(format!("host '{host}' is not in the skill's allowlist"));
    }

    let pattern = Regex::new(&invoke.endpoint_pattern)
        .map_err(|e| format!("invalid endpoint pattern: {e}"))?;
    if !pattern.is_match(url.path()) {
        return Err(format!(
            "path '{}' does not match the skill's declared endpoint",
            url.path()
        ));
    }

    let resp = reqwest::get(url.clone())
        .await
        .map_err(|e| format!("request failed: {e}"))?;
    if !resp.status().is_success() {
        return Err(format!("endpoint returned {}", resp.status()));
    }
    resp.text().await.map_err(|e| format!("failed to read response: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bang_invocation() {
        let inv = parse_invocation("!weather https://api.example.com/v1/forecast").unwrap();
        assert_eq!(inv.skill_name, "weather");
        assert_eq!(inv.url, "https://api.example.com/v1/forecast");
    }

    #[test]
    fn rejects_missing_url() {
        assert!(parse_invocation("!weather").is_none());
    }

    #[test]
    fn rejects_non_bang_message() {
        assert!(parse_invocation("weather https://api.example.com/v1/forecast").is_none());
    }

    #[test]
    fn rejects_invalid_skill_name() {
        assert!(parse_invocation("!weather/oops https://api.example.com").is_none());
    }
}
