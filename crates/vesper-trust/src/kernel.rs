//! Trust Kernel — parses a markdown constitution (`## Hard Rules`,
//! `## Soft Rules`, `## Forbidden Actions`) and gates actions against it.
//!
//! The check is deliberately simple: a fixed, small set of sensitive
//! keywords. If an action's description and a Hard/Forbidden rule both
//! mention the same keyword, the action is blocked. Soft rules are never
//! blocking — they exist to bias prompt behaviour, exposed via
//! `soft_rules()` for injection into the agent's system prompt.

use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Keywords that mark an action as sensitive enough to check against Hard
/// and Forbidden rules. Deliberately small and fixed rather than configurable
/// — the point is a simple, auditable gate, not a general classifier.
pub const SENSITIVE_KEYWORDS: &[&str] = &[
    "delete",
    "send money",
    "share",
    "impersonate",
    "secret",
    "password",
    "api key",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl TrustDecision {
    fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    fn block(reason: String) -> Self {
        Self { allowed: false, reason: Some(reason) }
    }
}

struct Constitution {
    raw: String,
    hard_rules: Vec<String>,
    soft_rules: Vec<String>,
    forbidden: Vec<String>,
}

impl Constitution {
    fn parse(raw: &str) -> Self {
        let mut hard_rules = Vec::new();
        let mut soft_rules = Vec::new();
        let mut forbidden = Vec::new();
        let mut current: Option<&mut Vec<String>> = None;

        for line in raw.lines() {
            let trimmed = line.trim();
            let lower = trimmed.to_ascii_lowercase();
            if trimmed.starts_with('#') {
                current = if lower.contains("hard rule") {
                    Some(&mut hard_rules)
                } else if lower.contains("soft rule") {
                    Some(&mut soft_rules)
                } else if lower.contains("forbidden") {
                    Some(&mut forbidden)
                } else {
                    None
                };
                continue;
            }
            let item = trimmed.trim_start_matches(['-', '*']).trim();
            if item.is_empty() {
                continue;
            }
            if let Some(bucket) = current.as_deref_mut() {
                bucket.push(item.to_string());
            }
        }

        Self {
            raw: raw.to_string(),
            hard_rules,
            soft_rules,
            forbidden,
        }
    }
}

pub struct TrustKernel {
    constitution: RwLock<Constitution>,
}

impl TrustKernel {
    /// Load the constitution from `path`. The document is read once at
    /// startup; runtime changes require an out-of-process restart — the
    /// kernel never writes to it.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(Self {
            constitution: RwLock::new(Constitution::parse(&raw)),
        })
    }

    pub fn from_str(raw: &str) -> Self {
        Self {
            constitution: RwLock::new(Constitution::parse(raw)),
        }
    }

    /// Check whether `action` (a natural-language description of what's
    /// about to happen) is allowed under the Hard and Forbidden rules.
    pub fn check(&self, action: &str) -> TrustDecision {
        let action_lower = action.to_ascii_lowercase();
        let c = self.constitution.read().unwrap();

        for rule in c.forbidden.iter().chain(c.hard_rules.iter()) {
            let rule_lower = rule.to_ascii_lowercase();
            for keyword in SENSITIVE_KEYWORDS {
                if action_lower.contains(keyword) && rule_lower.contains(keyword) {
                    return TrustDecision::block(format!(
                        "blocked by rule: \"{rule}\" (matched keyword \"{keyword}\")"
                    ));
                }
            }
        }
        TrustDecision::allow()
    }

    /// Advisory rules, for injection into the agent's system prompt.
    pub fn soft_rules(&self) -> Vec<String> {
        self.constitution.read().unwrap().soft_rules.clone()
    }

    /// Raw document text, for injection into the agent's system prompt.
    pub fn context(&self) -> String {
        self.constitution.read().unwrap().raw.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# Constitution

## Hard Rules
- Never delete a user's files without an explicit confirmation
- Never share a password with anyone

## Soft Rules
- Prefer concise answers

## Forbidden Actions
- Never send money on the user's behalf without approval
";

    #[test]
    fn blocks_matching_hard_rule() {
        let kernel = TrustKernel::from_str(DOC);
        let decision = kernel.check("delete all files in /home/user");
        assert!(!decision.allowed);
        assert!(decision.reason.unwrap().contains("delete"));
    }

    #[test]
    fn blocks_matching_forbidden_action() {
        let kernel = TrustKernel::from_str(DOC);
        let decision = kernel.check("send money to this account");
        assert!(!decision.allowed);
    }

    #[test]
    fn allows_unrelated_action() {
        let kernel = TrustKernel::from_str(DOC);
        let decision = kernel.check("summarise today's weather");
        assert!(decision.allowed);
    }

    #[test]
    fn soft_rules_never_block() {
        let kernel = TrustKernel::from_str(DOC);
        // "concise" isn't a sensitive keyword, so even mentioning it can't block.
        let decision = kernel.check("write a concise password reminder");
        // Still blocked, but by the Hard Rule on "password", not the Soft Rule.
        assert!(!decision.allowed);
        assert_eq!(kernel.soft_rules(), vec!["Prefer concise answers".to_string()]);
    }

    #[test]
    fn context_returns_raw_document() {
        let kernel = TrustKernel::from_str(DOC);
        assert!(kernel.context().contains("Constitution"));
    }
}
