//! Asynchronous knowledge/graph extraction, triggered from the request path
//! but never awaited by it: both entry points spawn a detached task and
//! return immediately.
//!
//! Extraction needs a "fast-tier model completion" call, but this crate
//! can't depend on `vesper-agent` (which depends on it) — so the completion
//! call is abstracted behind `FastCompletion`, implemented by the agent
//! crate's router and handed in by the caller.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::graph::GraphStore;
use crate::knowledge::KnowledgeStore;
use crate::types::{KnowledgeType, MemorySource};

const KNOWLEDGE_TRIGGER_LEN: usize = 30;
const GRAPH_TRIGGER_LEN: usize = 40;
const CONTEXT_TRUNCATE: usize = 800;
const MESSAGE_TRUNCATE: usize = 1_000;

#[async_trait]
pub trait FastCompletion: Send + Sync {
    async fn complete_fast(&self, prompt: &str) -> std::result::Result<String, String>;
}

fn is_trivial_greeting(message: &str) -> bool {
    let lower = message.trim().to_lowercase();
    matches!(
        lower.as_str(),
        "hi" | "hello" | "hey" | "thanks" | "thank you" | "ok" | "okay" | "yo" | "sup"
    )
}

/// Spawn detached knowledge extraction for a qualifying user message.
pub fn spawn_knowledge_extraction(
    store: Arc<KnowledgeStore>,
    completion: Arc<dyn FastCompletion>,
    existing_context: String,
    message: String,
) {
    if message.len() < KNOWLEDGE_TRIGGER_LEN || is_trivial_greeting(&message) {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = run_knowledge_extraction(&store, &completion, &existing_context, &message).await {
            warn!("knowledge extraction failed: {e}");
        }
    });
}

async fn run_knowledge_extraction(
    store: &KnowledgeStore,
    completion: &Arc<dyn FastCompletion>,
    existing_context: &str,
    message: &str,
) -> Result<(), String> {
    let ctx: String = existing_context.chars().take(CONTEXT_TRUNCATE).collect();
    let msg: String = message.chars().take(MESSAGE_TRUNCATE).collect();
    let prompt = format!(
        "Given what you already know about the user:\n{ctx}\n\n\
         And their latest message:\n{msg}\n\n\
         Extract any new durable facts, preferences, or notable events. \
         Reply with zero or more lines, each starting with FACT:, PREF:, or EVENT:, \
         followed by a short sentence. Reply with nothing if there is nothing new."
    );
    let reply = completion.complete_fast(&prompt).await?;
    for line in reply.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("FACT:") {
            store
                .add(KnowledgeType::Semantic, rest.trim(), 0.7, MemorySource::Inferred)
                .map_err(|e| e.to_string())?;
        } else if let Some(rest) = line.strip_prefix("PREF:") {
            store
                .add(KnowledgeType::Procedural, rest.trim(), 0.7, MemorySource::Inferred)
                .map_err(|e| e.to_string())?;
        } else if let Some(rest) = line.strip_prefix("EVENT:") {
            store
                .add(KnowledgeType::Episodic, rest.trim(), 0.7, MemorySource::Inferred)
                .map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

/// Spawn detached graph extraction for a qualifying user message.
pub fn spawn_graph_extraction(
    store: Arc<GraphStore>,
    completion: Arc<dyn FastCompletion>,
    message: String,
) {
    if message.len() < GRAPH_TRIGGER_LEN || is_trivial_greeting(&message) {
        return;
    }
    tokio::spawn(async move {
        if let Err(e) = run_graph_extraction(&store, &completion, &message).await {
            warn!("graph extraction failed: {e}");
        }
    });
}

async fn run_graph_extraction(
    store: &GraphStore,
    completion: &Arc<dyn FastCompletion>,
    message: &str,
) -> Result<(), String> {
    let msg: String = message.chars().take(MESSAGE_TRUNCATE).collect();
    let prompt = format!(
        "From the message below, list entities and relationships you observe.\n\
         Entity types: person, place, organisation, project, thing.\n\
         Relationship verbs: knows, works_at, lives_in, owns, related_to, mentioned.\n\n\
         Message:\n{msg}\n\n\
         Reply with lines of the form:\n\
         ENTITY: name | type | one-line description\n\
         REL: src | relation | dst | one-line context\n\
         Reply with nothing if there is nothing notable."
    );
    let reply = completion.complete_fast(&prompt).await?;

    // First pass: entities, so relationship endpoints can resolve.
    for line in reply.lines() {
        if let Some(rest) = line.trim().strip_prefix("ENTITY:") {
            let parts: Vec<&str> = rest.split('|').map(|p| p.trim()).collect();
            if parts.len() >= 2 {
                let desc = parts.get(2).copied().unwrap_or("");
                store.upsert_entity(parts[0], parts[1], desc).map_err(|e| e.to_string())?;
            }
        }
    }
    // Second pass: relationships, find-or-create unknown endpoints.
    for line in reply.lines() {
        if let Some(rest) = line.trim().strip_prefix("REL:") {
            let parts: Vec<&str> = rest.split('|').map(|p| p.trim()).collect();
            if parts.len() >= 3 {
                let context = parts.get(3).copied().unwrap_or("");
                if store.find_entity(parts[0]).map_err(|e| e.to_string())?.is_none() {
                    store.upsert_entity(parts[0], "thing", "").map_err(|e| e.to_string())?;
                }
                if store.find_entity(parts[2]).map_err(|e| e.to_string())?.is_none() {
                    store.upsert_entity(parts[2], "thing", "").map_err(|e| e.to_string())?;
                }
                store
                    .add_relationship(parts[0], parts[1], parts[2], context)
                    .map_err(|e| e.to_string())?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use rusqlite::Connection;

    struct StubCompletion(String);
    #[async_trait]
    impl FastCompletion for StubCompletion {
        async fn complete_fast(&self, _prompt: &str) -> std::result::Result<String, String> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn trivial_greetings_are_recognised() {
        assert!(is_trivial_greeting("  Hi  "));
        assert!(is_trivial_greeting("thanks"));
        assert!(!is_trivial_greeting("what's the weather like in Bristol today"));
    }

    #[tokio::test]
    async fn knowledge_extraction_parses_all_three_line_kinds() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = KnowledgeStore::new(conn);
        let completion: Arc<dyn FastCompletion> = Arc::new(StubCompletion(
            "FACT: works as an engineer\nPREF: prefers dark mode\nEVENT: deployed a new service today"
                .to_string(),
        ));
        run_knowledge_extraction(&store, &completion, "", "a message long enough to trigger extraction")
            .await
            .unwrap();
        assert_eq!(store.get_by_type(KnowledgeType::Semantic, 10).unwrap().len(), 1);
        assert_eq!(store.get_by_type(KnowledgeType::Procedural, 10).unwrap().len(), 1);
        assert_eq!(store.get_by_type(KnowledgeType::Episodic, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn graph_extraction_resolves_unknown_rel_endpoints() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let store = crate::graph::GraphStore::new(conn);
        let completion: Arc<dyn FastCompletion> =
            Arc::new(StubCompletion("REL: Alice | knows | Bob | met at a conference".to_string()));
        run_graph_extraction(&store, &completion, "a message about alice and bob meeting")
            .await
            .unwrap();
        assert!(store.find_entity("alice").unwrap().is_some());
        assert!(store.find_entity("bob").unwrap().is_some());
    }
}
