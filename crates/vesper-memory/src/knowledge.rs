//! Three-partition knowledge store (semantic/episodic/procedural).
//!
//! Distinct from `manager::MemoryManager`'s `user_memory` table: that one is
//! a confidence-gated key/value directive store written by explicit
//! "remember that..." calls. This one is a freeform notes store, written
//! mostly by the async extraction pipeline, capped per partition by
//! `KnowledgeType::cap()` with least-accessed-then-oldest eviction.

use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::types::{KnowledgeRecord, KnowledgeType, MemorySource};

/// Content longer than this is truncated on insert.
const MAX_CONTENT_CHARS: usize = 500;
/// Prefix length used for in-place dedup matching.
const DEDUP_PREFIX: usize = 50;

pub struct KnowledgeStore {
    db: Mutex<Connection>,
}

impl KnowledgeStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Insert or update an entry. Entries whose first `DEDUP_PREFIX` chars
    /// match an existing entry of the same type are updated in place rather
    /// than duplicated. When the partition is at capacity, evicts the
    /// least-accessed entry (ties broken by oldest `updated_at`) first.
    pub fn add(
        &self,
        kind: KnowledgeType,
        content: &str,
        confidence: f64,
        source: MemorySource,
    ) -> Result<()> {
        let content: String = content.chars().take(MAX_CONTENT_CHARS).collect();
        let prefix: String = content.chars().take(DEDUP_PREFIX).collect();
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let kind_s = kind.to_string();

        let existing: Option<i64> = db
            .query_row(
                "SELECT id FROM knowledge_store WHERE kind = ?1 AND substr(content, 1, ?2) = ?3",
                rusqlite::params![kind_s, DEDUP_PREFIX as i64, prefix],
                |row| row.get(0),
            )
            .ok();

        if let Some(id) = existing {
            db.execute(
                "UPDATE knowledge_store SET content = ?1, confidence = ?2, source = ?3,
                 updated_at = ?4 WHERE id = ?5",
                rusqlite::params![content, confidence, source.to_string(), now, id],
            )?;
            return Ok(());
        }

        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM knowledge_store WHERE kind = ?1",
            [&kind_s],
            |r| r.get(0),
        )?;
        if count as usize >= kind.cap() {
            let evict: Option<i64> = db
                .query_row(
                    "SELECT id FROM knowledge_store WHERE kind = ?1
                     ORDER BY access_count ASC, updated_at ASC LIMIT 1",
                    [&kind_s],
                    |r| r.get(0),
                )
                .ok();
            if let Some(id) = evict {
                db.execute("DELETE FROM knowledge_store WHERE id = ?1", [id])?;
            }
        }

        db.execute(
            "INSERT INTO knowledge_store (kind, content, confidence, source, access_count,
             created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            rusqlite::params![kind_s, content, confidence, source.to_string(), now],
        )?;
        Ok(())
    }

    /// Entries of one partition, confidence desc then updated desc. Each
    /// returned entry's access count is incremented.
    pub fn get_by_type(&self, kind: KnowledgeType, limit: usize) -> Result<Vec<KnowledgeRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, kind, content, confidence, source, access_count, created_at, updated_at
             FROM knowledge_store WHERE kind = ?1
             ORDER BY confidence DESC, updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![kind.to_string(), limit as i64], row_to_record)?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();
        for r in &rows {
            db.execute(
                "UPDATE knowledge_store SET access_count = access_count + 1 WHERE id = ?1",
                [r.id],
            )?;
        }
        Ok(rows)
    }

    /// Substring match against any lowercased query token of length > 2.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<KnowledgeRecord>> {
        let tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(|t| t.to_string())
            .collect();
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, kind, content, confidence, source, access_count, created_at, updated_at
             FROM knowledge_store ORDER BY updated_at DESC",
        )?;
        let all = stmt
            .query_map([], row_to_record)?
            .filter_map(|r| r.ok())
            .collect::<Vec<_>>();
        let matched: Vec<KnowledgeRecord> = all
            .into_iter()
            .filter(|r| {
                let lower = r.content.to_lowercase();
                tokens.iter().any(|t| lower.contains(t.as_str()))
            })
            .take(limit)
            .collect();
        Ok(matched)
    }

    /// Three-section prompt document: what-I-know, preferences, recent events.
    pub fn build_context(&self) -> Result<String> {
        let semantic = self.get_by_type(KnowledgeType::Semantic, 30)?;
        let procedural = self.get_by_type(KnowledgeType::Procedural, 20)?;
        let episodic = self.get_by_type(KnowledgeType::Episodic, 10)?;

        let mut out = String::new();
        if !semantic.is_empty() {
            out.push_str("## What I Know About You\n");
            for r in &semantic {
                out.push_str(&format!("- {}\n", r.content));
            }
        }
        if !procedural.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("## Your Preferences\n");
            for r in &procedural {
                out.push_str(&format!("- {}\n", r.content));
            }
        }
        if !episodic.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("## Recent Events\n");
            for r in &episodic {
                out.push_str(&format!("- {}\n", r.content));
            }
        }
        Ok(out)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeRecord> {
    let kind_str: String = row.get(1)?;
    let src_str: String = row.get(4)?;
    Ok(KnowledgeRecord {
        id: row.get(0)?,
        kind: kind_str.parse().unwrap_or(KnowledgeType::Episodic),
        content: row.get(2)?,
        confidence: row.get(3)?,
        source: src_str.parse().unwrap_or(MemorySource::Inferred),
        access_count: row.get::<_, i64>(5)? as u64,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> KnowledgeStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        KnowledgeStore::new(conn)
    }

    #[test]
    fn dedups_on_prefix_match() {
        let s = store();
        let long_prefix = "a".repeat(60);
        s.add(KnowledgeType::Semantic, &format!("{long_prefix} v1"), 0.5, MemorySource::Inferred).unwrap();
        s.add(KnowledgeType::Semantic, &format!("{long_prefix} v2"), 0.9, MemorySource::Inferred).unwrap();
        let entries = s.get_by_type(KnowledgeType::Semantic, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].content.ends_with("v2"));
    }

    #[test]
    fn evicts_least_accessed_when_full() {
        let s = store();
        for i in 0..KnowledgeType::Procedural.cap() {
            s.add(KnowledgeType::Procedural, &format!("entry {i} unique-prefix-{i}"), 0.5, MemorySource::Inferred).unwrap();
        }
        // Access all but the first entry so it becomes the eviction target.
        let all = s.get_by_type(KnowledgeType::Procedural, KnowledgeType::Procedural.cap()).unwrap();
        let _ = s.get_by_type(KnowledgeType::Procedural, KnowledgeType::Procedural.cap()).unwrap();
        let least = all.iter().min_by_key(|r| r.access_count).unwrap().content.clone();

        s.add(KnowledgeType::Procedural, "brand new entry, different prefix entirely", 0.5, MemorySource::Inferred).unwrap();
        let after = s.get_by_type(KnowledgeType::Procedural, 1000).unwrap();
        assert!(after.len() <= KnowledgeType::Procedural.cap());
        assert!(!after.iter().any(|r| r.content == least));
    }

    #[test]
    fn search_matches_on_token_substring() {
        let s = store();
        s.add(KnowledgeType::Semantic, "enjoys hiking in the mountains", 0.5, MemorySource::Inferred).unwrap();
        s.add(KnowledgeType::Semantic, "works as a software engineer", 0.5, MemorySource::Inferred).unwrap();
        let hits = s.search("hiking trip", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("hiking"));
    }

    #[test]
    fn build_context_has_three_sections_when_populated() {
        let s = store();
        s.add(KnowledgeType::Semantic, "lives in Bristol", 0.9, MemorySource::Inferred).unwrap();
        s.add(KnowledgeType::Procedural, "prefers terse answers", 0.9, MemorySource::UserSaid).unwrap();
        s.add(KnowledgeType::Episodic, "asked about the weather yesterday", 0.7, MemorySource::Inferred).unwrap();
        let ctx = s.build_context().unwrap();
        assert!(ctx.contains("## What I Know About You"));
        assert!(ctx.contains("## Your Preferences"));
        assert!(ctx.contains("## Recent Events"));
    }
}
