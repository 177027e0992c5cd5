//! Entity/relationship graph extracted from conversation.

use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::types::{Entity, Relationship};

pub struct GraphStore {
    db: Mutex<Connection>,
}

impl GraphStore {
    pub fn new(conn: Connection) -> Self {
        Self { db: Mutex::new(conn) }
    }

    /// Idempotent on `(lowercased name, type)`. Re-observation increments
    /// `mentions` and refreshes the description if one is supplied.
    pub fn upsert_entity(&self, name: &str, entity_type: &str, description: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let lname = name.to_lowercase();

        let existing: Option<i64> = db
            .query_row(
                "SELECT id FROM graph_entities WHERE lower(name) = ?1 AND entity_type = ?2",
                rusqlite::params![lname, entity_type],
                |r| r.get(0),
            )
            .ok();

        if let Some(id) = existing {
            if description.is_empty() {
                db.execute(
                    "UPDATE graph_entities SET mentions = mentions + 1, updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, id],
                )?;
            } else {
                db.execute(
                    "UPDATE graph_entities SET mentions = mentions + 1, description = ?1,
                     updated_at = ?2 WHERE id = ?3",
                    rusqlite::params![description, now, id],
                )?;
            }
        } else {
            db.execute(
                "INSERT INTO graph_entities (name, entity_type, description, mentions,
                 created_at, updated_at) VALUES (?1, ?2, ?3, 1, ?4, ?4)",
                rusqlite::params![name, entity_type, description, now],
            )?;
        }
        Ok(())
    }

    /// Idempotent on `(src, relation, dst)`. Re-observation adds 0.5 strength.
    pub fn add_relationship(&self, src: &str, relation: &str, dst: &str, context: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();

        let existing: Option<i64> = db
            .query_row(
                "SELECT id FROM graph_relationships WHERE src = ?1 AND relation = ?2 AND dst = ?3",
                rusqlite::params![src, relation, dst],
                |r| r.get(0),
            )
            .ok();

        if let Some(id) = existing {
            db.execute(
                "UPDATE graph_relationships SET strength = strength + 0.5, context = ?1,
                 updated_at = ?2 WHERE id = ?3",
                rusqlite::params![context, now, id],
            )?;
        } else {
            db.execute(
                "INSERT INTO graph_relationships (src, relation, dst, context, strength,
                 created_at, updated_at) VALUES (?1, ?2, ?3, ?4, 1.0, ?5, ?5)",
                rusqlite::params![src, relation, dst, context, now],
            )?;
        }
        Ok(())
    }

    /// Fuzzy lookup: case-insensitive substring match on name.
    pub fn find_entity(&self, name: &str) -> Result<Option<Entity>> {
        let db = self.db.lock().unwrap();
        let lname = format!("%{}%", name.to_lowercase());
        let found = db
            .query_row(
                "SELECT id, name, entity_type, description, mentions, created_at, updated_at
                 FROM graph_entities WHERE lower(name) LIKE ?1 ORDER BY mentions DESC LIMIT 1",
                [lname],
                row_to_entity,
            )
            .ok();
        Ok(found)
    }

    /// Entities whose name or description contains a length>2 query token,
    /// with up to 5 outgoing and 5 incoming relationships each, formatted as
    /// arrowed lines and hard-capped at `max_tokens * 4` characters.
    pub fn build_graph_context(&self, query: &str, max_tokens: usize) -> Result<String> {
        let tokens: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .filter(|t| t.len() > 2)
            .map(|t| t.to_string())
            .collect();
        if tokens.is_empty() {
            return Ok(String::new());
        }

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, name, entity_type, description, mentions, created_at, updated_at FROM graph_entities",
        )?;
        let entities: Vec<Entity> = stmt
            .query_map([], row_to_entity)?
            .filter_map(|r| r.ok())
            .filter(|e| {
                let n = e.name.to_lowercase();
                let d = e.description.to_lowercase();
                tokens.iter().any(|t| n.contains(t.as_str()) || d.contains(t.as_str()))
            })
            .collect();

        let mut out = String::new();
        let char_cap = max_tokens * 4;
        for e in &entities {
            let mut out_rel = db.prepare(
                "SELECT dst, relation FROM graph_relationships WHERE src = ?1 LIMIT 5",
            )?;
            let outgoing: Vec<(String, String)> = out_rel
                .query_map([&e.name], |r| Ok((r.get(0)?, r.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            let mut in_rel = db.prepare(
                "SELECT src, relation FROM graph_relationships WHERE dst = ?1 LIMIT 5",
            )?;
            let incoming: Vec<(String, String)> = in_rel
                .query_map([&e.name], |r| Ok((r.get(0)?, r.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();

            for (dst, rel) in outgoing {
                let line = format!("{} --{}--> {}\n", e.name, rel, dst);
                if out.len() + line.len() > char_cap {
                    return Ok(out);
                }
                out.push_str(&line);
            }
            for (src, rel) in incoming {
                let line = format!("{} --{}--> {}\n", src, rel, e.name);
                if out.len() + line.len() > char_cap {
                    return Ok(out);
                }
                out.push_str(&line);
            }
        }
        Ok(out)
    }
}

fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        entity_type: row.get(2)?,
        description: row.get(3)?,
        mentions: row.get::<_, i64>(4)? as u64,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn store() -> GraphStore {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        GraphStore::new(conn)
    }

    #[test]
    fn upsert_entity_increments_mentions() {
        let g = store();
        g.upsert_entity("Alice", "person", "a friend").unwrap();
        g.upsert_entity("alice", "person", "").unwrap();
        let e = g.find_entity("alice").unwrap().unwrap();
        assert_eq!(e.mentions, 2);
        assert_eq!(e.description, "a friend");
    }

    #[test]
    fn relationship_strength_grows_on_reobservation() {
        let g = store();
        g.add_relationship("Alice", "knows", "Bob", "met at work").unwrap();
        g.add_relationship("Alice", "knows", "Bob", "met again").unwrap();
        let db = g.db.lock().unwrap();
        let strength: f64 = db
            .query_row(
                "SELECT strength FROM graph_relationships WHERE src = 'Alice' AND dst = 'Bob'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(strength, 1.5);
    }

    #[test]
    fn build_graph_context_formats_arrows() {
        let g = store();
        g.upsert_entity("Alice", "person", "a friend").unwrap();
        g.add_relationship("Alice", "knows", "Bob", "").unwrap();
        let ctx = g.build_graph_context("tell me about alice", 500).unwrap();
        assert!(ctx.contains("Alice --knows--> Bob"));
    }
}
