//! `AuditLog` — append-only record of every decision the runtime makes, cost
//! tagged. Rows are never updated or deleted; the table has no UPDATE path
//! on purpose so the history can't be quietly rewritten.

use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{AuditRecord, ChannelCost, CostSummary};

pub struct AuditLog {
    conn: Mutex<Connection>,
}

impl AuditLog {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn log(
        &self,
        agent: &str,
        action: &str,
        detail: &str,
        model: Option<&str>,
        cost: f64,
        tier: Option<&str>,
        approved: bool,
        duration_ms: Option<u64>,
        channel: Option<&str>,
    ) -> Result<()> {
        let id = Uuid::now_v7().to_string();
        let ts = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO audit_log (id, timestamp, agent, action, detail, model, cost, tier, approved, duration_ms, channel) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            rusqlite::params![
                id, ts, agent, action, detail, model,
                (cost * 10_000.0).round() / 10_000.0,
                tier, approved as i32, duration_ms, channel
            ],
        )?;
        Ok(())
    }

    pub fn recent(&self, limit: u32, agent: Option<&str>) -> Result<Vec<AuditRecord>> {
        let conn = self.conn.lock().unwrap();
        let sql = match agent {
            Some(_) => {
                "SELECT id, timestamp, agent, action, detail, model, cost, tier, approved, duration_ms, channel \
                 FROM audit_log WHERE agent = ?1 ORDER BY timestamp DESC LIMIT ?2"
            }
            None => {
                "SELECT id, timestamp, agent, action, detail, model, cost, tier, approved, duration_ms, channel \
                 FROM audit_log ORDER BY timestamp DESC LIMIT ?1"
            }
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = if let Some(agent) = agent {
            stmt.query_map(rusqlite::params![agent, limit], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            stmt.query_map(rusqlite::params![limit], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };
        Ok(rows)
    }

    /// Cost totals for today/this-week/this-month. Only `action = 'completion'`
    /// rows count — approvals, tool calls, and other audit entries are free.
    pub fn cost_summary(&self) -> Result<CostSummary> {
        let conn = self.conn.lock().unwrap();
        let today: (f64, u64) = conn
            .query_row(
                "SELECT COALESCE(SUM(cost),0), COUNT(*) FROM audit_log \
                 WHERE action = 'completion' AND date(timestamp) = date('now')",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .unwrap_or((0.0, 0));
        let week: (f64, u64) = conn
            .query_row(
                "SELECT COALESCE(SUM(cost),0), COUNT(*) FROM audit_log \
                 WHERE action = 'completion' AND timestamp >= datetime('now', '-7 days')",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .unwrap_or((0.0, 0));
        let month: f64 = conn
            .query_row(
                "SELECT COALESCE(SUM(cost),0) FROM audit_log \
                 WHERE action = 'completion' AND timestamp >= datetime('now', '-30 days')",
                [],
                |r| r.get(0),
            )
            .optional()?
            .unwrap_or(0.0);

        Ok(CostSummary {
            today: today.0,
            week: week.0,
            month,
            today_msgs: today.1,
            week_msgs: week.1,
        })
    }

    pub fn costs_by_channel(&self, since_days: u32) -> Result<Vec<ChannelCost>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT COALESCE(channel, 'unknown'), COALESCE(SUM(cost),0), COUNT(*) FROM audit_log \
             WHERE action = 'completion' AND timestamp >= datetime('now', ?1) GROUP BY channel",
        )?;
        let arg = format!("-{since_days} days");
        let rows = stmt
            .query_map([arg], |r| {
                Ok(ChannelCost {
                    channel: r.get(0)?,
                    cost: r.get(1)?,
                    messages: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        agent: row.get(2)?,
        action: row.get(3)?,
        detail: row.get(4)?,
        model: row.get(5)?,
        cost: row.get(6)?,
        tier: row.get(7)?,
        approved: row.get::<_, i32>(8)? != 0,
        duration_ms: row.get(9)?,
        channel: row.get(10)?,
    })
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id          TEXT PRIMARY KEY NOT NULL,
            timestamp   TEXT NOT NULL,
            agent       TEXT NOT NULL,
            action      TEXT NOT NULL,
            detail      TEXT NOT NULL DEFAULT '',
            model       TEXT,
            cost        REAL NOT NULL DEFAULT 0,
            tier        TEXT,
            approved    INTEGER NOT NULL DEFAULT 1,
            duration_ms INTEGER,
            channel     TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log (timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log (action);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log() -> AuditLog {
        AuditLog::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn recent_returns_in_descending_order() {
        let log = log();
        log.log("agentA", "completion", "hi", Some("fast"), 0.01, Some("simple"), true, Some(120), Some("tg"))
            .unwrap();
        log.log("agentA", "completion", "bye", Some("fast"), 0.02, Some("simple"), true, Some(80), Some("tg"))
            .unwrap();
        let rows = log.recent(10, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].detail, "bye");
    }

    #[test]
    fn cost_summary_only_counts_completions() {
        let log = log();
        log.log("a", "completion", "x", None, 1.5, None, true, None, None).unwrap();
        log.log("a", "tool_call", "y", None, 99.0, None, true, None, None).unwrap();
        let summary = log.cost_summary().unwrap();
        assert_eq!(summary.today, 1.5);
        assert_eq!(summary.today_msgs, 1);
    }
}
