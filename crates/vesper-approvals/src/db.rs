use rusqlite::{Connection, Result};

use crate::types::{ApprovalRequest, ApprovalStatus, RiskLevel};

/// Map a SELECT row (column order from `APPROVAL_SELECT_SQL`) to an
/// `ApprovalRequest`. Centralised here so every query stays consistent.
pub(crate) fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<ApprovalRequest> {
    use std::str::FromStr;
    let risk = RiskLevel::from_str(&row.get::<_, String>(4)?).unwrap_or_default();
    let status = ApprovalStatus::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    Ok(ApprovalRequest {
        id: row.get(0)?,
        agent: row.get(1)?,
        action: row.get(2)?,
        detail: row.get(3)?,
        risk,
        status,
        requested_at: row.get(6)?,
        resolved_at: row.get(7)?,
        resolved_by: row.get(8)?,
        reason: row.get(9)?,
    })
}

pub(crate) const APPROVAL_SELECT_SQL: &str = "SELECT id, agent, action, detail, risk, status, \
     requested_at, resolved_at, resolved_by, reason FROM approval_queue";

/// Initialise the approvals table. Safe to call on every startup — CREATE IF
/// NOT EXISTS makes it idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS approval_queue (
            id            TEXT PRIMARY KEY NOT NULL,
            agent         TEXT NOT NULL,
            action        TEXT NOT NULL,
            detail        TEXT NOT NULL DEFAULT '',
            risk          TEXT NOT NULL DEFAULT 'low',
            status        TEXT NOT NULL DEFAULT 'pending',
            requested_at  TEXT NOT NULL,
            resolved_at   TEXT,
            resolved_by   TEXT,
            reason        TEXT
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_approval_status ON approval_queue (status);",
    )
}
