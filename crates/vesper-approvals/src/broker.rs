//! `ApprovalBroker` — parks a caller until a pending action is approved or
//! denied, or until 10 minutes elapse (auto-deny).
//!
//! Requests are persisted to `approval_queue` so the dashboard can list and
//! decide on them independently of which process instance issued the park;
//! the in-memory waiter map only matters for resolving the original caller's
//! future within this process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::oneshot;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{row_to_request, APPROVAL_SELECT_SQL};
use crate::error::{ApprovalError, Result};
use crate::types::{ApprovalOutcome, ApprovalRequest, ApprovalStatus, RiskLevel};

const AUTO_DENY_AFTER: Duration = Duration::from_secs(10 * 60);

pub struct ApprovalBroker {
    conn: Mutex<Connection>,
    waiters: Mutex<HashMap<String, oneshot::Sender<ApprovalOutcome>>>,
}

impl ApprovalBroker {
    pub fn new(conn: Connection) -> Result<Self> {
        crate::db::init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            waiters: Mutex::new(HashMap::new()),
        })
    }

    /// Request approval for `action`. Resolves once `approve`/`deny` is
    /// called for this id, or after the 10-minute auto-deny window.
    pub async fn request(
        &self,
        agent: &str,
        action: &str,
        detail: &str,
        risk: RiskLevel,
    ) -> Result<ApprovalOutcome> {
        let id = Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO approval_queue (id, agent, action, detail, risk, status, requested_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)",
                rusqlite::params![id, agent, action, detail, risk.to_string(), now],
            )?;
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(id.clone(), tx);

        info!(approval_id = %id, agent, action, risk = %risk, "approval requested");

        let outcome = match tokio::time::timeout(AUTO_DENY_AFTER, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) | Err(_) => {
                warn!(approval_id = %id, "approval auto-denied after 10 minutes");
                self.waiters.lock().unwrap().remove(&id);
                let outcome = ApprovalOutcome {
                    approved: false,
                    reason: Some("auto-denied: no decision within 10 minutes".to_string()),
                };
                let _ = self.finalize(&id, ApprovalStatus::Denied, None, outcome.reason.clone());
                outcome
            }
        };
        Ok(outcome)
    }

    /// Approve a pending request, waking its waiter (if still parked in this
    /// process) and persisting the decision either way.
    pub fn approve(&self, id: &str, by: &str) -> Result<()> {
        self.finalize(id, ApprovalStatus::Approved, Some(by), None)?;
        self.wake(id, ApprovalOutcome { approved: true, reason: None });
        Ok(())
    }

    pub fn deny(&self, id: &str, by: &str, reason: Option<String>) -> Result<()> {
        self.finalize(id, ApprovalStatus::Denied, Some(by), reason.clone())?;
        self.wake(id, ApprovalOutcome { approved: false, reason });
        Ok(())
    }

    pub fn pending(&self) -> Result<Vec<ApprovalRequest>> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("{APPROVAL_SELECT_SQL} WHERE status = 'pending' ORDER BY requested_at ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_request)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(ApprovalError::from)
    }

    fn wake(&self, id: &str, outcome: ApprovalOutcome) {
        if let Some(tx) = self.waiters.lock().unwrap().remove(id) {
            let _ = tx.send(outcome);
        }
    }

    fn finalize(
        &self,
        id: &str,
        status: ApprovalStatus,
        by: Option<&str>,
        reason: Option<String>,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE approval_queue SET status = ?1, resolved_at = ?2, resolved_by = ?3, reason = ?4 \
             WHERE id = ?5 AND status = 'pending'",
            rusqlite::params![status.to_string(), now, by, reason, id],
        )?;
        if updated == 0 {
            return Err(ApprovalError::AlreadyDecided);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker() -> ApprovalBroker {
        ApprovalBroker::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn approve_resolves_waiter() {
        let broker = std::sync::Arc::new(broker());
        let b2 = broker.clone();
        let handle = tokio::spawn(async move {
            b2.request("agent1", "send_money", "£50 to X", RiskLevel::High).await
        });

        // Give the request a moment to be inserted, then look it up and approve.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = broker.pending().unwrap();
        assert_eq!(pending.len(), 1);
        broker.approve(&pending[0].id, "admin").unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.approved);
    }

    #[tokio::test]
    async fn deny_carries_reason() {
        let broker = std::sync::Arc::new(broker());
        let b2 = broker.clone();
        let handle =
            tokio::spawn(async move { b2.request("agent1", "delete_file", "x.txt", RiskLevel::Medium).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        let pending = broker.pending().unwrap();
        broker
            .deny(&pending[0].id, "admin", Some("not now".to_string()))
            .unwrap();

        let outcome = handle.await.unwrap().unwrap();
        assert!(!outcome.approved);
        assert_eq!(outcome.reason.as_deref(), Some("not now"));
    }
}
