//! `DeliveryQueue` — persistent FIFO retry queue with per-item exponential
//! backoff, modelled on the scheduler's polling tick loop but keyed per item
//! rather than per channel: each failed send waits `2^attempts` minutes
//! before its next retry, rather than the channel-reconnect backoff's flat
//! jittered schedule.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rusqlite::Connection;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{DeliveryItem, DeliveryStatus, MAX_ATTEMPTS};

/// Implemented by whatever channel manager actually performs the send. Kept
/// as a trait so the queue crate has no dependency on any concrete adapter.
#[async_trait]
pub trait DeliverySender: Send + Sync {
    async fn deliver(&self, item: &DeliveryItem) -> std::result::Result<(), String>;
}

pub struct DeliveryQueue {
    conn: Mutex<Connection>,
}

impl DeliveryQueue {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn enqueue(
        &self,
        channel: &str,
        recipient: &str,
        content: &str,
        metadata: serde_json::Value,
    ) -> Result<DeliveryItem> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO delivery_queue (id, channel, recipient, content, metadata, attempts, next_retry, status, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, 'pending', ?6)",
            rusqlite::params![id, channel, recipient, content, metadata.to_string(), now],
        )?;
        Ok(DeliveryItem {
            id,
            channel: channel.to_string(),
            recipient: recipient.to_string(),
            content: content.to_string(),
            metadata,
            attempts: 0,
            next_retry: now.clone(),
            status: DeliveryStatus::Pending,
            created_at: now,
        })
    }

    /// Up to 20 items eligible for retry right now.
    pub fn pending(&self) -> Result<Vec<DeliveryItem>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "SELECT id, channel, recipient, content, metadata, attempts, next_retry, status, created_at \
             FROM delivery_queue WHERE status = 'pending' AND next_retry <= ?1 AND attempts < ?2 \
             ORDER BY created_at ASC LIMIT 20",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![now, MAX_ATTEMPTS], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delivered(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE delivery_queue SET status = 'delivered' WHERE id = ?1",
            [id],
        )?;
        Ok(())
    }

    /// Record a failed attempt. Backs off `2^attempts` minutes, or marks the
    /// item terminally `failed` once `MAX_ATTEMPTS` is reached.
    pub fn failed(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let attempts: u32 = conn.query_row(
            "SELECT attempts FROM delivery_queue WHERE id = ?1",
            [id],
            |r| r.get(0),
        )?;
        let attempts = attempts + 1;
        if attempts >= MAX_ATTEMPTS {
            conn.execute(
                "UPDATE delivery_queue SET attempts = ?1, status = 'failed' WHERE id = ?2",
                rusqlite::params![attempts, id],
            )?;
        } else {
            let next_retry = Utc::now() + ChronoDuration::minutes(2i64.pow(attempts));
            conn.execute(
                "UPDATE delivery_queue SET attempts = ?1, next_retry = ?2 WHERE id = ?3",
                rusqlite::params![attempts, next_retry.to_rfc3339(), id],
            )?;
        }
        Ok(())
    }

    /// Drive the retry loop: every 30 s, drain `pending()` through `sender`.
    /// One item's failure never blocks the others in the same tick.
    pub async fn run(self: Arc<Self>, sender: Arc<dyn DeliverySender>, mut shutdown: watch::Receiver<bool>) {
        info!("delivery queue loop started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.drain_once(&sender).await {
                        error!("delivery queue drain error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("delivery queue loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn drain_once(&self, sender: &Arc<dyn DeliverySender>) -> Result<()> {
        for item in self.pending()? {
            match sender.deliver(&item).await {
                Ok(()) => {
                    self.delivered(&item.id)?;
                }
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "delivery attempt failed");
                    self.failed(&item.id)?;
                }
            }
        }
        Ok(())
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<DeliveryItem> {
    use std::str::FromStr;
    let metadata: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(4)?).unwrap_or(serde_json::Value::Null);
    let status = DeliveryStatus::from_str(&row.get::<_, String>(7)?).unwrap_or_default();
    Ok(DeliveryItem {
        id: row.get(0)?,
        channel: row.get(1)?,
        recipient: row.get(2)?,
        content: row.get(3)?,
        metadata,
        attempts: row.get(5)?,
        next_retry: row.get(6)?,
        status,
        created_at: row.get(8)?,
    })
}

fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS delivery_queue (
            id          TEXT PRIMARY KEY NOT NULL,
            channel     TEXT NOT NULL,
            recipient   TEXT NOT NULL,
            content     TEXT NOT NULL,
            metadata    TEXT NOT NULL DEFAULT '{}',
            attempts    INTEGER NOT NULL DEFAULT 0,
            next_retry  TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'pending',
            created_at  TEXT NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_delivery_status ON delivery_queue (status, next_retry);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct AlwaysFail;
    #[async_trait]
    impl DeliverySender for AlwaysFail {
        async fn deliver(&self, _item: &DeliveryItem) -> std::result::Result<(), String> {
            Err("boom".to_string())
        }
    }

    struct CountingOk(AtomicUsize);
    #[async_trait]
    impl DeliverySender for CountingOk {
        async fn deliver(&self, _item: &DeliveryItem) -> std::result::Result<(), String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn failed_backs_off_exponentially() {
        let queue = DeliveryQueue::new(Connection::open_in_memory().unwrap()).unwrap();
        let item = queue.enqueue("tg", "user1", "hi", serde_json::json!({})).unwrap();
        queue.failed(&item.id).unwrap();
        let conn = queue.conn.lock().unwrap();
        let (attempts, next_retry): (u32, String) = conn
            .query_row(
                "SELECT attempts, next_retry FROM delivery_queue WHERE id = ?1",
                [&item.id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(attempts, 1);
        let next = chrono::DateTime::parse_from_rfc3339(&next_retry).unwrap();
        let delta = next.signed_duration_since(chrono::Utc::now());
        assert!(delta.num_minutes() >= 1 && delta.num_minutes() <= 2);
    }

    #[test]
    fn terminal_after_max_attempts() {
        let queue = DeliveryQueue::new(Connection::open_in_memory().unwrap()).unwrap();
        let item = queue.enqueue("tg", "user1", "hi", serde_json::json!({})).unwrap();
        for _ in 0..MAX_ATTEMPTS {
            queue.failed(&item.id).unwrap();
        }
        let conn = queue.conn.lock().unwrap();
        let status: String = conn
            .query_row("SELECT status FROM delivery_queue WHERE id = ?1", [&item.id], |r| r.get(0))
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[tokio::test]
    async fn one_failure_does_not_block_others() {
        let queue = Arc::new(DeliveryQueue::new(Connection::open_in_memory().unwrap()).unwrap());
        queue.enqueue("tg", "u1", "a", serde_json::json!({})).unwrap();
        queue.enqueue("tg", "u2", "b", serde_json::json!({})).unwrap();

        let sender = Arc::new(CountingOk(AtomicUsize::new(0)));
        queue.drain_once(&(sender.clone() as Arc<dyn DeliverySender>)).await.unwrap();
        assert_eq!(sender.0.load(Ordering::SeqCst), 2);

        let pending = queue.pending().unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn failures_reschedule_not_drop() {
        let queue = Arc::new(DeliveryQueue::new(Connection::open_in_memory().unwrap()).unwrap());
        queue.enqueue("tg", "u1", "a", serde_json::json!({})).unwrap();
        let sender: Arc<dyn DeliverySender> = Arc::new(AlwaysFail);
        queue.drain_once(&sender).await.unwrap();
        // Item is now scheduled 2 minutes out, so it's no longer "pending now".
        assert!(queue.pending().unwrap().is_empty());
    }
}
