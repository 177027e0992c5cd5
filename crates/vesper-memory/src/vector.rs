//! Lightweight in-process vector/keyword index with three retrieval
//! strategies, tried in order: embedding search when a provider is
//! configured, TF-IDF keyword search otherwise, recency fallback when the
//! query has no indexable tokens at all.
//!
//! Documents (and their pre-computed tokens) are persisted to a flat JSON
//! file, flushed every 30 s when dirty — the same temp-file-then-rename
//! idiom the secret store uses. Embeddings are never written to disk; they
//! are regenerated from the configured provider on each embedding search.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::Result;
use crate::types::VectorDoc;

const MAX_TEXT_CHARS: usize = 10_000;
const MAX_DOCS: usize = 5_000;
const RECENCY_DECAY_DAYS: f64 = 30.0;
const RECENCY_WEIGHT: f64 = 0.1;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, String>;
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct Snapshot {
    docs: Vec<VectorDoc>,
    next_id: u64,
}

pub struct VectorIndex {
    path: PathBuf,
    docs: Mutex<Vec<VectorDoc>>,
    next_id: AtomicU64,
    dirty: AtomicBool,
}

impl VectorIndex {
    /// Loads an existing snapshot from `path`, or starts empty if absent or
    /// unreadable.
    pub fn open(path: &Path) -> Self {
        let snapshot = std::fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Snapshot>(&bytes).ok())
            .unwrap_or_default();
        Self {
            path: path.to_path_buf(),
            next_id: AtomicU64::new(snapshot.next_id),
            docs: Mutex::new(snapshot.docs),
            dirty: AtomicBool::new(false),
        }
    }

    /// Append a document, tokenising eagerly. Truncates text, prunes to the
    /// most recent `MAX_DOCS`.
    pub fn add(&self, text: &str, metadata: serde_json::Value) {
        let text: String = text.chars().take(MAX_TEXT_CHARS).collect();
        let tokens = tokenize(&text);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let doc = VectorDoc {
            id,
            text,
            metadata,
            tokens,
            timestamp: chrono::Utc::now(),
            embedding: None,
        };
        let mut docs = self.docs.lock().unwrap();
        docs.push(doc);
        if docs.len() > MAX_DOCS {
            docs.remove(0);
        }
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        embedder: Option<&(dyn EmbeddingProvider + Send + Sync)>,
    ) -> Vec<VectorDoc> {
        if let Some(embedder) = embedder {
            if let Ok(qvec) = embedder.embed(query).await {
                let docs = self.docs.lock().unwrap().clone();
                let mut scored = Vec::with_capacity(docs.len());
                for doc in docs {
                    if let Ok(dvec) = embedder.embed(&doc.text).await {
                        scored.push((cosine(&qvec, &dvec), doc));
                    }
                }
                if !scored.is_empty() {
                    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
                    return scored.into_iter().take(limit).map(|(_, d)| d).collect();
                }
            }
        }

        let tokens = tokenize(query);
        if tokens.is_empty() {
            return self.recency_fallback(limit);
        }
        self.tfidf_search(&tokens, limit)
    }

    fn tfidf_search(&self, tokens: &[String], limit: usize) -> Vec<VectorDoc> {
        let docs = self.docs.lock().unwrap();
        let n = docs.len() as f64;
        if n == 0.0 {
            return Vec::new();
        }
        let now = chrono::Utc::now();
        let mut scored: Vec<(f64, VectorDoc)> = docs
            .iter()
            .map(|doc| {
                let mut score = 0.0;
                for t in tokens {
                    let tf = doc.tokens.iter().filter(|x| *x == t).count() as f64;
                    if tf == 0.0 {
                        continue;
                    }
                    let df = docs.iter().filter(|d| d.tokens.contains(t)).count() as f64;
                    let idf = (n / df.max(1.0)).ln();
                    score += tf * idf;
                }
                let days = now
                    .signed_duration_since(doc.timestamp)
                    .num_seconds()
                    .max(0) as f64
                    / 86400.0;
                let recency_bonus = (1.0 - days / RECENCY_DECAY_DAYS).max(0.0) * RECENCY_WEIGHT;
                (score + recency_bonus, doc.clone())
            })
            .filter(|(s, _)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
        scored.into_iter().take(limit).map(|(_, d)| d).collect()
    }

    fn recency_fallback(&self, limit: usize) -> Vec<VectorDoc> {
        let mut docs = self.docs.lock().unwrap().clone();
        docs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        docs.into_iter().take(limit).collect()
    }

    fn flush(&self) -> Result<()> {
        let docs = self.docs.lock().unwrap();
        let snapshot = Snapshot {
            docs: docs.clone(),
            next_id: self.next_id.load(Ordering::SeqCst),
        };
        drop(docs);
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Flush to disk every 30 s while dirty, until `shutdown` fires.
    pub async fn run(self: std::sync::Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("vector index flush loop started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.dirty.load(Ordering::SeqCst) {
                        if let Err(e) = self.flush() {
                            warn!("vector index flush failed: {e}");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let _ = self.flush();
                        info!("vector index flush loop shutting down");
                        break;
                    }
                }
            }
        }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn tfidf_ranks_relevant_doc_first() {
        let dir = tempdir().unwrap();
        let idx = VectorIndex::open(&dir.path().join("vec.json"));
        idx.add("the quick brown fox jumps over the lazy dog", serde_json::json!({}));
        idx.add("completely unrelated weather report for today", serde_json::json!({}));
        let hits = idx.search("quick fox", 5, None).await;
        assert_eq!(hits[0].text, "the quick brown fox jumps over the lazy dog");
    }

    #[tokio::test]
    async fn empty_query_falls_back_to_recency() {
        let dir = tempdir().unwrap();
        let idx = VectorIndex::open(&dir.path().join("vec.json"));
        idx.add("first doc", serde_json::json!({}));
        idx.add("second doc", serde_json::json!({}));
        let hits = idx.search("!!!", 5, None).await;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "second doc");
    }

    #[test]
    fn prunes_to_max_docs() {
        let dir = tempdir().unwrap();
        let idx = VectorIndex::open(&dir.path().join("vec.json"));
        for i in 0..(MAX_DOCS + 10) {
            idx.add(&format!("doc number {i}"), serde_json::json!({}));
        }
        assert_eq!(idx.docs.lock().unwrap().len(), MAX_DOCS);
    }

    #[test]
    fn flush_then_reopen_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vec.json");
        let idx = VectorIndex::open(&path);
        idx.add("persisted doc", serde_json::json!({"k": "v"}));
        idx.flush().unwrap();

        let reopened = VectorIndex::open(&path);
        assert_eq!(reopened.docs.lock().unwrap().len(), 1);
    }
}
