//! Optional remote graph/cognify service client. When configured and
//! reachable, conversation content is additionally shipped to it and graph
//! queries prefer it over the local graph/vector fallback chain.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

const RECONNECT_AFTER_SECS: i64 = 60;

#[derive(Clone)]
pub struct RemoteGraphConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    pub api_key: Option<String>,
}

/// `GRAPH_COMPLETION` query mode against a remote graph service, with a
/// 401-triggers-dead, 60 s-reconnect-window state machine.
pub struct RemoteGraphClient {
    client: Client,
    config: RemoteGraphConfig,
    dead_since: AtomicI64,
    connected: AtomicBool,
}

#[derive(Deserialize)]
struct GraphQueryResponse {
    result: String,
}

impl RemoteGraphClient {
    pub fn new(config: RemoteGraphConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            dead_since: AtomicI64::new(0),
            connected: AtomicBool::new(false),
        }
    }

    /// Probe the remote service. Called at startup and by the reconnect
    /// loop; does not mark the client dead on failure since it's already
    /// presumed down when this is called from the reconnect path.
    pub async fn connect(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);
        let ok = self
            .request(self.client.get(&url))
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        self.connected.store(ok, Ordering::SeqCst);
        if ok {
            self.dead_since.store(0, Ordering::SeqCst);
        }
        ok
    }

    pub fn is_available(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.is_dead()
    }

    fn is_dead(&self) -> bool {
        self.dead_since.load(Ordering::SeqCst) != 0
    }

    /// Ship message content to the remote ingest endpoint, fire-and-forget
    /// from the caller's perspective (errors are logged, never propagated).
    pub async fn ingest(&self, content: &str) {
        if !self.is_available() {
            return;
        }
        let url = format!("{}/ingest", self.config.base_url);
        let body = serde_json::json!({ "content": content });
        match self.request(self.client.post(&url).json(&body)).await {
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                self.mark_dead();
            }
            Ok(_) => {}
            Err(e) => warn!("remote graph ingest failed: {e}"),
        }
    }

    /// `GRAPH_COMPLETION`-mode query. Returns `None` on any failure so the
    /// caller can fall through to local graph, then vector, then empty.
    pub async fn graph_query(&self, query: &str) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        let url = format!("{}/query", self.config.base_url);
        let body = serde_json::json!({ "query": query, "mode": "GRAPH_COMPLETION" });
        match self.request(self.client.post(&url).json(&body)).await {
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                self.mark_dead();
                None
            }
            Ok(resp) if resp.status().is_success() => {
                resp.json::<GraphQueryResponse>().await.ok().map(|r| r.result)
            }
            Ok(_) => None,
            Err(e) => {
                warn!("remote graph query failed: {e}");
                None
            }
        }
    }

    fn mark_dead(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.dead_since.store(chrono::Utc::now().timestamp(), Ordering::SeqCst);
    }

    /// Background reconnect loop: every 60 s while dead, retry `connect()`.
    pub async fn run_reconnect_loop(&self) {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(RECONNECT_AFTER_SECS as u64));
        loop {
            interval.tick().await;
            if self.is_dead() || !self.connected.load(Ordering::SeqCst) {
                self.connect().await;
            }
        }
    }

    fn request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> impl std::future::Future<Output = reqwest::Result<reqwest::Response>> + '_ {
        let mut builder = builder;
        if let Some(token) = &self.config.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(key) = &self.config.api_key {
            builder = builder.header("x-api-key", key);
        }
        builder.send()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unavailable_until_connected() {
        let client = RemoteGraphClient::new(RemoteGraphConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            bearer_token: None,
            api_key: None,
        });
        assert!(!client.is_available());
    }

    #[test]
    fn mark_dead_flips_availability() {
        let client = RemoteGraphClient::new(RemoteGraphConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            bearer_token: None,
            api_key: None,
        });
        client.connected.store(true, Ordering::SeqCst);
        assert!(client.is_available());
        client.mark_dead();
        assert!(!client.is_available());
    }
}
