//! Direct-HTTP tools — declarative `(baseUrl, tools[])` entries.
//!
//! Each entry in `vesper.toml`'s `[[tools.http]]` becomes one `HttpTool` per
//! declared tool; calling it performs the HTTP request using a resolved
//! secret when the server config names one.

use std::sync::Arc;

use async_trait::async_trait;
use vesper_core::config::{HttpToolServerConfig, HttpToolSpec};
use vesper_secrets::SecretStore;

use super::{Tool, ToolResult};

pub struct HttpTool {
    server_name: String,
    base_url: String,
    auth_header: Option<String>,
    spec: HttpToolSpec,
    secrets: Option<Arc<SecretStore>>,
    client: reqwest::Client,
}

impl HttpTool {
    /// Build one `HttpTool` per declared tool in `server`.
    pub fn build(server: &HttpToolServerConfig, secrets: Option<Arc<SecretStore>>) -> Vec<Box<dyn Tool>> {
        server
            .tools
            .iter()
            .map(|spec| {
                Box::new(HttpTool {
                    server_name: server.name.clone(),
                    base_url: server.base_url.trim_end_matches('/').to_string(),
                    auth_header: server.auth_header.clone(),
                    spec: spec.clone(),
                    secrets: secrets.clone(),
                    client: reqwest::Client::new(),
                }) as Box<dyn Tool>
            })
            .collect()
    }
}

#[async_trait]
impl Tool for HttpTool {
    // Direct-HTTP tools are flat in the namespace (unlike remote tool-server
    // tools, which are namespaced `serverName__toolName`).
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn input_schema(&self) -> serde_json::Value {
        self.spec.input_schema.clone()
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let url = format!("{}{}", self.base_url, self.spec.path);
        let method = match self.spec.method.to_uppercase().as_str() {
            "GET" => reqwest::Method::GET,
            "PUT" => reqwest::Method::PUT,
            "DELETE" => reqwest::Method::DELETE,
            _ => reqwest::Method::POST,
        };

        let mut req = self.client.request(method.clone(), &url);
        if let Some(template) = &self.auth_header {
            let resolved = match &self.secrets {
                Some(store) => store.resolve(template),
                None => template.clone(),
            };
            req = req.header("Authorization", resolved);
        }
        req = if method == reqwest::Method::GET {
            req.query(&[("payload", input.to_string())])
        } else {
            req.json(&input)
        };

        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                if status.is_success() {
                    ToolResult::success(body)
                } else {
                    ToolResult::error(format!(
                        "{}__{} returned HTTP {}: {}",
                        self.server_name, self.spec.name, status, body
                    ))
                }
            }
            Err(e) => ToolResult::error(format!(
                "{}__{} request failed: {}",
                self.server_name, self.spec.name, e
            )),
        }
    }
}
