//! Inference engine auto-detection.
//!
//! Best effort: a host counts as an engine when a well-known port answers a
//! model-listing request with the expected JSON shape.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::scanner::{self, ScanOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineApi {
    /// `GET /api/tags` → `{"models":[{"name":..}]}`
    Ollama,
    /// `GET /v1/models` → `{"data":[{"id":..}]}`
    OpenAiCompatible,
}

impl EngineApi {
    pub fn models_path(self) -> &'static str {
        match self {
            EngineApi::Ollama => "/api/tags",
            EngineApi::OpenAiCompatible => "/v1/models",
        }
    }
}

/// A port worth asking for models, and what to call the engine found there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTarget {
    pub label: String,
    pub port: u16,
    pub api: EngineApi,
}

impl EngineTarget {
    pub fn new(label: impl Into<String>, port: u16, api: EngineApi) -> Self {
        Self {
            label: label.into(),
            port,
            api,
        }
    }
}

pub fn default_targets() -> Vec<EngineTarget> {
    vec![
        EngineTarget::new("ollama", 11434, EngineApi::Ollama),
        EngineTarget::new("vllm", 8000, EngineApi::OpenAiCompatible),
        EngineTarget::new("mlx", 8081, EngineApi::OpenAiCompatible),
        EngineTarget::new("llama.cpp", 8080, EngineApi::OpenAiCompatible),
        EngineTarget::new("lmstudio", 1234, EngineApi::OpenAiCompatible),
        EngineTarget::new("dnet", 9080, EngineApi::OpenAiCompatible),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEngine {
    pub name: String,
    pub api: EngineApi,
    pub base_url: String,
    pub models: Vec<String>,
    pub default_model: Option<String>,
    pub response_ms: u64,
}

#[derive(Deserialize)]
struct OllamaTags {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OpenAiModels {
    data: Vec<OpenAiModel>,
}

#[derive(Deserialize)]
struct OpenAiModel {
    id: String,
}

/// Pull model names out of a listing response.
pub fn parse_models(api: EngineApi, body: &[u8]) -> Result<Vec<String>> {
    let mut models: Vec<String> = match api {
        EngineApi::Ollama => serde_json::from_slice::<OllamaTags>(body)
            .context("not an ollama tags response")?
            .models
            .into_iter()
            .map(|m| m.name)
            .collect(),
        EngineApi::OpenAiCompatible => serde_json::from_slice::<OpenAiModels>(body)
            .context("not an OpenAI models response")?
            .data
            .into_iter()
            .map(|m| m.id)
            .collect(),
    };
    models.sort();
    models.dedup();
    Ok(models)
}

#[derive(Debug, Clone)]
pub struct EngineDetector {
    client: reqwest::Client,
    targets: Vec<EngineTarget>,
    timeout: Duration,
}

impl EngineDetector {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            targets: default_targets(),
            timeout,
        })
    }

    pub fn with_targets(mut self, targets: Vec<EngineTarget>) -> Self {
        self.targets = targets;
        self
    }

    pub fn targets(&self) -> &[EngineTarget] {
        &self.targets
    }

    /// Ask every target on every host. Results are deduped by base URL and
    /// sorted by it.
    pub async fn detect_hosts(&self, hosts: &[String]) -> Vec<DetectedEngine> {
        let probes = hosts
            .iter()
            .flat_map(|host| self.targets.iter().map(move |t| self.probe(host, t)));
        let mut found: BTreeMap<String, DetectedEngine> = BTreeMap::new();
        for engine in join_all(probes).await.into_iter().flatten() {
            found.entry(engine.base_url.clone()).or_insert(engine);
        }
        found.into_values().collect()
    }

    /// Localhost plus, when given, every node in `subnet` that has one of
    /// the target ports open.
    pub async fn detect(
        &self,
        subnet: Option<&str>,
        token: CancellationToken,
    ) -> fleetgate_core::Result<Vec<DetectedEngine>> {
        let mut hosts = vec!["127.0.0.1".to_string()];
        if let Some(cidr) = subnet {
            let options = ScanOptions::default()
                .with_tcp_ports(self.targets.iter().map(|t| t.port).collect())
                .without_http()
                .with_timeout(self.timeout);
            let mut rx = scanner::scan_subnet(token, cidr, options)?;
            while let Some(node) = rx.recv().await {
                let addr = node.address.to_string();
                if !hosts.contains(&addr) {
                    hosts.push(addr);
                }
            }
        }

        let engines = self.detect_hosts(&hosts).await;
        info!(hosts = hosts.len(), engines = engines.len(), "Engine detection complete");
        Ok(engines)
    }

    async fn probe(&self, host: &str, target: &EngineTarget) -> Option<DetectedEngine> {
        let base_url = format!("http://{}:{}", host, target.port);
        let url = format!("{}{}", base_url, target.api.models_path());
        let started = Instant::now();

        let resp = self.client.get(&url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        let body = resp.bytes().await.ok()?;
        let models = match parse_models(target.api, &body) {
            Ok(models) => models,
            Err(e) => {
                debug!(url = %url, error = %e, "Port answered but not as an engine");
                return None;
            }
        };

        Some(DetectedEngine {
            name: target.label.clone(),
            api: target.api,
            base_url,
            default_model: models.first().cloned(),
            models,
            response_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn serve(app: Router) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        port
    }

    #[test]
    fn parses_ollama_and_sorts() {
        let body = br#"{"models":[{"name":"qwen2.5:7b"},{"name":"llama3:8b"}]}"#;
        let models = parse_models(EngineApi::Ollama, body).unwrap();
        assert_eq!(models, vec!["llama3:8b", "qwen2.5:7b"]);
    }

    #[test]
    fn parses_openai_shape() {
        let body = br#"{"object":"list","data":[{"id":"mistral-7b"}]}"#;
        assert_eq!(
            parse_models(EngineApi::OpenAiCompatible, body).unwrap(),
            vec!["mistral-7b"]
        );
        assert!(parse_models(EngineApi::OpenAiCompatible, br#"{"status":"ok"}"#).is_err());
    }

    #[tokio::test]
    async fn detects_engines_and_skips_lookalikes() {
        let ollama = serve(Router::new().route(
            "/api/tags",
            get(|| async { Json(json!({"models": [{"name": "phi3"}, {"name": "gemma"}]})) }),
        ))
        .await;
        let health_only =
            serve(Router::new().route("/v1/models", get(|| async { Json(json!({"ok": true})) })))
                .await;

        let detector = EngineDetector::new(Duration::from_secs(2))
            .unwrap()
            .with_targets(vec![
                EngineTarget::new("ollama", ollama, EngineApi::Ollama),
                EngineTarget::new("vllm", health_only, EngineApi::OpenAiCompatible),
            ]);

        let hosts = vec!["127.0.0.1".to_string(), "127.0.0.1".to_string()];
        let engines = detector.detect_hosts(&hosts).await;
        assert_eq!(engines.len(), 1);
        assert_eq!(engines[0].name, "ollama");
        assert_eq!(engines[0].base_url, format!("http://127.0.0.1:{ollama}"));
        assert_eq!(engines[0].models, vec!["gemma", "phi3"]);
        assert_eq!(engines[0].default_model.as_deref(), Some("gemma"));
    }
}
