//! HTTP generator that calls an Ollama-compatible `/api/generate` endpoint

use crate::config::ServiceConfig;
use crate::error::{PipelineError, Result};
use crate::generators::TextGenerator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Non-streaming generate request
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// HTTP-based generator; no retries at this layer
pub struct OllamaGen {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaGen {
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| PipelineError::Service(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: Self::endpoint_for(&config.base_url),
            client,
        })
    }

    /// `<base>/api/generate`, tolerating a trailing slash on the base URL
    fn endpoint_for(base_url: &str) -> String {
        format!("{}/api/generate", base_url.trim_end_matches('/'))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for OllamaGen {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("Generation request to {} failed: {}", self.endpoint, e);
                PipelineError::Service(e.to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Generation service error ({}): {}", status, error_text);
            return Err(PipelineError::Service(format!("{}: {}", status, error_text)));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse generation response: {}", e);
            PipelineError::Service(format!("malformed response: {}", e))
        })?;

        let text = body.response.ok_or_else(|| {
            PipelineError::Service("response has no `response` field".to_string())
        })?;
        debug!("Generated {} chars with model '{}'", text.len(), model);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::time::Duration;

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/", addr)
    }

    fn client_for(base_url: String) -> OllamaGen {
        OllamaGen::new(&ServiceConfig {
            base_url,
            request_timeout: Some(Duration::from_secs(5)),
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_for() {
        assert_eq!(
            OllamaGen::endpoint_for("http://localhost:11434/"),
            "http://localhost:11434/api/generate"
        );
        assert_eq!(
            OllamaGen::endpoint_for("http://localhost:11434"),
            "http://localhost:11434/api/generate"
        );
    }

    #[tokio::test]
    async fn test_generate_success() {
        let router = Router::new().route(
            "/api/generate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], json!(false));
                let reply = format!("{} says hi to {}", body["model"].as_str().unwrap(), body["prompt"].as_str().unwrap());
                Json(json!({ "response": reply, "done": true }))
            }),
        );
        let gen = client_for(spawn_stub(router).await);
        let text = gen.generate("llama3.1", "steve").await.unwrap();
        assert_eq!(text, "llama3.1 says hi to steve");
    }

    #[tokio::test]
    async fn test_generate_http_error_is_service_failure() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let gen = client_for(spawn_stub(router).await);
        let err = gen.generate("llama3.1", "x").await.unwrap_err();
        assert!(matches!(err, PipelineError::Service(ref msg) if msg.contains("model not loaded")));
    }

    #[tokio::test]
    async fn test_generate_missing_field() {
        let router = Router::new().route(
            "/api/generate",
            post(|| async { Json(json!({ "done": true })) }),
        );
        let gen = client_for(spawn_stub(router).await);
        assert!(gen.generate("llama3.1", "x").await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_generate_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let gen = client_for(format!("http://{}", addr));
        assert!(matches!(
            gen.generate("llama3.1", "x").await,
            Err(PipelineError::Service(_))
        ));
    }
}
