// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! HTTP transport for the classification oracle
//!
//! Model ids look like `provider/model`. `ollama/*` talks to Ollama's native
//! generate endpoint; `local/*` talks to any OpenAI-compatible server at the
//! configured local URL; the hosted providers use their OpenAI-compatible
//! chat completion endpoints, or the local URL when it is on localhost.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier::BackendConfig;
use crate::{Result, SortError};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const OPENAI_URL: &str = "https://api.openai.com/v1";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1";

/// Something that turns a prompt into a completion
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, backend: &BackendConfig, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `POST /api/generate` with `format: "json"`
    OllamaGenerate,
    /// `POST /chat/completions` with a JSON response format
    ChatCompletions,
}

/// Where and how a request for a given backend goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub protocol: Protocol,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl Route {
    /// Resolve a backend into a route. `None` means the backend cannot be
    /// called: no model, unknown provider, or a missing credential.
    pub fn resolve(backend: &BackendConfig) -> Option<Route> {
        let model = backend.model.trim();
        if model.is_empty() {
            return None;
        }

        let (provider, name) = match model.split_once('/') {
            Some((provider, name)) => (provider.to_ascii_lowercase(), name.to_string()),
            None => (infer_provider(model).to_string(), model.to_string()),
        };
        if name.is_empty() {
            return None;
        }

        let local = backend
            .local_base_url
            .as_deref()
            .map(normalize_base_url);

        let route = match provider.as_str() {
            "ollama" => Route {
                protocol: Protocol::OllamaGenerate,
                base_url: local.unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
                model: name,
                api_key: None,
            },
            "local" => Route {
                protocol: Protocol::ChatCompletions,
                base_url: local?,
                model: name,
                api_key: None,
            },
            "openai" | "gemini" | "anthropic" => {
                let (default_url, key) = match provider.as_str() {
                    "openai" => (OPENAI_URL, &backend.openai_key),
                    "gemini" => (GEMINI_URL, &backend.gemini_key),
                    _ => (ANTHROPIC_URL, &backend.anthropic_key),
                };
                Route {
                    protocol: Protocol::ChatCompletions,
                    base_url: local
                        .filter(|url| is_loopback(url))
                        .unwrap_or_else(|| default_url.to_string()),
                    model: name,
                    api_key: Some(key.clone()?),
                }
            }
            _ => return None,
        };

        Some(route)
    }
}

/// Whether `url` points at this machine, e.g. a proxy in front of a hosted API
fn is_loopback(url: &str) -> bool {
    let host = url
        .split_once("://")
        .map_or(url, |(_, rest)| rest)
        .split(['/', ':'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    host == "localhost" || host == "127.0.0.1"
}

fn infer_provider(model: &str) -> &'static str {
    let lower = model.to_ascii_lowercase();
    if lower.starts_with("gpt") || lower.starts_with("o1") || lower.starts_with("o3") {
        "openai"
    } else if lower.starts_with("gemini") {
        "gemini"
    } else if lower.starts_with("claude") {
        "anthropic"
    } else {
        "ollama"
    }
}

/// Strip trailing slashes and endpoint suffixes users tend to paste in
fn normalize_base_url(url: &str) -> String {
    url.trim()
        .trim_end_matches('/')
        .trim_end_matches("/api/generate")
        .trim_end_matches("/api/chat")
        .trim_end_matches("/chat/completions")
        .trim_end_matches('/')
        .to_string()
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Oracle backed by reqwest
pub struct HttpOracle {
    client: Client,
}

impl HttpOracle {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    async fn generate(&self, route: &Route, backend: &BackendConfig, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", route.base_url);
        let request = GenerateRequest {
            model: &route.model,
            prompt,
            stream: false,
            format: "json",
        };

        debug!("Sending request to Ollama: model={}", route.model);

        let response = self
            .client
            .post(&url)
            .timeout(backend.timeout)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SortError::Oracle(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        Ok(result.response)
    }

    async fn chat(&self, route: &Route, backend: &BackendConfig, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", route.base_url);
        let request = ChatRequest {
            model: &route.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!("Sending chat completion: url={} model={}", url, route.model);

        let mut builder = self.client.post(&url).timeout(backend.timeout).json(&request);
        if let Some(key) = &route.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(SortError::Oracle(format!(
                "{} returned status {}",
                route.base_url,
                response.status()
            )));
        }

        let result: ChatResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SortError::Oracle("empty completion".to_string()))
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(&self, backend: &BackendConfig, prompt: &str) -> Result<String> {
        let route = Route::resolve(backend)
            .ok_or_else(|| SortError::Oracle(format!("model '{}' is not callable", backend.model)))?;

        match route.protocol {
            Protocol::OllamaGenerate => self.generate(&route, backend, prompt).await,
            Protocol::ChatCompletions => self.chat(&route, backend, prompt).await,
        }
    }
}
