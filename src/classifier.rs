// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Filename classification with a deterministic fallback

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::oracle::{HttpOracle, Oracle, Route};
use crate::{Result, SortError};

pub const DEFAULT_FOLDER: &str = "Other";
pub const DEFAULT_SUBFOLDER: &str = "Misc";

const MAX_COMPONENT_CHARS: usize = 64;

/// Folder and subfolder a file belongs in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub folder: String,
    pub subfolder: String,
}

impl Default for Classification {
    fn default() -> Self {
        Self::new(DEFAULT_FOLDER, DEFAULT_SUBFOLDER)
    }
}

impl Classification {
    pub fn new(folder: impl Into<String>, subfolder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            subfolder: subfolder.into(),
        }
    }

    /// `folder/subfolder`, as stored in the ledger
    pub fn category(&self) -> String {
        format!("{}/{}", self.folder, self.subfolder)
    }
}

/// Immutable description of which oracle to call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub model: String,
    pub gemini_key: Option<String>,
    pub openai_key: Option<String>,
    pub anthropic_key: Option<String>,
    pub local_base_url: Option<String>,
    pub timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            gemini_key: None,
            openai_key: None,
            anthropic_key: None,
            local_base_url: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Anything that can put a filename into a category
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, filename: &str) -> Classification;
}

/// Classifier that asks an oracle and never fails outward
pub struct ClassifierAdapter {
    backend: RwLock<Arc<BackendConfig>>,
    oracle: Arc<dyn Oracle>,
}

impl ClassifierAdapter {
    /// Adapter over the HTTP oracle
    pub fn new(backend: BackendConfig) -> Result<Self> {
        Ok(Self::with_oracle(backend, Arc::new(HttpOracle::new()?)))
    }

    pub fn with_oracle(backend: BackendConfig, oracle: Arc<dyn Oracle>) -> Self {
        Self {
            backend: RwLock::new(Arc::new(backend)),
            oracle,
        }
    }

    /// Swap the backend; calls already in flight keep the old one
    pub fn reconfigure(&self, backend: BackendConfig) {
        let mut slot = self.backend.write().unwrap_or_else(|p| p.into_inner());
        *slot = Arc::new(backend);
    }

    pub fn backend(&self) -> Arc<BackendConfig> {
        self.backend.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    async fn ask(&self, backend: &BackendConfig, filename: &str) -> Result<Classification> {
        let reply = self.oracle.complete(backend, &prompt_for(filename)).await?;
        parse_reply(&reply)
    }
}

#[async_trait]
impl Classifier for ClassifierAdapter {
    async fn classify(&self, filename: &str) -> Classification {
        let backend = self.backend();
        if Route::resolve(&backend).is_none() {
            debug!("No usable model configured, filing {} under default", filename);
            return Classification::default();
        }

        match self.ask(&backend, filename).await {
            Ok(classification) => classification,
            Err(e) => {
                warn!("Classification failed for {}: {}", filename, e);
                Classification::default()
            }
        }
    }
}

fn prompt_for(filename: &str) -> String {
    format!(
        "Categorize the file '{}' into a folder and subfolder.\n\
         Return ONLY a JSON object: {{\"folder\": \"string\", \"subfolder\": \"string\"}}\n\
         Common folders: Documents, Images, Videos, Music, Code, Archives, Installers, Work.",
        filename
    )
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(default)]
    folder: Option<String>,
    #[serde(default)]
    subfolder: Option<String>,
}

/// Parse an oracle reply into a classification
///
/// Text around the first `{ ... }` span is ignored, so fenced or chatty
/// replies still parse. Missing, blank or unsafe fields fall back to
/// `Other` / `Misc` individually.
pub fn parse_reply(reply: &str) -> Result<Classification> {
    let start = reply.find('{');
    let end = reply.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &reply[s..=e],
        _ => return Err(SortError::Oracle(format!("no JSON object in reply: {:?}", reply))),
    };

    let raw: RawReply = serde_json::from_str(json)?;
    Ok(Classification {
        folder: raw
            .folder
            .as_deref()
            .and_then(sanitize_component)
            .unwrap_or_else(|| DEFAULT_FOLDER.to_string()),
        subfolder: raw
            .subfolder
            .as_deref()
            .and_then(sanitize_component)
            .unwrap_or_else(|| DEFAULT_SUBFOLDER.to_string()),
    })
}

/// Reduce `raw` to one safe directory name, or `None` if nothing usable is left
pub fn sanitize_component(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|&c| !c.is_control() && !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .take(MAX_COMPONENT_CHARS)
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}
