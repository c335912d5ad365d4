// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Sortwise

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classifier::BackendConfig;
use crate::pipeline::Placement;
use crate::stability::StabilityProbe;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directories to watch (non-recursive)
    #[serde(default)]
    pub source_folders: Vec<PathBuf>,

    /// Shared destination root, used when `inplace` is off
    #[serde(default)]
    pub target_folder: Option<PathBuf>,

    /// Organize each file under its own source folder
    #[serde(default = "default_true")]
    pub inplace: bool,

    /// Ledger of completed moves
    #[serde(default = "default_history_file")]
    pub history_file: PathBuf,

    /// Classification backend
    #[serde(default)]
    pub engine: EngineConfig,

    /// Watch loop tuning
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    /// `provider/model`, e.g. `gemini/gemini-2.0-flash` or `ollama/llama3.2`
    #[serde(default = "default_model")]
    pub model: String,
    /// Gemini key
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub openai_api_key: String,
    #[serde(default)]
    pub anthropic_api_key: String,
    #[serde(default = "default_local_base_url")]
    pub local_base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_stability_timeout_ms")]
    pub stability_timeout_ms: u64,
    #[serde(default = "default_stability_interval_ms")]
    pub stability_interval_ms: u64,
}

// Default value functions
fn default_true() -> bool { true }
fn default_history_file() -> PathBuf { PathBuf::from("sortwise_history.json") }
fn default_model() -> String { "gemini/gemini-2.0-flash".to_string() }
fn default_local_base_url() -> String { "http://localhost:11434".to_string() }
fn default_timeout() -> u64 { 30 }
fn default_debounce_ms() -> u64 { 750 }
fn default_stability_timeout_ms() -> u64 { 5000 }
fn default_stability_interval_ms() -> u64 { 500 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            source_folders: Vec::new(),
            target_folder: None,
            inplace: default_true(),
            history_file: default_history_file(),
            engine: EngineConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: String::new(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            local_base_url: default_local_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            stability_timeout_ms: default_stability_timeout_ms(),
            stability_interval_ms: default_stability_interval_ms(),
        }
    }
}

impl EngineConfig {
    /// Snapshot the engine settings as an immutable classifier backend
    pub fn backend(&self) -> BackendConfig {
        BackendConfig {
            model: self.model.clone(),
            gemini_key: non_empty(&self.api_key),
            openai_key: non_empty(&self.openai_api_key),
            anthropic_key: non_empty(&self.anthropic_api_key),
            local_base_url: non_empty(&self.local_base_url),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn probe(&self) -> StabilityProbe {
        StabilityProbe::new(
            Duration::from_millis(self.stability_timeout_ms),
            Duration::from_millis(self.stability_interval_ms),
        )
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::SortError::Config(format!("Failed to parse config: {}", e)))?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Where organized files go, derived from `inplace` and `target_folder`
    pub fn placement(&self) -> crate::Result<Placement> {
        if self.inplace {
            return Ok(Placement::InPlace);
        }
        match &self.target_folder {
            Some(target) if !target.as_os_str().is_empty() => Ok(Placement::Shared(target.clone())),
            _ => Err(crate::SortError::Config(
                "target_folder must be set when inplace is false".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"source_folders": ["/tmp/in"], "inplace": false, "target_folder": "/tmp/out"}"#,
        )
        .unwrap();

        assert_eq!(config.source_folders, vec![PathBuf::from("/tmp/in")]);
        assert_eq!(config.engine.model, "gemini/gemini-2.0-flash");
        assert_eq!(config.watch.stability_timeout_ms, 5000);
        assert_eq!(
            config.placement().unwrap(),
            Placement::Shared(PathBuf::from("/tmp/out"))
        );
    }

    #[test]
    fn test_shared_mode_requires_target() {
        let config = AppConfig {
            inplace: false,
            ..AppConfig::default()
        };
        assert!(config.placement().is_err());
    }

    #[test]
    fn test_blank_keys_are_unset() {
        let engine = EngineConfig {
            api_key: "  ".to_string(),
            openai_api_key: "sk-test".to_string(),
            ..EngineConfig::default()
        };
        let backend = engine.backend();
        assert_eq!(backend.gemini_key, None);
        assert_eq!(backend.openai_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.inplace);
        assert!(config.source_folders.is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = AppConfig::default();
        config.source_folders.push(PathBuf::from("/data/downloads"));
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.source_folders, config.source_folders);
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(crate::SortError::Config(_))));
    }
}
