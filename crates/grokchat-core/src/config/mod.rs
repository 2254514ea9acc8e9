use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use crate::constants::defaults;
use crate::constants::models::{self, ModelInfo};
use crate::context::persistence;
use crate::error::{ChatError, Result};
use crate::llm::{CompletionRequest, Message};

/// Per-agent generation settings, persisted as `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,
    #[serde(default = "default_stream")]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_temperature() -> f64 {
    defaults::TEMPERATURE
}

fn default_max_history_size() -> usize {
    defaults::MAX_HISTORY_SIZE
}

fn default_stream() -> bool {
    true
}

fn default_top_p() -> f64 {
    defaults::TOP_P
}

/// Overrides applied to a single run without touching the persisted config.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOverrides {
    pub temperature: Option<f64>,
    pub stream: Option<bool>,
}

impl AgentConfig {
    pub fn for_model(model: &ModelInfo) -> Self {
        let now = Utc::now();
        Self {
            model: model.model_name.to_string(),
            temperature: defaults::TEMPERATURE,
            max_tokens: Some(model.max_tokens),
            max_history_size: defaults::MAX_HISTORY_SIZE,
            stream: true,
            system_prompt: Some(defaults::SYSTEM_PROMPT.to_string()),
            top_p: defaults::TOP_P,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(ChatError::Config("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ChatError::Config(format!(
                "temperature must be between 0.0 and 2.0 (got {})",
                self.temperature
            )));
        }
        if self.max_tokens == Some(0) {
            return Err(ChatError::Config("max_tokens must be positive".into()));
        }
        if self.max_history_size == 0 {
            return Err(ChatError::Config("max_history_size must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ChatError::Config(format!(
                "top_p must be between 0.0 and 1.0 (got {})",
                self.top_p
            )));
        }
        Ok(())
    }

    /// Catalogue entry for the configured model, if it is a known one.
    pub fn model_info(&self) -> Option<&'static ModelInfo> {
        models::find_by_model_name(&self.model)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Apply an explicit configuration change. The change is validated as a
    /// whole and only committed, with a fresh `updated_at`, when it is valid.
    pub fn update(&mut self, change: impl FnOnce(&mut AgentConfig)) -> Result<()> {
        let mut next = self.clone();
        change(&mut next);
        next.validate()?;
        next.touch();
        *self = next;
        Ok(())
    }

    /// Copy of this config with per-run overrides applied.
    pub fn with_overrides(&self, overrides: &RunOverrides) -> Result<Self> {
        let mut config = self.clone();
        if let Some(temperature) = overrides.temperature {
            config.temperature = temperature;
        }
        if let Some(stream) = overrides.stream {
            config.stream = stream;
        }
        config.validate()?;
        Ok(config)
    }

    /// Build the outgoing request for a message list.
    pub fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: (self.top_p != defaults::TOP_P).then_some(self.top_p),
            stream: self.stream,
        }
    }

    /// Load a config file. Missing file is `Ok(None)`; unparsable or invalid
    /// content is a configuration error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ChatError::storage(path, e)),
        };

        let config: AgentConfig = toml::from_str(&content).map_err(|e| {
            ChatError::Config(format!("invalid config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(Some(config))
    }

    /// Load the config, or create and persist the model's defaults when absent.
    pub fn load_or_create(path: &Path, model: &ModelInfo) -> Result<Self> {
        if let Some(config) = Self::load(path)? {
            return Ok(config);
        }

        let config = Self::for_model(model);
        config.save(path)?;
        tracing::info!(path = %path.display(), model = model.model_name, "Created default agent config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("failed to serialize config: {e}")))?;
        persistence::write_atomic(path, content.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_for_model() {
        let config = AgentConfig::for_model(&models::GROK3_MINI);

        assert_eq!(config.model, "grok-3-mini-latest");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.max_tokens, Some(32768));
        assert_eq!(config.max_history_size, 1000);
        assert!(config.stream);
        assert_eq!(config.system_prompt.as_deref(), Some("You are a helpful assistant."));
        assert_eq!(config.top_p, 1.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_info_follows_configured_model() {
        let mut config = AgentConfig::for_model(&models::GROK4);
        config.model = models::GROK3_MINI.model_name.to_string();
        assert_eq!(config.model_info().map(|m| m.key), Some("grok3mini"));

        config.model = "not-a-grok-model".into();
        assert!(config.model_info().is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let base = AgentConfig::for_model(&models::GROK4);

        let mut c = base.clone();
        c.temperature = 2.5;
        assert!(matches!(c.validate(), Err(ChatError::Config(_))));

        let mut c = base.clone();
        c.top_p = -0.1;
        assert!(c.validate().is_err());

        let mut c = base.clone();
        c.max_history_size = 0;
        assert!(c.validate().is_err());

        let mut c = base;
        c.max_tokens = Some(0);
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_update_refreshes_timestamp_and_rejects_invalid() {
        let mut config = AgentConfig::for_model(&models::GROK4);
        let before = config.updated_at;

        config.update(|c| c.temperature = 0.7).unwrap();
        assert_eq!(config.temperature, 0.7);
        assert!(config.updated_at >= before);

        let err = config.update(|c| c.temperature = 9.0);
        assert!(err.is_err());
        assert_eq!(config.temperature, 0.7);
    }

    #[test]
    fn test_overrides_do_not_mutate_original() {
        let config = AgentConfig::for_model(&models::GROK4);
        let overrides = RunOverrides {
            temperature: Some(1.2),
            stream: Some(false),
        };

        let run = config.with_overrides(&overrides).unwrap();
        assert_eq!(run.temperature, 1.2);
        assert!(!run.stream);
        assert_eq!(config.temperature, 0.0);
        assert!(config.stream);
    }

    #[test]
    fn test_request_omits_default_top_p() {
        let mut config = AgentConfig::for_model(&models::GROK4);
        let request = config.request(vec![Message::user("hi")]);
        assert!(request.top_p.is_none());

        config.top_p = 0.5;
        let request = config.request(vec![Message::user("hi")]);
        assert_eq!(request.top_p, Some(0.5));
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = AgentConfig::for_model(&models::GROK3);
        config.system_prompt = None;
        config.temperature = 0.25;
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_or_create_persists_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let created = AgentConfig::load_or_create(&path, &models::GROK4).unwrap();
        assert!(path.exists());

        let again = AgentConfig::load_or_create(&path, &models::GROK3).unwrap();
        assert_eq!(again.model, created.model);
    }

    #[test]
    fn test_load_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = \"grok-4-latest\"\ntemperature = 7.0\n").unwrap();

        assert!(matches!(AgentConfig::load(&path), Err(ChatError::Config(_))));
    }
}
