//! API credential storage.
//!
//! The key lives in the agent's `secrets.json` (owner-only permissions) or in
//! `GROK_API_KEY`. Only [`mask_key`] output is ever displayed or logged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::constants::env;
use crate::context::persistence;
use crate::error::{ChatError, Result};

const PROVIDER: &str = "grok";
const DEFAULT_KEY: &str = "default";
const GITIGNORE_BLOCK: &str = "\n# API keys\n**/secrets.json\nsecrets.json\n";

/// On-disk shape: `{"provider": "grok", "keys": {"default": "..."}}`.
#[derive(Clone, Serialize, Deserialize)]
pub struct SecretStore {
    pub provider: String,
    #[serde(default)]
    pub keys: BTreeMap<String, String>,
}

// Never print key material.
impl std::fmt::Debug for SecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretStore")
            .field("provider", &self.provider)
            .field("keys", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SecretStore {
    pub fn with_default_key(key: impl Into<String>) -> Self {
        let mut keys = BTreeMap::new();
        keys.insert(DEFAULT_KEY.to_string(), key.into());
        Self {
            provider: PROVIDER.to_string(),
            keys,
        }
    }

    pub fn default_key(&self) -> Option<&str> {
        self.keys
            .get(DEFAULT_KEY)
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        persistence::read_json(path)
    }

    /// Write with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(self)?;
        persistence::write_atomic_private(path, &contents)
    }
}

/// Where the credential came from. Logged instead of the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Environment,
    SecretsFile,
    Prompt,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Environment => "environment variable",
            KeySource::SecretsFile => "secrets file",
            KeySource::Prompt => "interactive prompt",
        }
    }
}

/// Find the API key: `GROK_API_KEY`, then `secrets_path`, then `prompt`.
///
/// A prompted key is saved to `secrets_path` and `.gitignore` (in
/// `gitignore_dir`) is updated so the file is not committed. An empty
/// prompt answer is a configuration error.
pub fn resolve_api_key(
    secrets_path: &Path,
    gitignore_dir: &Path,
    prompt: impl FnOnce() -> io::Result<String>,
) -> Result<(String, KeySource)> {
    if let Some(key) = std::env::var(env::API_KEY)
        .ok()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
    {
        tracing::info!("API key loaded from {}", KeySource::Environment.as_str());
        return Ok((key, KeySource::Environment));
    }

    match SecretStore::load(secrets_path) {
        Ok(Some(store)) => {
            if let Some(key) = store.default_key() {
                tracing::info!("API key loaded from {}", KeySource::SecretsFile.as_str());
                return Ok((key.to_string(), KeySource::SecretsFile));
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Ignoring unreadable secrets file: {e}"),
    }

    let key = prompt()?.trim().to_string();
    if key.is_empty() {
        return Err(ChatError::Config("an API key is required".into()));
    }

    SecretStore::with_default_key(&key).save(secrets_path)?;
    if let Err(e) = ensure_gitignored(gitignore_dir) {
        tracing::warn!("Could not update .gitignore: {e}");
    }
    tracing::info!(masked = %mask_key(&key), "API key saved to secrets file");
    Ok((key, KeySource::Prompt))
}

/// Append `secrets.json` patterns to `dir/.gitignore` unless already present.
pub fn ensure_gitignored(dir: &Path) -> Result<()> {
    let path = dir.join(".gitignore");
    let existing = match fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(ChatError::storage(&path, e)),
    };
    if existing.contains("secrets.json") {
        return Ok(());
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .and_then(|mut f| f.write_all(GITIGNORE_BLOCK.as_bytes()))
        .map_err(|e| ChatError::storage(&path, e))
}

/// `abcd...yz` for display. Short keys are fully hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}...{tail}")
}
