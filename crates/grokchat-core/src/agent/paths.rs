use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{defaults, env};
use crate::error::{ChatError, Result};

/// Storage root: explicit value, then `GROKCHAT_HOME`, then `./agents`.
pub fn default_root(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| std::env::var_os(env::HOME).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(defaults::AGENTS_DIR))
}

/// Agent ids name a single directory under the root.
pub fn validate_agent_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\'])
        && !id.chars().any(char::is_whitespace);
    if valid {
        Ok(())
    } else {
        Err(ChatError::Config(format!("invalid agent id '{id}'")))
    }
}

/// Directory layout of one agent:
///
/// ```text
/// ROOT/<id>/
///   config.toml  history.json  secrets.json
///   backups/  logs/  exports/  uploads/
/// ```
#[derive(Debug, Clone)]
pub struct AgentPaths {
    id: String,
    dir: PathBuf,
}

impl AgentPaths {
    pub fn new(root: &Path, id: &str) -> Result<Self> {
        validate_agent_id(id)?;
        Ok(Self {
            id: id.to_string(),
            dir: root.join(id),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    pub fn config_file(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    pub fn history_file(&self) -> PathBuf {
        self.dir.join("history.json")
    }

    pub fn secrets_file(&self) -> PathBuf {
        self.dir.join("secrets.json")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.dir.join("backups")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.dir.join("exports")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.join("uploads")
    }

    /// Create the agent directory and its subdirectories if missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.dir.clone(),
            self.backups_dir(),
            self.logs_dir(),
            self.exports_dir(),
            self.uploads_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| ChatError::storage(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_creates_layout() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path(), "alice").unwrap();
        assert!(!paths.exists());

        paths.ensure().unwrap();

        assert!(paths.exists());
        for sub in ["backups", "logs", "exports", "uploads"] {
            assert!(dir.path().join("alice").join(sub).is_dir(), "{sub} missing");
        }
        assert_eq!(paths.config_file(), dir.path().join("alice/config.toml"));
    }

    #[test]
    fn test_rejects_ids_that_escape_root() {
        for id in ["", "..", "a/b", "a\\b", "with space"] {
            assert!(validate_agent_id(id).is_err(), "{id:?} accepted");
        }
        assert!(validate_agent_id("project-x_2").is_ok());
    }

    #[test]
    fn test_explicit_root_wins() {
        let root = default_root(Some(PathBuf::from("/tmp/custom")));
        assert_eq!(root, PathBuf::from("/tmp/custom"));
    }
}
