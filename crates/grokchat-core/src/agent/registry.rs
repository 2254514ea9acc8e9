use chrono::{DateTime, Utc};
use ignore::WalkBuilder;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::agent::paths::AgentPaths;
use crate::config::AgentConfig;
use crate::context::{persistence, HistoryStatistics, Turn};
use crate::error::{ChatError, Result};

/// One line of the agent listing.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSummary {
    pub id: String,
    pub path: PathBuf,
    pub model: Option<String>,
    pub message_count: usize,
    pub history_size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentFile {
    /// Relative to the agent directory.
    pub path: PathBuf,
    pub size: u64,
}

/// Detailed view of one agent for `--info` and `/info`.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReport {
    pub summary: AgentSummary,
    pub config: Option<AgentConfig>,
    pub statistics: HistoryStatistics,
    pub files: Vec<AgentFile>,
}

/// Summaries of every agent directory under `root`, least recently updated first.
/// Unreadable config or history files degrade to empty fields.
pub fn list_agents(root: &Path) -> Result<Vec<AgentSummary>> {
    let entries = match fs::read_dir(root) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ChatError::storage(root, e)),
    };

    let mut agents = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ChatError::storage(root, e))?;
        if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let id = entry.file_name().to_string_lossy().into_owned();
        let Ok(paths) = AgentPaths::new(root, &id) else {
            continue;
        };
        let (summary, _, _) = inspect(&paths);
        agents.push(summary);
    }

    agents.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then_with(|| a.id.cmp(&b.id)));
    Ok(agents)
}

/// Configuration, statistics and file listing for one agent.
pub fn agent_report(root: &Path, id: &str) -> Result<AgentReport> {
    let paths = AgentPaths::new(root, id)?;
    if !paths.exists() {
        return Err(ChatError::Config(format!("Agent '{id}' not found")));
    }

    let (summary, config, turns) = inspect(&paths);
    let statistics = HistoryStatistics::compute(&turns);

    let mut files: Vec<AgentFile> = WalkBuilder::new(paths.dir())
        .standard_filters(false)
        .build()
        .flatten()
        .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
        .map(|e| AgentFile {
            path: e
                .path()
                .strip_prefix(paths.dir())
                .unwrap_or(e.path())
                .to_path_buf(),
            size: e.metadata().map(|m| m.len()).unwrap_or(0),
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(AgentReport {
        summary,
        config,
        statistics,
        files,
    })
}

fn inspect(paths: &AgentPaths) -> (AgentSummary, Option<AgentConfig>, Vec<Turn>) {
    let config = AgentConfig::load(&paths.config_file()).unwrap_or_else(|e| {
        tracing::warn!(agent = paths.id(), "Unreadable agent config: {e}");
        None
    });

    let history_file = paths.history_file();
    let turns: Vec<Turn> = persistence::read_json(&history_file)
        .unwrap_or_else(|e| {
            tracing::warn!(agent = paths.id(), "Unreadable agent history: {e}");
            None
        })
        .unwrap_or_default();
    let history_size = fs::metadata(&history_file).map(|m| m.len()).unwrap_or(0);

    let summary = AgentSummary {
        id: paths.id().to_string(),
        path: paths.dir().to_path_buf(),
        model: config.as_ref().map(|c| c.model.clone()),
        message_count: turns.len(),
        history_size,
        created_at: config.as_ref().map(|c| c.created_at),
        updated_at: config.as_ref().map(|c| c.updated_at),
    };
    (summary, config, turns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::models;
    use tempfile::TempDir;

    fn make_agent(root: &Path, id: &str, turns: &[Turn]) -> AgentPaths {
        let paths = AgentPaths::new(root, id).unwrap();
        paths.ensure().unwrap();
        AgentConfig::for_model(&models::GROK4)
            .save(&paths.config_file())
            .unwrap();
        persistence::write_json_atomic(&paths.history_file(), turns).unwrap();
        paths
    }

    #[test]
    fn test_list_agents_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_agents(&dir.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_list_agents_summarises_each_directory() {
        let dir = TempDir::new().unwrap();
        make_agent(dir.path(), "first", &[Turn::user("a"), Turn::assistant("b")]);
        make_agent(dir.path(), "second", &[]);
        fs::write(dir.path().join("stray.txt"), "not an agent").unwrap();

        let agents = list_agents(dir.path()).unwrap();
        assert_eq!(agents.len(), 2);

        let first = agents.iter().find(|a| a.id == "first").unwrap();
        assert_eq!(first.message_count, 2);
        assert_eq!(first.model.as_deref(), Some("grok-4-latest"));
        assert!(first.history_size > 0);
    }

    #[test]
    fn test_corrupt_history_degrades_to_zero() {
        let dir = TempDir::new().unwrap();
        let paths = make_agent(dir.path(), "broken", &[]);
        fs::write(paths.history_file(), "{not json").unwrap();

        let agents = list_agents(dir.path()).unwrap();
        assert_eq!(agents[0].message_count, 0);
    }

    #[test]
    fn test_agent_report_lists_files() {
        let dir = TempDir::new().unwrap();
        make_agent(dir.path(), "bob", &[Turn::user("hello")]);

        let report = agent_report(dir.path(), "bob").unwrap();
        assert_eq!(report.statistics.user_messages, 1);
        assert!(report.config.is_some());
        let names: Vec<_> = report.files.iter().map(|f| f.path.clone()).collect();
        assert!(names.contains(&PathBuf::from("config.toml")));
        assert!(names.contains(&PathBuf::from("history.json")));
    }

    #[test]
    fn test_agent_report_unknown_agent() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            agent_report(dir.path(), "ghost"),
            Err(ChatError::Config(_))
        ));
    }
}
