//! Conversation export in JSON, plain text, Markdown and HTML.

mod html;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::AgentConfig;
use crate::constants::models::ModelInfo;
use crate::context::{persistence, HistoryStatistics, Turn};
use crate::error::{ChatError, Result};
use crate::llm::Role;

const DISPLAY_TIME: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
    Markdown,
    Html,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 4] = [
        ExportFormat::Json,
        ExportFormat::Text,
        ExportFormat::Markdown,
        ExportFormat::Html,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
            ExportFormat::Markdown => "md",
            ExportFormat::Html => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Text),
            "md" | "markdown" => Ok(ExportFormat::Markdown),
            "html" | "htm" => Ok(ExportFormat::Html),
            _ => Err(ChatError::ExportFormat(s.to_string())),
        }
    }
}

/// Everything an export contains. This is also the JSON export's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub agent_id: String,
    /// Display name of the model ("Grok 4").
    pub model: String,
    pub exported_at: DateTime<Utc>,
    pub config: AgentConfig,
    pub messages: Vec<Turn>,
    pub statistics: HistoryStatistics,
}

impl ExportDocument {
    pub fn new(
        agent_id: impl Into<String>,
        model: impl Into<String>,
        config: &AgentConfig,
        turns: &[Turn],
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            model: model.into(),
            exported_at: Utc::now(),
            config: config.clone(),
            messages: turns.to_vec(),
            statistics: HistoryStatistics::compute(turns),
        }
    }

    /// Document labelled with the model `config` names, or `fallback` when
    /// the configured model is not in the catalogue.
    pub fn for_config(
        agent_id: impl Into<String>,
        fallback: &ModelInfo,
        config: &AgentConfig,
        turns: &[Turn],
    ) -> Self {
        let model = config.model_info().map_or(fallback.name, |m| m.name);
        Self::new(agent_id, model, config, turns)
    }
}

/// Render `doc` in `format`. Pure; writes nothing.
pub fn render(doc: &ExportDocument, format: ExportFormat) -> Result<Vec<u8>> {
    let text = match format {
        ExportFormat::Json => return Ok(serde_json::to_vec_pretty(doc)?),
        ExportFormat::Text => render_text(doc),
        ExportFormat::Markdown => render_markdown(doc),
        ExportFormat::Html => html::render_html(doc),
    };
    Ok(text.into_bytes())
}

/// Re-import a JSON export.
pub fn parse_json_export(bytes: &[u8]) -> Result<ExportDocument> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Render and write `conversation_<timestamp>.<ext>` into `dir`.
pub fn export_to_dir(doc: &ExportDocument, format: ExportFormat, dir: &Path) -> Result<PathBuf> {
    let bytes = render(doc, format)?;
    fs::create_dir_all(dir).map_err(|e| ChatError::storage(dir, e))?;

    let stamp = doc.exported_at.format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("conversation_{stamp}.{}", format.extension()));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("conversation_{stamp}_{n}.{}", format.extension()));
        n += 1;
    }

    persistence::write_atomic(&path, &bytes)?;
    tracing::info!(
        path = %path.display(),
        format = %format,
        messages = doc.messages.len(),
        "Conversation exported"
    );
    Ok(path)
}

fn render_text(doc: &ExportDocument) -> String {
    let mut out = String::new();
    out.push_str("Conversation Export - GrokChat\n");
    out.push_str(&format!("Agent ID: {}\n", doc.agent_id));
    out.push_str(&format!("Model: {}\n", doc.model));
    out.push_str(&format!("Exported at: {}\n", doc.exported_at.format(DISPLAY_TIME)));
    out.push_str(&"=".repeat(60));
    out.push_str("\n\n");

    if doc.messages.is_empty() {
        out.push_str("(no messages)\n");
    }
    for turn in &doc.messages {
        out.push_str(&format!(
            "[{}] {}:\n{}\n\n",
            turn.timestamp.format(DISPLAY_TIME),
            turn.role.as_str().to_uppercase(),
            turn.content
        ));
    }
    out
}

fn role_emoji(role: Role) -> &'static str {
    match role {
        Role::User => "🧑",
        Role::Assistant => "🤖",
        Role::System => "⚙️",
    }
}

fn render_markdown(doc: &ExportDocument) -> String {
    let mut out = String::new();
    out.push_str("# Conversation - GrokChat\n\n");
    out.push_str(&format!("**Agent ID:** {}  \n", doc.agent_id));
    out.push_str(&format!("**Model:** {}  \n", doc.model));
    out.push_str(&format!(
        "**Exported at:** {}  \n\n",
        doc.exported_at.format(DISPLAY_TIME)
    ));

    if doc.messages.is_empty() {
        out.push_str("_No messages._\n");
    }
    for turn in &doc.messages {
        out.push_str(&format!(
            "## {} {} - {}\n\n",
            role_emoji(turn.role),
            turn.role.title(),
            turn.timestamp.format(DISPLAY_TIME)
        ));
        // Blockquote every line so content cannot open headings or close blocks.
        for line in turn.content.lines() {
            if line.is_empty() {
                out.push_str(">\n");
            } else {
                out.push_str(&format!("> {line}\n"));
            }
        }
        if turn.content.is_empty() {
            out.push_str(">\n");
        }
        out.push('\n');
    }
    out
}
