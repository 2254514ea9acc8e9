use futures::StreamExt;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;

use crate::agent::AgentPaths;
use crate::config::{AgentConfig, RunOverrides};
use crate::constants::models::ModelInfo;
use crate::context::{
    AvailableFile, BackupStore, FileResolver, HistoryStore, InclusionOutcome, Turn,
};
use crate::error::{ChatError, Result};
use crate::export::{self, ExportDocument, ExportFormat};
use crate::llm::{CompletionClient, Message, Role, StreamEvent, Usage};

/// Events emitted while a turn is in flight, for the terminal front end.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Inclusion(InclusionOutcome),
    TextDelta(String),
    Complete { usage: Option<Usage> },
    Interrupted,
    Error(String),
}

/// Result of one request/response cycle that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Both turns were appended to the history.
    Completed { response: String },
    /// The user interrupted the stream. Nothing was appended.
    Interrupted { partial: String },
}

/// One agent's chat session: configuration, history, resolver and client.
///
/// Turns are processed one at a time; `send` takes `&mut self`, so no other
/// history mutation can run while a turn is in flight.
pub struct Session {
    paths: AgentPaths,
    model: &'static ModelInfo,
    config: AgentConfig,
    overrides: RunOverrides,
    history: HistoryStore,
    resolver: FileResolver,
    client: Box<dyn CompletionClient>,
}

impl Session {
    /// Open (creating on first use) the agent at `paths`.
    ///
    /// `workdir` anchors the inclusion search paths.
    pub fn open(
        paths: AgentPaths,
        model: &'static ModelInfo,
        client: Box<dyn CompletionClient>,
        workdir: &Path,
    ) -> Result<Self> {
        paths.ensure()?;
        let config = AgentConfig::load_or_create(&paths.config_file(), model)?;
        let history = HistoryStore::open(
            paths.history_file(),
            BackupStore::new(paths.backups_dir()),
            config.max_history_size,
        )?;
        let resolver = FileResolver::standard(workdir, &paths.uploads_dir());

        // A persisted config keeps its own model; display follows it.
        let model = config.model_info().unwrap_or(model);

        tracing::info!(
            agent = paths.id(),
            model = model.name,
            turns = history.len(),
            "Chat agent initialized"
        );

        Ok(Self {
            paths,
            model,
            config,
            overrides: RunOverrides::default(),
            history,
            resolver,
            client,
        })
    }

    /// Apply per-run overrides. They are never persisted.
    pub fn with_overrides(mut self, overrides: RunOverrides) -> Result<Self> {
        self.config.with_overrides(&overrides)?;
        self.overrides = overrides;
        Ok(self)
    }

    pub fn with_resolver(mut self, resolver: FileResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn agent_id(&self) -> &str {
        self.paths.id()
    }

    pub fn paths(&self) -> &AgentPaths {
        &self.paths
    }

    pub fn model(&self) -> &'static ModelInfo {
        self.model
    }

    /// The persisted configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The configuration used for requests: persisted values plus overrides.
    pub fn effective_config(&self) -> Result<AgentConfig> {
        self.config.with_overrides(&self.overrides)
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Validate, apply and persist a configuration change. A smaller
    /// `max_history_size` truncates the history (with a snapshot).
    ///
    /// On error the in-memory config, the persisted config and the history
    /// bound are all left as they were.
    pub fn update_config(&mut self, change: impl FnOnce(&mut AgentConfig)) -> Result<()> {
        let mut next = self.config.clone();
        next.update(change)?;
        next.with_overrides(&self.overrides)?;

        let config_file = self.paths.config_file();
        next.save(&config_file)?;
        if let Err(e) = self.history.set_max_size(next.max_history_size) {
            if let Err(revert) = self.config.save(&config_file) {
                tracing::error!(agent = self.paths.id(), "Config revert failed: {revert}");
            }
            return Err(e);
        }

        self.config = next;
        tracing::info!(agent = self.paths.id(), "Configuration updated");
        Ok(())
    }

    /// Clear the history, returning the snapshot taken beforehand.
    pub fn clear_history(&mut self) -> Result<Option<PathBuf>> {
        self.history.clear()
    }

    pub fn export_document(&self) -> ExportDocument {
        ExportDocument::new(
            self.paths.id(),
            self.model.name,
            &self.config,
            self.history.turns(),
        )
    }

    /// Write an export into the agent's `exports/` directory.
    pub fn export(&self, format: ExportFormat) -> Result<PathBuf> {
        export::export_to_dir(&self.export_document(), format, &self.paths.exports_dir())
    }

    pub fn list_files(&self) -> Vec<AvailableFile> {
        self.resolver.list_available_files()
    }

    /// Outgoing message list: system prompt, prior user/assistant turns, new user text.
    pub fn build_messages(&self, config: &AgentConfig, resolved_input: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);

        if let Some(prompt) = config.system_prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            messages.push(Message::system(prompt));
        }
        messages.extend(
            self.history
                .turns()
                .iter()
                .filter(|t| matches!(t.role, Role::User | Role::Assistant))
                .map(Turn::to_message),
        );
        messages.push(Message::user(resolved_input));
        messages
    }

    /// Run one request/response cycle.
    ///
    /// The raw `input` is stored as the user turn; the text sent for this
    /// turn has its inclusion markers resolved. On success both turns are
    /// appended; on failure or interrupt the history is left untouched.
    /// `cancel` completing interrupts the call.
    pub async fn send(
        &mut self,
        input: &str,
        event_tx: UnboundedSender<SessionEvent>,
        cancel: impl Future<Output = ()>,
    ) -> Result<TurnOutcome> {
        let config = self.effective_config()?;

        let resolution = self.resolver.resolve(input);
        for outcome in &resolution.outcomes {
            if let Some(err) = outcome.to_error() {
                tracing::warn!(agent = self.paths.id(), "{err}");
            }
            let _ = event_tx.send(SessionEvent::Inclusion(outcome.clone()));
        }

        let request = config.request(self.build_messages(&config, &resolution.text));

        let result = if config.stream {
            self.stream_response(&request, &event_tx, cancel).await
        } else {
            tokio::select! {
                response = self.client.complete(&request) => response.map(|r| {
                    let _ = event_tx.send(SessionEvent::TextDelta(r.content.clone()));
                    Streamed::Finished(r.content, r.usage)
                }),
                _ = cancel => Ok(Streamed::Cancelled(String::new())),
            }
        };

        match result {
            Ok(Streamed::Finished(response, usage)) => {
                self.history
                    .append_all([Turn::user(input), Turn::assistant(response.clone())])?;
                tracing::info!(
                    agent = self.paths.id(),
                    chars = response.len(),
                    "Turn completed"
                );
                let _ = event_tx.send(SessionEvent::Complete { usage });
                Ok(TurnOutcome::Completed { response })
            }
            Ok(Streamed::Cancelled(partial)) => {
                tracing::info!(agent = self.paths.id(), "Turn interrupted by user");
                let _ = event_tx.send(SessionEvent::Interrupted);
                Ok(TurnOutcome::Interrupted { partial })
            }
            Err(e) => {
                tracing::error!(agent = self.paths.id(), "Turn failed: {e}");
                let _ = event_tx.send(SessionEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn stream_response(
        &self,
        request: &crate::llm::CompletionRequest,
        event_tx: &UnboundedSender<SessionEvent>,
        cancel: impl Future<Output = ()>,
    ) -> Result<Streamed> {
        tokio::pin!(cancel);

        let mut stream = tokio::select! {
            stream = self.client.complete_stream(request) => stream?,
            _ = &mut cancel => return Ok(Streamed::Cancelled(String::new())),
        };

        let mut text = String::new();
        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(StreamEvent::TextDelta(delta))) => {
                        text.push_str(&delta);
                        let _ = event_tx.send(SessionEvent::TextDelta(delta));
                    }
                    Some(Ok(StreamEvent::Done)) => break,
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(ChatError::Remote(
                            "stream closed before end marker".into(),
                        ))
                    }
                },
                _ = &mut cancel => return Ok(Streamed::Cancelled(text)),
            }
        }

        if text.is_empty() {
            return Err(ChatError::Remote("No response content received".into()));
        }
        Ok(Streamed::Finished(text, None))
    }
}

enum Streamed {
    Finished(String, Option<Usage>),
    Cancelled(String),
}
