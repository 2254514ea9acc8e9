use anyhow::Result;
use grokchat_core::constants::history::{PREVIEW_CHARS, SEARCH_RESULT_LIMIT};
use grokchat_core::constants::models::ModelInfo;
use grokchat_core::context::{BackupStore, HistoryStore};
use grokchat_core::secrets::{self, mask_key};
use grokchat_core::session::{Session, SessionEvent, TurnOutcome};
use grokchat_core::export::export_to_dir;
use grokchat_core::{
    agent_report, list_agents as load_agents, AgentConfig, AgentPaths, ChatError, ExportDocument,
    ExportFormat, InclusionOutcome, RunOverrides, Turn, XaiClient,
};
use std::io::{self, BufRead, Write};
use std::path::Path;
use tokio::sync::mpsc;

use crate::commands::{self, CommandResult};
use crate::theme::Theme;

const FILES_SHOWN: usize = 20;

// ── Input helpers ───────────────────────────────────────────────────────

/// Print `prompt` and read one line. `None` at end of input.
fn read_line(prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

fn confirm(prompt: &str) -> io::Result<bool> {
    let answer = read_line(prompt)?.unwrap_or_default();
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

/// Print an error; non-recoverable ones are passed back to stop the current operation.
fn report(theme: &Theme, error: ChatError) -> Result<()> {
    if error.is_recoverable() {
        println!("{}", theme.paint(format!("Error: {error}"), theme.error));
        Ok(())
    } else {
        Err(error.into())
    }
}

// ── Agent listing & info ────────────────────────────────────────────────

pub fn list_agents(root: &Path, theme: &Theme) -> Result<()> {
    let agents = load_agents(root)?;
    if agents.is_empty() {
        println!("{}", theme.paint("No agents found", theme.warning));
        return Ok(());
    }

    println!("\n{}", theme.bold("Available Agents:", theme.accent));
    println!("{:<20} {:<22} {:<10} {:<20}", "ID", "Model", "Messages", "Last Updated");
    println!("{}", "-".repeat(75));
    for agent in agents {
        let updated = agent
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Unknown".into());
        println!(
            "{:<20} {:<22} {:<10} {:<20}",
            agent.id,
            agent.model.as_deref().unwrap_or("unknown"),
            agent.message_count,
            updated
        );
    }
    Ok(())
}

pub fn show_agent_info(root: &Path, id: &str, theme: &Theme) -> Result<()> {
    let report = match agent_report(root, id) {
        Ok(r) => r,
        Err(e @ ChatError::Config(_)) => {
            println!("{}", theme.paint(e.to_string(), theme.error));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let rule = "=".repeat(50);
    println!("\n{}", theme.paint(&rule, theme.accent));
    println!("{}", theme.bold(format!("Agent Information: {id}"), theme.warning));
    println!("{}", theme.paint(&rule, theme.accent));

    if let Some(config) = &report.config {
        println!("\n{}", theme.paint("Configuration:", theme.success));
        print_config(config);
        println!("  Created at: {}", config.created_at.format("%Y-%m-%d %H:%M:%S"));
        println!("  Updated at: {}", config.updated_at.format("%Y-%m-%d %H:%M:%S"));
    }

    let stats = &report.statistics;
    if stats.total_messages == 0 {
        println!("\n{}", theme.paint("No conversation history found", theme.warning));
    } else {
        println!("\n{}", theme.paint("Conversation History:", theme.success));
        println!("  Total messages: {}", stats.total_messages);
        println!("  User messages: {}", stats.user_messages);
        println!("  Assistant messages: {}", stats.assistant_messages);
        println!("  Total characters: {}", stats.total_characters);
        println!("  File size: {} bytes", report.summary.history_size);
        if let (Some(first), Some(last)) = (stats.first_message, stats.last_message) {
            println!("  First message: {}", first.format("%Y-%m-%d %H:%M:%S"));
            println!("  Last message: {}", last.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    println!("\n{}", theme.paint("Directory Structure:", theme.success));
    for file in &report.files {
        println!("  {} ({} bytes)", file.path.display(), file.size);
    }
    Ok(())
}

fn print_config(config: &AgentConfig) {
    println!("  Model: {}", config.model);
    println!("  Temperature: {}", config.temperature);
    match config.max_tokens {
        Some(n) => println!("  Max tokens: {n}"),
        None => println!("  Max tokens: (model default)"),
    }
    println!("  Max history size: {}", config.max_history_size);
    println!("  Streaming: {}", config.stream);
    println!("  Top p: {}", config.top_p);
    println!(
        "  System prompt: {}",
        config.system_prompt.as_deref().unwrap_or("(none)")
    );
}

// ── One-shot modes ──────────────────────────────────────────────────────

pub fn configure(paths: &AgentPaths, model: &'static ModelInfo, theme: &Theme) -> Result<()> {
    let config_path = paths.config_file();
    let mut config = AgentConfig::load_or_create(&config_path, model)?;

    println!(
        "\n{}",
        theme.bold(format!("Configuring agent '{}' for {}", paths.id(), model.name), theme.accent)
    );
    println!("{}", theme.paint("Press Enter to keep the current value\n", theme.warning));

    let temperature = ask_parsed("Temperature (0.0-2.0)", config.temperature, theme)?;
    let max_tokens = ask_parsed(
        "Max tokens for completion",
        config.max_tokens.unwrap_or(model.max_tokens),
        theme,
    )?;
    let max_history = ask_parsed("Max history size", config.max_history_size, theme)?;
    let system_prompt = read_line("System prompt (optional, '-' to remove): ")?.unwrap_or_default();
    let stream = read_line(&format!(
        "Enable streaming (y/n) [{}]: ",
        if config.stream { "y" } else { "n" }
    ))?
    .unwrap_or_default();

    config.update(|c| {
        c.model = model.model_name.to_string();
        c.temperature = temperature;
        c.max_tokens = Some(max_tokens);
        c.max_history_size = max_history;
        match system_prompt.trim() {
            "" => {}
            "-" => c.system_prompt = None,
            prompt => c.system_prompt = Some(prompt.to_string()),
        }
        match stream.trim().to_lowercase().as_str() {
            "n" | "no" | "false" => c.stream = false,
            "y" | "yes" | "true" => c.stream = true,
            _ => {}
        }
    })?;
    config.save(&config_path)?;

    // Applies a smaller bound right away, snapshotting what is dropped.
    HistoryStore::open(
        paths.history_file(),
        BackupStore::new(paths.backups_dir()),
        config.max_history_size,
    )?;

    println!("{}", theme.paint("Configuration saved", theme.success));
    Ok(())
}

fn ask_parsed<T>(label: &str, current: T, theme: &Theme) -> Result<T>
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    loop {
        let Some(answer) = read_line(&format!("{label} [{current}]: "))? else {
            return Ok(current);
        };
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(current);
        }
        match answer.parse() {
            Ok(value) => return Ok(value),
            Err(_) => println!("{}", theme.paint("Invalid value, try again", theme.error)),
        }
    }
}

pub fn prune_backups(paths: &AgentPaths, keep: usize, theme: &Theme) -> Result<()> {
    let removed = BackupStore::new(paths.backups_dir()).prune(keep)?;
    println!(
        "{}",
        theme.paint(format!("Removed {removed} backup snapshot(s)"), theme.success)
    );
    Ok(())
}

pub fn export(
    paths: &AgentPaths,
    model: &'static ModelInfo,
    format: &str,
    theme: &Theme,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let config = AgentConfig::load_or_create(&paths.config_file(), model)?;
    let history = HistoryStore::open(
        paths.history_file(),
        BackupStore::new(paths.backups_dir()),
        config.max_history_size,
    )?;

    let doc = ExportDocument::for_config(paths.id(), model, &config, history.turns());
    let path = export_to_dir(&doc, format, &paths.exports_dir())?;
    println!(
        "{}",
        theme.paint(format!("Exported to: {}", path.display()), theme.success)
    );
    Ok(())
}

// ── Interactive chat ────────────────────────────────────────────────────

pub async fn run_chat(
    paths: AgentPaths,
    model: &'static ModelInfo,
    overrides: RunOverrides,
    theme: Theme,
) -> Result<()> {
    let (api_key, source) = secrets::resolve_api_key(&paths.secrets_file(), Path::new("."), || {
        println!(
            "{}",
            theme.paint(format!("API key for {} not found.", model.name), theme.warning)
        );
        println!(
            "{}",
            theme.paint(
                "You can set the GROK_API_KEY environment variable or enter it now.",
                theme.warning
            )
        );
        read_line("Enter the API key for Grok models: ").map(Option::unwrap_or_default)
    })?;
    println!(
        "{}",
        theme.paint(
            format!("Using API key {} from {}", mask_key(&api_key), source.as_str()),
            theme.muted
        )
    );

    let client = XaiClient::for_model(api_key, model);
    let workdir = std::env::current_dir()?;
    let mut session =
        Session::open(paths, model, Box::new(client), &workdir)?.with_overrides(overrides)?;

    println!(
        "\n{}",
        theme.bold(format!("Starting interactive chat with {}", session.model().name), theme.success)
    );
    println!("{}", theme.paint(format!("Agent: {}", session.agent_id()), theme.warning));
    println!(
        "{}",
        theme.paint("Type '/help' for commands, '/quit' to exit\n", theme.success)
    );

    loop {
        let prompt = theme.bold("You: ", theme.user_color);
        let Some(line) = read_line(&prompt)? else {
            println!("\n{}", theme.paint("Goodbye!", theme.success));
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match commands::handle_command(input) {
            CommandResult::NotACommand => {
                if let Err(e) = chat_turn(&mut session, input, &theme).await {
                    report(&theme, e)?;
                }
            }
            CommandResult::Quit => {
                println!("{}", theme.paint("Goodbye!", theme.success));
                break;
            }
            command => {
                if let Err(e) = run_command(&mut session, command, &theme) {
                    report(&theme, e)?;
                }
            }
        }
    }
    Ok(())
}

async fn chat_turn(session: &mut Session, input: &str, theme: &Theme) -> Result<(), ChatError> {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    print!("\n{}", theme.bold("Assistant: ", theme.assistant_color));
    let _ = io::stdout().flush();

    let (result, ()) = tokio::join!(
        session.send(input, event_tx, cancel),
        print_events(event_rx, theme)
    );

    match result? {
        TurnOutcome::Completed { .. } => {}
        TurnOutcome::Interrupted { .. } => {
            println!(
                "{}",
                theme.paint("[interrupted - response not saved]\n", theme.warning)
            );
        }
    }
    Ok(())
}

async fn print_events(mut event_rx: mpsc::UnboundedReceiver<SessionEvent>, theme: &Theme) {
    while let Some(event) = event_rx.recv().await {
        match event {
            SessionEvent::Inclusion(outcome) => print_inclusion(&outcome, theme),
            SessionEvent::TextDelta(text) => {
                print!("{text}");
                let _ = io::stdout().flush();
            }
            SessionEvent::Complete { usage } => {
                println!("\n");
                if let Some(u) = usage {
                    tracing::info!(input = u.input_tokens, output = u.output_tokens, "Token usage");
                }
            }
            SessionEvent::Interrupted | SessionEvent::Error(_) => println!(),
        }
    }
}

fn print_inclusion(outcome: &InclusionOutcome, theme: &Theme) {
    let line = match outcome {
        InclusionOutcome::Resolved { name, chars, .. } => {
            theme.paint(format!("[included {name} ({chars} characters)]"), theme.muted)
        }
        other => theme.paint(other.marker().unwrap_or_default(), theme.warning),
    };
    print!("\n{line}\n");
}

fn print_turn(turn: &Turn, content: &str, theme: &Theme) {
    println!(
        "[{}] {}: {}",
        turn.timestamp.format("%H:%M:%S"),
        theme.paint(turn.role.as_str(), theme.role_color(turn.role)),
        content
    );
}

fn run_command(
    session: &mut Session,
    command: CommandResult,
    theme: &Theme,
) -> Result<(), ChatError> {
    match command {
        CommandResult::Message(text) => println!("{text}"),

        CommandResult::ShowHistory(n) => {
            let recent = session.history().last(n);
            if recent.is_empty() {
                println!("{}", theme.paint("No messages in history", theme.warning));
            } else {
                println!(
                    "\n{}",
                    theme.paint(format!("Last {} messages:", recent.len()), theme.warning)
                );
                for turn in recent {
                    print_turn(turn, &turn.preview(PREVIEW_CHARS), theme);
                }
            }
            println!();
        }

        CommandResult::Search(term) => {
            let results: Vec<&Turn> = session.history().search(&term).take(SEARCH_RESULT_LIMIT).collect();
            if results.is_empty() {
                println!(
                    "{}",
                    theme.paint(format!("No results found for '{term}'"), theme.warning)
                );
            } else {
                println!(
                    "\n{}",
                    theme.paint(
                        format!("Found {} results for '{term}':", results.len()),
                        theme.warning
                    )
                );
                for turn in results {
                    print_turn(turn, &turn.preview(PREVIEW_CHARS), theme);
                }
            }
            println!();
        }

        CommandResult::ShowStats => {
            let stats = session.history().statistics();
            println!("\n{}", theme.paint("Conversation Statistics:", theme.warning));
            println!("Model: {}", session.config().model);
            println!("Total messages: {}", stats.total_messages);
            println!("User messages: {}", stats.user_messages);
            println!("Assistant messages: {}", stats.assistant_messages);
            println!("Total characters: {}", stats.total_characters);
            println!("Estimated tokens: {}", stats.estimated_tokens);
            println!("Average message length: {}", stats.average_message_length);
            if let (Some(first), Some(last)) = (stats.first_message, stats.last_message) {
                println!("First message: {}", first.format("%Y-%m-%d %H:%M:%S"));
                println!("Last message: {}", last.format("%Y-%m-%d %H:%M:%S"));
                println!("Duration: {}", stats.duration_display().unwrap_or_default());
            }
            println!();
        }

        CommandResult::ShowConfig => {
            println!("\n{}", theme.paint("Current Configuration:", theme.warning));
            let effective = session.effective_config()?;
            print_config(&effective);
            if effective != *session.config() {
                println!(
                    "{}",
                    theme.paint("  (includes command-line overrides for this run)", theme.muted)
                );
            }
            println!();
        }

        CommandResult::Export(format) => {
            let format: ExportFormat = format.parse()?;
            let path = session.export(format)?;
            println!(
                "{}",
                theme.paint(format!("Exported to: {}", path.display()), theme.success)
            );
        }

        CommandResult::Clear => {
            if !confirm(&theme.paint("Clear conversation history? (y/N): ", theme.warning))? {
                return Ok(());
            }
            match session.clear_history()? {
                Some(backup) => println!(
                    "{}",
                    theme.paint(
                        format!("Conversation history cleared (backup: {})", backup.display()),
                        theme.success
                    )
                ),
                None => println!("{}", theme.paint("History is already empty", theme.warning)),
            }
        }

        CommandResult::ListFiles => {
            let files = session.list_files();
            if files.is_empty() {
                println!(
                    "{}",
                    theme.paint("No supported files found for inclusion", theme.warning)
                );
            } else {
                println!("\n{}", theme.paint("Files available for inclusion:", theme.warning));
                for file in files.iter().take(FILES_SHOWN) {
                    println!(
                        "{} ({}) [{}]",
                        file.path.display(),
                        file.display_size(),
                        file.extension
                    );
                }
                if files.len() > FILES_SHOWN {
                    println!(
                        "{}",
                        theme.paint(
                            format!("... and {} more files", files.len() - FILES_SHOWN),
                            theme.warning
                        )
                    );
                }
                println!(
                    "{}",
                    theme.paint("Use {filename} in your message to include file content\n", theme.accent)
                );
            }
        }

        CommandResult::ShowInfo => {
            let root = session
                .paths()
                .dir()
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf();
            show_agent_info(&root, session.agent_id(), theme)
                .map_err(|e| ChatError::Config(e.to_string()))?;
        }

        CommandResult::NotACommand | CommandResult::Quit => {}
    }
    Ok(())
}
