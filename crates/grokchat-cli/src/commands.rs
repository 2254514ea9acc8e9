use grokchat_core::constants::history::DEFAULT_RECENT;

/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Quit the chat.
    Quit,
    /// Clear the history (after confirmation).
    Clear,
    /// Show the last n turns.
    ShowHistory(usize),
    /// Search the history for a term.
    Search(String),
    /// Show conversation statistics.
    ShowStats,
    /// Show the current configuration.
    ShowConfig,
    /// Export the conversation in the named format.
    Export(String),
    /// List files available for `{name}` inclusion.
    ListFiles,
    /// Show agent information.
    ShowInfo,
    /// Not a command - treat as regular input.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    let input = input.trim();
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd.as_str() {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,
        "/clear" => CommandResult::Clear,

        "/history" => {
            if arg.is_empty() {
                CommandResult::ShowHistory(DEFAULT_RECENT)
            } else {
                match arg.parse::<usize>() {
                    Ok(n) if n > 0 => CommandResult::ShowHistory(n),
                    _ => CommandResult::Message("Usage: /history [n] (n must be a positive number)".into()),
                }
            }
        }
        "/search" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /search <term>".into())
            } else {
                CommandResult::Search(arg.to_string())
            }
        }
        "/stats" => CommandResult::ShowStats,
        "/config" => CommandResult::ShowConfig,
        "/export" => {
            if arg.is_empty() {
                CommandResult::Message("Usage: /export <json|txt|md|html>".into())
            } else {
                CommandResult::Export(arg.to_string())
            }
        }
        "/files" => CommandResult::ListFiles,
        "/info" => CommandResult::ShowInfo,

        // Unknown command
        _ => {
            if input.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
╭─ GrokChat Commands ────────────────────────────────────────────╮

  CONVERSATION
    /history [n]              Show the last n messages (default 5)
    /search <term>            Search the conversation history
    /stats                    Show conversation statistics
    /clear                    Clear history (a backup is kept)

  AGENT
    /config                   Show the current configuration
    /info                     Show agent information
    /export <format>          Export (json, txt, md, html)
    /files                    List files available for inclusion

  OTHER
    /help, /h                 Show this help message
    /exit, /quit, /q          Quit

  FILE INCLUSION
    Write {filename} in a message to include that file's content,
    e.g. \"Explain {main.py}\". Searched in ., src, lib, scripts,
    data, documents, files, config, configs and the agent uploads.

╰────────────────────────────────────────────────────────────────╯";

    CommandResult::Message(help_text.into())
}
