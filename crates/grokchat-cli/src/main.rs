use anyhow::{bail, Context, Result};
use clap::Parser;
use grokchat_core::constants::models;
use grokchat_core::{AgentPaths, RunOverrides};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

mod app;
mod commands;
mod theme;

use theme::Theme;

#[derive(Parser)]
#[command(name = "grokchat")]
#[command(about = "GrokChat - terminal chat client for Grok models")]
#[command(version)]
#[command(after_help = "\
Examples:
  grokchat --model grok4 --agent-id my-agent              Start an interactive chat with Grok 4
  grokchat --model grok3mini --agent-id test --no-stream  Chat without streaming
  grokchat --list                                         List all agents
  grokchat --model grok3 --agent-id my-agent --export html
  grokchat --model grok4 --agent-id my-agent --configure")]
struct Cli {
    /// Model to use (grok3, grok3mini, grok4)
    #[arg(short, long)]
    model: Option<String>,

    /// Agent identifier; each agent keeps its own config and history
    #[arg(short, long)]
    agent_id: Option<String>,

    /// List all agents
    #[arg(long)]
    list: bool,

    /// Show detailed information about an agent
    #[arg(long, value_name = "AGENT_ID")]
    info: Option<String>,

    /// Configure the agent interactively
    #[arg(long)]
    configure: bool,

    /// Override the temperature for this run (0.0-2.0)
    #[arg(long)]
    temperature: Option<f64>,

    /// Disable streaming for this run
    #[arg(long)]
    no_stream: bool,

    /// Export the conversation (json, txt, md, html) and exit
    #[arg(long, value_name = "FORMAT")]
    export: Option<String>,

    /// Delete all but the newest KEEP clear/truncate snapshots and exit
    #[arg(long, value_name = "KEEP")]
    prune_backups: Option<usize>,

    /// Directory holding the agents (default: $GROKCHAT_HOME or ./agents)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

/// Console on stderr (RUST_LOG, default warn); with an agent, also
/// `logs/YYYY-MM-DD.log` at info level.
fn init_logging(agent_logs: Option<&Path>) -> Result<()> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        );

    let file_layer = match agent_logs {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let path = dir.join(format!("{}.log", chrono::Local::now().format("%Y-%m-%d")));
            let file: File = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(LevelFilter::INFO),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let theme = Theme::detect(cli.no_color);
    let root = grokchat_core::agent::default_root(cli.root.clone());

    if cli.list {
        init_logging(None)?;
        return app::list_agents(&root, &theme);
    }

    if let Some(ref id) = cli.info {
        init_logging(None)?;
        return app::show_agent_info(&root, id, &theme);
    }

    let Some(model_key) = cli.model.as_deref() else {
        bail!("--model is required (one of: {})", models::keys().join(", "));
    };
    let Some(model) = models::find(model_key) else {
        bail!(
            "Configuration error: unsupported model '{model_key}' (supported: {})",
            models::keys().join(", ")
        );
    };
    let Some(agent_id) = cli.agent_id.as_deref() else {
        bail!("--agent-id is required");
    };

    let paths = AgentPaths::new(&root, agent_id)?;
    paths.ensure()?;
    init_logging(Some(&paths.logs_dir()))?;

    if cli.configure {
        return app::configure(&paths, model, &theme);
    }

    if let Some(keep) = cli.prune_backups {
        return app::prune_backups(&paths, keep, &theme);
    }

    if let Some(ref format) = cli.export {
        return app::export(&paths, model, format, &theme);
    }

    let overrides = RunOverrides {
        temperature: cli.temperature,
        stream: cli.no_stream.then_some(false),
    };
    app::run_chat(paths, model, overrides, theme).await
}
