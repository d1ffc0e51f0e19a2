//! Mercabot CLI — entry point.
//!
//! # Commands
//!
//! - `mercabot init` — write default config and a sample catalog
//! - `mercabot status` — show configuration and provider status
//! - `mercabot chat [-m MESSAGE] [--stream] [--model M]` — single message or REPL
//! - `mercabot history` / `close` — conversation lifecycle
//! - `mercabot stats` — ledger totals per domain
//! - `mercabot archive` — archive closed conversations past retention

mod helpers;
mod onboard;
mod repl;
mod status;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use mercabot_core::config::load_config;

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 🛒 Mercabot — multi-provider chat assistant for online stores
#[derive(Parser)]
#[command(name = "mercabot", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write default configuration and a sample catalog
    Init,

    /// Show configuration and provider status
    Status,

    /// Chat as a store customer (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Customer id
        #[arg(short, long, default_value = "cli-user")]
        user: String,

        /// Store domain
        #[arg(short, long, default_value = onboard::SAMPLE_DOMAIN)]
        domain: String,

        /// Provider id or model id to use instead of the router's pick
        #[arg(long)]
        model: Option<String>,

        /// Print the reply as it is generated
        #[arg(long, default_value_t = false)]
        stream: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show the active conversation of a customer
    History {
        #[arg(short, long, default_value = "cli-user")]
        user: String,

        #[arg(short, long, default_value = onboard::SAMPLE_DOMAIN)]
        domain: String,
    },

    /// Close a conversation
    Close {
        /// Conversation id
        id: String,
    },

    /// Token and cost totals for a domain
    Stats {
        #[arg(short, long, default_value = onboard::SAMPLE_DOMAIN)]
        domain: String,

        /// First day included (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Last day included (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Print JSON instead of a table
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Archive closed conversations past the retention window
    Archive,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => onboard::run(),
        Commands::Status => status::run(),
        Commands::Chat {
            message,
            user,
            domain,
            model,
            stream,
            logs,
        } => {
            init_logging(logs);
            run_chat(message, user, domain, model, stream).await
        }
        Commands::History { user, domain } => {
            init_logging(false);
            run_history(&user, &domain).await
        }
        Commands::Close { id } => {
            init_logging(false);
            let orchestrator = helpers::build_orchestrator(&load_config(None), false).await?;
            if orchestrator.close_conversation(&id).await? {
                println!("{} closed {id}", "✓".green());
            } else {
                println!("{} {id} was already closed", "·".dimmed());
            }
            Ok(())
        }
        Commands::Stats { domain, from, to, json } => {
            init_logging(false);
            run_stats(&domain, from.as_deref(), to.as_deref(), json).await
        }
        Commands::Archive => {
            init_logging(false);
            let orchestrator = helpers::build_orchestrator(&load_config(None), false).await?;
            let archived = orchestrator.archive_expired().await?;
            println!("{} archived {archived} conversation(s)", "✓".green());
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────

async fn run_chat(
    message: Option<String>,
    user: String,
    domain: String,
    model: Option<String>,
    stream: bool,
) -> Result<()> {
    let config = load_config(None);
    let orchestrator = helpers::build_orchestrator(&config, true).await?;

    let session = repl::Session {
        user,
        domain,
        model,
        stream,
    };
    match message {
        Some(msg) => {
            info!(user = %session.user, domain = %session.domain, "processing single message");
            repl::send(&orchestrator, &session, &msg).await?;
        }
        None => repl::run(orchestrator, session).await?,
    }
    Ok(())
}

async fn run_history(user: &str, domain: &str) -> Result<()> {
    let orchestrator = helpers::build_orchestrator(&load_config(None), false).await?;
    let messages = orchestrator.get_history(user, domain).await?;
    if messages.is_empty() {
        println!("{}", "(no active conversation)".dimmed());
        return Ok(());
    }
    for m in messages {
        helpers::print_history_message(&m);
    }
    Ok(())
}

async fn run_stats(domain: &str, from: Option<&str>, to: Option<&str>, json: bool) -> Result<()> {
    let start = from.map(helpers::parse_day_start).transpose()?;
    let end = to.map(helpers::parse_day_end).transpose()?;

    let orchestrator = helpers::build_orchestrator(&load_config(None), false).await?;
    let stats = orchestrator.get_stats(domain, start, end).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("serializing stats")?
        );
    } else {
        helpers::print_stats(&stats);
    }
    Ok(())
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("mercabot=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
