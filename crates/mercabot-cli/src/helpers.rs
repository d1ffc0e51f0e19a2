//! Shared CLI helpers — orchestrator wiring, date parsing, output formatting.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use colored::Colorize;

use mercabot_agent::orchestrator::{ChatReply, ConversationOrchestrator};
use mercabot_agent::tools::{JsonCatalog, ToolExecutor};
use mercabot_core::cache::system_clock;
use mercabot_core::config::Config;
use mercabot_core::conversation::{ConversationMessage, Role};
use mercabot_core::ledger::UsageStats;
use mercabot_core::reply::ActionKind;
use mercabot_core::store::{JsonConversationStore, JsonlLedgerStore};
use mercabot_core::utils::expand_home;
use mercabot_providers::build_adapters;

/// Wire stores, catalog, tools and adapters into an orchestrator.
///
/// With `require_providers`, an invalid configuration or a missing adapter
/// is fatal. Lifecycle commands (history, close, stats) run without keys.
pub async fn build_orchestrator(config: &Config, require_providers: bool) -> Result<Arc<ConversationOrchestrator>> {
    if require_providers {
        config.validate().context("invalid configuration (run `mercabot status`)")?;
    }

    let catalog_path = expand_home(&config.catalog.path);
    let catalog = JsonCatalog::load(&catalog_path)
        .await
        .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;
    let tools = Arc::new(ToolExecutor::from_sources(
        Arc::new(catalog),
        config.catalog.business_config_url.as_deref(),
        config.catalog.stop_words.clone(),
    ));

    let adapters = build_adapters(&config.providers, tools.clone());
    if require_providers && adapters.is_empty() {
        bail!("no provider adapter could be created; set an API key with `mercabot init` and edit the config");
    }

    let data_dir = expand_home(&config.conversation.data_dir);
    let conversations = JsonConversationStore::open(data_dir.join("conversations"))
        .with_context(|| format!("failed to open conversation store in {}", data_dir.display()))?;
    let ledger = JsonlLedgerStore::open(data_dir.join("ledger.jsonl")).context("failed to open ledger")?;

    Ok(Arc::new(ConversationOrchestrator::new(
        config,
        adapters,
        tools,
        Arc::new(conversations),
        Arc::new(ledger),
        system_clock(),
    )))
}

/// `YYYY-MM-DD` as the first instant of that UTC day.
pub fn parse_day_start(day: &str) -> Result<DateTime<Utc>> {
    Ok(parse_day(day)?.and_time(NaiveTime::MIN).and_utc())
}

/// `YYYY-MM-DD` as the last instant of that UTC day.
pub fn parse_day_end(day: &str) -> Result<DateTime<Utc>> {
    let next = parse_day(day)?
        .succ_opt()
        .with_context(|| format!("date out of range: {day}"))?;
    Ok(next.and_time(NaiveTime::MIN).and_utc() - chrono::Duration::nanoseconds(1))
}

fn parse_day(day: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(day.trim(), "%Y-%m-%d").with_context(|| format!("expected YYYY-MM-DD, got '{day}'"))
}

/// Print a finished reply with its routing details.
pub fn print_reply(reply: &ChatReply) {
    println!();
    println!("{}", "🛒 Mercabot".cyan().bold());
    if reply.message.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", reply.message);
    }
    if reply.action.kind == ActionKind::AddToCart {
        println!(
            "{} {} x{}",
            "→ add to cart:".green(),
            reply.action.title.as_deref().unwrap_or("?"),
            reply.action.quantity.unwrap_or(1)
        );
    }
    print_footer(reply);
    println!();
}

/// One dimmed line: provider, model, intent, tokens, latency.
pub fn print_footer(reply: &ChatReply) {
    println!(
        "{}",
        format!(
            "[{} · {} · {} ({:.2}) · {} tokens · {} ms]",
            reply.provider,
            if reply.model.is_empty() { "-" } else { reply.model.as_str() },
            reply.intent.intent,
            reply.intent.confidence,
            reply.usage.total,
            reply.latency_ms
        )
        .dimmed()
    );
}

pub fn print_history_message(message: &ConversationMessage) {
    let who = match message.role {
        Role::User => "You".bold().to_string(),
        Role::Assistant => "Mercabot".cyan().bold().to_string(),
        Role::System => "System".dimmed().to_string(),
    };
    println!("{} {}: {}", message.timestamp.format("%H:%M").to_string().dimmed(), who, message.content);
}

pub fn print_stats(stats: &UsageStats) {
    println!();
    println!("{} {}", "📊 Usage for".cyan().bold(), stats.domain.bold());
    println!("  {:<16} {}", "Turns:".bold(), stats.turns);
    println!("  {:<16} {}", "Conversations:".bold(), stats.conversations);
    println!(
        "  {:<16} {} (in {} / out {} / cached {})",
        "Tokens:".bold(),
        stats.tokens.total,
        stats.tokens.input,
        stats.tokens.output,
        stats.tokens.cached
    );
    println!("  {:<16} {:.6} {}", "Cost:".bold(), stats.cost, stats.currency);
    if !stats.by_provider.is_empty() {
        println!();
        for (provider, p) in &stats.by_provider {
            println!(
                "    {:<12} {:>5} turns {:>9} tokens {:>12.6} {}",
                provider, p.turns, p.tokens.total, p.cost, stats.currency
            );
        }
    }
    println!();
}

/// Print the banner shown at REPL start.
pub fn print_banner(domain: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}  {}", "🛒 Mercabot".cyan().bold(), version.dimmed(), domain.bold());
    println!(
        "{}",
        "Type a message, \"/history\", \"/close\", or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print a "thinking" spinner placeholder (for non-log mode).
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn day_bounds_cover_whole_day() {
        let start = parse_day_start("2024-03-05").unwrap();
        let end = parse_day_end("2024-03-05").unwrap();
        assert_eq!((start.day(), start.hour()), (5, 0));
        assert_eq!((end.day(), end.hour(), end.minute()), (5, 23, 59));
        assert!(end > start);
    }

    #[test]
    fn day_rejects_other_formats() {
        assert!(parse_day_start("05/03/2024").is_err());
        assert!(parse_day_end("").is_err());
    }

    #[tokio::test]
    async fn lifecycle_commands_build_without_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.catalog.path = dir.path().join("catalog.json").to_string_lossy().into_owned();
        config.conversation.data_dir = dir.path().join("data").to_string_lossy().into_owned();

        let orchestrator = build_orchestrator(&config, false).await.unwrap();
        assert!(orchestrator.get_history("u", "shop.example").await.unwrap().is_empty());
        assert!(build_orchestrator(&config, true).await.is_err());
    }
}
