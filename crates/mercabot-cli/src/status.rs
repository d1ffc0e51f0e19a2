//! `mercabot status` — show configuration, catalog and provider status.

use anyhow::Result;
use colored::Colorize;

use mercabot_core::config::{get_config_path, load_config, Config};
use mercabot_core::utils::expand_home;
use mercabot_providers::registry::PROVIDERS;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "🛒 Mercabot Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        found(config_path.exists())
    );

    let catalog = expand_home(&config.catalog.path);
    println!("  {:<18} {} {}", "Catalog:".bold(), catalog.display(), found(catalog.exists()));

    let data_dir = expand_home(&config.conversation.data_dir);
    println!("  {:<18} {} {}", "Data:".bold(), data_dir.display(), found(data_dir.exists()));

    println!(
        "  {:<18} {} | max_tokens: {} | history: {} messages",
        "Generation:".bold(),
        format!("temp: {}", config.generation.temperature).dimmed(),
        config.generation.max_tokens,
        config.conversation.history_window,
    );

    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let status = match config.providers.get_by_name(spec.id) {
            Some(p) if p.is_configured() => format!(
                "{} (key set) {}",
                "✓".green(),
                p.model.as_deref().unwrap_or(spec.default_model).dimmed()
            ),
            _ => format!("{}", "· not configured".dimmed()),
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    println!();
    println!("  {}", "Routing:".bold());
    println!("    {}", routing_line(&config).dimmed());
    let intent = if config.intent.enabled {
        format!(
            "rules {} · llm fallback {} ({} → {})",
            on_off(config.intent.local_rules),
            on_off(config.intent.llm_fallback),
            config.intent.primary,
            config.intent.secondary
        )
    } else {
        "disabled".to_string()
    };
    println!("  {:<18} {}", "Intent:".bold(), intent);

    println!();
    match config.validate() {
        Ok(()) => println!("  {}", "Ready to chat.".green()),
        Err(e) => println!("  {} {}", "✗".red(), e),
    }
    println!();

    Ok(())
}

fn found(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn routing_line(config: &Config) -> String {
    format!(
        "chat → {} · search → {} · reasoning → {} · fallback: {}",
        config.routing.conversational,
        config.routing.tool_calling,
        config.routing.reasoning,
        config.routing.fallback_order.join(" → ")
    )
}
