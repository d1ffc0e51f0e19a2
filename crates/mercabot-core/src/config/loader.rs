//! Config loader — reads `~/.mercabot/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.mercabot/config.json`
//! 3. Environment variables `MERCABOT_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::{Config, ProviderConfig, PROVIDER_IDS};

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `MERCABOT_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `MERCABOT_PROVIDERS__<ID>__API_KEY` / `__API_BASE` / `__MODEL` / `__TIMEOUT_SECS`
/// - `MERCABOT_ROUTING__CONVERSATIONAL` / `__TOOL_CALLING` / `__REASONING`
/// - `MERCABOT_INTENT__ENABLED` / `__LLM_FALLBACK` / `__PRIMARY` / `__SECONDARY`
/// - `MERCABOT_CONVERSATION__HISTORY_WINDOW` / `__DATA_DIR`
/// - `MERCABOT_CATALOG__PATH` / `__BUSINESS_CONFIG_URL`
/// - `MERCABOT_GENERATION__MAX_TOKENS` / `__TEMPERATURE`
fn apply_env_overrides(mut config: Config) -> Config {
    for id in PROVIDER_IDS {
        if let Some(provider) = config.providers.get_by_name_mut(id) {
            apply_provider_env(provider, &id.to_ascii_uppercase());
        }
    }

    // Routing
    if let Ok(val) = std::env::var("MERCABOT_ROUTING__CONVERSATIONAL") {
        config.routing.conversational = val;
    }
    if let Ok(val) = std::env::var("MERCABOT_ROUTING__TOOL_CALLING") {
        config.routing.tool_calling = val;
    }
    if let Ok(val) = std::env::var("MERCABOT_ROUTING__REASONING") {
        config.routing.reasoning = val;
    }

    // Intent
    if let Ok(val) = std::env::var("MERCABOT_INTENT__ENABLED") {
        config.intent.enabled = parse_flag(&val);
    }
    if let Ok(val) = std::env::var("MERCABOT_INTENT__LLM_FALLBACK") {
        config.intent.llm_fallback = parse_flag(&val);
    }
    if let Ok(val) = std::env::var("MERCABOT_INTENT__PRIMARY") {
        config.intent.primary = val;
    }
    if let Ok(val) = std::env::var("MERCABOT_INTENT__SECONDARY") {
        config.intent.secondary = val;
    }

    // Conversation
    if let Ok(val) = std::env::var("MERCABOT_CONVERSATION__HISTORY_WINDOW") {
        if let Ok(n) = val.parse::<usize>() {
            config.conversation.history_window = n;
        }
    }
    if let Ok(val) = std::env::var("MERCABOT_CONVERSATION__DATA_DIR") {
        config.conversation.data_dir = val;
    }

    // Catalog
    if let Ok(val) = std::env::var("MERCABOT_CATALOG__PATH") {
        config.catalog.path = val;
    }
    if let Ok(val) = std::env::var("MERCABOT_CATALOG__BUSINESS_CONFIG_URL") {
        config.catalog.business_config_url = Some(val);
    }

    // Generation
    if let Ok(val) = std::env::var("MERCABOT_GENERATION__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.generation.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("MERCABOT_GENERATION__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.generation.temperature = t;
        }
    }

    config
}

/// Apply env var overrides for a single provider.
fn apply_provider_env(provider: &mut ProviderConfig, name: &str) {
    if let Ok(val) = std::env::var(format!("MERCABOT_PROVIDERS__{name}__API_KEY")) {
        provider.api_key = val;
    }
    if let Ok(val) = std::env::var(format!("MERCABOT_PROVIDERS__{name}__API_BASE")) {
        provider.api_base = Some(val);
    }
    if let Ok(val) = std::env::var(format!("MERCABOT_PROVIDERS__{name}__MODEL")) {
        provider.model = Some(val);
    }
    if let Ok(val) = std::env::var(format!("MERCABOT_PROVIDERS__{name}__TIMEOUT_SECS")) {
        if let Ok(n) = val.parse::<u64>() {
            provider.timeout_secs = n;
        }
    }
}

fn parse_flag(val: &str) -> bool {
    matches!(val.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
