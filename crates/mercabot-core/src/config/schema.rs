//! Configuration schema.
//!
//! Hierarchy: `Config` → `ProvidersConfig`, `RoutingConfig`, `IntentConfig`,
//! `PromptsConfig`, `ConversationConfig`, `CatalogConfig`,
//! `GenerationConfig`, `PricingTable`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ConfigError;
use crate::ledger::{ModelPrice, PricingTable};

/// Provider ids this build knows how to talk to.
pub const PROVIDER_IDS: &[&str] = &["openai", "gemini", "deepseek"];

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.mercabot/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub providers: ProvidersConfig,
    pub routing: RoutingConfig,
    pub intent: IntentConfig,
    pub prompts: PromptsConfig,
    pub conversation: ConversationConfig,
    pub catalog: CatalogConfig,
    pub generation: GenerationConfig,
    pub pricing: PricingTable,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: ProvidersConfig::default(),
            routing: RoutingConfig::default(),
            intent: IntentConfig::default(),
            prompts: PromptsConfig::default(),
            conversation: ConversationConfig::default(),
            catalog: CatalogConfig::default(),
            generation: GenerationConfig::default(),
            pricing: default_pricing(),
        }
    }
}

impl Config {
    /// Refuse configurations the orchestrator cannot run with.
    ///
    /// At least one provider needs a key, and every provider id referenced
    /// by routing, fallback, or intent classification must be known.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.configured_ids().is_empty() {
            return Err(ConfigError::NoProviderConfigured);
        }

        let mut refs: Vec<(String, &str)> = vec![
            ("routing.conversational".into(), self.routing.conversational.as_str()),
            ("routing.toolCalling".into(), self.routing.tool_calling.as_str()),
            ("routing.reasoning".into(), self.routing.reasoning.as_str()),
            ("intent.primary".into(), self.intent.primary.as_str()),
            ("intent.secondary".into(), self.intent.secondary.as_str()),
        ];
        for (i, id) in self.routing.fallback_order.iter().enumerate() {
            refs.push((format!("routing.fallbackOrder[{i}]"), id.as_str()));
        }

        for (field, id) in refs {
            if !PROVIDER_IDS.contains(&id) {
                return Err(ConfigError::UnknownProvider {
                    field,
                    id: id.to_string(),
                });
            }
        }

        if self.conversation.history_window == 0 {
            return Err(ConfigError::Invalid {
                field: "conversation.historyWindow".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────

/// Configuration for a single LLM provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderConfig {
    /// API key for authentication.
    pub api_key: String,
    /// Custom API base URL (overrides provider default).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Model override; the registry default is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Model used when extended reasoning is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_model: Option<String>,
    /// Request timeout at the HTTP client.
    pub timeout_secs: u64,
    /// Extra HTTP headers to send with each request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_headers: Option<HashMap<String, String>>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: None,
            reasoning_model: None,
            timeout_secs: 30,
            extra_headers: None,
        }
    }
}

impl ProviderConfig {
    /// Whether this provider has a configured API key.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// All provider configurations.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvidersConfig {
    pub openai: ProviderConfig,
    pub gemini: ProviderConfig,
    pub deepseek: ProviderConfig,
}

impl ProvidersConfig {
    /// Get a provider config by id (e.g. `"gemini"`).
    pub fn get_by_name(&self, name: &str) -> Option<&ProviderConfig> {
        match name {
            "openai" => Some(&self.openai),
            "gemini" => Some(&self.gemini),
            "deepseek" => Some(&self.deepseek),
            _ => None,
        }
    }

    pub fn get_by_name_mut(&mut self, name: &str) -> Option<&mut ProviderConfig> {
        match name {
            "openai" => Some(&mut self.openai),
            "gemini" => Some(&mut self.gemini),
            "deepseek" => Some(&mut self.deepseek),
            _ => None,
        }
    }

    /// Ids of providers with an API key, in [`PROVIDER_IDS`] order.
    pub fn configured_ids(&self) -> Vec<&'static str> {
        PROVIDER_IDS
            .iter()
            .copied()
            .filter(|id| self.get_by_name(id).is_some_and(|p| p.is_configured()))
            .collect()
    }
}

// ─────────────────────────────────────────────
// Routing
// ─────────────────────────────────────────────

/// Which provider fills each routing role, plus the fallback chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingConfig {
    /// Greetings, acknowledgements and the default route.
    pub conversational: String,
    /// Catalog searches (strong, cheap tool calling).
    pub tool_calling: String,
    /// Comparisons, cost math, multi-part and "why/how" questions.
    pub reasoning: String,
    /// Tried in order after the routed provider fails.
    pub fallback_order: Vec<String>,
    /// Store-specific product nouns that mark a catalog search.
    pub product_vocabulary: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            conversational: "openai".into(),
            tool_calling: "gemini".into(),
            reasoning: "deepseek".into(),
            fallback_order: vec!["openai".into(), "gemini".into(), "deepseek".into()],
            product_vocabulary: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Intent
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IntentConfig {
    pub enabled: bool,
    /// Score messages with the per-language pattern rules.
    pub local_rules: bool,
    /// Ask an LLM when local rules are unsure.
    pub llm_fallback: bool,
    pub primary: String,
    pub secondary: String,
    pub cache_ttl_secs: u64,
    /// Below this local confidence the LLM classifier is consulted.
    pub escalation_threshold: f32,
    /// At or above this confidence the matching tool runs before generation.
    pub execution_threshold: f32,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_rules: true,
            llm_fallback: true,
            primary: "openai".into(),
            secondary: "deepseek".into(),
            cache_ttl_secs: 300,
            escalation_threshold: 0.7,
            execution_threshold: 0.6,
        }
    }
}

// ─────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptsConfig {
    pub business_ttl_secs: u64,
    pub catalog_ttl_secs: u64,
    /// Example items embedded in the full prompt's catalog digest.
    pub example_items: usize,
    /// Length cap stated in the behavioral rules.
    pub max_response_words: usize,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            business_ttl_secs: 600,
            catalog_ttl_secs: 300,
            example_items: 8,
            max_response_words: 80,
        }
    }
}

// ─────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationConfig {
    /// Non-system messages sent as history each turn.
    pub history_window: usize,
    pub closed_retention_days: i64,
    /// Where conversation documents and the ledger live.
    pub data_dir: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_window: 6,
            closed_retention_days: 90,
            data_dir: "~/.mercabot/data".into(),
        }
    }
}

// ─────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogConfig {
    /// JSON file keyed by domain with `business` and `products`.
    pub path: String,
    /// Secondary business-config source, queried as `{url}/{domain}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub business_config_url: Option<String>,
    /// Extra words never treated as product references or search terms.
    pub stop_words: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: "~/.mercabot/catalog.json".into(),
            business_config_url: None,
            stop_words: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

// ─────────────────────────────────────────────
// Pricing
// ─────────────────────────────────────────────

fn default_pricing() -> PricingTable {
    let rate = |input, output, cached| ModelPrice {
        input,
        output,
        cached,
    };
    PricingTable::default()
        .with_price("openai", "gpt-4o-mini", rate(0.15, 0.60, 0.075))
        .with_price("openai", "gpt-4o", rate(2.50, 10.00, 1.25))
        .with_price("gemini", "gemini-2.0-flash", rate(0.10, 0.40, 0.025))
        .with_price("deepseek", "deepseek-chat", rate(0.27, 1.10, 0.07))
        .with_price("deepseek", "deepseek-reasoner", rate(0.55, 2.19, 0.14))
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn with_openai_key() -> Config {
        let mut config = Config::default();
        config.providers.openai.api_key = "sk-test".into();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.conversation.history_window, 6);
        assert_eq!(config.conversation.closed_retention_days, 90);
        assert_eq!(config.intent.cache_ttl_secs, 300);
        assert_eq!(config.providers.openai.timeout_secs, 30);
        assert_eq!(config.routing.fallback_order, vec!["openai", "gemini", "deepseek"]);
    }

    #[test]
    fn test_config_from_json_camel_case() {
        let json = r#"{
            "providers": { "gemini": { "apiKey": "g-1", "timeoutSecs": 10 } },
            "intent": { "llmFallback": false, "escalationThreshold": 0.8 },
            "catalog": { "businessConfigUrl": "https://config.example/stores" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.providers.gemini.is_configured());
        assert_eq!(config.providers.gemini.timeout_secs, 10);
        assert!(!config.intent.llm_fallback);
        assert!(config.intent.enabled);
        assert_eq!(
            config.catalog.business_config_url.as_deref(),
            Some("https://config.example/stores")
        );
    }

    #[test]
    fn test_empty_json_gives_default_pricing() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert!(config.pricing.price_for("openai", "gpt-4o-mini").is_some());
    }

    #[test]
    fn test_config_json_uses_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["conversation"].get("historyWindow").is_some());
        assert!(json["routing"].get("fallbackOrder").is_some());
        assert!(json["conversation"].get("history_window").is_none());
    }

    #[test]
    fn test_validate_requires_a_provider() {
        assert_eq!(Config::default().validate(), Err(ConfigError::NoProviderConfigured));
        assert!(with_openai_key().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_provider_ids() {
        let mut config = with_openai_key();
        config.routing.fallback_order.push("anthropic".into());
        match config.validate() {
            Err(ConfigError::UnknownProvider { field, id }) => {
                assert_eq!(field, "routing.fallbackOrder[3]");
                assert_eq!(id, "anthropic");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_configured_ids_order() {
        let mut config = Config::default();
        config.providers.deepseek.api_key = "d".into();
        config.providers.openai.api_key = "o".into();
        assert_eq!(config.providers.configured_ids(), vec!["openai", "deepseek"]);
    }
}
