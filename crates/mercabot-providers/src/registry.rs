//! Provider registry — static specs for the supported LLM providers.
//!
//! Each `ProviderSpec` describes how to reach one provider: wire format,
//! default endpoint and models, and the keywords used to match a model id
//! given as an override.

use std::collections::HashMap;
use std::sync::Arc;

use mercabot_core::config::schema::{ProviderConfig, ProvidersConfig};
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::gemini::GeminiAdapter;
use crate::openai_compat::OpenAiCompatAdapter;
use crate::traits::{ProviderAdapter, ToolInvoker};

// ─────────────────────────────────────────────
// ProviderSpec
// ─────────────────────────────────────────────

/// Request/response shape spoken by a provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireFormat {
    /// `/chat/completions` with OpenAI tool calls and SSE deltas.
    OpenAiCompatible,
    /// `models/{model}:generateContent` with function declarations.
    Gemini,
}

#[derive(Clone, Debug)]
pub struct ProviderSpec {
    /// Id used in configuration and routing (e.g. `"gemini"`).
    pub id: &'static str,
    /// Human-readable name for logs.
    pub display_name: &'static str,
    /// Lowercase substrings that identify this provider's model ids.
    pub keywords: &'static [&'static str],
    pub wire: WireFormat,
    pub default_api_base: &'static str,
    pub default_model: &'static str,
    /// Model switched to for extended reasoning; `None` means the provider
    /// enables reasoning with a request parameter instead.
    pub reasoning_model: Option<&'static str>,
    pub supports_extended_reasoning: bool,
}

pub static PROVIDERS: &[ProviderSpec] = &[
    ProviderSpec {
        id: "openai",
        display_name: "OpenAI",
        keywords: &["gpt", "openai", "o1", "o3", "o4"],
        wire: WireFormat::OpenAiCompatible,
        default_api_base: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        reasoning_model: None,
        supports_extended_reasoning: false,
    },
    ProviderSpec {
        id: "gemini",
        display_name: "Gemini",
        keywords: &["gemini"],
        wire: WireFormat::Gemini,
        default_api_base: "https://generativelanguage.googleapis.com/v1beta",
        default_model: "gemini-2.0-flash",
        reasoning_model: None,
        supports_extended_reasoning: true,
    },
    ProviderSpec {
        id: "deepseek",
        display_name: "DeepSeek",
        keywords: &["deepseek"],
        wire: WireFormat::OpenAiCompatible,
        default_api_base: "https://api.deepseek.com/v1",
        default_model: "deepseek-chat",
        reasoning_model: Some("deepseek-reasoner"),
        supports_extended_reasoning: true,
    },
];

/// Look up a spec by provider id.
pub fn find_by_id(id: &str) -> Option<&'static ProviderSpec> {
    PROVIDERS.iter().find(|s| s.id == id)
}

/// Find the provider whose keywords match a model id.
pub fn find_by_model(model: &str) -> Option<&'static ProviderSpec> {
    let lower = model.to_lowercase();
    PROVIDERS
        .iter()
        .find(|s| s.keywords.iter().any(|kw| lower.starts_with(kw) || lower.contains(&format!("/{kw}"))))
        .or_else(|| PROVIDERS.iter().find(|s| s.keywords.iter().any(|kw| lower.contains(kw))))
}

/// A resolved model override.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForcedModel {
    pub provider: &'static str,
    /// Concrete model when the override named one.
    pub model: Option<String>,
}

/// Resolve `force` as a provider id or a model id.
pub fn resolve_forced(force: &str) -> Option<ForcedModel> {
    let force = force.trim();
    if force.is_empty() {
        return None;
    }
    if let Some(spec) = find_by_id(&force.to_lowercase()) {
        return Some(ForcedModel {
            provider: spec.id,
            model: None,
        });
    }
    find_by_model(force).map(|spec| ForcedModel {
        provider: spec.id,
        model: Some(force.to_string()),
    })
}

// ─────────────────────────────────────────────
// Construction
// ─────────────────────────────────────────────

/// Build the adapter for `id` from its config.
pub fn create_adapter(
    id: &str,
    config: &ProviderConfig,
    tools: Arc<dyn ToolInvoker>,
) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
    let spec = find_by_id(id).ok_or_else(|| ProviderError::NotConfigured(id.to_string()))?;
    if !config.is_configured() {
        return Err(ProviderError::NotConfigured(id.to_string()));
    }

    debug!(
        provider = spec.display_name,
        api_base = config.api_base.as_deref().unwrap_or(spec.default_api_base),
        "Creating provider adapter"
    );

    Ok(match spec.wire {
        WireFormat::OpenAiCompatible => Arc::new(OpenAiCompatAdapter::new(config, spec, tools)),
        WireFormat::Gemini => Arc::new(GeminiAdapter::new(config, spec, tools)),
    })
}

/// Build one adapter per configured provider.
pub fn build_adapters(
    providers: &ProvidersConfig,
    tools: Arc<dyn ToolInvoker>,
) -> HashMap<String, Arc<dyn ProviderAdapter>> {
    let mut out = HashMap::new();
    for spec in PROVIDERS {
        let Some(config) = providers.get_by_name(spec.id) else {
            continue;
        };
        if !config.is_configured() {
            continue;
        }
        match create_adapter(spec.id, config, tools.clone()) {
            Ok(adapter) => {
                out.insert(spec.id.to_string(), adapter);
            }
            Err(e) => warn!(provider = spec.id, "skipping provider: {}", e),
        }
    }
    out
}
