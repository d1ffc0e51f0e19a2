//! Token/cost ledger — one immutable entry per completed turn.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::TokenUsage;

// ─────────────────────────────────────────────
// Pricing
// ─────────────────────────────────────────────

/// Rates for one model, in currency units per million tokens.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
    pub cached: f64,
}

/// Pricing table keyed by provider id, then model id.
///
/// Injected from configuration; nothing here is hard-wired to a vendor's
/// current price list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PricingTable {
    pub currency: String,
    pub models: BTreeMap<String, BTreeMap<String, ModelPrice>>,
}

impl Default for PricingTable {
    fn default() -> Self {
        PricingTable {
            currency: "USD".to_string(),
            models: BTreeMap::new(),
        }
    }
}

impl PricingTable {
    /// Set the rates for a provider/model pair (builder style).
    pub fn with_price(mut self, provider: &str, model: &str, price: ModelPrice) -> Self {
        self.models
            .entry(provider.to_string())
            .or_default()
            .insert(model.to_string(), price);
        self
    }

    pub fn price_for(&self, provider: &str, model: &str) -> Option<&ModelPrice> {
        self.models.get(provider).and_then(|m| m.get(model))
    }

    /// Cost of `usage` on `provider`/`model`.
    ///
    /// `usage.input` includes cached tokens; those are billed at the cached
    /// rate. Thinking tokens are billed at the output rate. An unknown model
    /// costs zero and is logged.
    pub fn cost(&self, provider: &str, model: &str, usage: &TokenUsage) -> TokenCost {
        let Some(price) = self.price_for(provider, model) else {
            warn!(provider, model, "no pricing entry, recording zero cost");
            return TokenCost::zero(&self.currency);
        };

        const PER: f64 = 1_000_000.0;
        let uncached = usage.input.saturating_sub(usage.cached) as f64;
        let input = uncached * price.input / PER;
        let cached = usage.cached as f64 * price.cached / PER;
        let output = (usage.output + usage.thinking) as f64 * price.output / PER;

        TokenCost {
            input,
            output,
            cached,
            total: input + output + cached,
            currency: self.currency.clone(),
        }
    }
}

/// Cost breakdown for one turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenCost {
    pub input: f64,
    pub output: f64,
    pub cached: f64,
    pub total: f64,
    pub currency: String,
}

impl TokenCost {
    pub fn zero(currency: &str) -> Self {
        TokenCost {
            currency: currency.to_string(),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────
// Ledger entry
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: String,
    pub conversation_id: String,
    pub user_id: String,
    pub domain: String,
    pub provider: String,
    pub model: String,
    pub tokens: TokenUsage,
    pub cost: TokenCost,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        conversation_id: &str,
        user_id: &str,
        domain: &str,
        provider: &str,
        model: &str,
        tokens: TokenUsage,
        cost: TokenCost,
        created_at: DateTime<Utc>,
    ) -> Self {
        LedgerEntry {
            id: uuid::Uuid::new_v4().simple().to_string(),
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            domain: domain.to_string(),
            provider: provider.to_string(),
            model: model.to_string(),
            tokens,
            cost,
            created_at,
        }
    }

    /// Whether the entry falls in `[start, end]` (open bounds allowed).
    pub fn within(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> bool {
        start.map_or(true, |s| self.created_at >= s) && end.map_or(true, |e| self.created_at <= e)
    }
}

// ─────────────────────────────────────────────
// Aggregate stats
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub turns: u64,
    pub tokens: TokenUsage,
    pub cost: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub domain: String,
    pub turns: u64,
    pub conversations: u64,
    pub tokens: TokenUsage,
    pub cost: f64,
    pub currency: String,
    pub by_provider: BTreeMap<String, ProviderStats>,
}

impl UsageStats {
    /// Aggregate ledger entries already filtered to one domain and range.
    pub fn from_entries(domain: &str, currency: &str, entries: &[LedgerEntry]) -> Self {
        let mut stats = UsageStats {
            domain: domain.to_string(),
            currency: currency.to_string(),
            ..Default::default()
        };
        let mut conversations = std::collections::HashSet::new();

        for entry in entries {
            stats.turns += 1;
            stats.tokens.accumulate(&entry.tokens);
            stats.cost += entry.cost.total;
            conversations.insert(entry.conversation_id.as_str());

            let per = stats.by_provider.entry(entry.provider.clone()).or_default();
            per.turns += 1;
            per.tokens.accumulate(&entry.tokens);
            per.cost += entry.cost.total;
        }

        stats.conversations = conversations.len() as u64;
        stats
    }
}
