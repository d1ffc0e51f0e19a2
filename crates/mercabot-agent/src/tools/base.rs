//! StoreTool trait and the context every store tool shares.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use mercabot_core::catalog::{BusinessProfile, Product};
use mercabot_core::error::ToolError;
use mercabot_core::reply::ToolResult;
use mercabot_core::types::ToolDefinition;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use super::business::BusinessDirectory;
use super::catalog_store::CatalogStore;
use super::search;
use crate::language;

/// Opaque ids: 24 hex characters, or a run of at least 6 digits.
static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9a-fA-F]{24}|\d{6,})$").expect("static pattern"));

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("static pattern"));

// ─────────────────────────────────────────────
// StoreTool trait
// ─────────────────────────────────────────────

/// Every store tool implements this trait.
///
/// "Nothing found" is `Ok` with an empty result; `Err` is reserved for the
/// backing store or HTTP source being unreachable.
#[async_trait]
pub trait StoreTool: Send + Sync {
    /// Name used by the model to call this tool (e.g. `"search_products"`).
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema: `{"type": "object", "properties": {...}, "required": [...]}`.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: &Value, domain: &str) -> Result<ToolResult, ToolError>;

    /// Build the `ToolDefinition` sent to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters())
    }
}

// ─────────────────────────────────────────────
// Param helpers
// ─────────────────────────────────────────────

/// Non-empty trimmed string param. Numbers are accepted as their text.
pub fn optional_string(args: &Value, key: &str) -> Option<String> {
    let value = args.get(key)?;
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Quantity param clamped to `[1, 100]`; accepts numbers and numeric strings.
pub fn optional_quantity(args: &Value, key: &str) -> Option<u32> {
    let raw = match args.get(key)? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if raw < 1.0 {
        return None;
    }
    Some(raw.min(100.0) as u32)
}

// ─────────────────────────────────────────────
// ToolContext
// ─────────────────────────────────────────────

/// Backing sources shared by the store tools.
pub struct ToolContext {
    pub catalog: Arc<dyn CatalogStore>,
    pub business: Arc<dyn BusinessDirectory>,
    /// Extra stop-words from configuration.
    pub stop_words: Vec<String>,
}

impl ToolContext {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        business: Arc<dyn BusinessDirectory>,
        stop_words: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            business,
            stop_words,
        }
    }

    pub fn is_product_id(candidate: &str) -> bool {
        ID_PATTERN.is_match(candidate)
    }

    pub fn is_slug(candidate: &str) -> bool {
        candidate.len() >= 3 && SLUG_PATTERN.is_match(candidate)
    }

    /// Profile for `domain`; always resolves (minimal default last).
    pub async fn profile(&self, domain: &str) -> Result<BusinessProfile, ToolError> {
        Ok(self
            .business
            .business_profile(domain)
            .await?
            .unwrap_or_else(|| BusinessProfile::minimal(domain)))
    }

    /// Look a product up by id or slug after rejecting stop-words and
    /// malformed identifiers. No store query is issued for rejected input.
    pub async fn lookup(&self, domain: &str, identifier: &str) -> Result<Option<Product>, ToolError> {
        let ident = identifier.trim();
        if ident.is_empty() || language::is_stop_word(ident, &self.stop_words) {
            debug!(identifier = ident, "rejected product identifier (stop-word)");
            return Ok(None);
        }

        if Self::is_product_id(ident) {
            return self
                .catalog
                .find_by_id(domain, ident)
                .await
                .map_err(|e| ToolError::Store(e.to_string()));
        }

        let slug = ident.to_lowercase();
        if Self::is_slug(&slug) {
            return self
                .catalog
                .find_by_slug(domain, &slug)
                .await
                .map_err(|e| ToolError::Store(e.to_string()));
        }

        debug!(identifier = ident, "rejected product identifier (malformed)");
        Ok(None)
    }

    /// Ranked search over the domain's available products.
    pub async fn search(&self, domain: &str, query: &str, limit: usize) -> Result<Vec<Product>, ToolError> {
        let products = self
            .catalog
            .available_products(domain)
            .await
            .map_err(|e| ToolError::Store(e.to_string()))?;
        Ok(search::rank(&products, query, &self.stop_words)
            .into_iter()
            .take(limit)
            .map(|hit| hit.product)
            .collect())
    }

    /// Resolve a product from an explicit id/slug, else the top search hit.
    pub async fn resolve(
        &self,
        domain: &str,
        product_id: Option<&str>,
        query: Option<&str>,
    ) -> Result<Option<Product>, ToolError> {
        if let Some(id) = product_id {
            if let Some(found) = self.lookup(domain, id).await? {
                return Ok(Some(found));
            }
        }
        match query {
            Some(q) if !q.trim().is_empty() => Ok(self.search(domain, q, 1).await?.into_iter().next()),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_optional_string() {
        let args = json!({ "query": "  gorras ", "id": 123456, "empty": "  " });
        assert_eq!(optional_string(&args, "query"), Some("gorras".into()));
        assert_eq!(optional_string(&args, "id"), Some("123456".into()));
        assert_eq!(optional_string(&args, "empty"), None);
        assert_eq!(optional_string(&args, "missing"), None);
    }

    #[test]
    fn test_optional_quantity_bounds() {
        assert_eq!(optional_quantity(&json!({ "q": 3 }), "q"), Some(3));
        assert_eq!(optional_quantity(&json!({ "q": "2" }), "q"), Some(2));
        assert_eq!(optional_quantity(&json!({ "q": 250 }), "q"), Some(100));
        assert_eq!(optional_quantity(&json!({ "q": 0 }), "q"), None);
        assert_eq!(optional_quantity(&json!({ "q": "many" }), "q"), None);
    }

    #[test]
    fn test_identifier_patterns() {
        assert!(ToolContext::is_product_id("65a1b2c3d4e5f6a7b8c9d0e1"));
        assert!(ToolContext::is_product_id("12345678"));
        assert!(!ToolContext::is_product_id("65a1b2c3"));
        assert!(ToolContext::is_slug("zapatilla-runner-azul"));
        assert!(!ToolContext::is_slug("Zapatilla Runner"));
        assert!(!ToolContext::is_slug("a-"));
    }
}
