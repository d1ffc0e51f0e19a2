//! Prompt memory manager — builds the system prompts for a store domain.
//!
//! The full prompt carries business identity, the reply contract, the
//! behavioral rules and a compact catalog digest. It is attached to a
//! conversation once; later turns get the short prompt (no catalog data)
//! and reach current data through the tools.
//!
//! Business profiles and catalog digests are read through two independent
//! TTL caches keyed by domain.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::Duration;
use mercabot_core::cache::{Clock, TtlCache};
use mercabot_core::catalog::{BusinessProfile, CatalogDigest};
use mercabot_core::config::schema::PromptsConfig;
use mercabot_core::reply::ToolResult;
use tracing::{debug, warn};

use crate::intent::InterpretedIntent;
use crate::tools::{BusinessDirectory, CatalogStore};

const REPLY_CONTRACT: &str = r#"{"message": "...", "audio_description": "...", "action": {"type": "none", "productId": null, "quantity": null, "url": null, "price_sale": null, "title": null, "price_regular": null, "image": null, "slug": null}}"#;

pub struct PromptMemoryManager {
    catalog: Arc<dyn CatalogStore>,
    business: Arc<dyn BusinessDirectory>,
    config: PromptsConfig,
    business_cache: TtlCache<String, BusinessProfile>,
    digest_cache: TtlCache<String, CatalogDigest>,
}

impl PromptMemoryManager {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        business: Arc<dyn BusinessDirectory>,
        config: PromptsConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            business,
            business_cache: TtlCache::new(Duration::seconds(config.business_ttl_secs as i64), clock.clone()),
            digest_cache: TtlCache::new(Duration::seconds(config.catalog_ttl_secs as i64), clock),
            config,
        }
    }

    /// Business profile for `domain`, read through the cache.
    ///
    /// A source failure yields the minimal profile, which is not cached.
    pub async fn business_profile(&self, domain: &str) -> BusinessProfile {
        let loaded = self
            .business_cache
            .get_or_try_insert_with(domain.to_string(), || async {
                debug!(domain, "loading business profile");
                self.business
                    .business_profile(domain)
                    .await
                    .map(|found| found.unwrap_or_else(|| BusinessProfile::minimal(domain)))
            })
            .await;
        loaded.unwrap_or_else(|e| {
            warn!(domain, error = %e, "business profile unavailable, using minimal profile");
            BusinessProfile::minimal(domain)
        })
    }

    /// Catalog digest for `domain`, read through the cache.
    pub async fn catalog_digest(&self, domain: &str) -> CatalogDigest {
        let top_n = self.config.example_items;
        let loaded = self
            .digest_cache
            .get_or_try_insert_with(domain.to_string(), || async {
                debug!(domain, "building catalog digest");
                self.catalog
                    .available_products(domain)
                    .await
                    .map(|products| CatalogDigest::from_products(&products, top_n))
            })
            .await;
        loaded.unwrap_or_else(|e| {
            warn!(domain, error = %e, "catalog unavailable, prompt built without digest");
            CatalogDigest::default()
        })
    }

    /// Drop both cached entries for `domain`.
    pub fn invalidate(&self, domain: &str) {
        let key = domain.to_string();
        self.business_cache.invalidate(&key);
        self.digest_cache.invalidate(&key);
    }

    /// Full prompt: identity, contract, rules and catalog digest.
    pub async fn build_system_prompt(&self, domain: &str) -> String {
        let business = self.business_profile(domain).await;
        let digest = self.catalog_digest(domain).await;

        let mut prompt = self.instructions(&business, domain);
        prompt.push_str("\n\n## Catalog overview\n");
        if digest.count == 0 {
            prompt.push_str("The catalog is currently empty. Do not offer or describe any product.\n");
        } else {
            let _ = writeln!(prompt, "{} products available.", digest.count);
            if !digest.categories.is_empty() {
                let _ = writeln!(prompt, "Categories: {}.", digest.categories.join(", "));
            }
            prompt.push_str("Some examples (use the tools for current prices and details):\n");
            for item in &digest.examples {
                let category = if item.category.is_empty() { "-" } else { item.category.as_str() };
                let _ = writeln!(
                    prompt,
                    "- {} ({}): {:.2} {}",
                    item.title, category, item.price, business.currency
                );
            }
        }
        prompt
    }

    /// Short prompt: identity, contract and rules only.
    pub async fn build_short_system_prompt(&self, domain: &str) -> String {
        let business = self.business_profile(domain).await;
        self.instructions(&business, domain)
    }

    /// Per-turn prompt grounding a pre-executed tool result. Never
    /// persisted as the conversation's system prompt.
    pub fn build_dynamic_prompt(&self, base: &str, intent: &InterpretedIntent, result: &ToolResult) -> String {
        let mut prompt = String::with_capacity(base.len() + 512);
        prompt.push_str(base);
        prompt.push_str("\n\n## Data for this turn\n");
        let _ = writeln!(
            prompt,
            "The request was identified as `{}`. The tool `{}` was already run for it:",
            intent.intent, result.tool
        );
        match &result.data {
            Some(data) => {
                let _ = writeln!(prompt, "```json\n{data}\n```");
                prompt.push_str(
                    "Answer from this data. If it lists no products, say nothing matched and do not invent any.\n",
                );
            }
            None => prompt.push_str(
                "It found nothing. Tell the customer that and offer to search for something else. Do not invent data.\n",
            ),
        }
        prompt
    }

    fn instructions(&self, business: &BusinessProfile, domain: &str) -> String {
        let words = self.config.max_response_words;
        let mut prompt = String::with_capacity(2048);
        let _ = writeln!(
            prompt,
            "You are the shopping assistant of {} ({}).",
            business.name,
            business.site_url(domain)
        );
        if !business.description.trim().is_empty() {
            let _ = writeln!(prompt, "{}", business.description.trim());
        }
        let _ = writeln!(
            prompt,
            "Prices are in {}. Store locale: {}. Answer in the customer's language.",
            business.currency, business.locale
        );

        prompt.push_str("\n## Reply format\n");
        prompt.push_str("Reply with exactly one JSON object and nothing else:\n");
        prompt.push_str(REPLY_CONTRACT);
        prompt.push('\n');
        let _ = writeln!(prompt, "- message: the answer shown to the customer, at most {words} words.");
        prompt.push_str("- audio_description: the same answer written to be read aloud, without URLs, symbols or emoji.\n");
        prompt.push_str(
            "- action: {\"type\": \"none\"} unless the customer explicitly asked to add a product to the cart; then type \"add_to_cart\" with the product fields filled from tool data.\n",
        );

        prompt.push_str("\n## Rules\n");
        prompt.push_str("1. For any question about products, prices, stock, shipping or the store, call the tools first. Never invent products, prices or links.\n");
        prompt.push_str("2. Call add_to_cart only when the customer explicitly asks to add or buy something.\n");
        prompt.push_str("3. If a search finds nothing, say so and suggest another search.\n");
        let _ = writeln!(prompt, "4. Keep every answer under {words} words.");
        prompt
    }
}
