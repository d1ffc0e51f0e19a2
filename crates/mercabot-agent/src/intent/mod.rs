//! Intent interpreter.
//!
//! Local pattern rules first; when they are unsure, an LLM classifier
//! (primary provider, then secondary); when that fails too, `general_chat`.
//! Results are cached per `(language, first 50 chars)` for a fixed TTL.

pub mod params;
pub mod rules;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use mercabot_core::cache::{Clock, TtlCache};
use mercabot_core::config::schema::IntentConfig;
use mercabot_core::conversation::IntentSnapshot;
use mercabot_core::utils::char_prefix;
use mercabot_providers::ProviderAdapter;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

pub use params::IntentParams;

use crate::language::Language;
use crate::tools::{names, optional_quantity, optional_string};

const CACHE_KEY_CHARS: usize = 50;
const DEFAULT_CONFIDENCE: f32 = 0.5;

// ─────────────────────────────────────────────
// Intent
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Intent {
    SearchProducts,
    ProductDetails,
    ProductPrice,
    BusinessInfo,
    ShippingInfo,
    AddToCart,
    GeneralChat,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::SearchProducts,
        Intent::ProductDetails,
        Intent::ProductPrice,
        Intent::BusinessInfo,
        Intent::ShippingInfo,
        Intent::AddToCart,
        Intent::GeneralChat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SearchProducts => "search_products",
            Intent::ProductDetails => "product_details",
            Intent::ProductPrice => "product_price",
            Intent::BusinessInfo => "business_info",
            Intent::ShippingInfo => "shipping_info",
            Intent::AddToCart => "add_to_cart",
            Intent::GeneralChat => "general_chat",
        }
    }

    /// Accepts the intent names and the matching tool names.
    pub fn parse(s: &str) -> Option<Intent> {
        let s = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Intent::ALL
            .into_iter()
            .find(|i| i.as_str() == s || i.tool_name() == Some(s.as_str()))
    }

    /// The tool that serves this intent.
    pub fn tool_name(&self) -> Option<&'static str> {
        match self {
            Intent::SearchProducts => Some(names::SEARCH_PRODUCTS),
            Intent::ProductDetails => Some(names::GET_PRODUCT_DETAILS),
            Intent::ProductPrice => Some(names::GET_PRODUCT_PRICE),
            Intent::BusinessInfo => Some(names::GET_BUSINESS_INFO),
            Intent::ShippingInfo => Some(names::GET_SHIPPING_INFO),
            Intent::AddToCart => Some(names::ADD_TO_CART),
            Intent::GeneralChat => None,
        }
    }

    /// Whether the intent refers to a single product.
    pub fn targets_product(&self) -> bool {
        matches!(self, Intent::ProductDetails | Intent::ProductPrice | Intent::AddToCart)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a classification was reached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntentMethod {
    LocalRules,
    /// LLM classifier of the named provider.
    Llm(String),
    Default,
    Disabled,
}

impl fmt::Display for IntentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentMethod::LocalRules => f.write_str("local_rules"),
            IntentMethod::Llm(provider) => write!(f, "llm-{provider}"),
            IntentMethod::Default => f.write_str("default"),
            IntentMethod::Disabled => f.write_str("disabled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InterpretedIntent {
    pub intent: Intent,
    pub params: IntentParams,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub method: IntentMethod,
}

impl InterpretedIntent {
    /// Build a result; `confidence` is clamped to `[0, 1]`.
    pub fn new(intent: Intent, params: IntentParams, confidence: f32, method: IntentMethod) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        InterpretedIntent {
            intent,
            params,
            confidence,
            method,
        }
    }

    pub fn general_chat(confidence: f32, method: IntentMethod) -> Self {
        Self::new(Intent::GeneralChat, IntentParams::default(), confidence, method)
    }

    /// Whether the matching tool should run before generation.
    pub fn should_execute(&self, threshold: f32) -> bool {
        self.intent != Intent::GeneralChat && self.confidence >= threshold
    }

    /// Arguments for the intent's tool.
    pub fn tool_args(&self) -> Value {
        let mut args = json!({});
        if let Some(q) = &self.params.query {
            args["query"] = json!(q);
        }
        if let Some(id) = &self.params.product_id {
            args["product_id"] = json!(id);
        }
        if let Some(n) = self.params.quantity {
            args["quantity"] = json!(n);
        }
        args
    }

    pub fn snapshot(&self) -> IntentSnapshot {
        IntentSnapshot {
            intent: self.intent.to_string(),
            confidence: self.confidence,
            method: self.method.to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Interpreter
// ─────────────────────────────────────────────

fn classifier_instruction() -> String {
    let intents: Vec<&str> = Intent::ALL.iter().map(Intent::as_str).collect();
    format!(
        "You classify messages sent to an online store's chat assistant.\n\
         Reply with a single JSON object and nothing else:\n\
         {{\"intent\": one of [{}], \"params\": {{\"query\": string|null, \"product_id\": string|null, \"quantity\": integer|null}}, \"confidence\": number between 0 and 1}}\n\
         - query: the product words the customer is asking about, without filler words\n\
         - product_id: only an explicit id written in the message\n\
         - quantity: only when the customer states how many units",
        intents.join(", ")
    )
}

pub struct IntentInterpreter {
    config: IntentConfig,
    /// Primary then secondary classifier, whichever are configured.
    classifiers: Vec<Arc<dyn ProviderAdapter>>,
    cache: TtlCache<(Language, String), InterpretedIntent>,
    stop_words: Vec<String>,
}

impl IntentInterpreter {
    pub fn new(
        config: IntentConfig,
        adapters: &HashMap<String, Arc<dyn ProviderAdapter>>,
        stop_words: Vec<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut classifiers = Vec::new();
        for id in [&config.primary, &config.secondary] {
            match adapters.get(id) {
                Some(adapter) if !classifiers.iter().any(|c: &Arc<dyn ProviderAdapter>| c.id() == id.as_str()) => {
                    classifiers.push(adapter.clone());
                }
                Some(_) => {}
                None if config.enabled && config.llm_fallback => {
                    warn!(provider = %id, "intent classifier provider not configured");
                }
                None => {}
            }
        }
        let ttl = Duration::seconds(config.cache_ttl_secs as i64);
        IntentInterpreter {
            config,
            classifiers,
            cache: TtlCache::new(ttl, clock),
            stop_words,
        }
    }

    pub fn execution_threshold(&self) -> f32 {
        self.config.execution_threshold
    }

    /// Classify `message`. Never fails: every error path ends in a
    /// `general_chat` result.
    pub async fn interpret(&self, message: &str, language: Language, domain: &str) -> InterpretedIntent {
        if !self.config.enabled {
            return InterpretedIntent::general_chat(1.0, IntentMethod::Disabled);
        }

        let key = (language, char_prefix(message, CACHE_KEY_CHARS));
        if let Some(hit) = self.cache.get(&key) {
            debug!(domain, intent = %hit.intent, "intent cache hit");
            return hit;
        }

        let local = if self.config.local_rules {
            rules::best_match(message, language).map(|(intent, score)| {
                let params = params::extract(intent, message, language, &self.stop_words);
                InterpretedIntent::new(intent, params, score, IntentMethod::LocalRules)
            })
        } else {
            None
        };

        let result = match local {
            Some(found) if found.confidence >= self.config.escalation_threshold => found,
            _ if self.config.llm_fallback => self
                .classify_remote(message, language)
                .await
                .unwrap_or_else(|| InterpretedIntent::general_chat(DEFAULT_CONFIDENCE, IntentMethod::Default)),
            Some(found) => found,
            None => InterpretedIntent::general_chat(DEFAULT_CONFIDENCE, IntentMethod::Default),
        };

        info!(
            domain,
            intent = %result.intent,
            confidence = result.confidence,
            method = %result.method,
            "intent interpreted"
        );
        if result.method != IntentMethod::Default {
            self.cache.insert(key, result.clone());
        }
        result
    }

    /// Ask each classifier in turn; the first usable answer wins.
    async fn classify_remote(&self, message: &str, language: Language) -> Option<InterpretedIntent> {
        let instruction = classifier_instruction();
        for adapter in &self.classifiers {
            let classification = match adapter.classify(&instruction, message).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(provider = adapter.id(), error = %e, "intent classifier failed");
                    continue;
                }
            };
            debug!(provider = adapter.id(), tokens = classification.usage.total, "intent classified");
            match self.from_classification(&classification.value, message, language, adapter.id()) {
                Some(result) => return Some(result),
                None => warn!(
                    provider = adapter.id(),
                    output = %classification.value,
                    "intent classifier returned an unusable answer"
                ),
            }
        }
        None
    }

    fn from_classification(
        &self,
        value: &Value,
        message: &str,
        language: Language,
        provider: &str,
    ) -> Option<InterpretedIntent> {
        let intent = Intent::parse(value.get("intent")?.as_str()?)?;
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .map(|c| c as f32)
            .unwrap_or(DEFAULT_CONFIDENCE);

        let raw = value.get("params").cloned().unwrap_or_else(|| json!({}));
        let mut extracted = IntentParams {
            query: optional_string(&raw, "query"),
            product_id: optional_string(&raw, "product_id").or_else(|| optional_string(&raw, "productId")),
            quantity: optional_quantity(&raw, "quantity"),
        };
        extracted.merge_missing(params::extract(intent, message, language, &self.stop_words));
        if !intent.targets_product() {
            extracted = IntentParams {
                query: extracted.query.filter(|_| intent == Intent::SearchProducts),
                ..Default::default()
            };
        }
        Some(InterpretedIntent::new(
            intent,
            extracted,
            confidence,
            IntentMethod::Llm(provider.to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProvider;
    use mercabot_core::cache::ManualClock;
    use mercabot_providers::ProviderError;

    fn adapters(list: Vec<Arc<MockProvider>>) -> HashMap<String, Arc<dyn ProviderAdapter>> {
        list.into_iter()
            .map(|a| (a.id().to_string(), a as Arc<dyn ProviderAdapter>))
            .collect()
    }

    fn interpreter(
        config: IntentConfig,
        list: Vec<Arc<MockProvider>>,
    ) -> (IntentInterpreter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let interp = IntentInterpreter::new(config, &adapters(list), Vec::new(), clock.clone());
        (interp, clock)
    }

    #[tokio::test]
    async fn test_disabled_is_always_general_chat() {
        let config = IntentConfig {
            enabled: false,
            ..Default::default()
        };
        let (interp, _) = interpreter(config, vec![]);
        for msg in ["busco zapatillas", "sí, agrégalo", "how much is shipping?", ""] {
            for lang in [Language::Es, Language::En] {
                let r = interp.interpret(msg, lang, "shop.example").await;
                assert_eq!(r.intent, Intent::GeneralChat);
                assert_eq!(r.method, IntentMethod::Disabled);
                assert_eq!(r.confidence, 1.0);
            }
        }
    }

    #[tokio::test]
    async fn test_confident_local_match_skips_llm() {
        let openai = Arc::new(MockProvider::new("openai"));
        let (interp, _) = interpreter(IntentConfig::default(), vec![openai.clone()]);
        let r = interp.interpret("busco zapatillas deportivas", Language::Es, "shop.example").await;
        assert_eq!(r.intent, Intent::SearchProducts);
        assert_eq!(r.method, IntentMethod::LocalRules);
        assert_eq!(r.params.query.as_deref(), Some("zapatillas deportivas"));
        assert_eq!(openai.classify_calls(), 0);
    }

    #[tokio::test]
    async fn test_escalates_to_secondary_when_primary_fails() {
        let openai = Arc::new(MockProvider::new("openai"));
        openai.push_classify(Err(ProviderError::QuotaExhausted {
            provider: "openai".into(),
            detail: "insufficient_quota".into(),
        }));
        let deepseek = Arc::new(MockProvider::new("deepseek"));
        deepseek.push_classify(Ok(json!({
            "intent": "get_product_price",
            "params": { "query": "gorra trucker" },
            "confidence": 0.83
        })));
        let (interp, _) = interpreter(IntentConfig::default(), vec![openai.clone(), deepseek.clone()]);

        let r = interp.interpret("y la gorra trucker?", Language::Es, "shop.example").await;
        assert_eq!(r.intent, Intent::ProductPrice);
        assert_eq!(r.method.to_string(), "llm-deepseek");
        assert_eq!(r.params.query.as_deref(), Some("gorra trucker"));
        assert!((r.confidence - 0.83).abs() < 1e-6);
        assert_eq!(openai.classify_calls(), 1);
        assert_eq!(deepseek.classify_calls(), 1);
    }

    #[tokio::test]
    async fn test_both_classifiers_fail_defaults() {
        let openai = Arc::new(MockProvider::new("openai"));
        openai.push_classify(Ok(json!({ "intent": "teleport" })));
        let deepseek = Arc::new(MockProvider::new("deepseek"));
        deepseek.push_classify(Err(ProviderError::malformed("deepseek", "not json")));
        let (interp, _) = interpreter(IntentConfig::default(), vec![openai, deepseek.clone()]);

        let r = interp.interpret("mi pedido no llegó", Language::Es, "shop.example").await;
        assert_eq!(r.intent, Intent::GeneralChat);
        assert_eq!(r.method, IntentMethod::Default);
        assert_eq!(r.confidence, 0.5);

        // default results are not cached
        deepseek.push_classify(Ok(json!({ "intent": "general_chat", "confidence": 0.9 })));
        let r = interp.interpret("mi pedido no llegó", Language::Es, "shop.example").await;
        assert_eq!(r.method.to_string(), "llm-deepseek");
    }

    #[tokio::test]
    async fn test_llm_confidence_clamped() {
        let openai = Arc::new(MockProvider::new("openai"));
        openai.push_classify(Ok(json!({ "intent": "business_info", "confidence": 7 })));
        let (interp, _) = interpreter(IntentConfig::default(), vec![openai]);
        let r = interp.interpret("quiero hablar con alguien", Language::Es, "shop.example").await;
        assert_eq!(r.intent, Intent::BusinessInfo);
        assert_eq!(r.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_cache_does_not_grow_past_ttl() {
        let (interp, clock) = interpreter(IntentConfig::default(), vec![]);
        for i in 0..200 {
            let r = interp.interpret(&format!("busco zapatillas talla {i}"), Language::Es, "shop.example").await;
            assert_eq!(r.method, IntentMethod::LocalRules);
        }
        assert_eq!(interp.cache.len(), 200);

        clock.advance(Duration::hours(1));
        for i in 0..5 {
            interp.interpret(&format!("busco zapatillas numero {i}"), Language::Es, "shop.example").await;
        }
        assert_eq!(interp.cache.len(), 5);
    }

    #[tokio::test]
    async fn test_cache_by_prefix_expires_after_ttl() {
        let openai = Arc::new(MockProvider::new("openai"));
        openai.push_classify(Ok(json!({ "intent": "general_chat", "confidence": 0.9 })));
        openai.push_classify(Ok(json!({ "intent": "general_chat", "confidence": 0.8 })));
        let (interp, clock) = interpreter(IntentConfig::default(), vec![openai.clone()]);

        let prefix = "a".repeat(50);
        interp.interpret(&format!("{prefix} uno"), Language::Es, "shop.example").await;
        let cached = interp.interpret(&format!("{prefix} dos"), Language::Es, "shop.example").await;
        assert_eq!(openai.classify_calls(), 1);
        assert!((cached.confidence - 0.9).abs() < 1e-6);

        // a different language is a different key
        interp.interpret(&format!("{prefix} uno"), Language::En, "shop.example").await;
        assert_eq!(openai.classify_calls(), 2);

        clock.advance(Duration::minutes(5));
        interp.interpret(&format!("{prefix} uno"), Language::Es, "shop.example").await;
        assert_eq!(openai.classify_calls(), 3);
    }

    #[tokio::test]
    async fn test_local_only_keeps_weak_match() {
        let config = IntentConfig {
            llm_fallback: false,
            ..Default::default()
        };
        let (interp, _) = interpreter(config, vec![]);
        let r = interp.interpret("¿es gratis?", Language::Es, "shop.example").await;
        assert_eq!(r.intent, Intent::ShippingInfo);
        assert_eq!(r.method, IntentMethod::LocalRules);
        assert!(r.confidence < 0.7);

        let r = interp.interpret("hola", Language::Es, "shop.example").await;
        assert_eq!(r.intent, Intent::GeneralChat);
        assert_eq!(r.method, IntentMethod::Default);
    }

    #[tokio::test]
    async fn test_confidence_always_bounded() {
        let (interp, _) = interpreter(
            IntentConfig {
                llm_fallback: false,
                ..Default::default()
            },
            vec![],
        );
        for msg in [
            "sí sí sí agrégalo al carrito lo quiero me lo llevo",
            "busco tienen venden catálogo modelos opciones",
            "add it to my cart, I'll take it, buy it",
            "¿¿??",
            "",
        ] {
            for lang in [Language::Es, Language::En] {
                let r = interp.interpret(msg, lang, "shop.example").await;
                assert!((0.0..=1.0).contains(&r.confidence), "{msg}: {}", r.confidence);
            }
        }
    }

    #[test]
    fn test_intent_parse_and_tool_args() {
        assert_eq!(Intent::parse("ADD-TO-CART"), Some(Intent::AddToCart));
        assert_eq!(Intent::parse("get_shipping_info"), Some(Intent::ShippingInfo));
        assert_eq!(Intent::parse("dance"), None);

        let r = InterpretedIntent::new(
            Intent::AddToCart,
            IntentParams {
                product_id: Some("65a1b2c3d4e5f6a7b8c9d0e1".into()),
                quantity: Some(2),
                ..Default::default()
            },
            0.95,
            IntentMethod::LocalRules,
        );
        assert_eq!(r.tool_args(), json!({ "product_id": "65a1b2c3d4e5f6a7b8c9d0e1", "quantity": 2 }));
        assert!(r.should_execute(0.6));
        assert_eq!(r.snapshot().method, "local_rules");
        assert!(!InterpretedIntent::general_chat(1.0, IntentMethod::Disabled).should_execute(0.6));
    }
}
