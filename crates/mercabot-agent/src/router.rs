//! Model router — picks a provider from message text alone.
//!
//! First matching heuristic wins:
//! 1. greeting / acknowledgement → conversational provider
//! 2. catalog-search signals → tool-calling provider
//! 3. comparison language → reasoning provider
//! 4. numbers plus cost words → reasoning provider
//! 5. two or more conjunctions, or any disjunction → reasoning provider
//! 6. explanation-seeking words → reasoning provider
//! 7. otherwise → conversational provider
//!
//! No I/O and no randomness: the same input always routes the same way.

use mercabot_core::config::schema::RoutingConfig;
use mercabot_core::conversation::ConversationMessage;
use tracing::debug;

use crate::language::words;
use crate::tools::search::fold;

const GREETING_WORDS: &[&str] = &[
    "hola", "hi", "hello", "hey", "buenas", "buenos", "dias", "tardes", "noches", "gracias",
    "muchas", "thanks", "thank", "you", "ok", "okay", "vale", "perfecto", "genial", "great",
    "adios", "bye", "chau", "saludos", "que", "tal", "good", "morning", "evening", "si", "yes",
    "no", "listo", "dale",
];
const MAX_GREETING_WORDS: usize = 4;

const SEARCH_WORDS: &[&str] = &[
    "busco", "buscar", "buscando", "tienen", "tienes", "venden", "vendes", "muestrame",
    "mostrar", "catalogo", "producto", "productos", "disponible", "disponibles", "stock",
    "search", "find", "sell", "catalog", "product", "products", "available",
];
const SEARCH_PHRASES: &[&str] = &["looking for", "show me", "do you have", "quiero ver", "hay algun"];

/// Product types recognized out of the box; stores extend it via config.
const PRODUCT_VOCABULARY: &[&str] = &[
    "zapatilla", "zapatillas", "zapato", "zapatos", "botas", "camiseta", "camisetas", "remera",
    "pantalon", "pantalones", "gorra", "gorras", "mochila", "mochilas", "chaqueta", "ropa",
    "shoes", "sneakers", "boots", "shirt", "shirts", "pants", "cap", "backpack", "jacket",
];

const COMPARISON_WORDS: &[&str] = &[
    "vs", "versus", "mejor", "mejores", "better", "best", "diferencia", "diferencias",
    "difference", "compara", "comparar", "compare", "comparison",
];

const COST_WORDS: &[&str] = &[
    "cuanto", "costo", "coste", "cuesta", "cuestan", "precio", "total", "pagar", "descuento",
    "cuotas", "price", "cost", "costs", "pay", "discount", "much",
];

const CONJUNCTIONS: &[&str] = &["y", "e", "and", "ademas", "tambien", "also", "plus"];
const DISJUNCTIONS: &[&str] = &["o", "u", "or"];

const EXPLANATION_WORDS: &[&str] = &[
    "como", "porque", "why", "how", "explica", "explicame", "explain",
];
const EXPLANATION_PHRASES: &[&str] = &["por que"];

const DEEP_REASONING_PHRASES: &[&str] = &[
    "paso a paso", "step by step", "analiza", "analyze", "analyse", "detalladamente", "in detail",
    "pros y contras", "pros and cons",
];
const DEEP_REASONING_MIN_WORDS: usize = 25;

/// Why a route was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteReason {
    Greeting,
    CatalogSearch,
    Comparison,
    CostCalculation,
    MultiPart,
    Explanation,
    Default,
    Forced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDecision {
    pub provider: String,
    pub reason: RouteReason,
    /// Whether deeper reasoning should be requested from the provider.
    pub extended_reasoning: bool,
}

pub struct ModelRouter {
    conversational: String,
    tool_calling: String,
    reasoning: String,
    vocabulary: Vec<String>,
}

impl ModelRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            conversational: config.conversational.clone(),
            tool_calling: config.tool_calling.clone(),
            reasoning: config.reasoning.clone(),
            vocabulary: config.product_vocabulary.iter().map(|w| fold(w)).collect(),
        }
    }

    pub fn conversational(&self) -> &str {
        &self.conversational
    }

    /// Route `message`. History is accepted for signature stability; no
    /// current heuristic reads it.
    pub fn decide(&self, message: &str, _history: &[ConversationMessage]) -> RouteDecision {
        let folded = fold(message);
        let tokens = words(&folded);
        let reason = self.classify(&folded, &tokens);
        let provider = match reason {
            RouteReason::Greeting | RouteReason::Default | RouteReason::Forced => &self.conversational,
            RouteReason::CatalogSearch => &self.tool_calling,
            _ => &self.reasoning,
        };
        let decision = RouteDecision {
            provider: provider.clone(),
            reason,
            extended_reasoning: Self::should_use_extended_reasoning(message),
        };
        debug!(provider = %decision.provider, reason = ?decision.reason, "routed message");
        decision
    }

    fn classify(&self, folded: &str, tokens: &[String]) -> RouteReason {
        let has = |list: &[&str]| tokens.iter().any(|t| list.contains(&t.as_str()));
        let count = |list: &[&str]| tokens.iter().filter(|t| list.contains(&t.as_str())).count();

        if is_greeting(tokens) {
            return RouteReason::Greeting;
        }
        if has(SEARCH_WORDS)
            || SEARCH_PHRASES.iter().any(|p| folded.contains(p))
            || has(PRODUCT_VOCABULARY)
            || tokens.iter().any(|t| self.vocabulary.contains(t))
        {
            return RouteReason::CatalogSearch;
        }
        if has(COMPARISON_WORDS) {
            return RouteReason::Comparison;
        }
        if folded.chars().any(|c| c.is_ascii_digit()) && (has(COST_WORDS) || folded.contains('%')) {
            return RouteReason::CostCalculation;
        }
        if count(CONJUNCTIONS) >= 2 || has(DISJUNCTIONS) {
            return RouteReason::MultiPart;
        }
        if has(EXPLANATION_WORDS) || EXPLANATION_PHRASES.iter().any(|p| folded.contains(p)) {
            return RouteReason::Explanation;
        }
        RouteReason::Default
    }

    /// Whether the message asks for deliberate, multi-step reasoning.
    pub fn should_use_extended_reasoning(message: &str) -> bool {
        let folded = fold(message);
        DEEP_REASONING_PHRASES.iter().any(|p| folded.contains(p))
            || folded.matches('?').count() >= 2
            || words(&folded).len() >= DEEP_REASONING_MIN_WORDS
    }
}

fn is_greeting(tokens: &[String]) -> bool {
    !tokens.is_empty()
        && tokens.len() <= MAX_GREETING_WORDS
        && tokens.iter().all(|t| GREETING_WORDS.contains(&t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercabot_core::conversation::Role;

    fn router() -> ModelRouter {
        let mut config = RoutingConfig::default();
        config.product_vocabulary = vec!["Poncho".into()];
        ModelRouter::new(&config)
    }

    fn route(message: &str) -> (String, RouteReason) {
        let d = router().decide(message, &[]);
        (d.provider, d.reason)
    }

    #[test]
    fn test_greetings_go_conversational_regardless_of_history() {
        let histories = vec![
            vec![],
            vec![ConversationMessage::new(Role::User, "busco zapatillas")],
            vec![
                ConversationMessage::new(Role::System, "prompt"),
                ConversationMessage::new(Role::User, "compara el plan A vs B"),
                ConversationMessage::new(Role::Assistant, "El plan A..."),
            ],
        ];
        for greeting in ["hola", "Hola!", "buenas tardes", "ok, gracias", "Hi", "thank you"] {
            for history in &histories {
                let d = router().decide(greeting, history);
                assert_eq!(d.provider, "openai", "{greeting}");
                assert_eq!(d.reason, RouteReason::Greeting);
            }
        }
    }

    #[test]
    fn test_cascade_order() {
        assert_eq!(route("busco zapatillas deportivas"), ("gemini".into(), RouteReason::CatalogSearch));
        assert_eq!(route("¿tienen ponchos?").1, RouteReason::CatalogSearch);
        assert_eq!(route("do you have sneakers or boots?").1, RouteReason::CatalogSearch);
        assert_eq!(route("¿cuál es mejor, el plan anual o el mensual?"), ("deepseek".into(), RouteReason::Comparison));
        assert_eq!(route("si compro 3 con 20% de descuento cuánto pago").1, RouteReason::CostCalculation);
        assert_eq!(route("envían a Córdoba y aceptan tarjeta y efectivo").1, RouteReason::MultiPart);
        assert_eq!(route("retiro en tienda o envío").1, RouteReason::MultiPart);
        assert_eq!(route("¿por qué tarda el envío?").1, RouteReason::Explanation);
        assert_eq!(route("mi pedido no llegó"), ("openai".into(), RouteReason::Default));
    }

    #[test]
    fn test_deterministic() {
        let r = router();
        let msg = "¿Cómo funciona la garantía y qué cubre?";
        let first = r.decide(msg, &[]);
        for _ in 0..50 {
            assert_eq!(r.decide(msg, &[]), first);
        }
    }

    #[test]
    fn test_extended_reasoning_flag() {
        assert!(ModelRouter::should_use_extended_reasoning("Analiza pros y contras de cada plan"));
        assert!(ModelRouter::should_use_extended_reasoning("¿Cuál conviene? ¿Y por qué?"));
        assert!(!ModelRouter::should_use_extended_reasoning("hola"));
    }
}
