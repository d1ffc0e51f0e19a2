//! Local intent rules, one table per language.
//!
//! A rule scores `0.5` when its pattern matches, plus up to `0.5` from
//! keyword overlap (two distinct keywords saturate it) weighted by the
//! rule's confidence. The highest score wins; ties go to the rule listed
//! first.

use std::sync::LazyLock;

use regex::Regex;

use super::Intent;
use crate::language::{words, Language};

const PATTERN_WEIGHT: f32 = 0.5;
const KEYWORD_WEIGHT: f32 = 0.5;
const KEYWORDS_TO_SATURATE: f32 = 2.0;

pub struct IntentRule {
    pub intent: Intent,
    pattern: Regex,
    keywords: &'static [&'static str],
    /// Weight applied to the keyword share of the score.
    pub confidence: f32,
}

impl IntentRule {
    fn new(intent: Intent, pattern: &str, keywords: &'static [&'static str], confidence: f32) -> Self {
        IntentRule {
            intent,
            pattern: Regex::new(pattern).expect("static pattern"),
            keywords,
            confidence,
        }
    }

    /// Score in `[0, 1]` for `message` (`tokens` are its lowercased words).
    pub fn score(&self, message: &str, tokens: &[String]) -> f32 {
        let mut score = 0.0;
        if self.pattern.is_match(message) {
            score += PATTERN_WEIGHT;
        }
        let mut matched: Vec<&str> = tokens
            .iter()
            .filter(|t| self.keywords.contains(&t.as_str()))
            .map(String::as_str)
            .collect();
        matched.sort_unstable();
        matched.dedup();
        let ratio = (matched.len() as f32 / KEYWORDS_TO_SATURATE).min(1.0);
        score += KEYWORD_WEIGHT * ratio * self.confidence;
        score.clamp(0.0, 1.0)
    }
}

// ─────────────────────────────────────────────
// Rule tables
// ─────────────────────────────────────────────

static ES_RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    vec![
        IntentRule::new(
            Intent::AddToCart,
            r"(?i)\b(agreg|agrég|añad|anad|carrito|me lo llevo|me la llevo|lo quiero|la quiero)",
            &[
                "agrega", "agregar", "agrégalo", "agregalo", "agrégala", "agregala", "añade",
                "añadir", "añádelo", "carrito", "comprar", "compro", "sí", "si", "quiero", "llevo",
            ],
            0.9,
        ),
        IntentRule::new(
            Intent::ShippingInfo,
            r"(?i)\b(env[ií]o|env[ií]os|env[ií]an|entrega|despacho|mandan)\b",
            &[
                "envío", "envio", "envíos", "envios", "envían", "envian", "entrega", "despacho",
                "gratis", "demora", "tarda", "días", "cuánto", "cuanto", "cuesta",
            ],
            0.9,
        ),
        IntentRule::new(
            Intent::ProductPrice,
            r"(?i)\b(cu[aá]nto\s+(cuesta|cuestan|vale|valen|sale|salen|es)|precio)",
            &["cuánto", "cuanto", "cuesta", "cuestan", "precio", "vale", "valen", "costo", "oferta"],
            0.9,
        ),
        IntentRule::new(
            Intent::ProductDetails,
            r"(?i)\b(detalles?|caracter[ií]sticas|especificaciones|m[aá]s\s+info)",
            &[
                "detalles", "detalle", "características", "caracteristicas", "material", "medidas",
                "talla", "tallas", "información", "info", "color", "colores",
            ],
            0.85,
        ),
        IntentRule::new(
            Intent::BusinessInfo,
            r"(?i)\b(horarios?|direcci[oó]n|tel[eé]fono|contacto|ubicaci[oó]n|d[oó]nde\s+(est[aá]n|quedan)|qui[eé]nes\s+son)",
            &[
                "horario", "horarios", "dirección", "direccion", "teléfono", "telefono", "contacto",
                "email", "correo", "ubicación", "ubicacion", "local", "abren", "whatsapp",
            ],
            0.85,
        ),
        IntentRule::new(
            Intent::SearchProducts,
            r"(?i)\b(busc\w*|tienen|tienes|venden|vendes|muestr\w*|cat[aá]logo)\b",
            &[
                "busco", "buscar", "buscando", "tienen", "tienes", "venden", "hay", "muéstrame",
                "muestrame", "catálogo", "catalogo", "modelos", "opciones",
            ],
            0.9,
        ),
    ]
});

static EN_RULES: LazyLock<Vec<IntentRule>> = LazyLock::new(|| {
    vec![
        IntentRule::new(
            Intent::AddToCart,
            r"(?i)\b(add\s+(it|this|that|one|to\s+(my\s+)?cart)|buy\s+(it|this|that)|i'?ll\s+take)",
            &["add", "cart", "buy", "take", "yes", "purchase", "order"],
            0.9,
        ),
        IntentRule::new(
            Intent::ShippingInfo,
            r"(?i)\b(shipping|ship|deliver\w*)\b",
            &["shipping", "ship", "delivery", "deliver", "free", "days", "arrive", "cost", "much"],
            0.9,
        ),
        IntentRule::new(
            Intent::ProductPrice,
            r"(?i)\b(how\s+much|price|cost)",
            &["how", "much", "price", "cost", "costs", "expensive", "cheap", "sale"],
            0.9,
        ),
        IntentRule::new(
            Intent::ProductDetails,
            r"(?i)\b(details?|specs?|specifications|features|tell\s+me\s+(more\s+)?about)\b",
            &["details", "detail", "specs", "features", "material", "size", "sizes", "color", "about"],
            0.85,
        ),
        IntentRule::new(
            Intent::BusinessInfo,
            r"(?i)\b(opening\s+hours|hours|address|phone|contact|located|where\s+are\s+you)\b",
            &["hours", "open", "address", "phone", "contact", "email", "located", "location"],
            0.85,
        ),
        IntentRule::new(
            Intent::SearchProducts,
            r"(?i)\b(looking\s+for|do\s+you\s+(have|sell)|search|show\s+me|find)\b",
            &["looking", "search", "find", "show", "sell", "have", "catalog", "options"],
            0.9,
        ),
    ]
});

pub fn rules_for(lang: Language) -> &'static [IntentRule] {
    match lang {
        Language::Es => &ES_RULES,
        Language::En => &EN_RULES,
    }
}

/// Best-scoring rule for `message`, if any rule scores above zero.
pub fn best_match(message: &str, lang: Language) -> Option<(Intent, f32)> {
    let tokens = words(message);
    let mut best: Option<(Intent, f32)> = None;
    for rule in rules_for(lang) {
        let score = rule.score(message, &tokens);
        if score > 0.0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((rule.intent, score));
        }
    }
    best
}
