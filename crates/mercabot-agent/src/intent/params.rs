//! Intent-specific parameter extraction.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Intent;
use crate::language::{content_words, Language};

static PRODUCT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([0-9a-fA-F]{24}|\d{6,})\b").expect("static pattern"));

static QUANTITY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,3})\b").expect("static pattern"));

pub const MIN_QUANTITY: u32 = 1;
pub const MAX_QUANTITY: u32 = 100;

const NUMBER_WORDS: &[(&str, u32)] = &[
    ("un", 1), ("uno", 1), ("una", 1), ("dos", 2), ("tres", 3), ("cuatro", 4), ("cinco", 5),
    ("seis", 6), ("siete", 7), ("ocho", 8), ("nueve", 9), ("diez", 10),
    ("one", 1), ("two", 2), ("three", 3), ("four", 4), ("five", 5), ("six", 6), ("seven", 7),
    ("eight", 8), ("nine", 9), ("ten", 10),
];

/// Words that carry the intent itself, not the product.
const INTENT_WORDS: &[&str] = &[
    "unidades", "unidad", "units", "unit", "pares", "par", "pairs", "pair", "piezas", "al",
    "detalle", "características", "caracteristicas", "envío", "envio", "shipping",
];

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IntentParams {
    /// Free-text product query with stop-words removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Explicit product reference found in the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    /// Requested units, within `[1, 100]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

impl IntentParams {
    pub fn is_empty(&self) -> bool {
        self.query.is_none() && self.product_id.is_none() && self.quantity.is_none()
    }

    /// Fill fields still missing from `other`.
    pub fn merge_missing(&mut self, other: IntentParams) {
        self.query = self.query.take().or(other.query);
        self.product_id = self.product_id.take().or(other.product_id);
        self.quantity = self.quantity.or(other.quantity);
    }
}

/// First explicit product id (24 hex chars or a long digit run).
pub fn product_id(message: &str) -> Option<String> {
    PRODUCT_ID.find(message).map(|m| m.as_str().to_string())
}

/// Requested quantity, clamped to `[1, 100]`. Product ids are ignored.
pub fn quantity(message: &str) -> Option<u32> {
    let without_ids = PRODUCT_ID.replace_all(message, " ");
    if let Some(m) = QUANTITY.find(&without_ids) {
        let n: u32 = m.as_str().parse().ok()?;
        return (n >= MIN_QUANTITY).then(|| n.min(MAX_QUANTITY));
    }
    let lower = without_ids.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|w| NUMBER_WORDS.iter().find(|(word, _)| *word == w).map(|(_, n)| *n))
}

/// Stop-word-free query text, ids and numbers removed.
pub fn query(message: &str, lang: Language, extra_stop: &[String]) -> Option<String> {
    let without_ids = PRODUCT_ID.replace_all(message, " ");
    let terms: Vec<String> = content_words(&without_ids, lang, extra_stop)
        .into_iter()
        .filter(|w| !w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !INTENT_WORDS.contains(&w.as_str()))
        .filter(|w| !NUMBER_WORDS.iter().any(|(n, _)| *n == w.as_str()))
        .collect();
    (!terms.is_empty()).then(|| terms.join(" "))
}

/// Parameters relevant to `intent`.
pub fn extract(intent: Intent, message: &str, lang: Language, extra_stop: &[String]) -> IntentParams {
    match intent {
        Intent::SearchProducts => IntentParams {
            query: query(message, lang, extra_stop),
            ..Default::default()
        },
        Intent::ProductDetails | Intent::ProductPrice => {
            let id = product_id(message);
            IntentParams {
                query: if id.is_none() { query(message, lang, extra_stop) } else { None },
                product_id: id,
                quantity: None,
            }
        }
        Intent::AddToCart => {
            let id = product_id(message);
            IntentParams {
                query: if id.is_none() { query(message, lang, extra_stop) } else { None },
                product_id: id,
                quantity: quantity(message),
            }
        }
        Intent::BusinessInfo | Intent::ShippingInfo | Intent::GeneralChat => IntentParams::default(),
    }
}
