//! Tolerant parsing of model text into the reply contract.
//!
//! Tried in order of specificity, first structurally valid candidate wins:
//! 1. the whole text is a JSON object;
//! 2. a JSON object inside a markdown code fence;
//! 3. a balanced `{...}` object embedded in free text;
//! 4. plain text, wrapped into a minimal reply.
//!
//! A candidate is valid when it is an object with a `message` or `action` key.
//! Parsing never fails.

use mercabot_core::reply::{ActionKind, NormalizedReply, ReplyAction};
use serde_json::{Map, Value};
use tracing::debug;

/// Which strategy produced the reply (for logs and tests).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStrategy {
    Json,
    Fenced,
    Embedded,
    PlainText,
}

pub fn parse_reply(raw: &str) -> NormalizedReply {
    parse_reply_with_strategy(raw).0
}

pub fn parse_reply_with_strategy(raw: &str) -> (NormalizedReply, ParseStrategy) {
    let text = raw.trim();

    if let Some(obj) = contract_object(text) {
        return (from_object(&obj, ""), ParseStrategy::Json);
    }

    if let Some(obj) = fenced_blocks(text).find_map(|block| contract_object(block.trim())) {
        return (from_object(&obj, &prose_outside_fences(text)), ParseStrategy::Fenced);
    }

    for (start, end) in balanced_objects(text) {
        if let Some(obj) = contract_object(&text[start..end]) {
            let before = text[..start].trim();
            return (from_object(&obj, before), ParseStrategy::Embedded);
        }
    }

    debug!(len = text.len(), "no JSON reply found, using plain text");
    (plain_text(text), ParseStrategy::PlainText)
}

/// Minimal reply carrying `text` and no action.
pub fn plain_text(text: &str) -> NormalizedReply {
    NormalizedReply {
        message: text.to_string(),
        audio_description: text.to_string(),
        action: ReplyAction::none(),
        ..Default::default()
    }
}

fn contract_object(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate).ok()? {
        Value::Object(obj) if obj.contains_key("message") || obj.contains_key("action") => Some(obj),
        _ => None,
    }
}

// ─────────────────────────────────────────────
// Candidates
// ─────────────────────────────────────────────

/// Bodies of ``` fenced blocks, with an optional language tag stripped.
fn fenced_blocks(text: &str) -> impl Iterator<Item = &str> {
    text.split("```")
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, block)| {
            let block = block.trim_start();
            match block.find('\n') {
                Some(nl) if !block[..nl].trim_start().starts_with('{') => &block[nl + 1..],
                _ => block,
            }
        })
}

fn prose_outside_fences(text: &str) -> String {
    text.split("```")
        .enumerate()
        .filter(|(i, _)| i % 2 == 0)
        .map(|(_, s)| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Byte ranges of top-level balanced `{...}` spans, string-literal aware.
fn balanced_objects(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push((start, i + 1));
                }
            }
            _ => {}
        }
    }
    spans
}

// ─────────────────────────────────────────────
// Object → reply
// ─────────────────────────────────────────────

fn from_object(obj: &Map<String, Value>, prose: &str) -> NormalizedReply {
    let message = obj
        .get("message")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(prose)
        .to_string();

    let audio_description = obj
        .get("audio_description")
        .or_else(|| obj.get("audioDescription"))
        .and_then(Value::as_str)
        .filter(|a| !a.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| message.clone());

    let action = obj.get("action").map(parse_action).unwrap_or_default();

    NormalizedReply {
        message,
        audio_description,
        action,
        ..Default::default()
    }
}

/// Lenient action parsing: loose type names, snake or camel keys, numbers
/// given as strings.
pub fn parse_action(value: &Value) -> ReplyAction {
    let obj = match value {
        Value::Object(obj) => obj,
        Value::String(kind) => {
            return ReplyAction {
                kind: ActionKind::from_loose(kind),
                ..Default::default()
            }
        }
        _ => return ReplyAction::none(),
    };

    let str_field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| match obj.get(*k)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    };
    let num_field = |keys: &[&str]| {
        keys.iter().find_map(|k| match obj.get(*k)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    };

    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .map(ActionKind::from_loose)
        .unwrap_or_default();

    ReplyAction {
        kind,
        product_id: str_field(&["productId", "product_id", "id"]),
        quantity: num_field(&["quantity", "qty"])
            .filter(|q| *q >= 1.0)
            .map(|q| q.min(100.0) as u32),
        url: str_field(&["url"]),
        price_sale: num_field(&["price_sale", "priceSale"]),
        title: str_field(&["title"]),
        price_regular: num_field(&["price_regular", "priceRegular"]),
        image: str_field(&["image"]),
        slug: str_field(&["slug"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pure_json() {
        let raw = r#"{"message":"¡Hola! ¿En qué te ayudo?","audio_description":"Hola","action":{"type":"none"}}"#;
        let (reply, strategy) = parse_reply_with_strategy(raw);
        assert_eq!(strategy, ParseStrategy::Json);
        assert_eq!(reply.message, "¡Hola! ¿En qué te ayudo?");
        assert_eq!(reply.audio_description, "Hola");
        assert_eq!(reply.action.kind, ActionKind::None);
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let raw = "Claro:\n```json\n{\"message\": \"Listo\", \"action\": {\"type\": \"add_to_cart\", \"productId\": \"abc\", \"quantity\": \"2\"}}\n```";
        let (reply, strategy) = parse_reply_with_strategy(raw);
        assert_eq!(strategy, ParseStrategy::Fenced);
        assert_eq!(reply.message, "Listo");
        assert_eq!(reply.action.kind, ActionKind::AddToCart);
        assert_eq!(reply.action.product_id.as_deref(), Some("abc"));
        assert_eq!(reply.action.quantity, Some(2));
    }

    #[test]
    fn test_embedded_json_prefers_prose_when_message_missing() {
        let raw = r#"Aquí tienes las zapatillas. {"action": {"type": "view_product", "slug": "zapatilla-run"}}"#;
        let (reply, strategy) = parse_reply_with_strategy(raw);
        assert_eq!(strategy, ParseStrategy::Embedded);
        assert_eq!(reply.message, "Aquí tienes las zapatillas.");
        assert_eq!(reply.action.kind, ActionKind::ViewProduct);
        assert_eq!(reply.action.slug.as_deref(), Some("zapatilla-run"));
    }

    #[test]
    fn test_embedded_skips_objects_without_contract_keys() {
        let raw = r#"Datos {"foo": 1} y luego {"message": "ok {con llaves}"}"#;
        let (reply, strategy) = parse_reply_with_strategy(raw);
        assert_eq!(strategy, ParseStrategy::Embedded);
        assert_eq!(reply.message, "ok {con llaves}");
    }

    #[test]
    fn test_plain_text() {
        let (reply, strategy) = parse_reply_with_strategy("  Tenemos envíos a todo el país.  ");
        assert_eq!(strategy, ParseStrategy::PlainText);
        assert_eq!(reply.message, "Tenemos envíos a todo el país.");
        assert_eq!(reply.audio_description, reply.message);
        assert_eq!(reply.action.kind, ActionKind::None);
    }

    #[test]
    fn test_broken_json_falls_back_to_text() {
        let raw = r#"{"message": "cortado"#;
        let (reply, strategy) = parse_reply_with_strategy(raw);
        assert_eq!(strategy, ParseStrategy::PlainText);
        assert_eq!(reply.message, raw);
    }

    #[test]
    fn test_quantity_bounds() {
        let action = parse_action(&serde_json::json!({"type": "add_to_cart", "quantity": 500}));
        assert_eq!(action.quantity, Some(100));
        let action = parse_action(&serde_json::json!({"type": "add_to_cart", "quantity": 0}));
        assert_eq!(action.quantity, None);
    }

    #[test]
    fn test_action_as_bare_string() {
        let action = parse_action(&serde_json::json!("add-to-cart"));
        assert_eq!(action.kind, ActionKind::AddToCart);
    }
}
