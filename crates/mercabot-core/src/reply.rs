//! The reply contract every provider is instructed to emit, and the
//! normalized form the orchestrator works with.
//!
//! On the wire a reply is
//! `{"message": "...", "audio_description": "...", "action": {...}}`.

use serde::{Deserialize, Serialize};

use crate::types::TokenUsage;

// ─────────────────────────────────────────────
// Action
// ─────────────────────────────────────────────

/// What the client should do alongside showing the message.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[default]
    None,
    AddToCart,
    ViewProduct,
    OpenUrl,
    /// Anything the model invented; treated like `None` by clients.
    #[serde(other)]
    Unknown,
}

impl ActionKind {
    /// Parse the loose strings models produce (`"add-to-cart"`, `"ADD_TO_CART"`).
    pub fn from_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "" | "none" | "null" => ActionKind::None,
            "add_to_cart" | "addtocart" | "add" => ActionKind::AddToCart,
            "view_product" | "show_product" | "product" => ActionKind::ViewProduct,
            "open_url" | "url" | "link" => ActionKind::OpenUrl,
            _ => ActionKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::None => "none",
            ActionKind::AddToCart => "add_to_cart",
            ActionKind::ViewProduct => "view_product",
            ActionKind::OpenUrl => "open_url",
            ActionKind::Unknown => "unknown",
        }
    }
}

/// The `action` object of the reply contract.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ReplyAction {
    #[serde(rename = "type", default)]
    pub kind: ActionKind,
    #[serde(rename = "productId", default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_regular: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
}

impl ReplyAction {
    /// `{"type": "none"}`.
    pub fn none() -> Self {
        ReplyAction::default()
    }
}

// ─────────────────────────────────────────────
// Tool result
// ─────────────────────────────────────────────

/// Outcome of one tool execution.
///
/// `data == None` means "nothing found", which is not an error.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn found(tool: impl Into<String>, data: serde_json::Value) -> Self {
        ToolResult {
            tool: tool.into(),
            data: Some(data),
        }
    }

    pub fn empty(tool: impl Into<String>) -> Self {
        ToolResult {
            tool: tool.into(),
            data: None,
        }
    }

    /// JSON text handed back to the model as the tool output.
    pub fn to_model_payload(&self) -> String {
        match &self.data {
            Some(data) => data.to_string(),
            None => serde_json::json!({ "found": false }).to_string(),
        }
    }
}

// ─────────────────────────────────────────────
// Normalized reply
// ─────────────────────────────────────────────

/// A provider reply after parsing, independent of which provider produced it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NormalizedReply {
    pub message: String,
    pub audio_description: String,
    pub action: ReplyAction,
    pub usage: TokenUsage,
    #[serde(rename = "functionResults", default)]
    pub function_results: Vec<ToolResult>,
    /// Provider id that produced the reply.
    #[serde(default)]
    pub provider: String,
    /// Concrete model that produced the reply.
    #[serde(default)]
    pub model: String,
}
