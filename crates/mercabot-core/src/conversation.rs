//! Conversation document — one per `(user_id, domain)` active chat.
//!
//! Invariants kept by this module:
//! - a `system` message, if present, is the first message and is set once;
//! - per-message token/cost metadata is written once and never recomputed;
//! - status only moves `active → closed → archived`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::TokenCost;
use crate::reply::ReplyAction;
use crate::types::TokenUsage;

// ─────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    #[default]
    Active,
    Closed,
    Archived,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Active => "active",
            ConversationStatus::Closed => "closed",
            ConversationStatus::Archived => "archived",
        }
    }
}

/// Which system prompt variant a turn was generated with.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PromptKind {
    Full,
    Short,
    Dynamic,
}

/// Rejected status transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot move conversation from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Intent classification folded into a message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IntentSnapshot {
    pub intent: String,
    pub confidence: f32,
    pub method: String,
}

/// Per-message metadata. Written once when the turn is persisted.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub tokens: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<TokenCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_sent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_type: Option<PromptKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<IntentSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ReplyAction>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        ConversationMessage {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ─────────────────────────────────────────────
// Aggregate metadata
// ─────────────────────────────────────────────

/// Per-provider usage counters.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ProviderUsage {
    pub requests: u64,
    pub tokens: u64,
}

/// Snapshot of the catalog item most recently shown to the user.
///
/// Used to resolve "add it" / "sí, agrégalo" on a later turn.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProductContext {
    pub product_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_regular: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_sale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub shown_at: DateTime<Utc>,
}

/// Running totals kept on the conversation document.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetadata {
    pub message_count: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub average_latency_ms: f64,
    /// Number of assistant responses folded into `average_latency_ms`.
    pub response_count: u64,
    pub provider_usage: BTreeMap<String, ProviderUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_product_context: Option<ProductContext>,
}

impl ConversationMetadata {
    /// Fold one completed turn (user + assistant message) into the totals.
    pub fn record_turn(&mut self, provider: &str, usage: &TokenUsage, latency_ms: u64) {
        self.message_count += 2;
        self.total_tokens += usage.total;
        self.cached_tokens += usage.cached;

        let n = self.response_count as f64;
        self.average_latency_ms = ((self.average_latency_ms * n) + latency_ms as f64) / (n + 1.0);
        self.response_count += 1;

        let entry = self.provider_usage.entry(provider.to_string()).or_default();
        entry.requests += 1;
        entry.tokens += usage.total;
    }
}

// ─────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub domain: String,
    pub status: ConversationStatus,
    pub messages: Vec<ConversationMessage>,
    pub metadata: ConversationMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Conversation {
    /// Create a new active conversation with no messages.
    pub fn new(user_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self::started_at(user_id, domain, Utc::now())
    }

    /// Like [`Conversation::new`], stamped with `now` instead of the wall clock.
    pub fn started_at(user_id: impl Into<String>, domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Conversation {
            id: uuid::Uuid::new_v4().simple().to_string(),
            user_id: user_id.into(),
            domain: domain.into(),
            status: ConversationStatus::Active,
            messages: Vec::new(),
            metadata: ConversationMetadata::default(),
            created_at: now,
            updated_at: now,
            closed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    /// The memorized system prompt, if one was attached.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    /// Attach the system prompt as the first message.
    ///
    /// Returns `false` (and changes nothing) when one is already attached.
    pub fn attach_system_prompt(&mut self, prompt: impl Into<String>) -> bool {
        if self.system_prompt().is_some() {
            return false;
        }
        let message = ConversationMessage::new(Role::System, prompt).with_timestamp(self.updated_at);
        self.messages.insert(0, message);
        true
    }

    /// The system message (if any) followed by the last `window` other messages.
    pub fn history_window(&self, window: usize) -> Vec<ConversationMessage> {
        let mut out = Vec::with_capacity(window + 1);
        if let Some(system) = self.messages.first().filter(|m| m.role == Role::System) {
            out.push(system.clone());
        }
        let rest: Vec<&ConversationMessage> = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let start = rest.len().saturating_sub(window);
        out.extend(rest[start..].iter().map(|m| (*m).clone()));
        out
    }

    /// Messages without the memorized system prompt.
    pub fn visible_messages(&self) -> Vec<ConversationMessage> {
        self.messages
            .iter()
            .filter(|m| m.role != Role::System)
            .cloned()
            .collect()
    }

    /// Append a user/assistant pair. The assistant message's timestamp
    /// becomes the conversation's `updated_at`.
    pub fn push_turn(&mut self, user: ConversationMessage, assistant: ConversationMessage) {
        self.updated_at = assistant.timestamp;
        self.messages.push(user);
        self.messages.push(assistant);
    }

    /// `active → closed`. Closing a closed conversation is a no-op (`Ok(false)`).
    pub fn close(&mut self, now: DateTime<Utc>) -> Result<bool, StatusTransitionError> {
        match self.status {
            ConversationStatus::Active => {
                self.status = ConversationStatus::Closed;
                self.closed_at = Some(now);
                self.updated_at = now;
                Ok(true)
            }
            ConversationStatus::Closed => Ok(false),
            ConversationStatus::Archived => Err(StatusTransitionError {
                from: "archived",
                to: "closed",
            }),
        }
    }

    /// `closed → archived`.
    pub fn archive(&mut self, now: DateTime<Utc>) -> Result<(), StatusTransitionError> {
        if self.status != ConversationStatus::Closed {
            return Err(StatusTransitionError {
                from: self.status.as_str(),
                to: "archived",
            });
        }
        self.status = ConversationStatus::Archived;
        self.updated_at = now;
        Ok(())
    }

    /// Whether a closed conversation has outlived the retention window.
    pub fn retention_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.status == ConversationStatus::Closed
            && self.closed_at.is_some_and(|closed| now - closed >= retention)
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(conv: &mut Conversation, user: &str, assistant: &str) {
        conv.push_turn(
            ConversationMessage::new(Role::User, user),
            ConversationMessage::new(Role::Assistant, assistant),
        );
    }

    #[test]
    fn test_system_prompt_attached_once_and_first() {
        let mut conv = Conversation::new("u1", "shop.example");
        turn(&mut conv, "hola", "¡hola!");
        assert!(conv.attach_system_prompt("FULL PROMPT"));
        assert!(!conv.attach_system_prompt("OTHER PROMPT"));

        assert_eq!(conv.messages[0].role, Role::System);
        assert_eq!(conv.system_prompt(), Some("FULL PROMPT"));
        assert_eq!(
            conv.messages.iter().filter(|m| m.role == Role::System).count(),
            1
        );
    }

    #[test]
    fn test_history_window_keeps_system_and_tail() {
        let mut conv = Conversation::new("u1", "shop.example");
        conv.attach_system_prompt("SYS");
        for i in 0..5 {
            turn(&mut conv, &format!("q{i}"), &format!("a{i}"));
        }

        let window = conv.history_window(6);
        assert_eq!(window.len(), 7);
        assert_eq!(window[0].role, Role::System);
        assert_eq!(window[1].content, "q2");
        assert_eq!(window.last().unwrap().content, "a4");
    }

    #[test]
    fn test_history_window_without_system() {
        let mut conv = Conversation::new("u1", "d");
        turn(&mut conv, "q", "a");
        let window = conv.history_window(6);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].role, Role::User);
    }

    #[test]
    fn test_record_turn_rolling_average() {
        let mut meta = ConversationMetadata::default();
        meta.record_turn("openai", &TokenUsage::new(10, 5, 15), 100);
        meta.record_turn("gemini", &TokenUsage::new(20, 10, 30), 300);
        meta.record_turn("openai", &TokenUsage::new(1, 1, 2), 200);

        assert_eq!(meta.message_count, 6);
        assert_eq!(meta.total_tokens, 47);
        assert!((meta.average_latency_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(meta.provider_usage["openai"].requests, 2);
        assert_eq!(meta.provider_usage["openai"].tokens, 17);
        assert_eq!(meta.provider_usage["gemini"].requests, 1);
    }

    #[test]
    fn test_timestamps_follow_the_given_clock() {
        let start = Utc::now() - Duration::days(3);
        let mut conv = Conversation::started_at("u1", "d", start);
        conv.attach_system_prompt("FULL");
        assert_eq!(conv.messages[0].timestamp, start);

        let later = start + Duration::minutes(2);
        conv.push_turn(
            ConversationMessage::new(Role::User, "hola").with_timestamp(later),
            ConversationMessage::new(Role::Assistant, "¡hola!").with_timestamp(later),
        );
        assert_eq!(conv.created_at, start);
        assert_eq!(conv.updated_at, later);
        assert_eq!(conv.messages[2].timestamp, later);
    }

    #[test]
    fn test_status_transitions() {
        let now = Utc::now();
        let mut conv = Conversation::new("u1", "d");
        assert!(conv.archive(now).is_err());
        assert_eq!(conv.close(now), Ok(true));
        assert_eq!(conv.close(now), Ok(false));
        conv.archive(now).unwrap();
        assert_eq!(conv.status, ConversationStatus::Archived);
        assert!(conv.close(now).is_err());
    }

    #[test]
    fn test_retention_only_for_closed() {
        let now = Utc::now();
        let retention = Duration::days(90);
        let mut conv = Conversation::new("u1", "d");
        assert!(!conv.retention_expired(now + Duration::days(365), retention));

        conv.close(now).unwrap();
        assert!(!conv.retention_expired(now + Duration::days(89), retention));
        assert!(conv.retention_expired(now + Duration::days(90), retention));
    }

    #[test]
    fn test_document_round_trip_uses_camel_case() {
        let mut conv = Conversation::new("u1", "shop.example");
        turn(&mut conv, "hola", "¡hola!");
        let json = serde_json::to_value(&conv).unwrap();
        assert!(json.get("userId").is_some());
        assert_eq!(json["status"], "active");
        assert_eq!(json["messages"][0]["role"], "user");

        let back: Conversation = serde_json::from_value(json).unwrap();
        assert_eq!(back, conv);
    }
}
