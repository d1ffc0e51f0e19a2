//! Provider capability trait — one implementation per LLM backend.
//!
//! The orchestrator only ever holds `Arc<dyn ProviderAdapter>`; which
//! backend sits behind it is decided at runtime by the router.

use std::sync::Arc;

use async_trait::async_trait;
use mercabot_core::conversation::{ConversationMessage, Role};
use mercabot_core::error::ToolError;
use mercabot_core::reply::{NormalizedReply, ToolResult};
use mercabot_core::types::{TokenUsage, ToolCall, ToolDefinition};
use tracing::warn;

use crate::error::ProviderError;
use crate::reply_parser;
use crate::stream::ReplyStream;

/// Requests per turn in the internal tool loop. The last one is sent
/// without tools so the model has to answer in text.
pub const MAX_TOOL_ROUNDS: usize = 3;

// ─────────────────────────────────────────────
// Tool invocation seam
// ─────────────────────────────────────────────

/// The capability set adapters may call on behalf of a model.
///
/// Implemented once (by the tool executor) and shared by every adapter.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Schemas presented to every provider.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run `name`. Unknown names and "not found" are `Ok` with empty data.
    async fn invoke(
        &self,
        name: &str,
        args: &serde_json::Value,
        domain: &str,
    ) -> Result<ToolResult, ToolError>;
}

/// One executed tool call, ready to be shown back to the model.
#[derive(Clone, Debug)]
pub struct ToolExchange {
    pub call: ToolCall,
    pub result: ToolResult,
}

// ─────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────

/// Per-call knobs.
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    /// Ask for deeper reasoning; ignored with a warning when unsupported.
    pub extended_reasoning: bool,
    /// Offer the tool schema to the model.
    pub tools_enabled: bool,
    /// Use this model instead of the adapter's default.
    pub model: Option<String>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.7,
            extended_reasoning: false,
            tools_enabled: true,
            model: None,
        }
    }
}

/// Everything an adapter needs for one turn.
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub user_message: String,
    /// Prior turns; a leading system message is skipped in favour of
    /// `system_prompt`.
    pub history: Vec<ConversationMessage>,
    pub domain: String,
    /// The prompt in effect this turn (full, short, or dynamic).
    pub system_prompt: String,
    /// Tool calls already executed for this turn, appended after the user
    /// message in the provider's shape.
    pub tool_exchanges: Vec<ToolExchange>,
    pub options: GenerateOptions,
}

impl GenerateRequest {
    pub fn new(
        user_message: impl Into<String>,
        history: Vec<ConversationMessage>,
        domain: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        GenerateRequest {
            user_message: user_message.into(),
            history,
            domain: domain.into(),
            system_prompt: system_prompt.into(),
            tool_exchanges: Vec::new(),
            options: GenerateOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    /// Follow-up request carrying executed tool calls, with tools disabled.
    pub fn resumed_with(&self, exchanges: Vec<ToolExchange>) -> Self {
        let mut next = self.clone();
        next.tool_exchanges.extend(exchanges);
        next.options.tools_enabled = false;
        next
    }

    /// History without the memorized system message.
    pub fn dialogue(&self) -> impl Iterator<Item = &ConversationMessage> {
        self.history.iter().filter(|m| m.role != Role::System)
    }
}

/// Structured output of a classification call.
#[derive(Clone, Debug)]
pub struct Classification {
    pub value: serde_json::Value,
    pub usage: TokenUsage,
}

// ─────────────────────────────────────────────
// ProviderAdapter
// ─────────────────────────────────────────────

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider id (`"openai"`, `"gemini"`, `"deepseek"`).
    fn id(&self) -> &str;

    /// Default model of this instance.
    fn model(&self) -> &str;

    fn supports_extended_reasoning(&self) -> bool;

    /// Tools this adapter executes during its internal loop.
    fn tools(&self) -> &Arc<dyn ToolInvoker>;

    /// One full turn, running the tool loop internally.
    async fn generate_response(&self, request: &GenerateRequest) -> Result<NormalizedReply, ProviderError>;

    /// Start a streamed turn. The stream ends with either text or tool
    /// calls; the caller decides whether to resume.
    async fn generate_response_stream(&self, request: &GenerateRequest) -> Result<ReplyStream, ProviderError>;

    /// Single non-tool call asking for a JSON object.
    async fn classify(&self, instruction: &str, message: &str) -> Result<Classification, ProviderError>;

    /// Execute one model-requested tool call.
    async fn execute_tool_call(&self, call: &ToolCall, domain: &str) -> Result<ToolResult, ProviderError> {
        let args = call.arguments_value();
        Ok(self.tools().invoke(&call.function.name, &args, domain).await?)
    }

    /// Normalize raw model text into the reply contract.
    fn parse_response(&self, raw: &str) -> NormalizedReply {
        let mut reply = reply_parser::parse_reply(raw);
        reply.provider = self.id().to_string();
        reply.model = self.model().to_string();
        reply
    }

    /// Whether `options` may use extended reasoning on this provider.
    fn reasoning_enabled(&self, options: &GenerateOptions) -> bool {
        if options.extended_reasoning && !self.supports_extended_reasoning() {
            warn!(provider = self.id(), "extended reasoning requested but unsupported, ignoring");
            return false;
        }
        options.extended_reasoning
    }
}

/// Execute every call of one round, in order.
pub async fn execute_all<A: ProviderAdapter + ?Sized>(
    adapter: &A,
    calls: &[ToolCall],
    domain: &str,
) -> Result<Vec<ToolExchange>, ProviderError> {
    let mut out = Vec::with_capacity(calls.len());
    for call in calls {
        let result = adapter.execute_tool_call(call, domain).await?;
        out.push(ToolExchange {
            call: call.clone(),
            result,
        });
    }
    Ok(out)
}
