//! Wire types shared by every provider adapter.
//!
//! The chat message and tool-call shapes follow the OpenAI chat completions
//! format, which is also what DeepSeek speaks. Providers with a different
//! wire format (Gemini) convert from these types at their own boundary.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────
// Messages (OpenAI chat completions format)
// ─────────────────────────────────────────────

/// A chat message in the OpenAI format.
///
/// Each variant maps to a `role` field value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "system")]
    System { content: String },

    #[serde(rename = "user")]
    User { content: String },

    #[serde(rename = "assistant")]
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },

    #[serde(rename = "tool")]
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    /// Create an assistant message carrying tool calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content,
            tool_calls: Some(tool_calls),
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }
}

// ─────────────────────────────────────────────
// Tool Calls (function calling)
// ─────────────────────────────────────────────

/// A tool call from the assistant, requesting execution of a function.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Unique ID for this tool call (used to match results).
    pub id: String,
    /// Always "function" in current OpenAI API.
    #[serde(rename = "type")]
    pub call_type: String,
    /// The function to call.
    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        ToolCall {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Decode the JSON argument string into an object.
    ///
    /// Models sometimes send an empty string or malformed JSON; both decode
    /// to an empty object so the tool can apply its own defaults.
    pub fn arguments_value(&self) -> serde_json::Value {
        match serde_json::from_str::<serde_json::Value>(&self.function.arguments) {
            Ok(v @ serde_json::Value::Object(_)) => v,
            _ => serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// The function name and arguments within a tool call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Name of the function/tool to call.
    pub name: String,
    /// JSON-encoded arguments string.
    pub arguments: String,
}

// ─────────────────────────────────────────────
// Tool Definitions (for LLM requests)
// ─────────────────────────────────────────────

/// Definition of a tool, sent to the LLM so it knows what tools are available.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// Always "function".
    #[serde(rename = "type")]
    pub tool_type: String,
    /// The function schema.
    pub function: FunctionDefinition,
}

/// Schema of a function tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─────────────────────────────────────────────
// Token usage
// ─────────────────────────────────────────────

/// Token counts for one provider request or an aggregate of several.
///
/// `input` includes `cached`; `thinking` is reported separately from `output`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub cached: u64,
    pub thinking: u64,
    pub total: u64,
}

impl TokenUsage {
    /// Build usage from the three counts providers always report.
    pub fn new(input: u64, output: u64, total: u64) -> Self {
        TokenUsage {
            input,
            output,
            total,
            ..Default::default()
        }
    }

    /// Add another request's usage into this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input += other.input;
        self.output += other.output;
        self.cached += other.cached;
        self.thinking += other.thinking;
        self.total += other.total;
    }

    /// Whether nothing was counted.
    pub fn is_empty(&self) -> bool {
        self.total == 0 && self.input == 0 && self.output == 0
    }
}

// ─────────────────────────────────────────────
// LLM Response (one provider request)
// ─────────────────────────────────────────────

/// Response from a single provider request.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Text content from the assistant (None if only tool calls).
    pub content: Option<String>,
    /// Tool calls requested by the assistant.
    pub tool_calls: Vec<ToolCall>,
    /// Why the model stopped generating.
    pub finish_reason: Option<String>,
    /// Token usage for this request.
    pub usage: TokenUsage,
}

impl LlmResponse {
    /// Whether the response contains tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

// ─────────────────────────────────────────────
// OpenAI-compatible request / response bodies
// ─────────────────────────────────────────────

/// Request body for an OpenAI-compatible chat completion API.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
}

/// `response_format` request field.
#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl ResponseFormat {
    /// `{"type": "json_object"}`.
    pub fn json_object() -> Self {
        ResponseFormat {
            format_type: "json_object".to_string(),
        }
    }
}

/// `stream_options` request field.
#[derive(Debug, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

/// Raw chat completion response from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<WireUsage>,
}

/// A single choice in a chat completion response.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message within a chat completion choice.
#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// Usage block as reported by OpenAI and DeepSeek.
///
/// OpenAI reports cache hits in `prompt_tokens_details.cached_tokens`,
/// DeepSeek in `prompt_cache_hit_tokens`.
#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
    #[serde(default)]
    pub prompt_cache_hit_tokens: Option<u64>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct PromptTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
pub struct CompletionTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}

impl From<&WireUsage> for TokenUsage {
    fn from(u: &WireUsage) -> Self {
        let cached = u
            .prompt_tokens_details
            .as_ref()
            .map(|d| d.cached_tokens)
            .or(u.prompt_cache_hit_tokens)
            .unwrap_or(0);
        let thinking = u
            .completion_tokens_details
            .as_ref()
            .map(|d| d.reasoning_tokens)
            .unwrap_or(0);
        TokenUsage {
            input: u.prompt_tokens,
            output: u.completion_tokens.saturating_sub(thinking),
            cached,
            thinking,
            total: u.total_tokens,
        }
    }
}

impl TryFrom<ChatCompletionResponse> for LlmResponse {
    type Error = String;

    fn try_from(resp: ChatCompletionResponse) -> Result<Self, Self::Error> {
        let usage = resp.usage.as_ref().map(TokenUsage::from).unwrap_or_default();
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "No choices in response".to_string())?;
        Ok(LlmResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage,
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_system_message_serialization() {
        let msg = Message::system("You are the store assistant.");
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["role"], "system");
        assert_eq!(json["content"], "You are the store assistant.");
    }

    #[test]
    fn test_assistant_tool_calls_omit_content() {
        let msg = Message::assistant_tool_calls(
            None,
            vec![ToolCall::new("call_1", "search_products", r#"{"query":"shoes"}"#)],
        );
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["role"], "assistant");
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "search_products");
    }

    #[test]
    fn test_tool_result_serialization() {
        let msg = Message::tool_result("call_9", "{\"count\":0}");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_9");
    }

    #[test]
    fn test_arguments_value_tolerates_garbage() {
        let ok = ToolCall::new("1", "x", r#"{"query":"a"}"#);
        assert_eq!(ok.arguments_value()["query"], "a");

        let empty = ToolCall::new("2", "x", "");
        assert!(empty.arguments_value().as_object().unwrap().is_empty());

        let array = ToolCall::new("3", "x", "[1,2]");
        assert!(array.arguments_value().is_object());
    }

    #[test]
    fn test_usage_from_openai_details() {
        let wire: WireUsage = serde_json::from_value(json!({
            "prompt_tokens": 120,
            "completion_tokens": 40,
            "total_tokens": 160,
            "prompt_tokens_details": { "cached_tokens": 100 },
            "completion_tokens_details": { "reasoning_tokens": 10 }
        }))
        .unwrap();

        let usage = TokenUsage::from(&wire);
        assert_eq!(usage.input, 120);
        assert_eq!(usage.cached, 100);
        assert_eq!(usage.thinking, 10);
        assert_eq!(usage.output, 30);
        assert_eq!(usage.total, 160);
    }

    #[test]
    fn test_usage_from_deepseek_cache_hits() {
        let wire: WireUsage = serde_json::from_value(json!({
            "prompt_tokens": 50,
            "completion_tokens": 5,
            "total_tokens": 55,
            "prompt_cache_hit_tokens": 32
        }))
        .unwrap();

        assert_eq!(TokenUsage::from(&wire).cached, 32);
    }

    #[test]
    fn test_usage_accumulate() {
        let mut total = TokenUsage::new(10, 5, 15);
        total.accumulate(&TokenUsage {
            input: 20,
            output: 2,
            cached: 4,
            thinking: 1,
            total: 23,
        });
        assert_eq!(total.input, 30);
        assert_eq!(total.cached, 4);
        assert_eq!(total.total, 38);
    }

    #[test]
    fn test_chat_completion_parsing() {
        let resp: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": { "content": "{\"message\":\"hola\"}" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 8, "completion_tokens": 4, "total_tokens": 12 }
        }))
        .unwrap();

        let llm = LlmResponse::try_from(resp).unwrap();
        assert_eq!(llm.content.as_deref(), Some("{\"message\":\"hola\"}"));
        assert!(!llm.has_tool_calls());
        assert_eq!(llm.usage.total, 12);
    }

    #[test]
    fn test_chat_completion_empty_choices() {
        let resp: ChatCompletionResponse =
            serde_json::from_value(json!({ "id": "x", "choices": [], "usage": null })).unwrap();
        assert!(LlmResponse::try_from(resp).is_err());
    }

    #[test]
    fn test_chat_request_skips_unset_fields() {
        let request = ChatCompletionRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![Message::user("hola")],
            tools: None,
            tool_choice: None,
            max_tokens: None,
            temperature: None,
            response_format: None,
            stream: false,
            stream_options: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("stream").is_none());
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_chat_request_streaming_fields() {
        let request = ChatCompletionRequest {
            model: "deepseek-chat".to_string(),
            messages: vec![],
            tools: None,
            tool_choice: None,
            max_tokens: Some(512),
            temperature: Some(0.3),
            response_format: Some(ResponseFormat::json_object()),
            stream: true,
            stream_options: Some(StreamOptions { include_usage: true }),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], true);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["response_format"]["type"], "json_object");
    }
}
