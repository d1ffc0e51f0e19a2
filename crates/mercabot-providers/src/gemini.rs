//! Adapter for the Gemini `generateContent` API.
//!
//! Gemini speaks its own wire format: a separate `systemInstruction`,
//! `contents` with `user`/`model` roles, and function calls carried as
//! message parts without ids. Ids are minted here so the rest of the
//! pipeline can treat Gemini tool calls like any other.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use mercabot_core::config::schema::ProviderConfig;
use mercabot_core::conversation::Role;
use mercabot_core::reply::NormalizedReply;
use mercabot_core::types::{TokenUsage, ToolCall, ToolDefinition};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{classify_http_error, ProviderError};
use crate::openai_compat::build_headers;
use crate::registry::ProviderSpec;
use crate::sse;
use crate::stream::{ReplyStream, StreamCompletion};
use crate::traits::{
    execute_all, Classification, GenerateOptions, GenerateRequest, ProviderAdapter, ToolExchange,
    ToolInvoker, MAX_TOOL_ROUNDS,
};

/// Thinking budget (tokens) granted when extended reasoning is on.
const THINKING_BUDGET: u32 = 2048;

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: &str, text: &str) -> Self {
        Content {
            role: Some(role.to_string()),
            parts: vec![Part {
                text: Some(text.to_string()),
                ..Default::default()
            }],
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCallPart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponsePart>,
    /// Set on thought-summary parts, which are not reply text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct FunctionCallPart {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
struct FunctionResponsePart {
    name: String,
    response: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclarations>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclarations {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

impl From<ToolDefinition> for FunctionDeclaration {
    fn from(def: ToolDefinition) -> Self {
        FunctionDeclaration {
            name: def.function.name,
            description: def.function.description,
            parameters: def.function.parameters,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    /// Gemini rejects JSON mode combined with function declarations.
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
    #[serde(default)]
    cached_content_token_count: u64,
    #[serde(default)]
    thoughts_token_count: u64,
    #[serde(default)]
    total_token_count: u64,
}

impl From<&UsageMetadata> for TokenUsage {
    fn from(u: &UsageMetadata) -> Self {
        TokenUsage {
            input: u.prompt_token_count,
            output: u.candidates_token_count,
            cached: u.cached_content_token_count,
            thinking: u.thoughts_token_count,
            total: u.total_token_count,
        }
    }
}

/// One candidate reduced to what the tool loop needs.
struct Turn {
    text: String,
    calls: Vec<ToolCall>,
    usage: TokenUsage,
}

impl GenerateContentResponse {
    fn into_turn(self) -> Turn {
        let usage = self.usage_metadata.as_ref().map(TokenUsage::from).unwrap_or_default();
        let mut text = String::new();
        let mut calls = Vec::new();
        if let Some(candidate) = self.candidates.into_iter().next() {
            if let Some(reason) = candidate.finish_reason.as_deref() {
                if reason != "STOP" {
                    debug!(finish_reason = reason, "Gemini stopped early");
                }
            }
            collect_parts(candidate.content.parts, &mut text, &mut calls);
        }
        Turn { text, calls, usage }
    }
}

fn collect_parts(parts: Vec<Part>, text: &mut String, calls: &mut Vec<ToolCall>) {
    for part in parts {
        if part.thought == Some(true) {
            continue;
        }
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(fc) = part.function_call {
            calls.push(ToolCall::new(
                format!("call_{}", uuid::Uuid::new_v4().simple()),
                fc.name,
                fc.args.to_string(),
            ));
        }
    }
}

/// `functionResponse.response` must be an object.
fn response_object(exchange: &ToolExchange) -> Value {
    match serde_json::from_str::<Value>(&exchange.result.to_model_payload()) {
        Ok(v @ Value::Object(_)) => v,
        Ok(other) => serde_json::json!({ "result": other }),
        Err(_) => serde_json::json!({ "found": false }),
    }
}

fn call_content(calls: &[ToolCall]) -> Content {
    Content {
        role: Some("model".to_string()),
        parts: calls
            .iter()
            .map(|c| Part {
                function_call: Some(FunctionCallPart {
                    name: c.function.name.clone(),
                    args: c.arguments_value(),
                }),
                ..Default::default()
            })
            .collect(),
    }
}

fn response_content(exchanges: &[ToolExchange]) -> Content {
    Content {
        role: Some("user".to_string()),
        parts: exchanges
            .iter()
            .map(|e| Part {
                function_response: Some(FunctionResponsePart {
                    name: e.call.function.name.clone(),
                    response: response_object(e),
                }),
                ..Default::default()
            })
            .collect(),
    }
}

// ─────────────────────────────────────────────
// GeminiAdapter
// ─────────────────────────────────────────────

pub struct GeminiAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    extra_headers: HeaderMap,
    spec: &'static ProviderSpec,
    tools: Arc<dyn ToolInvoker>,
}

impl std::fmt::Debug for GeminiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiAdapter")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl GeminiAdapter {
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec, tools: Arc<dyn ToolInvoker>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        GeminiAdapter {
            client,
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| spec.default_api_base.to_string()),
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| spec.default_model.to_string()),
            extra_headers: build_headers(config),
            spec,
            tools,
        }
    }

    fn endpoint(&self, model: &str, stream: bool) -> String {
        let base = self.api_base.trim_end_matches('/');
        let model = model.strip_prefix("models/").unwrap_or(model);
        if stream {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    fn build_contents(&self, request: &GenerateRequest) -> Vec<Content> {
        let mut contents: Vec<Content> = request
            .dialogue()
            .filter_map(|m| match m.role {
                Role::User => Some(Content::text("user", &m.content)),
                Role::Assistant => Some(Content::text("model", &m.content)),
                Role::System => None,
            })
            .collect();
        contents.push(Content::text("user", &request.user_message));

        if !request.tool_exchanges.is_empty() {
            let calls: Vec<ToolCall> = request.tool_exchanges.iter().map(|e| e.call.clone()).collect();
            contents.push(call_content(&calls));
            contents.push(response_content(&request.tool_exchanges));
        }
        contents
    }

    fn request_body(
        &self,
        system_prompt: &str,
        contents: &[Content],
        options: &GenerateOptions,
        with_tools: bool,
    ) -> GenerateContentRequest {
        let tools = with_tools.then(|| {
            vec![ToolDeclarations {
                function_declarations: self.tools.definitions().into_iter().map(Into::into).collect(),
            }]
        });
        GenerateContentRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: Some(system_prompt.to_string()),
                    ..Default::default()
                }],
            }),
            contents: contents.to_vec(),
            generation_config: GenerationConfig {
                max_output_tokens: Some(options.max_tokens),
                temperature: Some(options.temperature),
                response_mime_type: tools.is_none().then(|| "application/json".to_string()),
                thinking_config: self.reasoning_enabled(options).then_some(ThinkingConfig {
                    thinking_budget: THINKING_BUDGET,
                }),
            },
            tools,
        }
    }

    fn model_for(&self, options: &GenerateOptions) -> String {
        options.model.clone().unwrap_or_else(|| self.model.clone())
    }

    async fn send(
        &self,
        body: &GenerateContentRequest,
        model: &str,
        stream: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        debug!(
            provider = self.spec.display_name,
            model,
            contents = body.contents.len(),
            tools = body.tools.is_some(),
            stream,
            "Calling LLM"
        );

        let response = self
            .client
            .post(self.endpoint(model, stream))
            .header("x-goog-api-key", &self.api_key)
            .headers(self.extra_headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(self.spec.id, &e))?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(classify_http_error(self.spec.id, status, &headers, &text));
        }
        Ok(response)
    }

    async fn complete(&self, body: &GenerateContentRequest, model: &str) -> Result<Turn, ProviderError> {
        let response = self.send(body, model, false).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(self.spec.id, &e))?;
        let parsed: GenerateContentResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(provider = self.spec.id, error = %e, "Failed to parse LLM response");
            ProviderError::malformed(self.spec.id, e)
        })?;
        if parsed.candidates.is_empty() {
            return Err(ProviderError::malformed(self.spec.id, "no candidates in response"));
        }
        let turn = parsed.into_turn();
        debug!(
            provider = self.spec.display_name,
            text_len = turn.text.len(),
            tool_calls = turn.calls.len(),
            tokens = turn.usage.total,
            "LLM response received"
        );
        Ok(turn)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_extended_reasoning(&self) -> bool {
        self.spec.supports_extended_reasoning
    }

    fn tools(&self) -> &Arc<dyn ToolInvoker> {
        &self.tools
    }

    async fn generate_response(&self, request: &GenerateRequest) -> Result<NormalizedReply, ProviderError> {
        let mut contents = self.build_contents(request);
        let model = self.model_for(&request.options);
        let mut usage = TokenUsage::default();
        let mut function_results = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let with_tools = request.options.tools_enabled && round + 1 < MAX_TOOL_ROUNDS;
            let body = self.request_body(&request.system_prompt, &contents, &request.options, with_tools);
            let turn = self.complete(&body, &model).await?;
            usage.accumulate(&turn.usage);

            if with_tools && !turn.calls.is_empty() {
                debug!(provider = self.spec.id, round, calls = turn.calls.len(), "executing tool calls");
                let exchanges = execute_all(self, &turn.calls, &request.domain).await?;
                contents.push(call_content(&turn.calls));
                contents.push(response_content(&exchanges));
                function_results.extend(exchanges.into_iter().map(|e| e.result));
                continue;
            }

            let mut reply = self.parse_response(&turn.text);
            if reply.message.trim().is_empty() {
                return Err(ProviderError::malformed(self.spec.id, "empty reply"));
            }
            reply.model = model;
            reply.usage = usage;
            reply.function_results = function_results;
            return Ok(reply);
        }

        Err(ProviderError::malformed(self.spec.id, "tool loop ended without a reply"))
    }

    async fn generate_response_stream(&self, request: &GenerateRequest) -> Result<ReplyStream, ProviderError> {
        let contents = self.build_contents(request);
        let body = self.request_body(
            &request.system_prompt,
            &contents,
            &request.options,
            request.options.tools_enabled,
        );
        let model = self.model_for(&request.options);
        let response = self.send(&body, &model, true).await?;

        let provider = self.spec.id;
        let (sink, stream) = ReplyStream::channel(provider);

        tokio::spawn(async move {
            let mut events = Box::pin(sse::data_events(provider, response));
            let mut completion = StreamCompletion {
                model,
                ..Default::default()
            };

            while let Some(event) = events.next().await {
                let data = match event {
                    Ok(data) => data,
                    Err(e) => return sink.fail(e).await,
                };
                let chunk: GenerateContentResponse = match serde_json::from_str(&data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(provider, error = %e, "unparseable stream chunk");
                        return sink.fail(ProviderError::malformed(provider, e)).await;
                    }
                };
                // Gemini repeats cumulative usage on every chunk.
                if let Some(u) = chunk.usage_metadata.as_ref() {
                    completion.usage = TokenUsage::from(u);
                }
                let mut text = String::new();
                if let Some(candidate) = chunk.candidates.into_iter().next() {
                    collect_parts(candidate.content.parts, &mut text, &mut completion.tool_calls);
                }
                if !text.is_empty() {
                    completion.text.push_str(&text);
                    if !sink.send_text(text).await {
                        debug!(provider, "stream consumer went away");
                        return;
                    }
                }
            }

            sink.finish(completion);
        });

        Ok(stream)
    }

    async fn classify(&self, instruction: &str, message: &str) -> Result<Classification, ProviderError> {
        let body = GenerateContentRequest {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: Some(instruction.to_string()),
                    ..Default::default()
                }],
            }),
            contents: vec![Content::text("user", message)],
            tools: None,
            generation_config: GenerationConfig {
                max_output_tokens: Some(200),
                temperature: Some(0.0),
                response_mime_type: Some("application/json".to_string()),
                thinking_config: None,
            },
        };
        let turn = self.complete(&body, &self.model).await?;
        let value = serde_json::from_str(turn.text.trim())
            .map_err(|e| ProviderError::malformed(self.spec.id, format!("classifier output: {e}")))?;
        Ok(Classification {
            value,
            usage: turn.usage,
        })
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::find_by_id;
    use crate::test_support::RecordingTools;
    use mercabot_core::conversation::ConversationMessage;
    use mercabot_core::reply::ActionKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const GENERATE: &str = "/models/gemini-2.0-flash:generateContent";

    fn adapter(base: &str, tools: Arc<RecordingTools>) -> GeminiAdapter {
        let config = ProviderConfig {
            api_key: "g-key".to_string(),
            api_base: Some(base.to_string()),
            ..Default::default()
        };
        GeminiAdapter::new(&config, find_by_id("gemini").unwrap(), tools)
    }

    fn text_response(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 200, "candidatesTokenCount": 30,
                "cachedContentTokenCount": 150, "thoughtsTokenCount": 12, "totalTokenCount": 242
            }
        })
    }

    fn call_response() -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "functionCall": { "name": "search_products", "args": { "query": "mochila" } } }
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 80, "candidatesTokenCount": 5, "totalTokenCount": 85 }
        })
    }

    fn request(message: &str) -> GenerateRequest {
        GenerateRequest::new(message, Vec::new(), "shop.example", "Reply as JSON.")
    }

    #[test]
    fn test_endpoint() {
        let a = adapter("https://generativelanguage.googleapis.com/v1beta/", Arc::new(RecordingTools::default()));
        assert_eq!(
            a.endpoint("models/gemini-2.0-flash", true),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_contents_map_roles() {
        let a = adapter("http://localhost", Arc::new(RecordingTools::default()));
        let mut req = request("¿tienen envío?");
        req.history = vec![
            ConversationMessage::new(Role::System, "FULL"),
            ConversationMessage::new(Role::User, "hola"),
            ConversationMessage::new(Role::Assistant, "¡Hola!"),
        ];
        let contents = a.build_contents(&req);
        let roles: Vec<_> = contents.iter().map(|c| c.role.clone().unwrap()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_thought_parts_are_not_text() {
        let resp: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "thinking...", "thought": true },
                { "text": "{\"message\":\"ok\"}" }
            ]}}]
        }))
        .unwrap();
        assert_eq!(resp.into_turn().text, "{\"message\":\"ok\"}");
    }

    #[tokio::test]
    async fn test_generate_plain_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_partial_json(json!({
                "systemInstruction": { "parts": [{ "text": "Reply as JSON." }] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"message":"Envíos a todo el país","action":{"type":"none"}}"#,
            )))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let reply = a.generate_response(&request("¿envían?")).await.unwrap();
        assert_eq!(reply.message, "Envíos a todo el país");
        assert_eq!(reply.action.kind, ActionKind::None);
        assert_eq!(reply.provider, "gemini");
        assert_eq!(reply.usage.cached, 150);
        assert_eq!(reply.usage.thinking, 12);
        assert_eq!(reply.usage.total, 242);
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .and(header("x-store-tenant", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("hola")))
            .mount(&server)
            .await;

        let config = ProviderConfig {
            api_key: "g-key".to_string(),
            api_base: Some(server.uri()),
            extra_headers: Some(std::collections::HashMap::from([
                ("x-store-tenant".to_string(), "demo".to_string()),
                ("bad header".to_string(), "skipped".to_string()),
            ])),
            ..Default::default()
        };
        let a = GeminiAdapter::new(&config, find_by_id("gemini").unwrap(), Arc::new(RecordingTools::default()));
        let reply = a.generate_response(&request("hola")).await.unwrap();
        assert_eq!(reply.message, "hola");
    }

    #[tokio::test]
    async fn test_blank_text_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response("  ")))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let err = a.generate_response(&request("hola")).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_function_call_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .respond_with(ResponseTemplate::new(200).set_body_json(call_response()))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"message":"No tenemos mochilas ahora"}"#,
            )))
            .mount(&server)
            .await;

        let tools = Arc::new(RecordingTools::default());
        let a = adapter(&server.uri(), tools.clone());
        let reply = a.generate_response(&request("mochilas")).await.unwrap();

        assert_eq!(tools.names(), vec!["search_products"]);
        assert_eq!(reply.function_results.len(), 1);
        assert_eq!(reply.usage.total, 85 + 242);

        let requests = server.received_requests().await.unwrap();
        let first: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            first["tools"][0]["functionDeclarations"][0]["name"],
            "search_products"
        );
        assert!(first["generationConfig"].get("responseMimeType").is_none());

        let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
        let contents = second["contents"].as_array().unwrap();
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"]["query"], "mochila");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"],
            json!({ "count": 0, "products": [] })
        );
    }

    #[tokio::test]
    async fn test_resource_exhausted_is_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {
                    "code": 429,
                    "status": "RESOURCE_EXHAUSTED",
                    "details": [{
                        "@type": "type.googleapis.com/google.rpc.QuotaFailure",
                        "violations": [{ "quotaMetric": "generate_content_free_tier_requests" }]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let err = a.generate_response(&request("hola")).await.unwrap_err();
        assert!(matches!(err, ProviderError::QuotaExhausted { .. }));
    }

    #[tokio::test]
    async fn test_empty_candidates_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let err = a.generate_response(&request("hola")).await.unwrap_err();
        assert!(matches!(err, ProviderError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_extended_reasoning_sets_thinking_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": { "thinkingConfig": { "thinkingBudget": THINKING_BUDGET } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(r#"{"message":"ok"}"#)))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let mut req = request("compara los planes");
        req.options.extended_reasoning = true;
        assert_eq!(a.generate_response(&req).await.unwrap().message, "ok");
    }

    #[tokio::test]
    async fn test_stream_text_and_calls() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"{\\\"message\\\":\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\\\"Hola\\\"}\"}]}}],",
            "\"usageMetadata\":{\"promptTokenCount\":10,\"candidatesTokenCount\":3,\"totalTokenCount\":13}}\n\n"
        );
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:streamGenerateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let mut stream = a.generate_response_stream(&request("hola")).await.unwrap();
        let mut text = String::new();
        while let Some(chunk) = stream.next_chunk().await {
            text.push_str(&chunk.unwrap());
        }
        assert_eq!(text, r#"{"message":"Hola"}"#);
        let done = stream.completion().await.unwrap();
        assert_eq!(done.usage.total, 13);
        assert_eq!(done.model, "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_classify() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_response(
                r#"{"intent":"get_shipping_info","confidence":0.8}"#,
            )))
            .mount(&server)
            .await;

        let a = adapter(&server.uri(), Arc::new(RecordingTools::default()));
        let out = a.classify("Classify.", "¿cuánto tarda el envío?").await.unwrap();
        assert_eq!(out.value["intent"], "get_shipping_info");
    }
}
