//! Adapter for OpenAI-compatible `/chat/completions` APIs (OpenAI, DeepSeek).

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use mercabot_core::config::schema::ProviderConfig;
use mercabot_core::conversation::Role;
use mercabot_core::reply::NormalizedReply;
use mercabot_core::types::{
    ChatCompletionRequest, ChatCompletionResponse, LlmResponse, Message, ResponseFormat,
    StreamOptions, TokenUsage, ToolCall, WireUsage,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{classify_http_error, ProviderError};
use crate::registry::ProviderSpec;
use crate::sse;
use crate::stream::{ReplyStream, StreamCompletion};
use crate::traits::{
    execute_all, Classification, GenerateOptions, GenerateRequest, ProviderAdapter, ToolInvoker,
    MAX_TOOL_ROUNDS,
};

// ─────────────────────────────────────────────
// OpenAiCompatAdapter
// ─────────────────────────────────────────────

pub struct OpenAiCompatAdapter {
    /// HTTP client (shared, connection-pooled).
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    /// Model swapped in when extended reasoning is requested.
    reasoning_model: Option<String>,
    extra_headers: HeaderMap,
    spec: &'static ProviderSpec,
    tools: Arc<dyn ToolInvoker>,
}

impl std::fmt::Debug for OpenAiCompatAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatAdapter")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("provider", &self.spec.display_name)
            .finish()
    }
}

impl OpenAiCompatAdapter {
    pub fn new(config: &ProviderConfig, spec: &'static ProviderSpec, tools: Arc<dyn ToolInvoker>) -> Self {
        let api_base = config
            .api_base
            .clone()
            .unwrap_or_else(|| spec.default_api_base.to_string());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        OpenAiCompatAdapter {
            client,
            api_base,
            api_key: config.api_key.clone(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| spec.default_model.to_string()),
            reasoning_model: config
                .reasoning_model
                .clone()
                .or_else(|| spec.reasoning_model.map(String::from)),
            extra_headers: build_headers(config),
            spec,
            tools,
        }
    }

    /// Build the full chat completions URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn model_for(&self, options: &GenerateOptions) -> String {
        if let Some(model) = &options.model {
            return model.clone();
        }
        if self.reasoning_enabled(options) {
            if let Some(model) = &self.reasoning_model {
                return model.clone();
            }
        }
        self.model.clone()
    }

    fn is_reasoning_model(&self, model: &str) -> bool {
        self.reasoning_model.as_deref() == Some(model)
    }

    /// System prompt, prior dialogue, the new user message, then any
    /// already-executed tool calls with their results.
    fn build_messages(&self, request: &GenerateRequest) -> Vec<Message> {
        let mut messages = Vec::with_capacity(request.history.len() + 4);
        messages.push(Message::system(&request.system_prompt));
        for m in request.dialogue() {
            match m.role {
                Role::User => messages.push(Message::user(&m.content)),
                Role::Assistant => messages.push(Message::assistant(&m.content)),
                Role::System => {}
            }
        }
        messages.push(Message::user(&request.user_message));

        if !request.tool_exchanges.is_empty() {
            let calls = request.tool_exchanges.iter().map(|e| e.call.clone()).collect();
            messages.push(Message::assistant_tool_calls(None, calls));
            for exchange in &request.tool_exchanges {
                messages.push(Message::tool_result(
                    &exchange.call.id,
                    exchange.result.to_model_payload(),
                ));
            }
        }
        messages
    }

    fn request_body(
        &self,
        model: &str,
        messages: &[Message],
        options: &GenerateOptions,
        with_tools: bool,
        stream: bool,
    ) -> ChatCompletionRequest {
        let reasoning = self.is_reasoning_model(model);
        let tools = with_tools.then(|| self.tools.definitions());
        ChatCompletionRequest {
            model: model.to_string(),
            messages: messages.to_vec(),
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            max_tokens: Some(options.max_tokens),
            // Reasoning models reject sampling parameters and JSON mode.
            temperature: (!reasoning).then_some(options.temperature),
            response_format: (!reasoning).then(ResponseFormat::json_object),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, ProviderError> {
        debug!(
            provider = self.spec.display_name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.as_ref().map_or(0, |t| t.len()),
            stream = body.stream,
            "Calling LLM"
        );

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
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

    async fn complete(&self, body: &ChatCompletionRequest) -> Result<LlmResponse, ProviderError> {
        let response = self.send(body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(self.spec.id, &e))?;

        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            warn!(provider = self.spec.id, error = %e, "Failed to parse LLM response");
            ProviderError::malformed(self.spec.id, e)
        })?;
        let llm = LlmResponse::try_from(parsed).map_err(|e| ProviderError::malformed(self.spec.id, e))?;

        debug!(
            provider = self.spec.display_name,
            has_content = llm.content.is_some(),
            tool_calls = llm.tool_calls.len(),
            finish_reason = llm.finish_reason.as_deref().unwrap_or("?"),
            tokens = llm.usage.total,
            "LLM response received"
        );
        Ok(llm)
    }
}

/// Extra headers from config; invalid pairs are logged and skipped.
pub(crate) fn build_headers(config: &ProviderConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(ref extra) = config.extra_headers {
        for (key, value) in extra {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            } else {
                warn!("Invalid header: {}={}", key, value);
            }
        }
    }
    headers
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatAdapter {
    fn id(&self) -> &str {
        self.spec.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_extended_reasoning(&self) -> bool {
        self.spec.supports_extended_reasoning && self.reasoning_model.is_some()
    }

    fn tools(&self) -> &Arc<dyn ToolInvoker> {
        &self.tools
    }

    async fn generate_response(&self, request: &GenerateRequest) -> Result<NormalizedReply, ProviderError> {
        let model = self.model_for(&request.options);
        let mut messages = self.build_messages(request);
        let mut usage = TokenUsage::default();
        let mut function_results = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let with_tools = request.options.tools_enabled && round + 1 < MAX_TOOL_ROUNDS;
            let body = self.request_body(&model, &messages, &request.options, with_tools, false);
            let response = self.complete(&body).await?;
            usage.accumulate(&response.usage);

            if with_tools && response.has_tool_calls() {
                debug!(
                    provider = self.spec.id,
                    round,
                    calls = response.tool_calls.len(),
                    "executing tool calls"
                );
                let exchanges = execute_all(self, &response.tool_calls, &request.domain).await?;
                messages.push(Message::assistant_tool_calls(
                    response.content.clone(),
                    response.tool_calls.clone(),
                ));
                for exchange in exchanges {
                    messages.push(Message::tool_result(
                        &exchange.call.id,
                        exchange.result.to_model_payload(),
                    ));
                    function_results.push(exchange.result);
                }
                continue;
            }

            let mut reply = self.parse_response(response.content.as_deref().unwrap_or_default());
            if reply.message.trim().is_empty() {
                return Err(ProviderError::malformed(self.spec.id, "empty reply"));
            }
            reply.usage = usage;
            reply.function_results = function_results;
            reply.model = model;
            return Ok(reply);
        }

        Err(ProviderError::malformed(self.spec.id, "tool loop ended without a reply"))
    }

    async fn generate_response_stream(&self, request: &GenerateRequest) -> Result<ReplyStream, ProviderError> {
        let model = self.model_for(&request.options);
        let messages = self.build_messages(request);
        let body = self.request_body(&model, &messages, &request.options, request.options.tools_enabled, true);
        let response = self.send(&body).await?;

        let provider = self.spec.id;
        let (sink, stream) = ReplyStream::channel(provider);

        tokio::spawn(async move {
            let mut events = Box::pin(sse::data_events(provider, response));
            let mut state = DeltaState::default();

            while let Some(event) = events.next().await {
                let data = match event {
                    Ok(data) => data,
                    Err(e) => return sink.fail(e).await,
                };
                let chunk: ChatCompletionChunk = match serde_json::from_str(&data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!(provider, error = %e, "unparseable stream chunk");
                        return sink.fail(ProviderError::malformed(provider, e)).await;
                    }
                };
                if let Some(text) = state.apply(chunk) {
                    if !sink.send_text(text).await {
                        debug!(provider, "stream consumer went away");
                        return;
                    }
                }
            }

            sink.finish(state.finish(model));
        });

        Ok(stream)
    }

    async fn classify(&self, instruction: &str, message: &str) -> Result<Classification, ProviderError> {
        let messages = vec![Message::system(instruction), Message::user(message)];
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            tools: None,
            tool_choice: None,
            max_tokens: Some(200),
            temperature: Some(0.0),
            response_format: Some(ResponseFormat::json_object()),
            stream: false,
            stream_options: None,
        };
        let response = self.complete(&body).await?;
        let content = response.content.unwrap_or_default();
        let value = serde_json::from_str(content.trim())
            .map_err(|e| ProviderError::malformed(self.spec.id, format!("classifier output: {e}")))?;
        Ok(Classification {
            value,
            usage: response.usage,
        })
    }
}

// ─────────────────────────────────────────────
// Streaming deltas
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates text, tool-call fragments and the usage trailer.
#[derive(Default)]
struct DeltaState {
    text: String,
    /// `(index, id, name, arguments)`
    calls: Vec<(usize, String, String, String)>,
    usage: TokenUsage,
}

impl DeltaState {
    /// Fold one chunk in; returns text to forward, if any.
    fn apply(&mut self, chunk: ChatCompletionChunk) -> Option<String> {
        if let Some(usage) = chunk.usage.as_ref() {
            self.usage = TokenUsage::from(usage);
        }
        let choice = chunk.choices.into_iter().next()?;

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let pos = match self.calls.iter().position(|(i, ..)| *i == tc.index) {
                Some(pos) => pos,
                None => {
                    self.calls.push((tc.index, String::new(), String::new(), String::new()));
                    self.calls.len() - 1
                }
            };
            let entry = &mut self.calls[pos];
            if let Some(id) = tc.id {
                entry.1 = id;
            }
            if let Some(f) = tc.function {
                entry.2.push_str(f.name.as_deref().unwrap_or_default());
                entry.3.push_str(f.arguments.as_deref().unwrap_or_default());
            }
        }

        let text = choice.delta.content.filter(|c| !c.is_empty())?;
        self.text.push_str(&text);
        Some(text)
    }

    fn finish(self, model: String) -> StreamCompletion {
        let tool_calls = self
            .calls
            .into_iter()
            .filter(|(_, _, name, _)| !name.is_empty())
            .map(|(index, id, name, args)| {
                let id = if id.is_empty() { format!("call_{index}") } else { id };
                ToolCall::new(id, name, args)
            })
            .collect();
        StreamCompletion {
            text: self.text,
            usage: self.usage,
            tool_calls,
            model,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
