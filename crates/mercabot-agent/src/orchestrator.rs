//! Conversation orchestrator — one chat turn from request to persisted record.
//!
//! A turn moves through `Preparing → Interpreting → Generating → (ToolLoop)*
//! → Finalizing → Persisted`:
//!
//! - **Preparing**: load or create the active conversation, attach the full
//!   system prompt on the first turn, slice the history window.
//! - **Interpreting**: classify the message; a confident, actionable intent
//!   runs its tool up front and the result is folded into a dynamic prompt
//!   for this turn only.
//! - **Generating**: the router (or a forced model) picks the first provider;
//!   the configured fallback order supplies the rest. The non-streamed tool
//!   loop runs inside the adapter; the streamed one runs here, once.
//! - **Finalizing / Persisted**: counters, ledger entry, save.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use mercabot_core::cache::Clock;
use mercabot_core::config::schema::{Config, GenerationConfig};
use mercabot_core::conversation::{
    Conversation, ConversationMessage, IntentSnapshot, MessageMetadata, ProductContext, PromptKind, Role,
};
use mercabot_core::ledger::{LedgerEntry, PricingTable, UsageStats};
use mercabot_core::reply::{ActionKind, NormalizedReply, ReplyAction, ToolResult};
use mercabot_core::store::{ConversationStore, LedgerStore};
use mercabot_core::types::TokenUsage;
use mercabot_core::utils::content_hash;
use mercabot_providers::traits::execute_all;
use mercabot_providers::{resolve_forced, GenerateOptions, GenerateRequest, ProviderAdapter, ProviderError, ReplyStream};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::ChatError;
use crate::intent::{Intent, IntentInterpreter, InterpretedIntent};
use crate::language::{detect_language, Language};
use crate::prompt::PromptMemoryManager;
use crate::router::{ModelRouter, RouteReason};
use crate::stream_filter::EnvelopeFilter;
use crate::tools::{names, ToolExecutor};

/// Longest accepted user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const FRAME_BUFFER: usize = 64;

/// Provider id recorded for turns no provider could answer.
pub const FALLBACK_PROVIDER: &str = "fallback";

const FALLBACK_MESSAGE_ES: &str =
    "Lo siento, en este momento no puedo responder. Por favor, inténtalo de nuevo en unos minutos.";
const FALLBACK_MESSAGE_EN: &str = "Sorry, I can't answer right now. Please try again in a few minutes.";

// ─────────────────────────────────────────────
// Request / reply types
// ─────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub message: String,
    pub domain: String,
    pub user_id: String,
    /// Provider id or model id to use instead of the router's pick.
    pub force_model: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, domain: impl Into<String>, user_id: impl Into<String>) -> Self {
        ChatRequest {
            message: message.into(),
            domain: domain.into(),
            user_id: user_id.into(),
            force_model: None,
        }
    }

    pub fn with_force_model(mut self, force: impl Into<String>) -> Self {
        self.force_model = Some(force.into());
        self
    }

    fn validate(&self) -> Result<(), ChatError> {
        if self.message.trim().is_empty() {
            return Err(ChatError::Validation("message is required".into()));
        }
        if self.message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
        if self.domain.trim().is_empty() {
            return Err(ChatError::Validation("domain is required".into()));
        }
        if self.user_id.trim().is_empty() {
            return Err(ChatError::Validation("userId is required".into()));
        }
        Ok(())
    }
}

/// The finalized turn as returned to the caller.
#[derive(Clone, Debug)]
pub struct ChatReply {
    pub conversation_id: String,
    pub message: String,
    pub audio_description: String,
    pub action: ReplyAction,
    pub provider: String,
    pub model: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
    pub intent: IntentSnapshot,
    pub prompt_kind: PromptKind,
}

/// One streamed text fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFrame {
    pub text: String,
}

pub type FrameReceiver = mpsc::Receiver<Result<StreamFrame, ChatError>>;

// ─────────────────────────────────────────────
// Turn state
// ─────────────────────────────────────────────

/// Provider to try, with the model override that applies to it.
struct Candidate {
    adapter: Arc<dyn ProviderAdapter>,
    model: Option<String>,
}

/// Everything decided before the first provider call.
struct PreparedTurn {
    conversation: Conversation,
    request: GenerateRequest,
    prompt_kind: PromptKind,
    intent: InterpretedIntent,
    eager: Option<ToolResult>,
    language: Language,
    candidates: Vec<Candidate>,
}

impl PreparedTurn {
    fn request_for(&self, candidate: &Candidate) -> GenerateRequest {
        let mut request = self.request.clone();
        request.options.model = candidate.model.clone();
        request
    }
}

/// Forwards filtered text to the caller and remembers whether any was sent.
struct FrameSink {
    tx: mpsc::Sender<Result<StreamFrame, ChatError>>,
    sent: bool,
    shown: String,
}

impl FrameSink {
    async fn text(&mut self, text: String) {
        if text.is_empty() {
            return;
        }
        self.sent = true;
        self.shown.push_str(&text);
        // A closed receiver only stops delivery; the turn is still persisted.
        if self.tx.send(Ok(StreamFrame { text })).await.is_err() {
            debug!("stream receiver dropped");
        }
    }

    async fn error(&mut self, err: ChatError) {
        if self.sent {
            warn!(error = %err, "stream already started, closing without error frame");
            return;
        }
        let _ = self.tx.send(Err(err)).await;
    }
}

// ─────────────────────────────────────────────
// ConversationOrchestrator
// ─────────────────────────────────────────────

pub struct ConversationOrchestrator {
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    router: ModelRouter,
    intents: IntentInterpreter,
    prompts: PromptMemoryManager,
    tools: Arc<ToolExecutor>,
    conversations: Arc<dyn ConversationStore>,
    ledger: Arc<dyn LedgerStore>,
    pricing: PricingTable,
    fallback_order: Vec<String>,
    history_window: usize,
    retention: Duration,
    generation: GenerationConfig,
    clock: Arc<dyn Clock>,
}

impl ConversationOrchestrator {
    pub fn new(
        config: &Config,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
        tools: Arc<ToolExecutor>,
        conversations: Arc<dyn ConversationStore>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ctx = tools.context();
        let prompts = PromptMemoryManager::new(
            ctx.catalog.clone(),
            ctx.business.clone(),
            config.prompts.clone(),
            clock.clone(),
        );
        let intents = IntentInterpreter::new(
            config.intent.clone(),
            &adapters,
            config.catalog.stop_words.clone(),
            clock.clone(),
        );

        let mut providers: Vec<&str> = adapters.keys().map(String::as_str).collect();
        providers.sort_unstable();
        info!(
            providers = ?providers,
            history_window = config.conversation.history_window,
            intent = config.intent.enabled,
            "conversation orchestrator initialized"
        );

        Self {
            router: ModelRouter::new(&config.routing),
            fallback_order: config.routing.fallback_order.clone(),
            history_window: config.conversation.history_window,
            retention: Duration::days(config.conversation.closed_retention_days),
            generation: config.generation.clone(),
            pricing: config.pricing.clone(),
            adapters,
            intents,
            prompts,
            tools,
            conversations,
            ledger,
            clock,
        }
    }

    pub fn prompts(&self) -> &PromptMemoryManager {
        &self.prompts
    }

    /// Run one non-streamed turn.
    pub async fn send_message(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        request.validate()?;
        let started = Instant::now();
        let mut turn = self.prepare(&request).await?;

        let mut answered = None;
        for candidate in &turn.candidates {
            let provider = candidate.adapter.id();
            match candidate.adapter.generate_response(&turn.request_for(candidate)).await {
                Ok(reply) if reply.message.trim().is_empty() => {
                    warn!(provider, "provider returned an empty reply, trying next")
                }
                Ok(reply) => {
                    answered = Some(reply);
                    break;
                }
                Err(e) => warn!(provider, error = %e, "provider failed, trying next"),
            }
        }

        let reply = match answered {
            Some(reply) => reply,
            None => fallback_reply(turn.language),
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        self.persist(&mut turn, &request, reply, latency_ms).await
    }

    /// Start a streamed turn. Validation errors are returned here, before any
    /// frame; everything else arrives on the channel.
    pub fn send_message_stream(self: &Arc<Self>, request: ChatRequest) -> Result<FrameReceiver, ChatError> {
        request.validate()?;
        let (tx, rx) = mpsc::channel(FRAME_BUFFER);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_stream(request, tx).await;
        });
        Ok(rx)
    }

    /// Visible messages of the active conversation, or none.
    pub async fn get_history(&self, user_id: &str, domain: &str) -> Result<Vec<ConversationMessage>, ChatError> {
        Ok(self
            .conversations
            .find_active(user_id, domain)
            .await?
            .map(|c| c.visible_messages())
            .unwrap_or_default())
    }

    pub async fn active_conversation_id(&self, user_id: &str, domain: &str) -> Result<Option<String>, ChatError> {
        Ok(self.conversations.find_active(user_id, domain).await?.map(|c| c.id))
    }

    /// `active → closed`. Returns `false` when it was already closed.
    pub async fn close_conversation(&self, conversation_id: &str) -> Result<bool, ChatError> {
        let Some(mut conversation) = self.conversations.get(conversation_id).await? else {
            return Err(ChatError::NotFound(format!("conversation {conversation_id}")));
        };
        let changed = conversation
            .close(self.clock.now())
            .map_err(mercabot_core::error::StoreError::from)?;
        if changed {
            self.conversations.save(&conversation).await?;
            info!(conversation = conversation_id, "conversation closed");
        }
        Ok(changed)
    }

    /// Ledger totals for `domain` within the optional date range.
    pub async fn get_stats(
        &self,
        domain: &str,
        start: Option<chrono::DateTime<chrono::Utc>>,
        end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<UsageStats, ChatError> {
        let entries = self.ledger.query(domain, start, end).await?;
        Ok(UsageStats::from_entries(domain, &self.pricing.currency, &entries))
    }

    /// Archive closed conversations past the retention window.
    pub async fn archive_expired(&self) -> Result<usize, ChatError> {
        let archived = self
            .conversations
            .archive_expired(self.clock.now(), self.retention)
            .await?;
        if archived > 0 {
            info!(archived, "archived expired conversations");
        }
        Ok(archived)
    }

    // ─────────────────────────────────────────
    // Preparing + Interpreting
    // ─────────────────────────────────────────

    async fn prepare(&self, request: &ChatRequest) -> Result<PreparedTurn, ChatError> {
        let domain = request.domain.as_str();
        let mut conversation = match self.conversations.find_active(&request.user_id, domain).await? {
            Some(conversation) => conversation,
            None => {
                let conversation = Conversation::started_at(&request.user_id, domain, self.clock.now());
                debug!(conversation = %conversation.id, domain, "new conversation");
                conversation
            }
        };

        let (base_prompt, mut prompt_kind) = if conversation.system_prompt().is_none() {
            let full = self.prompts.build_system_prompt(domain).await;
            conversation.attach_system_prompt(full.clone());
            (full, PromptKind::Full)
        } else {
            (self.prompts.build_short_system_prompt(domain).await, PromptKind::Short)
        };
        let history = conversation.history_window(self.history_window);

        let language = detect_language(&request.message);
        let mut intent = self.intents.interpret(&request.message, language, domain).await;
        if intent.intent.targets_product()
            && intent.params.product_id.is_none()
            && intent.params.query.is_none()
        {
            if let Some(context) = &conversation.metadata.last_product_context {
                debug!(product = %context.product_id, "using last shown product as reference");
                intent.params.product_id = Some(context.product_id.clone());
            }
        }

        let eager = self.pre_execute(&intent, domain).await;
        let system_prompt = match &eager {
            Some(result) => {
                prompt_kind = PromptKind::Dynamic;
                self.prompts.build_dynamic_prompt(&base_prompt, &intent, result)
            }
            None => base_prompt,
        };

        let (candidates, extended_reasoning) = self.candidates(request, &history);
        let options = GenerateOptions {
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
            extended_reasoning,
            tools_enabled: true,
            model: None,
        };
        let generate = GenerateRequest::new(&request.message, history, domain, system_prompt).with_options(options);

        Ok(PreparedTurn {
            conversation,
            request: generate,
            prompt_kind,
            intent,
            eager,
            language,
            candidates,
        })
    }

    /// Run the intent's tool ahead of generation when it is confident and
    /// has something to look up. A store failure only drops the grounding.
    async fn pre_execute(&self, intent: &InterpretedIntent, domain: &str) -> Option<ToolResult> {
        if !intent.should_execute(self.intents.execution_threshold()) {
            return None;
        }
        let tool = intent.intent.tool_name()?;
        let ready = match intent.intent {
            Intent::SearchProducts => intent.params.query.is_some(),
            i if i.targets_product() => intent.params.product_id.is_some() || intent.params.query.is_some(),
            _ => true,
        };
        if !ready {
            debug!(intent = %intent.intent, "intent has no reference, skipping pre-execution");
            return None;
        }

        match self.tools.execute_tool(tool, &intent.tool_args(), domain).await {
            Ok(result) => {
                debug!(tool, found = result.data.is_some(), "pre-executed intent tool");
                Some(result)
            }
            Err(e) => {
                warn!(tool, domain, error = %e, "intent tool failed, continuing without grounding");
                None
            }
        }
    }

    /// Ordered providers for this turn and whether to ask for extended
    /// reasoning.
    fn candidates(&self, request: &ChatRequest, history: &[ConversationMessage]) -> (Vec<Candidate>, bool) {
        let decision = self.router.decide(&request.message, history);
        let mut first = decision.provider.clone();
        let mut reason = decision.reason;
        let mut forced_model = None;

        if let Some(force) = request.force_model.as_deref() {
            match resolve_forced(force) {
                Some(forced) if self.adapters.contains_key(forced.provider) => {
                    first = forced.provider.to_string();
                    forced_model = forced.model;
                    reason = RouteReason::Forced;
                }
                _ => warn!(force, "forced model unknown or not configured, using router"),
            }
        }
        info!(provider = %first, reason = ?reason, "provider selected");

        let mut out: Vec<Candidate> = Vec::new();
        let order = std::iter::once(first.as_str()).chain(self.fallback_order.iter().map(String::as_str));
        for id in order {
            if out.iter().any(|c| c.adapter.id() == id) {
                continue;
            }
            match self.adapters.get(id) {
                Some(adapter) => out.push(Candidate {
                    adapter: adapter.clone(),
                    model: if id == first { forced_model.clone() } else { None },
                }),
                None => debug!(provider = id, "provider not configured, skipping"),
            }
        }
        (out, decision.extended_reasoning)
    }

    // ─────────────────────────────────────────
    // Streaming
    // ─────────────────────────────────────────

    async fn run_stream(&self, request: ChatRequest, tx: mpsc::Sender<Result<StreamFrame, ChatError>>) {
        let started = Instant::now();
        let mut sink = FrameSink {
            tx,
            sent: false,
            shown: String::new(),
        };

        let mut turn = match self.prepare(&request).await {
            Ok(turn) => turn,
            Err(e) => {
                error!(domain = %request.domain, error = %e, "could not prepare streamed turn");
                sink.error(e).await;
                return;
            }
        };

        let mut answered = None;
        for candidate in &turn.candidates {
            let provider = candidate.adapter.id();
            match self.stream_from(candidate, &turn, &mut sink).await {
                Ok(reply) => {
                    answered = Some(reply);
                    break;
                }
                Err(e) if sink.sent => {
                    warn!(provider, error = %e, "stream failed after text was sent");
                    answered = Some(NormalizedReply {
                        message: sink.shown.clone(),
                        audio_description: sink.shown.clone(),
                        provider: provider.to_string(),
                        model: candidate.model.clone().unwrap_or_else(|| candidate.adapter.model().to_string()),
                        ..Default::default()
                    });
                    break;
                }
                Err(e) => warn!(provider, error = %e, "provider stream failed, trying next"),
            }
        }

        let reply = match answered {
            Some(reply) => reply,
            None => {
                let reply = fallback_reply(turn.language);
                sink.text(reply.message.clone()).await;
                reply
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        if let Err(e) = self.persist(&mut turn, &request, reply, latency_ms).await {
            error!(
                conversation = %turn.conversation.id,
                error = %e,
                "failed to persist streamed turn"
            );
        }
    }

    /// Stream one provider's answer to `sink`. Tool calls at the end of the
    /// first pass are all executed and generation resumes once.
    async fn stream_from(
        &self,
        candidate: &Candidate,
        turn: &PreparedTurn,
        sink: &mut FrameSink,
    ) -> Result<NormalizedReply, ProviderError> {
        let adapter = candidate.adapter.as_ref();
        let request = turn.request_for(candidate);

        let first = adapter.generate_response_stream(&request).await?;
        let (mut completion, tail) = forward(first, sink).await?;
        sink.text(tail).await;

        let mut usage = completion.usage;
        let mut function_results = Vec::new();
        if !completion.tool_calls.is_empty() {
            debug!(
                provider = adapter.id(),
                calls = completion.tool_calls.len(),
                "stream requested tools, resuming once"
            );
            let exchanges = execute_all(adapter, &completion.tool_calls, &request.domain).await?;
            function_results = exchanges.iter().map(|e| e.result.clone()).collect();
            let resumed = request.resumed_with(exchanges);

            let second = adapter.generate_response_stream(&resumed).await?;
            let (done, tail) = forward(second, sink).await?;
            sink.text(tail).await;
            usage.accumulate(&done.usage);
            completion = done;
        }

        let mut reply = adapter.parse_response(&completion.text);
        if reply.message.trim().is_empty() {
            return Err(ProviderError::malformed(adapter.id(), "empty reply"));
        }
        reply.usage = usage;
        reply.function_results = function_results;
        if !completion.model.is_empty() {
            reply.model = completion.model;
        }
        Ok(reply)
    }

    // ─────────────────────────────────────────
    // Finalizing + Persisted
    // ─────────────────────────────────────────

    async fn persist(
        &self,
        turn: &mut PreparedTurn,
        request: &ChatRequest,
        mut reply: NormalizedReply,
        latency_ms: u64,
    ) -> Result<ChatReply, ChatError> {
        let answered = reply.provider != FALLBACK_PROVIDER;
        if answered && matches!(reply.action.kind, ActionKind::None | ActionKind::Unknown) {
            if let Some(action) = grounded_cart_action(turn.eager.iter().chain(reply.function_results.iter())) {
                debug!(product = ?action.product_id, "using cart action from tool result");
                reply.action = action;
            }
        }
        if reply.audio_description.trim().is_empty() {
            reply.audio_description = reply.message.clone();
        }

        let now = self.clock.now();
        let conversation = &mut turn.conversation;
        let shown = turn
            .eager
            .iter()
            .chain(reply.function_results.iter())
            .filter_map(|r| product_context(r, now))
            .last();
        if let Some(context) = shown {
            conversation.metadata.last_product_context = Some(context);
        }

        let cost = self.pricing.cost(&reply.provider, &reply.model, &reply.usage);
        let intent = turn.intent.snapshot();
        let system_prompt = &turn.request.system_prompt;
        let metadata = MessageMetadata {
            provider: Some(reply.provider.clone()),
            model: Some(reply.model.clone()).filter(|m| !m.is_empty()),
            tokens: reply.usage,
            cost: Some(cost.clone()),
            prompt_sent: (turn.prompt_kind == PromptKind::Dynamic).then(|| system_prompt.clone()),
            prompt_type: Some(turn.prompt_kind),
            system_prompt_hash: Some(content_hash(system_prompt)),
            intent: Some(intent.clone()),
            latency_ms: Some(latency_ms),
            action: Some(reply.action.clone()),
        };

        conversation.metadata.record_turn(&reply.provider, &reply.usage, latency_ms);
        conversation.push_turn(
            ConversationMessage::new(Role::User, &request.message).with_timestamp(now),
            ConversationMessage::new(Role::Assistant, &reply.message)
                .with_timestamp(now)
                .with_metadata(metadata),
        );
        self.conversations.save(conversation).await?;

        if answered {
            let entry = LedgerEntry::new(
                &conversation.id,
                &conversation.user_id,
                &conversation.domain,
                &reply.provider,
                &reply.model,
                reply.usage,
                cost,
                now,
            );
            if let Err(e) = self.ledger.append(&entry).await {
                error!(conversation = %conversation.id, error = %e, "failed to write ledger entry");
            }
        }

        info!(
            conversation = %conversation.id,
            domain = %conversation.domain,
            provider = %reply.provider,
            model = %reply.model,
            intent = %intent.intent,
            confidence = intent.confidence,
            tokens = reply.usage.total,
            latency_ms,
            "turn persisted"
        );

        Ok(ChatReply {
            conversation_id: conversation.id.clone(),
            message: reply.message,
            audio_description: reply.audio_description,
            action: reply.action,
            provider: reply.provider,
            model: reply.model,
            usage: reply.usage,
            latency_ms,
            intent,
            prompt_kind: turn.prompt_kind,
        })
    }
}

/// Forward a stream's text through a fresh envelope filter. Returns the
/// completion and any text the filter still owes.
async fn forward(
    mut stream: ReplyStream,
    sink: &mut FrameSink,
) -> Result<(mercabot_providers::StreamCompletion, String), ProviderError> {
    let mut filter = EnvelopeFilter::new();
    while let Some(chunk) = stream.next_chunk().await {
        let text = filter.push(&chunk?);
        sink.text(text).await;
    }
    let completion = stream.completion().await?;
    Ok((completion, filter.finish()))
}

fn fallback_reply(language: Language) -> NormalizedReply {
    let message = match language {
        Language::Es => FALLBACK_MESSAGE_ES,
        Language::En => FALLBACK_MESSAGE_EN,
    };
    warn!("no provider answered, using fallback reply");
    NormalizedReply {
        message: message.to_string(),
        audio_description: message.to_string(),
        action: ReplyAction::none(),
        provider: FALLBACK_PROVIDER.to_string(),
        ..Default::default()
    }
}

/// Last cart action produced by an `add_to_cart` result.
fn grounded_cart_action<'a>(results: impl Iterator<Item = &'a ToolResult>) -> Option<ReplyAction> {
    results
        .filter(|r| r.tool == names::ADD_TO_CART)
        .filter_map(|r| r.data.as_ref()?.get("action").cloned())
        .filter_map(|v| serde_json::from_value::<ReplyAction>(v).ok())
        .filter(|a| a.kind == ActionKind::AddToCart)
        .last()
}

/// The single product a tool result showed, if any.
fn product_context(result: &ToolResult, now: chrono::DateTime<chrono::Utc>) -> Option<ProductContext> {
    let data = result.data.as_ref()?;
    let product = match result.tool.as_str() {
        names::GET_PRODUCT_DETAILS | names::GET_PRODUCT_PRICE => data,
        names::ADD_TO_CART => data.get("product")?,
        names::SEARCH_PRODUCTS => match data.get("products")?.as_array()?.as_slice() {
            [only] => only,
            _ => return None,
        },
        _ => return None,
    };
    let text = |key: &str| product.get(key).and_then(Value::as_str).map(str::to_string);
    let price = |key: &str| product.get("price").and_then(|p| p.get(key)).and_then(Value::as_f64);
    Some(ProductContext {
        product_id: text("id")?,
        title: text("title").unwrap_or_default(),
        slug: text("slug"),
        price_regular: price("regular"),
        price_sale: price("sale"),
        image: text("image"),
        url: text("url"),
        shown_at: now,
    })
}
