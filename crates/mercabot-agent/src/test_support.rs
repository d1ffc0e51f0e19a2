//! Shared fixtures for agent tests: a small demo store and a scripted
//! provider.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mercabot_core::catalog::{BusinessProfile, Price, Product, ShippingPolicy};
use mercabot_core::error::ToolError;
use mercabot_core::reply::{NormalizedReply, ToolResult};
use mercabot_core::types::{TokenUsage, ToolCall, ToolDefinition};
use mercabot_providers::reply_parser;
use mercabot_providers::traits::execute_all;
use mercabot_providers::{
    Classification, GenerateRequest, ProviderAdapter, ProviderError, ReplyStream, StreamCompletion, ToolInvoker,
};
use serde_json::Value;

use crate::tools::{DomainCatalog, InMemoryCatalog, ToolExecutor};

pub const DEMO_DOMAIN: &str = "shop.example";
pub const RUNNER_ID: &str = "65a1b2c3d4e5f6a7b8c9d0e1";
pub const URBANA_ID: &str = "65a1b2c3d4e5f6a7b8c9d0e2";
pub const GORRA_ID: &str = "65a1b2c3d4e5f6a7b8c9d0e3";

fn product(id: &str, slug: &str, title: &str, category: &str, description: &str, regular: f64, sale: Option<f64>) -> Product {
    Product {
        id: id.to_string(),
        slug: slug.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category: category.to_string(),
        price: Price { regular, sale },
        image: Some(format!("/img/{}.jpg", slug.trim_start_matches("zapatilla-").trim_start_matches("gorra-"))),
        available: true,
        stock: Some(10),
    }
}

pub fn demo_business() -> BusinessProfile {
    BusinessProfile {
        name: "Demo Shop".to_string(),
        description: "Tienda de ropa y calzado urbano.".to_string(),
        currency: "USD".to_string(),
        locale: "es".to_string(),
        base_url: None,
        phone: Some("+1 555 0100".to_string()),
        email: Some("hola@shop.example".to_string()),
        address: None,
        hours: Some("Lun a Vie 9 a 18".to_string()),
        shipping: Some(ShippingPolicy {
            zones: vec!["Nacional".to_string()],
            cost: Some(5.0),
            free_shipping_from: Some(100.0),
            estimated_days: Some("3-5".to_string()),
            notes: None,
        }),
    }
}

/// Three products in two categories, plus a business record.
pub fn demo_catalog() -> Arc<InMemoryCatalog> {
    let products = vec![
        product(
            RUNNER_ID,
            "zapatilla-runner",
            "Zapatilla Runner",
            "Calzado",
            "Zapatilla liviana para running y entrenamiento",
            89.9,
            Some(69.9),
        ),
        product(
            URBANA_ID,
            "zapatilla-urbana",
            "Zapatilla Urbana",
            "Calzado",
            "Zapatilla de lona para uso diario",
            59.0,
            None,
        ),
        product(
            GORRA_ID,
            "gorra-trucker",
            "Gorra Trucker",
            "Accesorios",
            "Gorra con malla y visera curva",
            19.0,
            None,
        ),
    ];
    Arc::new(InMemoryCatalog::new().with_domain(
        DEMO_DOMAIN,
        DomainCatalog {
            business: Some(demo_business()),
            products,
        },
    ))
}

pub fn demo_executor() -> (ToolExecutor, Arc<InMemoryCatalog>) {
    let catalog = demo_catalog();
    (ToolExecutor::from_sources(catalog.clone(), None, Vec::new()), catalog)
}

pub fn empty_executor() -> ToolExecutor {
    ToolExecutor::from_sources(Arc::new(InMemoryCatalog::new()), None, Vec::new())
}

// ─────────────────────────────────────────────
// MockProvider
// ─────────────────────────────────────────────

/// A tool invoker with no tools.
pub struct NoTools;

#[async_trait]
impl ToolInvoker for NoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, _args: &Value, _domain: &str) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::empty(name))
    }
}

/// What one scripted non-streamed turn does.
pub enum Scripted {
    Reply(Result<NormalizedReply, ProviderError>),
    /// Execute the calls through the adapter's tools, then answer `text`.
    ToolRound { calls: Vec<ToolCall>, text: String },
}

/// One scripted streamed turn.
#[derive(Default)]
pub struct StreamScript {
    pub chunks: Vec<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
    /// Sent after the chunks instead of a completion.
    pub error: Option<ProviderError>,
}

impl StreamScript {
    pub fn text(chunks: &[&str], usage: TokenUsage) -> Self {
        StreamScript {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            usage,
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        StreamScript {
            tool_calls: calls,
            usage: TokenUsage::new(10, 2, 12),
            ..Default::default()
        }
    }
}

/// Provider whose answers are queued by the test. An empty queue is an
/// upstream error.
pub struct MockProvider {
    id: String,
    model: String,
    reasoning: bool,
    tools: Arc<dyn ToolInvoker>,
    classify_queue: Mutex<VecDeque<Result<Value, ProviderError>>>,
    generate_queue: Mutex<VecDeque<Scripted>>,
    stream_queue: Mutex<VecDeque<Result<StreamScript, ProviderError>>>,
    classify_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    stream_calls: AtomicUsize,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl MockProvider {
    pub fn new(id: &str) -> Self {
        MockProvider {
            id: id.to_string(),
            model: format!("{id}-mock"),
            reasoning: id == "deepseek",
            tools: Arc::new(NoTools),
            classify_queue: Mutex::new(VecDeque::new()),
            generate_queue: Mutex::new(VecDeque::new()),
            stream_queue: Mutex::new(VecDeque::new()),
            classify_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolInvoker>) -> Self {
        self.tools = tools;
        self
    }

    pub fn push_classify(&self, result: Result<Value, ProviderError>) {
        self.classify_queue.lock().unwrap().push_back(result);
    }

    pub fn push_reply(&self, result: Result<NormalizedReply, ProviderError>) {
        self.generate_queue.lock().unwrap().push_back(Scripted::Reply(result));
    }

    /// Queue a reply parsed from raw model text.
    pub fn push_text(&self, raw: &str, usage: TokenUsage) {
        let mut reply = reply_parser::parse_reply(raw);
        reply.usage = usage;
        self.push_reply(Ok(reply));
    }

    pub fn push_tool_round(&self, calls: Vec<ToolCall>, text: &str) {
        self.generate_queue.lock().unwrap().push_back(Scripted::ToolRound {
            calls,
            text: text.to_string(),
        });
    }

    pub fn push_stream(&self, script: Result<StreamScript, ProviderError>) {
        self.stream_queue.lock().unwrap().push_back(script);
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Every request seen by generate and stream, in order.
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn exhausted(&self) -> ProviderError {
        ProviderError::Upstream {
            provider: self.id.clone(),
            status: 500,
            body: "no scripted response".to_string(),
        }
    }

    fn finish_reply(&self, mut reply: NormalizedReply, request: &GenerateRequest) -> NormalizedReply {
        reply.provider = self.id.clone();
        reply.model = request.options.model.clone().unwrap_or_else(|| self.model.clone());
        reply
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_extended_reasoning(&self) -> bool {
        self.reasoning
    }

    fn tools(&self) -> &Arc<dyn ToolInvoker> {
        &self.tools
    }

    async fn generate_response(&self, request: &GenerateRequest) -> Result<NormalizedReply, ProviderError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.generate_queue.lock().unwrap().pop_front();
        match next {
            None => Err(self.exhausted()),
            Some(Scripted::Reply(result)) => result.map(|reply| self.finish_reply(reply, request)),
            Some(Scripted::ToolRound { calls, text }) => {
                let exchanges = execute_all(self, &calls, &request.domain).await?;
                let mut reply = reply_parser::parse_reply(&text);
                reply.usage = TokenUsage::new(20, 8, 28);
                reply.function_results = exchanges.into_iter().map(|e| e.result).collect();
                Ok(self.finish_reply(reply, request))
            }
        }
    }

    async fn generate_response_stream(&self, request: &GenerateRequest) -> Result<ReplyStream, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let next = self.stream_queue.lock().unwrap().pop_front();
        let script = next.unwrap_or_else(|| Err(self.exhausted()))?;

        let model = request.options.model.clone().unwrap_or_else(|| self.model.clone());
        let (sink, stream) = ReplyStream::channel(&self.id);
        tokio::spawn(async move {
            for chunk in &script.chunks {
                if !sink.send_text(chunk.clone()).await {
                    return;
                }
            }
            if let Some(err) = script.error {
                sink.fail(err).await;
                return;
            }
            sink.finish(StreamCompletion {
                text: script.chunks.concat(),
                usage: script.usage,
                tool_calls: script.tool_calls,
                model,
            });
        });
        Ok(stream)
    }

    async fn classify(&self, _instruction: &str, _message: &str) -> Result<Classification, ProviderError> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.classify_queue.lock().unwrap().pop_front();
        match next {
            Some(result) => result.map(|value| Classification {
                value,
                usage: TokenUsage::new(40, 10, 50),
            }),
            None => Err(self.exhausted()),
        }
    }
}
