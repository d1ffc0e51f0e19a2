//! LLM provider layer for Mercabot.
//!
//! # Architecture
//!
//! - [`traits::ProviderAdapter`] — trait every backend implements
//! - [`traits::ToolInvoker`] — seam through which adapters run store tools
//! - [`registry`] — static specs for the supported providers + adapter construction
//! - [`openai_compat::OpenAiCompatAdapter`] — OpenAI and DeepSeek (`/chat/completions`)
//! - [`gemini::GeminiAdapter`] — Gemini (`generateContent`)
//! - [`reply_parser`] — raw model text to the reply contract
//! - [`stream::ReplyStream`] — incremental text plus a trailing usage summary

pub mod error;
pub mod gemini;
pub mod openai_compat;
pub mod registry;
pub mod reply_parser;
pub mod sse;
pub mod stream;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export main types for convenience
pub use error::ProviderError;
pub use gemini::GeminiAdapter;
pub use openai_compat::OpenAiCompatAdapter;
pub use registry::{build_adapters, create_adapter, resolve_forced, ForcedModel, ProviderSpec, PROVIDERS};
pub use stream::{ReplyStream, StreamCompletion, StreamSink};
pub use traits::{
    Classification, GenerateOptions, GenerateRequest, ProviderAdapter, ToolExchange, ToolInvoker,
    MAX_TOOL_ROUNDS,
};
