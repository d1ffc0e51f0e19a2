//! Mercabot Agent — everything between an incoming chat message and the
//! persisted reply.
//!
//! This crate contains:
//! - **router**: keyword routing of a message to a provider
//! - **intent**: local rules plus LLM fallback classification
//! - **tools**: the store tools and the executor that runs them
//! - **prompt**: cached full / short / per-turn system prompts
//! - **orchestrator**: the turn pipeline, streaming, and conversation lifecycle

pub mod error;
pub mod intent;
pub mod language;
pub mod orchestrator;
pub mod prompt;
pub mod router;
pub mod stream_filter;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use error::ChatError;
pub use intent::{Intent, IntentInterpreter, InterpretedIntent};
pub use language::{detect_language, Language};
pub use orchestrator::{ChatReply, ChatRequest, ConversationOrchestrator, FrameReceiver, StreamFrame};
pub use prompt::PromptMemoryManager;
pub use router::{ModelRouter, RouteDecision, RouteReason};
pub use tools::{ToolExecutor, ToolRegistry};
