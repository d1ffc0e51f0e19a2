//! Streaming handle returned by adapters.
//!
//! Text chunks arrive on a channel as the provider produces them. Token
//! usage, the full text and any requested tool calls are delivered on a
//! separate completion that only resolves once the provider's trailer has
//! been read, so usage can never be observed before the stream is done.

use mercabot_core::types::{TokenUsage, ToolCall};
use tokio::sync::{mpsc, oneshot};

use crate::error::ProviderError;

const CHUNK_BUFFER: usize = 64;

/// Summary available after the last chunk.
#[derive(Clone, Debug, Default)]
pub struct StreamCompletion {
    /// Concatenation of every text chunk.
    pub text: String,
    pub usage: TokenUsage,
    /// Calls requested instead of (or after) text.
    pub tool_calls: Vec<ToolCall>,
    pub model: String,
}

/// Consumer side.
pub struct ReplyStream {
    chunks: mpsc::Receiver<Result<String, ProviderError>>,
    completion: oneshot::Receiver<Result<StreamCompletion, ProviderError>>,
    provider: String,
}

/// Producer side, held by the adapter's background task.
pub struct StreamSink {
    chunks: mpsc::Sender<Result<String, ProviderError>>,
    completion: oneshot::Sender<Result<StreamCompletion, ProviderError>>,
}

impl ReplyStream {
    pub fn channel(provider: &str) -> (StreamSink, ReplyStream) {
        let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_BUFFER);
        let (done_tx, done_rx) = oneshot::channel();
        (
            StreamSink {
                chunks: chunk_tx,
                completion: done_tx,
            },
            ReplyStream {
                chunks: chunk_rx,
                completion: done_rx,
                provider: provider.to_string(),
            },
        )
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Next text chunk, `None` once the provider is done.
    pub async fn next_chunk(&mut self) -> Option<Result<String, ProviderError>> {
        self.chunks.recv().await
    }

    /// Drain any remaining chunks, then wait for the summary.
    pub async fn completion(mut self) -> Result<StreamCompletion, ProviderError> {
        while let Some(chunk) = self.chunks.recv().await {
            chunk?;
        }
        match self.completion.await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Stream {
                provider: self.provider,
                detail: "stream ended without a summary".to_string(),
            }),
        }
    }
}

impl StreamSink {
    /// Forward a text chunk. Returns `false` when the consumer has gone away.
    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.chunks.send(Ok(text.into())).await.is_ok()
    }

    /// End the stream with an error.
    pub async fn fail(self, err: ProviderError) {
        let _ = self.chunks.send(Err(err)).await;
    }

    /// End the stream successfully and publish the summary.
    pub fn finish(self, completion: StreamCompletion) {
        drop(self.chunks);
        let _ = self.completion.send(Ok(completion));
    }
}
