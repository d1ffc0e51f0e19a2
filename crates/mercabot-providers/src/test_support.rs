//! Shared fixtures for adapter tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use mercabot_core::error::ToolError;
use mercabot_core::reply::ToolResult;
use mercabot_core::types::ToolDefinition;
use serde_json::json;

use crate::traits::ToolInvoker;

/// Records every invocation and answers with a canned payload.
#[derive(Default)]
pub struct RecordingTools {
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
    pub count: AtomicUsize,
}

impl RecordingTools {
    pub fn invoked(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    pub fn names(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(n, _)| n.clone()).collect()
    }
}

#[async_trait]
impl ToolInvoker for RecordingTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "search_products",
            "Search the catalog",
            json!({"type": "object", "properties": {"query": {"type": "string"}}, "required": ["query"]}),
        )]
    }

    async fn invoke(
        &self,
        name: &str,
        args: &serde_json::Value,
        _domain: &str,
    ) -> Result<ToolResult, ToolError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((name.to_string(), args.clone()));
        Ok(ToolResult::found(name, json!({ "count": 0, "products": [] })))
    }
}
