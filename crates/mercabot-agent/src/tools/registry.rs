//! Tool registry: stores tools keyed by name and dispatches calls.

use std::collections::HashMap;
use std::sync::Arc;

use mercabot_core::error::ToolError;
use mercabot_core::reply::ToolResult;
use mercabot_core::types::ToolDefinition;
use serde_json::Value;
use tracing::{info, warn};

use super::base::StoreTool;

// ─────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────

/// Owns `Arc<dyn StoreTool>` so tools can be shared across tasks.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn StoreTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Overwrites any previous tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn StoreTool>) {
        info!(tool = tool.name(), "registered tool");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn StoreTool>> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Names of all registered tools, sorted for determinism.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Model-facing definitions for all registered tools, sorted by name.
    pub fn get_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self.tools.values().map(|t| t.to_definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Execute a tool by name.
    ///
    /// An unknown name is logged and answered with an empty result so a
    /// hallucinated tool cannot break the turn.
    pub async fn execute(&self, name: &str, args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "tool not found");
            return Ok(ToolResult::empty(name));
        };

        match tool.execute(args, domain).await {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(tool = name, domain, error = %e, "tool execution failed");
                Err(e)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
