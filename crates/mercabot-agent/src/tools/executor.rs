//! ToolExecutor — the single implementation of the store capability set,
//! shared by every provider adapter and by intent pre-execution.

use std::sync::Arc;

use async_trait::async_trait;
use mercabot_core::error::ToolError;
use mercabot_core::reply::ToolResult;
use mercabot_core::types::ToolDefinition;
use mercabot_providers::ToolInvoker;
use serde_json::Value;
use tracing::{debug, info};

use super::base::ToolContext;
use super::business::{BusinessSources, HttpBusinessSource, StoreBusinessSource};
use super::catalog_store::CatalogStore;
use super::products::{AddToCartTool, GetProductDetailsTool, GetProductPriceTool, SearchProductsTool};
use super::registry::ToolRegistry;
use super::store_info::{GetBusinessInfoTool, GetShippingInfoTool};

pub struct ToolExecutor {
    registry: ToolRegistry,
    ctx: Arc<ToolContext>,
}

impl ToolExecutor {
    /// Register the six store tools over `ctx`.
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SearchProductsTool::new(ctx.clone())));
        registry.register(Arc::new(GetProductDetailsTool::new(ctx.clone())));
        registry.register(Arc::new(GetProductPriceTool::new(ctx.clone())));
        registry.register(Arc::new(GetBusinessInfoTool::new(ctx.clone())));
        registry.register(Arc::new(GetShippingInfoTool::new(ctx.clone())));
        registry.register(Arc::new(AddToCartTool::new(ctx.clone())));
        info!(tools = registry.len(), "tool executor initialized");
        Self { registry, ctx }
    }

    /// Wire the catalog store as primary business source, with the optional
    /// HTTP config service behind it.
    pub fn from_sources(
        catalog: Arc<dyn CatalogStore>,
        business_config_url: Option<&str>,
        stop_words: Vec<String>,
    ) -> Self {
        let mut business = BusinessSources::new(Arc::new(StoreBusinessSource::new(catalog.clone())));
        if let Some(url) = business_config_url {
            business = business.with_fallback(Arc::new(HttpBusinessSource::new(url)));
        }
        Self::new(Arc::new(ToolContext::new(catalog, Arc::new(business), stop_words)))
    }

    pub fn context(&self) -> &Arc<ToolContext> {
        &self.ctx
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    /// Run `name` for `domain`. Unknown names and "not found" are `Ok` with
    /// empty data; only source failures are errors.
    pub async fn execute_tool(&self, name: &str, params: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        debug!(tool = name, domain, params = %params, "executing tool");
        self.registry.execute(name, params, domain).await
    }
}

#[async_trait]
impl ToolInvoker for ToolExecutor {
    fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.get_definitions()
    }

    async fn invoke(&self, name: &str, args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        self.execute_tool(name, args, domain).await
    }
}
