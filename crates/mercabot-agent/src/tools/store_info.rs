//! Business and shipping tools.

use std::sync::Arc;

use async_trait::async_trait;
use mercabot_core::error::ToolError;
use mercabot_core::reply::ToolResult;
use serde_json::{json, Value};

use super::base::{StoreTool, ToolContext};
use super::names;

fn no_params() -> Value {
    json!({ "type": "object", "properties": {} })
}

pub struct GetBusinessInfoTool {
    ctx: Arc<ToolContext>,
}

impl GetBusinessInfoTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StoreTool for GetBusinessInfoTool {
    fn name(&self) -> &str {
        names::GET_BUSINESS_INFO
    }

    fn description(&self) -> &str {
        "Get the store's contact details, address, opening hours and website."
    }

    fn parameters(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let profile = self.ctx.profile(domain).await?;
        Ok(ToolResult::found(
            names::GET_BUSINESS_INFO,
            json!({
                "name": profile.name,
                "description": profile.description,
                "currency": profile.currency,
                "locale": profile.locale,
                "website": profile.site_url(domain),
                "phone": profile.phone,
                "email": profile.email,
                "address": profile.address,
                "hours": profile.hours,
            }),
        ))
    }
}

pub struct GetShippingInfoTool {
    ctx: Arc<ToolContext>,
}

impl GetShippingInfoTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StoreTool for GetShippingInfoTool {
    fn name(&self) -> &str {
        names::GET_SHIPPING_INFO
    }

    fn description(&self) -> &str {
        "Get shipping zones, costs, free-shipping threshold and delivery times."
    }

    fn parameters(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let profile = self.ctx.profile(domain).await?;
        let Some(shipping) = profile.shipping else {
            return Ok(ToolResult::empty(names::GET_SHIPPING_INFO));
        };
        Ok(ToolResult::found(
            names::GET_SHIPPING_INFO,
            json!({
                "zones": shipping.zones,
                "cost": shipping.cost,
                "free_shipping_from": shipping.free_shipping_from,
                "estimated_days": shipping.estimated_days,
                "notes": shipping.notes,
                "currency": profile.currency,
            }),
        ))
    }
}
