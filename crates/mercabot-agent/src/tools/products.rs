//! Catalog tools: search, details, price, add-to-cart.

use std::sync::Arc;

use async_trait::async_trait;
use mercabot_core::catalog::{BusinessProfile, Product};
use mercabot_core::error::ToolError;
use mercabot_core::reply::{ActionKind, ReplyAction, ToolResult};
use serde_json::{json, Value};
use tracing::debug;

use super::base::{optional_quantity, optional_string, StoreTool, ToolContext};
use super::names;
use super::normalize::{absolute_url, price_json, product_json, product_summary, product_url};

/// Max search results.
const DEFAULT_MAX_RESULTS: usize = 10;

/// Accept the id under the names models tend to use.
fn product_ref(args: &Value) -> Option<String> {
    ["product_id", "productId", "id", "slug"]
        .iter()
        .find_map(|k| optional_string(args, k))
}

fn identifier_schema(extra: Value) -> Value {
    let mut properties = json!({
        "product_id": {
            "type": "string",
            "description": "Product id (24 hex characters) or slug"
        },
        "query": {
            "type": "string",
            "description": "Product name to look up when no id is known"
        }
    });
    if let (Some(props), Value::Object(more)) = (properties.as_object_mut(), extra) {
        props.extend(more);
    }
    json!({ "type": "object", "properties": properties })
}

// ─────────────────────────────────────────────
// SearchProductsTool
// ─────────────────────────────────────────────

pub struct SearchProductsTool {
    ctx: Arc<ToolContext>,
}

impl SearchProductsTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StoreTool for SearchProductsTool {
    fn name(&self) -> &str {
        names::SEARCH_PRODUCTS
    }

    fn description(&self) -> &str {
        "Search the store catalog by keywords. Returns matching products with id, title, price and link. Use it for any question about what the store sells."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords, e.g. \"zapatillas running\""
                },
                "limit": {
                    "type": "integer",
                    "description": "Max results (1-10, default 10)",
                    "minimum": 1,
                    "maximum": 10
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let query = optional_string(args, "query").unwrap_or_default();
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, DEFAULT_MAX_RESULTS))
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let hits = if query.is_empty() {
            Vec::new()
        } else {
            self.ctx.search(domain, &query, limit).await?
        };
        let business = self.ctx.profile(domain).await?;
        debug!(domain, query = %query, hits = hits.len(), "catalog search");

        let products: Vec<Value> = hits
            .iter()
            .map(|p| product_summary(p, &business, domain))
            .collect();
        Ok(ToolResult::found(
            names::SEARCH_PRODUCTS,
            json!({
                "query": query,
                "count": products.len(),
                "currency": business.currency,
                "products": products,
            }),
        ))
    }
}

// ─────────────────────────────────────────────
// GetProductDetailsTool
// ─────────────────────────────────────────────

pub struct GetProductDetailsTool {
    ctx: Arc<ToolContext>,
}

impl GetProductDetailsTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StoreTool for GetProductDetailsTool {
    fn name(&self) -> &str {
        names::GET_PRODUCT_DETAILS
    }

    fn description(&self) -> &str {
        "Get the full details of one product by its id or slug."
    }

    fn parameters(&self) -> Value {
        identifier_schema(json!({}))
    }

    async fn execute(&self, args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let Some(ident) = product_ref(args).or_else(|| optional_string(args, "query")) else {
            return Ok(ToolResult::empty(names::GET_PRODUCT_DETAILS));
        };
        match self.ctx.lookup(domain, &ident).await? {
            Some(product) => {
                let business = self.ctx.profile(domain).await?;
                Ok(ToolResult::found(
                    names::GET_PRODUCT_DETAILS,
                    product_json(&product, &business, domain),
                ))
            }
            None => Ok(ToolResult::empty(names::GET_PRODUCT_DETAILS)),
        }
    }
}

// ─────────────────────────────────────────────
// GetProductPriceTool
// ─────────────────────────────────────────────

pub struct GetProductPriceTool {
    ctx: Arc<ToolContext>,
}

impl GetProductPriceTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl StoreTool for GetProductPriceTool {
    fn name(&self) -> &str {
        names::GET_PRODUCT_PRICE
    }

    fn description(&self) -> &str {
        "Get the current price of a product, by id/slug or by name."
    }

    fn parameters(&self) -> Value {
        identifier_schema(json!({}))
    }

    async fn execute(&self, args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let id = product_ref(args);
        let query = optional_string(args, "query");
        let Some(product) = self.ctx.resolve(domain, id.as_deref(), query.as_deref()).await? else {
            return Ok(ToolResult::empty(names::GET_PRODUCT_PRICE));
        };
        let business = self.ctx.profile(domain).await?;
        Ok(ToolResult::found(
            names::GET_PRODUCT_PRICE,
            json!({
                "id": product.id,
                "title": product.title,
                "price": price_json(&product.price),
                "on_sale": product.price.sale.is_some_and(|s| s < product.price.regular),
                "currency": business.currency,
            }),
        ))
    }
}

// ─────────────────────────────────────────────
// AddToCartTool
// ─────────────────────────────────────────────

pub struct AddToCartTool {
    ctx: Arc<ToolContext>,
}

impl AddToCartTool {
    pub fn new(ctx: Arc<ToolContext>) -> Self {
        Self { ctx }
    }
}

/// The reply action that puts `product` in the cart.
pub fn cart_action(product: &Product, quantity: u32, business: &BusinessProfile, domain: &str) -> ReplyAction {
    let site = business.site_url(domain);
    ReplyAction {
        kind: ActionKind::AddToCart,
        product_id: Some(product.id.clone()),
        quantity: Some(quantity),
        url: Some(product_url(product, &site)),
        price_sale: Some(product.price.effective()),
        title: Some(product.title.clone()),
        price_regular: Some(product.price.regular),
        image: product.image.as_deref().map(|i| absolute_url(i, &site)),
        slug: Some(product.slug.clone()),
    }
}

#[async_trait]
impl StoreTool for AddToCartTool {
    fn name(&self) -> &str {
        names::ADD_TO_CART
    }

    fn description(&self) -> &str {
        "Prepare adding a product to the customer's cart. Only call it when the customer explicitly asks to add or buy something."
    }

    fn parameters(&self) -> Value {
        identifier_schema(json!({
            "quantity": {
                "type": "integer",
                "description": "Units to add (1-100, default 1)",
                "minimum": 1,
                "maximum": 100
            }
        }))
    }

    async fn execute(&self, args: &Value, domain: &str) -> Result<ToolResult, ToolError> {
        let id = product_ref(args);
        let query = optional_string(args, "query");
        let quantity = optional_quantity(args, "quantity").unwrap_or(1);

        let Some(product) = self.ctx.resolve(domain, id.as_deref(), query.as_deref()).await? else {
            debug!(domain, "add_to_cart: product not resolved");
            return Ok(ToolResult::empty(names::ADD_TO_CART));
        };
        let business = self.ctx.profile(domain).await?;
        let action = cart_action(&product, quantity, &business, domain);
        Ok(ToolResult::found(
            names::ADD_TO_CART,
            json!({
                "product": product_json(&product, &business, domain),
                "quantity": quantity,
                "action": action,
            }),
        ))
    }
}
