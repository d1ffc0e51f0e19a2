//! Store tools: the fixed capability set a model (or the intent
//! pre-execution step) may call.

pub mod base;
pub mod business;
pub mod catalog_store;
pub mod executor;
pub mod normalize;
pub mod products;
pub mod registry;
pub mod search;
pub mod store_info;

pub use base::{optional_quantity, optional_string, StoreTool, ToolContext};
pub use business::{BusinessDirectory, BusinessSources, HttpBusinessSource, StoreBusinessSource};
pub use catalog_store::{CatalogStore, DomainCatalog, InMemoryCatalog, JsonCatalog};
pub use executor::ToolExecutor;
pub use registry::ToolRegistry;

/// Tool names as presented to models.
pub mod names {
    pub const SEARCH_PRODUCTS: &str = "search_products";
    pub const GET_PRODUCT_DETAILS: &str = "get_product_details";
    pub const GET_PRODUCT_PRICE: &str = "get_product_price";
    pub const GET_BUSINESS_INFO: &str = "get_business_info";
    pub const GET_SHIPPING_INFO: &str = "get_shipping_info";
    pub const ADD_TO_CART: &str = "add_to_cart";
}
