//! Catalog and business records as read from the store.

use serde::{Deserialize, Serialize};

/// Price as stored. `sale` is optional; normalized output always carries one.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Price {
    pub regular: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale: Option<f64>,
}

impl Price {
    /// The price the customer pays.
    pub fn effective(&self) -> f64 {
        self.sale.unwrap_or(self.regular)
    }
}

/// One catalog item.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: Price,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
}

fn default_available() -> bool {
    true
}

/// Shipping terms for a store.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ShippingPolicy {
    pub zones: Vec<String>,
    pub cost: Option<f64>,
    pub free_shipping_from: Option<f64>,
    pub estimated_days: Option<String>,
    pub notes: Option<String>,
}

/// Business identity and settings for one store domain.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfile {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingPolicy>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_locale() -> String {
    "es".to_string()
}

impl BusinessProfile {
    /// The last-resort profile when no source knows the domain.
    pub fn minimal(domain: &str) -> Self {
        BusinessProfile {
            name: domain.to_string(),
            description: String::new(),
            currency: default_currency(),
            locale: default_locale(),
            base_url: None,
            phone: None,
            email: None,
            address: None,
            hours: None,
            shipping: None,
        }
    }

    /// Base URL used to absolutize relative image and product paths.
    pub fn site_url(&self, domain: &str) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{domain}"))
            .trim_end_matches('/')
            .to_string()
    }
}

/// Compact catalog digest used in the full system prompt.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogDigest {
    pub count: usize,
    pub categories: Vec<String>,
    pub examples: Vec<DigestItem>,
}

/// One example item in the digest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DigestItem {
    pub title: String,
    pub category: String,
    pub price: f64,
}

impl CatalogDigest {
    /// Build the digest from the available products: count, sorted distinct
    /// categories, and the first `top_n` items by title.
    pub fn from_products(products: &[Product], top_n: usize) -> Self {
        let mut categories: Vec<String> = products
            .iter()
            .map(|p| p.category.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        categories.sort();
        categories.dedup();

        let mut sorted: Vec<&Product> = products.iter().collect();
        sorted.sort_by(|a, b| a.title.cmp(&b.title));

        CatalogDigest {
            count: products.len(),
            categories,
            examples: sorted
                .into_iter()
                .take(top_n)
                .map(|p| DigestItem {
                    title: p.title.clone(),
                    category: p.category.clone(),
                    price: p.price.effective(),
                })
                .collect(),
        }
    }
}
