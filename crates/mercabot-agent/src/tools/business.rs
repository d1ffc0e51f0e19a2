//! Business profile sources.
//!
//! Resolution order: the catalog store's own record, then an optional HTTP
//! config service, then `BusinessProfile::minimal`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mercabot_core::catalog::BusinessProfile;
use mercabot_core::error::ToolError;
use reqwest::StatusCode;
use tracing::{debug, warn};

use super::catalog_store::CatalogStore;

#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    /// `Ok(None)` when this source has no record for `domain`.
    async fn business_profile(&self, domain: &str) -> Result<Option<BusinessProfile>, ToolError>;
}

// ─────────────────────────────────────────────
// Primary: the catalog store
// ─────────────────────────────────────────────

pub struct StoreBusinessSource {
    catalog: Arc<dyn CatalogStore>,
}

impl StoreBusinessSource {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl BusinessDirectory for StoreBusinessSource {
    async fn business_profile(&self, domain: &str) -> Result<Option<BusinessProfile>, ToolError> {
        self.catalog
            .business(domain)
            .await
            .map_err(|e| ToolError::Store(e.to_string()))
    }
}

// ─────────────────────────────────────────────
// Secondary: HTTP config service
// ─────────────────────────────────────────────

/// `GET {base_url}/{domain}` returning a profile document; 404 means none.
pub struct HttpBusinessSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBusinessSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BusinessDirectory for HttpBusinessSource {
    async fn business_profile(&self, domain: &str) -> Result<Option<BusinessProfile>, ToolError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), domain);
        debug!(url = %url, "fetching business config");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ToolError::Http(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<BusinessProfile>()
                .await
                .map(Some)
                .map_err(|e| ToolError::Http(format!("invalid business config: {e}"))),
            status => Err(ToolError::Http(format!("HTTP {status} from {url}"))),
        }
    }
}

// ─────────────────────────────────────────────
// Chain
// ─────────────────────────────────────────────

/// Primary store first; the HTTP fallback is best-effort.
pub struct BusinessSources {
    primary: Arc<dyn BusinessDirectory>,
    fallback: Option<Arc<dyn BusinessDirectory>>,
}

impl BusinessSources {
    pub fn new(primary: Arc<dyn BusinessDirectory>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn BusinessDirectory>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[async_trait]
impl BusinessDirectory for BusinessSources {
    async fn business_profile(&self, domain: &str) -> Result<Option<BusinessProfile>, ToolError> {
        if let Some(profile) = self.primary.business_profile(domain).await? {
            return Ok(Some(profile));
        }
        let Some(fallback) = &self.fallback else {
            return Ok(None);
        };
        match fallback.business_profile(domain).await {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(domain, error = %e, "business config fallback failed, using default");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::catalog_store::{DomainCatalog, InMemoryCatalog};
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_with_profile() -> Arc<InMemoryCatalog> {
        let mut profile = BusinessProfile::minimal("shop.example");
        profile.name = "Tienda Demo".into();
        Arc::new(InMemoryCatalog::new().with_domain(
            "shop.example",
            DomainCatalog {
                business: Some(profile),
                products: Vec::new(),
            },
        ))
    }

    #[tokio::test]
    async fn test_primary_wins() {
        let sources = BusinessSources::new(Arc::new(StoreBusinessSource::new(store_with_profile())))
            .with_fallback(Arc::new(HttpBusinessSource::new("http://127.0.0.1:1")));
        let profile = sources.business_profile("shop.example").await.unwrap().unwrap();
        assert_eq!(profile.name, "Tienda Demo");
    }

    #[tokio::test]
    async fn test_http_fallback_used_when_store_has_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/config/other.example"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "name": "Otra Tienda",
                "currency": "MXN",
                "phone": "+52 55 0000 0000"
            })))
            .mount(&server)
            .await;

        let sources = BusinessSources::new(Arc::new(StoreBusinessSource::new(store_with_profile())))
            .with_fallback(Arc::new(HttpBusinessSource::new(format!("{}/config", server.uri()))));
        let profile = sources.business_profile("other.example").await.unwrap().unwrap();
        assert_eq!(profile.name, "Otra Tienda");
        assert_eq!(profile.currency, "MXN");
    }

    #[tokio::test]
    async fn test_http_404_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = HttpBusinessSource::new(server.uri());
        assert!(source.business_profile("nobody.example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_http_failure_degrades_in_chain() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = HttpBusinessSource::new(server.uri());
        assert!(matches!(
            source.business_profile("x.example").await,
            Err(ToolError::Http(_))
        ));

        let sources = BusinessSources::new(Arc::new(StoreBusinessSource::new(store_with_profile())))
            .with_fallback(Arc::new(source));
        assert!(sources.business_profile("x.example").await.unwrap().is_none());
    }
}
