//! Read-only catalog access keyed by domain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use mercabot_core::catalog::{BusinessProfile, Product};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Catalog queries. Only `available` products are ever returned.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn available_products(&self, domain: &str) -> Result<Vec<Product>>;

    async fn find_by_id(&self, domain: &str, id: &str) -> Result<Option<Product>>;

    async fn find_by_slug(&self, domain: &str, slug: &str) -> Result<Option<Product>>;

    /// The store's own business record for `domain`, if it has one.
    async fn business(&self, domain: &str) -> Result<Option<BusinessProfile>>;
}

/// Everything the store holds for one domain.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DomainCatalog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business: Option<BusinessProfile>,
    #[serde(default)]
    pub products: Vec<Product>,
}

// ─────────────────────────────────────────────
// InMemoryCatalog
// ─────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryCatalog {
    domains: RwLock<HashMap<String, DomainCatalog>>,
    queries: AtomicUsize,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domain(self, domain: &str, catalog: DomainCatalog) -> Self {
        self.insert(domain, catalog);
        self
    }

    pub fn insert(&self, domain: &str, catalog: DomainCatalog) {
        self.domains
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(domain.to_string(), catalog);
    }

    /// Number of store queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn read<T>(&self, domain: &str, f: impl FnOnce(&DomainCatalog) -> T) -> Option<T> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let domains = self.domains.read().unwrap_or_else(|e| e.into_inner());
        domains.get(domain).map(f)
    }

    fn find(&self, domain: &str, pred: impl Fn(&Product) -> bool) -> Option<Product> {
        self.read(domain, |c| {
            c.products
                .iter()
                .find(|p| p.available && pred(p))
                .cloned()
        })
        .flatten()
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn available_products(&self, domain: &str) -> Result<Vec<Product>> {
        Ok(self
            .read(domain, |c| c.products.iter().filter(|p| p.available).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_by_id(&self, domain: &str, id: &str) -> Result<Option<Product>> {
        Ok(self.find(domain, |p| p.id.eq_ignore_ascii_case(id)))
    }

    async fn find_by_slug(&self, domain: &str, slug: &str) -> Result<Option<Product>> {
        Ok(self.find(domain, |p| p.slug == slug))
    }

    async fn business(&self, domain: &str) -> Result<Option<BusinessProfile>> {
        Ok(self.read(domain, |c| c.business.clone()).flatten())
    }
}

// ─────────────────────────────────────────────
// JsonCatalog
// ─────────────────────────────────────────────

/// Catalog loaded from a JSON file: `{ "<domain>": { "business": {...}, "products": [...] } }`.
pub struct JsonCatalog {
    path: PathBuf,
    inner: InMemoryCatalog,
}

impl JsonCatalog {
    /// Load `path`. A missing file yields an empty catalog.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let catalog = Self {
            inner: InMemoryCatalog::new(),
            path,
        };
        catalog.reload().await?;
        Ok(catalog)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, replacing every domain.
    pub async fn reload(&self) -> Result<usize> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "catalog file not found, starting empty");
            return Ok(0);
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading catalog {}", self.path.display()))?;
        let parsed: HashMap<String, DomainCatalog> = serde_json::from_str(&content)
            .with_context(|| format!("parsing catalog {}", self.path.display()))?;

        let count = parsed.len();
        {
            let mut domains = self.inner.domains.write().unwrap_or_else(|e| e.into_inner());
            domains.clear();
            for (domain, catalog) in parsed {
                debug!(domain = %domain, products = catalog.products.len(), "loaded catalog domain");
                domains.insert(domain.to_lowercase(), catalog);
            }
        }
        info!(path = %self.path.display(), domains = count, "catalog loaded");
        Ok(count)
    }
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    async fn available_products(&self, domain: &str) -> Result<Vec<Product>> {
        self.inner.available_products(&domain.to_lowercase()).await
    }

    async fn find_by_id(&self, domain: &str, id: &str) -> Result<Option<Product>> {
        self.inner.find_by_id(&domain.to_lowercase(), id).await
    }

    async fn find_by_slug(&self, domain: &str, slug: &str) -> Result<Option<Product>> {
        self.inner.find_by_slug(&domain.to_lowercase(), slug).await
    }

    async fn business(&self, domain: &str) -> Result<Option<BusinessProfile>> {
        self.inner.business(&domain.to_lowercase()).await
    }
}
