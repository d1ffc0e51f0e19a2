//! Shape normalization for tool output handed to models.

use mercabot_core::catalog::{BusinessProfile, Price, Product};
use mercabot_core::utils::truncate_string;
use serde_json::{json, Value};

const DESCRIPTION_CHARS: usize = 300;

/// Resolve an image or page path against the store's site URL.
pub fn absolute_url(raw: &str, site: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("{}/{}", site.trim_end_matches('/'), raw.trim_start_matches('/'))
    }
}

/// `{regular, sale}` with `sale` defaulting to `regular`.
pub fn price_json(price: &Price) -> Value {
    json!({
        "regular": price.regular,
        "sale": price.sale.unwrap_or(price.regular),
    })
}

pub fn product_url(product: &Product, site: &str) -> String {
    format!("{}/products/{}", site.trim_end_matches('/'), product.slug)
}

/// Full product record as shown to a model.
pub fn product_json(product: &Product, business: &BusinessProfile, domain: &str) -> Value {
    let site = business.site_url(domain);
    json!({
        "id": product.id,
        "slug": product.slug,
        "title": product.title,
        "description": truncate_string(&product.description, DESCRIPTION_CHARS),
        "category": product.category,
        "price": price_json(&product.price),
        "currency": business.currency,
        "image": product.image.as_deref().map(|i| absolute_url(i, &site)),
        "url": product_url(product, &site),
        "available": product.available,
        "stock": product.stock,
    })
}

/// Compact record used in search listings.
pub fn product_summary(product: &Product, business: &BusinessProfile, domain: &str) -> Value {
    let site = business.site_url(domain);
    json!({
        "id": product.id,
        "slug": product.slug,
        "title": product.title,
        "price": price_json(&product.price),
        "image": product.image.as_deref().map(|i| absolute_url(i, &site)),
        "url": product_url(product, &site),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_url_variants() {
        let site = "https://shop.example";
        assert_eq!(absolute_url("/img/a.jpg", site), "https://shop.example/img/a.jpg");
        assert_eq!(absolute_url("img/a.jpg", "https://shop.example/"), "https://shop.example/img/a.jpg");
        assert_eq!(absolute_url("//cdn.example/a.jpg", site), "https://cdn.example/a.jpg");
        assert_eq!(absolute_url("http://cdn.example/a.jpg", site), "http://cdn.example/a.jpg");
    }

    #[test]
    fn test_sale_defaults_to_regular() {
        let p = price_json(&Price {
            regular: 49.9,
            sale: None,
        });
        assert_eq!(p, json!({ "regular": 49.9, "sale": 49.9 }));
    }

    #[test]
    fn test_product_json_uses_business_base_url() {
        let mut business = BusinessProfile::minimal("shop.example");
        business.base_url = Some("https://tienda.example/".into());
        let product = Product {
            id: "65a1b2c3d4e5f6a7b8c9d0e1".into(),
            slug: "runner".into(),
            title: "Runner".into(),
            description: "x".repeat(400),
            category: "Calzado".into(),
            price: Price {
                regular: 80.0,
                sale: Some(60.0),
            },
            image: Some("/img/runner.jpg".into()),
            available: true,
            stock: Some(3),
        };
        let v = product_json(&product, &business, "shop.example");
        assert_eq!(v["image"], "https://tienda.example/img/runner.jpg");
        assert_eq!(v["url"], "https://tienda.example/products/runner");
        assert_eq!(v["price"]["sale"], 60.0);
        assert!(v["description"].as_str().unwrap().chars().count() <= 303);
    }
}
