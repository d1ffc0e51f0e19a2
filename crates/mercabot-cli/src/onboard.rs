//! `mercabot init` — write default configuration and a sample catalog.
//!
//! - Creates `~/.mercabot/config.json` with defaults
//! - Creates the catalog file with one demo store when it is missing
//! - Creates the conversation data and history directories

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use mercabot_core::config::{get_config_path, load_config, save_config};
use mercabot_core::utils::{expand_home, get_data_path};

/// Domain of the demo store written to the sample catalog.
pub const SAMPLE_DOMAIN: &str = "demo.mercabot.local";

/// Run the init command.
pub fn run() -> Result<()> {
    println!();
    println!("{}", "🛒 Mercabot — Setup".cyan().bold());
    println!();

    // 1. Config
    let config_path = get_config_path();
    if config_path.exists() {
        println!("  {} config already exists at {}", "✓".green(), config_path.display());
    } else {
        let config = load_config(None);
        save_config(&config, Some(&config_path))?;
        println!("  {} created config at {}", "✓".green(), config_path.display());
    }
    let config = load_config(Some(&config_path));

    // 2. Catalog
    let catalog_path = expand_home(&config.catalog.path);
    if write_if_missing(&catalog_path, SAMPLE_CATALOG)? {
        println!("  {} created sample catalog at {}", "✓".green(), catalog_path.display());
    } else {
        println!("  {} catalog already exists at {}", "✓".green(), catalog_path.display());
    }

    // 3. Data + history directories
    let data_dir = expand_home(&config.conversation.data_dir);
    std::fs::create_dir_all(data_dir.join("conversations"))
        .with_context(|| format!("failed to create {}", data_dir.display()))?;
    println!("  {} data dir at {}", "✓".green(), data_dir.display());
    std::fs::create_dir_all(get_data_path().join("history"))?;

    println!();
    if config.providers.configured_ids().is_empty() {
        println!(
            "  {} add at least one API key under {} in {}",
            "!".yellow().bold(),
            "providers".bold(),
            config_path.display()
        );
        println!("    (or set MERCABOT_PROVIDERS__OPENAI__API_KEY)");
    }
    println!(
        "{}",
        format!("  Setup complete! Run `mercabot chat -d {SAMPLE_DOMAIN}` to start chatting.").green()
    );
    println!();

    Ok(())
}

/// Write `content` to `path` unless it exists. Returns whether it wrote.
fn write_if_missing(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

// ─────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────

const SAMPLE_CATALOG: &str = r#"{
  "demo.mercabot.local": {
    "business": {
      "name": "Tienda Demo",
      "description": "Calzado y accesorios urbanos.",
      "currency": "USD",
      "locale": "es",
      "phone": "+1 555 0100",
      "email": "hola@demo.mercabot.local",
      "hours": "Lunes a viernes de 9 a 18",
      "shipping": {
        "zones": ["Nacional"],
        "cost": 5.0,
        "freeShippingFrom": 100.0,
        "estimatedDays": "3-5"
      }
    },
    "products": [
      {
        "id": "65a1b2c3d4e5f6a7b8c9d0e1",
        "slug": "zapatilla-runner",
        "title": "Zapatilla Runner",
        "description": "Zapatilla liviana para running y entrenamiento.",
        "category": "Calzado",
        "price": { "regular": 89.9, "sale": 69.9 },
        "image": "/img/runner.jpg",
        "stock": 12
      },
      {
        "id": "65a1b2c3d4e5f6a7b8c9d0e2",
        "slug": "zapatilla-urbana",
        "title": "Zapatilla Urbana",
        "description": "Zapatilla de lona para uso diario.",
        "category": "Calzado",
        "price": { "regular": 59.0 },
        "image": "/img/urbana.jpg",
        "stock": 30
      },
      {
        "id": "65a1b2c3d4e5f6a7b8c9d0e3",
        "slug": "gorra-trucker",
        "title": "Gorra Trucker",
        "description": "Gorra con malla y visera curva.",
        "category": "Accesorios",
        "price": { "regular": 19.0 },
        "image": "/img/trucker.jpg"
      }
    ]
  }
}
"#;

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mercabot_agent::tools::{CatalogStore, JsonCatalog};

    #[test]
    fn write_if_missing_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("catalog.json");
        assert!(write_if_missing(&path, "first").unwrap());
        assert!(!write_if_missing(&path, "second").unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first");
    }

    #[tokio::test]
    async fn sample_catalog_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        write_if_missing(&path, SAMPLE_CATALOG).unwrap();

        let catalog = JsonCatalog::load(&path).await.unwrap();
        let products = catalog.available_products(SAMPLE_DOMAIN).await.unwrap();
        assert_eq!(products.len(), 3);
    }
}
