//! Configuration system — schema, loading, and env var overrides.
//!
//! # Usage
//! ```no_run
//! use mercabot_core::config;
//!
//! let cfg = config::load_config(None);
//! println!("History window: {}", cfg.conversation.history_window);
//! ```

pub mod loader;
pub mod schema;

pub use loader::{get_config_path, load_config, save_config};
pub use schema::Config;
