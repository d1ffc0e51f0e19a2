//! Mercabot core — shared types, configuration, caching and persistence for
//! the store chat assistant.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod error;
pub mod ledger;
pub mod reply;
pub mod store;
pub mod types;
pub mod utils;
