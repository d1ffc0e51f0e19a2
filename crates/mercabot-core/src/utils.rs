//! Utility helpers — path resolution, hashing, string manipulation.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Get the Mercabot data directory (e.g. `~/.mercabot/`).
pub fn get_data_path() -> PathBuf {
    let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".mercabot")
}

/// Expand `~` to the home directory in a path string.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None if path == "~" => dirs_next::home_dir().unwrap_or_else(|| PathBuf::from(".")),
        None => PathBuf::from(path),
    }
}

/// Hex SHA-256 of `text`. Used to fingerprint the system prompt in effect.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

/// First `n` characters of `s` (no ellipsis).
pub fn char_prefix(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Sanitize a string for use as a filename.
pub fn safe_filename(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
