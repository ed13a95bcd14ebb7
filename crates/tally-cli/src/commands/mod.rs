//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, open_store, load_config)
//! - `ingest` - Upload, Silver, Gold, ingest and status retry
//! - `reports` - Files, rejected rows and summary tables

pub mod core;
pub mod ingest;
pub mod reports;

// Re-export command functions for main.rs
pub use core::*;
pub use ingest::*;
pub use reports::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
