//! Helpers shared by the `relq` binary: tracing setup and backup list rendering.

use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI. Logs go to stderr so stdout only carries items.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "relq=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// One entry of a backup list as shown to operators.
#[derive(Debug, Serialize)]
pub struct BackupEntry {
    /// Position from the head of the backup list.
    pub index: usize,
    pub size_bytes: usize,
    /// Lossy UTF-8 rendering of the value.
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct BackupListing {
    pub db: i64,
    pub backup_list: String,
    pub items: Vec<BackupEntry>,
}

impl BackupListing {
    pub fn new(db: i64, backup_list: String, raw_items: Vec<Vec<u8>>) -> Self {
        let items = raw_items
            .into_iter()
            .enumerate()
            .map(|(index, raw)| BackupEntry {
                index,
                size_bytes: raw.len(),
                value: String::from_utf8_lossy(&raw).into_owned(),
            })
            .collect();
        Self {
            db,
            backup_list,
            items,
        }
    }
}

pub fn print_backup_table(listing: &BackupListing) {
    println!("\n=== Backup List ===\n");
    println!("List: {} (db={})", listing.backup_list, listing.db);

    if listing.items.is_empty() {
        println!("\nNo items in backup list.");
        println!();
        return;
    }

    println!("\n{:<6} {:<10} Value", "Index", "Bytes");
    println!("{}", "-".repeat(80));
    for item in &listing.items {
        println!(
            "{:<6} {:<10} {}",
            item.index,
            item.size_bytes,
            truncate_string(&item.value, 62)
        );
    }
    println!();
}

/// Truncate a string to max_len characters, appending "..." if truncated.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
