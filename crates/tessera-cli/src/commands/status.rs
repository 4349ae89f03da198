//! Status command implementation

use anyhow::{Context, Result};
use tessera::prelude::*;

pub async fn execute(db: &TesseraDb) -> Result<()> {
    let meta = db.meta().await.context("Failed to read store metadata")?;

    println!("\nStore Status");
    println!("{}", "=".repeat(60));
    println!("Backend: {}", meta.kind);
    println!("Schema Version: {}", meta.schema_version);
    if let Some(created_at) = &meta.created_at {
        println!("Created At: {}", created_at);
    }
    println!("Versionstamp: {}", meta.versionstamp);
    println!("Entries: {}", meta.entry_count);

    Ok(())
}
