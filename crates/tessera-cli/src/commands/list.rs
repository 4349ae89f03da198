//! List command implementation

use anyhow::{Context, Result};
use tessera::prelude::*;

use super::{format_key, format_value, parse_key};

pub async fn execute(
    db: &TesseraDb,
    prefix: Option<&str>,
    limit: usize,
    reverse: bool,
    cursor: Option<&str>,
) -> Result<()> {
    let prefix = match prefix {
        Some(raw) => parse_key(raw)?,
        None => Key::default(),
    };

    let mut options = ListOptions::new().with_limit(limit);
    if reverse {
        options = options.reverse();
    }
    if let Some(raw) = cursor {
        options = options.with_cursor(raw.parse::<Cursor>().context("Invalid cursor")?);
    }

    let mut iter = db
        .list(ListSelector::prefix(prefix), options)
        .context("Failed to start listing")?;

    let mut count = 0;
    while let Some(entry) = iter.next().await.context("Failed to list entries")? {
        println!(
            "{} @ {}\n{}",
            format_key(&entry.key)?,
            entry.versionstamp,
            format_value(&entry.value)?
        );
        count += 1;
    }

    println!("\n{} entr{}", count, if count == 1 { "y" } else { "ies" });
    if count == limit {
        if let Some(cursor) = iter.cursor() {
            println!("Next cursor: {}", cursor);
        }
    }
    Ok(())
}
