//! Single-entry commands: get, set, delete

use anyhow::{Context, Result};
use std::time::Duration;
use tessera::codec::decode_value_json;
use tessera::prelude::*;

use super::{format_key, format_value, parse_key};

pub async fn get(db: &TesseraDb, raw_key: &str) -> Result<()> {
    let key = parse_key(raw_key)?;
    let entry = db.get(key).await.context("Failed to read entry")?;

    match (entry.value, entry.versionstamp) {
        (Some(value), Some(versionstamp)) => {
            println!("Key: {}", format_key(&entry.key)?);
            println!("Versionstamp: {}", versionstamp);
            println!("{}", format_value(&value)?);
        }
        _ => println!("Not found: {}", format_key(&entry.key)?),
    }
    Ok(())
}

pub async fn set(
    db: &TesseraDb,
    raw_key: &str,
    raw_value: &str,
    expire_in_ms: Option<u64>,
) -> Result<()> {
    let key = parse_key(raw_key)?;
    let value = decode_value_json(raw_value).context("Value must be JSON")?;
    let options = SetOptions {
        expire_in: expire_in_ms.map(Duration::from_millis),
    };

    let versionstamp = db
        .set_with(key, value, options)
        .await
        .context("Failed to write entry")?;
    println!("Versionstamp: {}", versionstamp);
    Ok(())
}

pub async fn delete(db: &TesseraDb, raw_key: &str) -> Result<()> {
    let key = parse_key(raw_key)?;
    db.delete(key.clone()).await.context("Failed to delete entry")?;
    println!("Deleted: {}", format_key(&key)?);
    Ok(())
}
