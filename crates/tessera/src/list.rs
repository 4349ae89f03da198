//! Lazy, cursor-resumable range listing

use std::collections::VecDeque;
use tessera_core::{
    observe, Consistency, Cursor, Entry, ListSelector, Result, ScanRange, ScanRequest,
    ScannedEntry, TesseraError,
};

use crate::db::{is_reserved, TesseraDb};

/// Options for [`TesseraDb::list`]
#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Maximum number of entries the iterator yields
    pub limit: Option<usize>,
    /// Resume strictly after the entry this cursor was taken at
    pub cursor: Option<Cursor>,
    pub reverse: bool,
    pub consistency: Consistency,
    /// Entries fetched from the backend per round trip
    pub batch_size: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            limit: None,
            cursor: None,
            reverse: false,
            consistency: Consistency::Strong,
            batch_size: 100,
        }
    }
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn with_consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Ordered entries of one selector, fetched in batches on demand.
///
/// ```ignore
/// let mut iter = db.list(ListSelector::prefix(key!["users"]), ListOptions::new().with_limit(10))?;
/// while let Some(entry) = iter.next().await? {
///     println!("{} = {:?}", entry.key, entry.value);
/// }
/// let resume_from = iter.cursor();
/// ```
pub struct ListIterator {
    db: TesseraDb,
    /// What is left to scan
    remaining: ScanRange,
    options: ListOptions,
    buffer: VecDeque<(Vec<u8>, Entry)>,
    yielded: usize,
    exhausted: bool,
    last_yielded: Option<Vec<u8>>,
}

impl ListIterator {
    pub(crate) fn new(db: TesseraDb, selector: ListSelector, options: ListOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(TesseraError::Validation(
                "list batch size must be positive".into(),
            ));
        }

        let range = selector.to_range()?;
        let remaining = match &options.cursor {
            Some(cursor) => {
                cursor.validate_for(&range)?;
                range.resume_after(cursor.as_bytes(), options.reverse)
            }
            None => range,
        };

        Ok(Self {
            db,
            remaining,
            exhausted: options.limit == Some(0),
            options,
            buffer: VecDeque::new(),
            yielded: 0,
            last_yielded: None,
        })
    }

    fn budget(&self) -> Option<usize> {
        self.options.limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    async fn fetch(&mut self) -> Result<()> {
        let want = match self.budget() {
            Some(budget) => budget.min(self.options.batch_size),
            None => self.options.batch_size,
        };
        if want == 0 || self.remaining.is_empty() {
            self.exhausted = true;
            return Ok(());
        }

        let entries = self
            .db
            .scan(ScanRequest {
                range: self.remaining.clone(),
                limit: want,
                reverse: self.options.reverse,
                consistency: self.options.consistency,
            })
            .await?;
        observe::record_list_batch(entries.len());

        if entries.len() < want {
            self.exhausted = true;
        }

        for ScannedEntry { position, entry } in entries {
            self.remaining = self.remaining.resume_after(&position, self.options.reverse);
            if !is_reserved(&entry.key) {
                self.buffer.push_back((position, entry));
            }
        }
        Ok(())
    }

    /// Next entry in key order, or `None` once the selector or limit is exhausted
    pub async fn next(&mut self) -> Result<Option<Entry>> {
        if self.budget() == Some(0) {
            return Ok(None);
        }

        while self.buffer.is_empty() && !self.exhausted {
            self.fetch().await?;
        }

        Ok(self.buffer.pop_front().map(|(encoded, entry)| {
            self.yielded += 1;
            self.last_yielded = Some(encoded);
            entry
        }))
    }

    /// Resume token for the last yielded entry
    ///
    /// Listing again with this cursor and the same selector continues with
    /// the entry right after it.
    pub fn cursor(&self) -> Option<Cursor> {
        self.last_yielded.clone().map(Cursor::from_encoded_key)
    }

    /// Drain the iterator
    pub async fn collect(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::{key, Value};

    async fn seeded() -> TesseraDb {
        let db = TesseraDb::open_in_memory().await.unwrap();
        for i in 0..7 {
            db.set(key!["items", i], i).await.unwrap();
        }
        db.set(key!["other", 1], 1).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_small_batches_cover_everything() {
        let db = seeded().await;
        let entries = db
            .list(
                ListSelector::prefix(key!["items"]),
                ListOptions::new().with_batch_size(2),
            )
            .unwrap()
            .collect()
            .await
            .unwrap();

        let values: Vec<_> = entries.iter().map(|e| e.value.clone()).collect();
        assert_eq!(values, (0..7).map(Value::from).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_reverse_with_cursor() {
        let db = seeded().await;
        let selector = ListSelector::prefix(key!["items"]);

        let mut first = db
            .list(selector.clone(), ListOptions::new().reverse().with_limit(3))
            .unwrap();
        let mut keys = Vec::new();
        while let Some(entry) = first.next().await.unwrap() {
            keys.push(entry.key);
        }
        assert_eq!(keys, vec![key!["items", 6], key!["items", 5], key!["items", 4]]);

        let rest = db
            .list(
                selector,
                ListOptions::new()
                    .reverse()
                    .with_cursor(first.cursor().unwrap()),
            )
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(rest.len(), 4);
        assert_eq!(rest[0].key, key!["items", 3]);
        assert_eq!(rest[3].key, key!["items", 0]);
    }

    #[tokio::test]
    async fn test_cursor_from_other_selector_rejected() {
        let db = seeded().await;
        let mut iter = db
            .list(ListSelector::prefix(key!["other"]), ListOptions::new())
            .unwrap();
        iter.next().await.unwrap();
        let cursor = iter.cursor().unwrap();

        let err = db
            .list(
                ListSelector::prefix(key!["items"]),
                ListOptions::new().with_cursor(cursor),
            )
            .err()
            .unwrap();
        assert!(matches!(err, TesseraError::Validation(_)));
    }

    #[tokio::test]
    async fn test_queue_namespace_hidden() {
        let db = seeded().await;
        db.enqueue("job", crate::EnqueueOptions::new().with_delay(std::time::Duration::from_secs(60)))
            .await
            .unwrap();

        let everything = db
            .list(ListSelector::prefix(key![]), ListOptions::new().with_batch_size(1))
            .unwrap()
            .collect()
            .await
            .unwrap();
        assert_eq!(everything.len(), 8);
    }

    #[tokio::test]
    async fn test_range_selector() {
        let db = seeded().await;
        let entries = db
            .list(
                ListSelector::range(key!["items", 2], key!["items", 5]),
                ListOptions::new(),
            )
            .unwrap()
            .collect()
            .await
            .unwrap();
        let keys: Vec<_> = entries.into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec![key!["items", 2], key!["items", 3], key!["items", 4]]);
    }
}
