use mongodb::bson::Document;
use tracing::{debug, warn};

use crate::books::BookDocument;
use crate::store::{BookStore, StoreResult};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Running totals across all flushed batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteTally {
    pub batches: u64,
    pub attempted: u64,
    pub inserted: u64,
}

impl WriteTally {
    pub fn failed(&self) -> u64 {
        self.attempted.saturating_sub(self.inserted)
    }
}

/// Buffers documents and writes them with unordered bulk inserts.
///
/// Per-document rejections are tallied and the run continues; any other
/// store error is returned to the caller.
pub struct BatchWriter<'a, S: BookStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    pending: Vec<Document>,
    tally: WriteTally,
}

impl<'a, S: BookStore + ?Sized> BatchWriter<'a, S> {
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        BatchWriter {
            store,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            tally: WriteTally::default(),
        }
    }

    pub fn push<D: BookDocument>(&mut self, book: &D) -> StoreResult<()> {
        self.push_document(book.to_document())
    }

    pub fn push_document(&mut self, doc: Document) -> StoreResult<()> {
        self.pending.push(doc);
        if self.pending.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write whatever is buffered.
    pub fn flush(&mut self) -> StoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.pending);
        let outcome = self.store.insert_many_unordered(&batch)?;

        self.tally.batches += 1;
        self.tally.attempted += outcome.attempted as u64;
        self.tally.inserted += outcome.inserted as u64;

        if outcome.failed() > 0 {
            warn!(
                batch = self.tally.batches,
                inserted = outcome.inserted,
                failed = outcome.failed(),
                "partial batch insert"
            );
        } else {
            debug!(batch = self.tally.batches, inserted = outcome.inserted, "batch written");
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn tally(&self) -> WriteTally {
        self.tally
    }

    /// Flush the final partial batch and return the totals.
    pub fn finish(mut self) -> StoreResult<WriteTally> {
        self.flush()?;
        Ok(self.tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::books::SampleBook;
    use crate::store::MemoryStore;
    use mongodb::bson::doc;

    fn book(title: &str) -> SampleBook {
        SampleBook {
            title: title.to_string(),
            authors: vec!["Someone".to_string()],
            subjects: vec![],
        }
    }

    #[test]
    fn test_batches_and_final_flush() {
        let store = MemoryStore::default();
        let mut writer = BatchWriter::new(&store, 2);
        for i in 0..5 {
            writer.push(&book(&format!("Book {}", i))).unwrap();
        }
        assert_eq!(writer.pending(), 1);
        assert_eq!(writer.tally().batches, 2);

        let tally = writer.finish().unwrap();
        assert_eq!(
            tally,
            WriteTally {
                batches: 3,
                attempted: 5,
                inserted: 5
            }
        );
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_duplicate_ids_count_only_persisted() {
        let store = MemoryStore::default();
        let mut writer = BatchWriter::new(&store, DEFAULT_BATCH_SIZE);
        writer.push_document(doc! {"_id": "a", "title": "A"}).unwrap();
        writer.push_document(doc! {"_id": "a", "title": "A again"}).unwrap();
        writer.push_document(doc! {"_id": "b", "title": "B"}).unwrap();

        let tally = writer.finish().unwrap();
        assert_eq!(tally.inserted, 2);
        assert_eq!(tally.failed(), 1);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_empty_finish_writes_nothing() {
        let store = MemoryStore::default();
        let tally = BatchWriter::new(&store, 0).finish().unwrap();
        assert_eq!(tally, WriteTally::default());
    }
}
