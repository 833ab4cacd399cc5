//! Source records and the partitioned pull protocol
//!
//! A [`RecordSource`] splits its records into partitions. Each importer task
//! owns one [`ScanCursor`] and pulls batches with
//! [`ScanCursor::reserve_batch`] followed by [`ScanCursor::consume_batch`].

use crate::error::Result;
use crate::idmap::LabelToken;

/// Reference into a [`super::PropertyReader`]
pub type PropertiesRef = u64;

/// Token identifying a relationship type in the source
pub type TypeToken = u32;

/// Marker for records without properties
pub const NO_PROPERTIES: PropertiesRef = u64::MAX;

/// One node as produced by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    /// Original id
    pub id: u64,
    /// Label tokens
    pub labels: Vec<LabelToken>,
    /// Where the node's properties can be read
    pub properties_ref: PropertiesRef,
}

impl NodeRecord {
    /// Node without properties
    #[must_use]
    pub fn new(id: u64, labels: Vec<LabelToken>) -> Self {
        Self {
            id,
            labels,
            properties_ref: NO_PROPERTIES,
        }
    }

    /// Attach a properties reference
    #[must_use]
    pub const fn with_properties(mut self, properties_ref: PropertiesRef) -> Self {
        self.properties_ref = properties_ref;
        self
    }
}

/// One relationship as produced by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipRecord {
    /// Original id of the start node
    pub source: u64,
    /// Original id of the end node
    pub target: u64,
    /// Relationship type token
    pub type_token: TypeToken,
    /// Where the relationship's properties can be read
    pub properties_ref: PropertiesRef,
}

impl RelationshipRecord {
    /// Relationship without properties
    #[must_use]
    pub const fn new(source: u64, target: u64, type_token: TypeToken) -> Self {
        Self {
            source,
            target,
            type_token,
            properties_ref: NO_PROPERTIES,
        }
    }

    /// Attach a properties reference
    #[must_use]
    pub const fn with_properties(mut self, properties_ref: PropertiesRef) -> Self {
        self.properties_ref = properties_ref;
        self
    }
}

/// Cursor over one partition of a source
pub trait ScanCursor<R>: Send {
    /// Reserve the next batch; `false` once the partition is drained
    fn reserve_batch(&mut self) -> bool;

    /// Feed every record of the reserved batch to `consumer`
    ///
    /// Returns the number of records consumed.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `consumer`.
    fn consume_batch(&mut self, consumer: &mut dyn FnMut(&R) -> Result<()>) -> Result<usize>;
}

/// Partitionable stream of records
pub trait RecordSource<R>: Sync {
    /// Split the source into at most `count` cursors
    fn partitions(&self, count: usize) -> Vec<Box<dyn ScanCursor<R> + '_>>;

    /// Number of records, if known
    fn record_count(&self) -> Option<u64>;
}

/// Source over records held in memory
#[derive(Debug, Clone)]
pub struct InMemorySource<R> {
    records: Vec<R>,
    batch_size: usize,
}

impl<R> InMemorySource<R> {
    /// Default records per scan batch
    pub const DEFAULT_BATCH_SIZE: usize = 1024;

    /// Source over `records`
    #[must_use]
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records,
            batch_size: Self::DEFAULT_BATCH_SIZE,
        }
    }

    /// Change the scan batch size
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// The records
    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }
}

struct SliceCursor<'a, R> {
    remaining: &'a [R],
    batch: &'a [R],
    batch_size: usize,
}

impl<R: Sync> ScanCursor<R> for SliceCursor<'_, R> {
    fn reserve_batch(&mut self) -> bool {
        let take = self.batch_size.min(self.remaining.len());
        let (batch, rest) = self.remaining.split_at(take);
        self.batch = batch;
        self.remaining = rest;
        !batch.is_empty()
    }

    fn consume_batch(&mut self, consumer: &mut dyn FnMut(&R) -> Result<()>) -> Result<usize> {
        let batch = std::mem::take(&mut self.batch);
        for record in batch {
            consumer(record)?;
        }
        Ok(batch.len())
    }
}

impl<R: Sync> RecordSource<R> for InMemorySource<R> {
    fn partitions(&self, count: usize) -> Vec<Box<dyn ScanCursor<R> + '_>> {
        if self.records.is_empty() {
            return Vec::new();
        }
        let chunk = self.records.len().div_ceil(count.max(1));
        self.records
            .chunks(chunk)
            .map(|remaining| {
                Box::new(SliceCursor {
                    remaining,
                    batch: &[],
                    batch_size: self.batch_size,
                }) as Box<dyn ScanCursor<R> + '_>
            })
            .collect()
    }

    fn record_count(&self) -> Option<u64> {
        Some(self.records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(cursor: &mut (dyn ScanCursor<u64> + '_)) -> Vec<u64> {
        let mut seen = Vec::new();
        while cursor.reserve_batch() {
            cursor
                .consume_batch(&mut |&r| {
                    seen.push(r);
                    Ok(())
                })
                .unwrap();
        }
        seen
    }

    #[test]
    fn test_partitions_cover_every_record_once() {
        let source = InMemorySource::new((0..103).collect::<Vec<u64>>()).with_batch_size(10);
        let mut all = Vec::new();
        let mut partitions = source.partitions(4);
        assert_eq!(partitions.len(), 4);
        for cursor in &mut partitions {
            all.extend(drain(cursor.as_mut()));
        }
        assert_eq!(all, (0..103).collect::<Vec<_>>());
        assert_eq!(source.record_count(), Some(103));
    }

    #[test]
    fn test_batches_respect_batch_size() {
        let source = InMemorySource::new(vec![1_u64; 25]).with_batch_size(10);
        let mut partitions = source.partitions(1);
        let cursor = &mut partitions[0];

        let mut sizes = Vec::new();
        while cursor.reserve_batch() {
            sizes.push(cursor.consume_batch(&mut |_| Ok(())).unwrap());
        }
        assert_eq!(sizes, vec![10, 10, 5]);
    }

    #[test]
    fn test_empty_source_has_no_partitions() {
        let source = InMemorySource::<u64>::new(Vec::new());
        assert!(source.partitions(8).is_empty());
    }
}
