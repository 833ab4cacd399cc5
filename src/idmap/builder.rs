//! Concurrent population of an id map
//!
//! Importer workers call [`IdMapBuilder::insert`] for every node record they
//! see. Insertion is an atomic insert-if-absent: racing inserts of the same
//! original id resolve to one intermediate id and intermediate ids are handed
//! out without gaps.
//!
//! Two backends exist. When the id range is known and small, a dense array of
//! atomic slots indexed by original id is used; a slot moves from `EMPTY` to
//! `RESERVED` by compare-and-swap and then to the assigned id. Otherwise a
//! sharded [`DashMap`] is used, whose entry lock makes the check and the id
//! allocation one step.

use super::array::ArrayIdMap;
use super::bit::BitIdMap;
use super::high_limit::{HighLimitIdMap, InnerStrategy};
use super::labels::LabelIndex;
use super::{IdMap, IdMapStrategy, MAX_ORIGINAL_ID};
use crate::error::{CsrError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest id range backed by dense atomic slots
pub const DENSE_SLOT_LIMIT: u64 = 1 << 26;

const EMPTY: u64 = u64::MAX;
const RESERVED: u64 = u64::MAX - 1;

/// Outcome of [`IdMapBuilder::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// The original id was unknown and got this intermediate id
    New(u64),
    /// The original id already had this intermediate id
    Existing(u64),
}

impl Insertion {
    /// Intermediate id, new or existing
    #[must_use]
    pub const fn id(self) -> u64 {
        match self {
            Self::New(id) | Self::Existing(id) => id,
        }
    }

    /// Whether this call allocated the id
    #[must_use]
    pub const fn is_new(self) -> bool {
        matches!(self, Self::New(_))
    }
}

#[derive(Debug)]
enum Slots {
    Dense(Box<[AtomicU64]>),
    Sharded(DashMap<u64, u64>),
}

/// Concurrent insert-if-absent id assignment
#[derive(Debug)]
pub struct IdMapBuilder {
    slots: Slots,
    next_id: AtomicU64,
    labels: Mutex<LabelIndex>,
}

impl IdMapBuilder {
    /// Builder for original ids up to `highest_possible_id`, if known
    #[must_use]
    pub fn new(highest_possible_id: Option<u64>) -> Self {
        match highest_possible_id {
            Some(highest) if highest < DENSE_SLOT_LIMIT => Self::dense(highest),
            _ => Self::sharded(),
        }
    }

    /// Dense atomic slots for original ids `0..=highest`
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn dense(highest: u64) -> Self {
        let len = highest.min(DENSE_SLOT_LIMIT - 1) as usize + 1;
        let slots = (0..len).map(|_| AtomicU64::new(EMPTY)).collect();
        Self::with_slots(Slots::Dense(slots))
    }

    /// Sharded hash map for unbounded original ids
    #[must_use]
    pub fn sharded() -> Self {
        Self::with_slots(Slots::Sharded(DashMap::new()))
    }

    fn with_slots(slots: Slots) -> Self {
        Self {
            slots,
            next_id: AtomicU64::new(0),
            labels: Mutex::new(LabelIndex::new()),
        }
    }

    /// Whether the dense slot backend is in use
    #[must_use]
    pub const fn is_dense(&self) -> bool {
        matches!(self.slots, Slots::Dense(_))
    }

    /// Ids handed out so far
    #[must_use]
    pub fn node_count(&self) -> u64 {
        self.next_id.load(Ordering::Acquire)
    }

    /// Insert `original` unless present
    ///
    /// Returns `None` for ids the builder cannot hold: ids above
    /// [`MAX_ORIGINAL_ID`] or outside the dense slot range.
    pub fn insert(&self, original: u64) -> Option<Insertion> {
        if original > MAX_ORIGINAL_ID {
            return None;
        }
        match &self.slots {
            Slots::Dense(slots) => {
                let slot = slots.get(usize::try_from(original).ok()?)?;
                Some(self.claim(slot))
            }
            Slots::Sharded(map) => Some(match map.entry(original) {
                Entry::Occupied(entry) => Insertion::Existing(*entry.get()),
                Entry::Vacant(entry) => {
                    let id = self.next_id.fetch_add(1, Ordering::AcqRel);
                    entry.insert(id);
                    Insertion::New(id)
                }
            }),
        }
    }

    fn claim(&self, slot: &AtomicU64) -> Insertion {
        loop {
            match slot.load(Ordering::Acquire) {
                EMPTY => {
                    if slot
                        .compare_exchange(EMPTY, RESERVED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
                        slot.store(id, Ordering::Release);
                        return Insertion::New(id);
                    }
                }
                // another worker is between reserve and publish
                RESERVED => std::hint::spin_loop(),
                id => return Insertion::Existing(id),
            }
        }
    }

    /// Merge labels recorded by one worker, keyed by intermediate id
    pub fn add_labels(&self, labels: LabelIndex) {
        self.labels.lock().merge(labels);
    }

    /// Freeze into an [`IdMap`]
    ///
    /// Uses `strategy` if given, otherwise [`IdMapStrategy::select`].
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::InvalidConfig`] if the forced strategy cannot hold
    /// the highest original id.
    #[allow(clippy::cast_possible_truncation)]
    pub fn build(self, strategy: Option<IdMapStrategy>) -> Result<IdMap> {
        let node_count = self.next_id.into_inner();
        let mut originals = vec![0_u64; node_count as usize];
        match self.slots {
            Slots::Dense(slots) => {
                for (original, slot) in slots.into_vec().into_iter().enumerate() {
                    let id = slot.into_inner();
                    if id < RESERVED {
                        originals[id as usize] = original as u64;
                    }
                }
            }
            Slots::Sharded(map) => {
                for (original, id) in map {
                    originals[id as usize] = original;
                }
            }
        }
        let labels = self.labels.into_inner();
        let highest = originals.iter().copied().max().unwrap_or(0);

        let strategy = strategy.unwrap_or_else(|| IdMapStrategy::select(node_count, highest));
        if highest > strategy.range_limit() {
            return Err(CsrError::InvalidConfig(format!(
                "id map strategy {strategy} cannot hold original id {highest}"
            )));
        }
        tracing::debug!(%strategy, node_count, highest, "building id map");

        Ok(match strategy {
            IdMapStrategy::Array => IdMap::Array(ArrayIdMap::from_originals(originals, labels)),
            IdMapStrategy::Bit => IdMap::Bit(BitIdMap::from_originals(&originals, &labels)),
            IdMapStrategy::HighLimit => IdMap::HighLimit(HighLimitIdMap::from_originals(
                originals,
                labels,
                InnerStrategy::Bit,
            )),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idmap::{NodeMapping, NOT_FOUND};
    use std::collections::HashSet;

    fn concurrent_inserts(builder: &IdMapBuilder, threads: u64, per_thread: u64) -> u64 {
        let news = AtomicU64::new(0);
        std::thread::scope(|scope| {
            for t in 0..threads {
                let news = &news;
                scope.spawn(move || {
                    // every id is inserted by two threads
                    for i in 0..per_thread {
                        let original = ((t / 2) * per_thread + i) * 3;
                        if builder.insert(original).unwrap().is_new() {
                            news.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });
        news.into_inner()
    }

    #[test]
    fn test_dense_backend_dedups_concurrent_inserts() {
        let builder = IdMapBuilder::new(Some(100_000));
        assert!(builder.is_dense());

        let news = concurrent_inserts(&builder, 8, 1_000);
        assert_eq!(news, 4_000);
        assert_eq!(builder.node_count(), 4_000);
    }

    #[test]
    fn test_sharded_backend_dedups_concurrent_inserts() {
        let builder = IdMapBuilder::new(None);
        assert!(!builder.is_dense());

        let news = concurrent_inserts(&builder, 8, 1_000);
        assert_eq!(news, 4_000);

        let map = builder.build(None).unwrap();
        assert_eq!(map.node_count(), 4_000);
        let mut seen = HashSet::new();
        for mapped in 0..map.node_count() {
            let original = map.to_original_node_id(mapped);
            assert_ne!(original, NOT_FOUND);
            assert_eq!(map.to_mapped_node_id(original), mapped);
            assert!(seen.insert(original));
        }
    }

    #[test]
    fn test_insert_reports_existing() {
        let builder = IdMapBuilder::dense(10);
        assert_eq!(builder.insert(7), Some(Insertion::New(0)));
        assert_eq!(builder.insert(3), Some(Insertion::New(1)));
        assert_eq!(builder.insert(7), Some(Insertion::Existing(0)));
        assert_eq!(builder.insert(11), None);
        assert_eq!(IdMapBuilder::sharded().insert(1 << 63), None);
    }

    #[test]
    fn test_build_every_strategy() {
        for strategy in IdMapStrategy::ALL {
            let builder = IdMapBuilder::new(Some(1_000));
            for original in [500, 20, 999, 20] {
                builder.insert(original);
            }
            let mut labels = LabelIndex::new();
            // intermediate id 1 is original 20
            labels.insert(1, 4);
            builder.add_labels(labels);

            let map = builder.build(Some(strategy)).unwrap();
            assert_eq!(map.strategy(), strategy);
            assert_eq!(map.node_count(), 3);
            assert_eq!(map.highest_original_id(), 999);
            let twenty = map.to_mapped_node_id(20);
            assert!(twenty < 3);
            assert!(map.has_label(twenty, 4), "{strategy}");
            assert_eq!(map.to_original_node_id(twenty), 20);
        }
    }

    #[test]
    fn test_forced_strategy_out_of_range() {
        let builder = IdMapBuilder::sharded();
        builder.insert(1 << 50);
        assert!(matches!(
            builder.build(Some(IdMapStrategy::Array)),
            Err(CsrError::InvalidConfig(_))
        ));
    }
}
