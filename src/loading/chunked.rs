//! Growable per-node accumulation lists
//!
//! Relationship batches arrive in arbitrary order and a node's targets may be
//! spread over many flush rounds. Each node of a page keeps its targets as a
//! zig-zag delta var-long byte stream (deltas continue across rounds) plus one
//! raw word list per property channel. Collapsed slots ([`IGNORE_VALUE`]) are
//! skipped on the way in.

use crate::compress::varlong::{self, VarLongCursor};
use crate::compress::{CompressionFlags, IGNORE_VALUE};
use crate::error::{CsrError, Result};
use std::ops::Range;

/// Default ceiling of one node's buffers, in bytes of encoded targets and in
/// words per property channel
pub const DEFAULT_LIST_CEILING: usize = i32::MAX as usize;

/// First allocation of a growing list
const MIN_GROWTH: usize = 64;

/// Grow `vec` by doubling so that `additional` more elements fit
///
/// # Errors
///
/// Returns [`CsrError::CapacityOverflow`] if the resulting length would exceed
/// `ceiling`.
pub fn reserve_checked<T>(vec: &mut Vec<T>, additional: usize, ceiling: usize) -> Result<()> {
    let len = vec.len();
    let required = len
        .checked_add(additional)
        .filter(|&required| required <= ceiling)
        .ok_or(CsrError::CapacityOverflow {
            requested: len as u64 + additional as u64,
            ceiling,
        })?;
    if required > vec.capacity() {
        let doubled = vec.capacity().saturating_mul(2).max(MIN_GROWTH);
        let target = doubled.max(required).min(ceiling);
        vec.reserve_exact(target - len);
    }
    Ok(())
}

#[derive(Debug, Default)]
struct NodeList {
    bytes: Vec<u8>,
    length: usize,
    last: u64,
    properties: Vec<Vec<u64>>,
}

/// One node's accumulated relationships, handed out by
/// [`ChunkedAdjacencyLists::consume`]
#[derive(Debug, Clone, Copy)]
pub struct AccumulatedList<'a> {
    bytes: &'a [u8],
    length: usize,
    properties: &'a [Vec<u64>],
}

impl<'a> AccumulatedList<'a> {
    /// Number of targets
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Targets in arrival order
    #[must_use]
    pub fn targets(&self) -> VarLongCursor<'a> {
        VarLongCursor::new(self.bytes, self.length, CompressionFlags::DELTA)
    }

    /// Property channels, index aligned with [`AccumulatedList::targets`]
    #[must_use]
    pub const fn properties(&self) -> &'a [Vec<u64>] {
        self.properties
    }

    /// Encoded size of the targets
    #[must_use]
    pub const fn bytes_used(&self) -> usize {
        self.bytes.len()
    }
}

/// Accumulation lists for the nodes of one page
#[derive(Debug)]
pub struct ChunkedAdjacencyLists {
    lists: Vec<NodeList>,
    channels: usize,
    ceiling: usize,
}

impl ChunkedAdjacencyLists {
    /// Lists with `channels` property channels
    ///
    /// `ceiling` bounds each node's encoded target stream in bytes and each of
    /// its property channels in words.
    #[must_use]
    pub fn new(channels: usize, ceiling: usize) -> Self {
        Self {
            lists: Vec::new(),
            channels,
            ceiling,
        }
    }

    /// Append `targets[range]` (and the matching property words) to node
    /// `local_id`
    ///
    /// `count_hint` is the number of non-collapsed slots in the range and only
    /// sizes the growth.
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::CapacityOverflow`] if the encoded targets would
    /// exceed the ceiling in bytes or a property channel in words. The list is
    /// left unchanged in that case.
    pub fn add(
        &mut self,
        local_id: usize,
        targets: &[u64],
        properties: &[Vec<u64>],
        range: Range<usize>,
        count_hint: usize,
    ) -> Result<()> {
        debug_assert_eq!(properties.len(), self.channels);
        if local_id >= self.lists.len() {
            self.lists.resize_with(local_id + 1, NodeList::default);
        }
        let ceiling = self.ceiling;
        let channels = self.channels;
        let list = &mut self.lists[local_id];

        let mut last = list.last;
        let mut required = 0;
        let mut added = 0;
        for &target in targets[range.clone()].iter().filter(|&&t| t != IGNORE_VALUE) {
            required += varlong::encoded_size(CompressionFlags::DELTA.encode_step(last, target));
            last = target;
            added += 1;
        }
        debug_assert!(count_hint >= added || count_hint == 0);

        reserve_checked(&mut list.bytes, required, ceiling)?;
        list.properties.resize_with(channels, Vec::new);
        for channel in &mut list.properties {
            reserve_checked(channel, count_hint.max(added), ceiling)?;
        }

        let mut last = list.last;
        for slot in range {
            let target = targets[slot];
            if target == IGNORE_VALUE {
                continue;
            }
            varlong::encode(CompressionFlags::DELTA.encode_step(last, target), &mut list.bytes);
            last = target;
            for (channel, source) in list.properties.iter_mut().zip(properties) {
                channel.push(source[slot]);
            }
        }
        list.last = last;
        list.length += added;
        Ok(())
    }

    /// Targets accumulated for `local_id`
    #[must_use]
    pub fn degree(&self, local_id: usize) -> usize {
        self.lists.get(local_id).map_or(0, |list| list.length)
    }

    /// Number of property channels
    #[must_use]
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Bytes currently held
    #[must_use]
    pub fn size_in_bytes(&self) -> usize {
        self.lists
            .iter()
            .map(|list| {
                list.bytes.capacity()
                    + list.properties.iter().map(|p| p.capacity() * 8).sum::<usize>()
            })
            .sum()
    }

    /// Hand every non-empty list to `consumer` in local id order, releasing
    /// each list right after
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `consumer`.
    pub fn consume(
        self,
        mut consumer: impl FnMut(usize, AccumulatedList<'_>) -> Result<()>,
    ) -> Result<()> {
        for (local_id, list) in self.lists.into_iter().enumerate() {
            if list.length == 0 {
                continue;
            }
            consumer(
                local_id,
                AccumulatedList {
                    bytes: &list.bytes,
                    length: list.length,
                    properties: &list.properties,
                },
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(lists: ChunkedAdjacencyLists) -> Vec<(usize, Vec<u64>, Vec<Vec<u64>>)> {
        let mut out = Vec::new();
        lists
            .consume(|local, list| {
                out.push((local, list.targets().collect(), list.properties().to_vec()));
                Ok(())
            })
            .unwrap();
        out
    }

    #[test]
    fn test_adds_accumulate_across_rounds() {
        let mut lists = ChunkedAdjacencyLists::new(0, DEFAULT_LIST_CEILING);
        lists.add(3, &[10, 2, 7], &[], 0..3, 3).unwrap();
        lists.add(0, &[5], &[], 0..1, 1).unwrap();
        lists.add(3, &[99, 1, 1000], &[], 1..3, 2).unwrap();

        assert_eq!(lists.degree(3), 5);
        assert_eq!(lists.degree(1), 0);
        assert_eq!(
            collect(lists),
            vec![
                (0, vec![5], vec![]),
                (3, vec![10, 2, 7, 1, 1000], vec![]),
            ]
        );
    }

    #[test]
    fn test_ignored_slots_are_skipped_with_their_properties() {
        let mut lists = ChunkedAdjacencyLists::new(1, DEFAULT_LIST_CEILING);
        let targets = [4, IGNORE_VALUE, 6];
        let properties = vec![vec![40, 50, 60]];
        lists.add(0, &targets, &properties, 0..3, 2).unwrap();

        assert_eq!(collect(lists), vec![(0, vec![4, 6], vec![vec![40, 60]])]);
    }

    #[test]
    fn test_ceiling_is_enforced() {
        let mut lists = ChunkedAdjacencyLists::new(0, 8);
        lists.add(0, &[1, 2, 3, 4, 5, 6, 7, 8], &[], 0..8, 8).unwrap();
        assert!(matches!(
            lists.add(0, &[9], &[], 0..1, 1),
            Err(CsrError::CapacityOverflow { ceiling: 8, .. })
        ));
        assert_eq!(lists.degree(0), 8);
    }

    #[test]
    fn test_ceiling_counts_encoded_bytes() {
        // 200 takes two var-long bytes, so four targets need five bytes
        let mut lists = ChunkedAdjacencyLists::new(1, 4);
        assert!(matches!(
            lists.add(0, &[200, 201, 202, 203], &[vec![0; 4]], 0..4, 4),
            Err(CsrError::CapacityOverflow { requested: 5, ceiling: 4 })
        ));
        assert_eq!(lists.degree(0), 0);

        lists.add(0, &[1, 2, 3, 4], &[vec![0; 4]], 0..4, 4).unwrap();
        assert_eq!(lists.degree(0), 4);
    }

    #[test]
    fn test_reserve_checked_doubles() {
        let mut values: Vec<u64> = Vec::new();
        reserve_checked(&mut values, 1, 1_000).unwrap();
        assert!(values.capacity() >= MIN_GROWTH);

        values.extend(0..64);
        reserve_checked(&mut values, 1, 1_000).unwrap();
        assert!(values.capacity() >= 128);

        assert!(reserve_checked(&mut values, usize::MAX, 1_000).is_err());
    }
}
