//! In-place collapsing of parallel relationships
//!
//! A run of `(target, property...)` slots is reduced to one survivor per
//! distinct target. Each property channel combines the values of the collapsed
//! slots with its own [`Aggregation`]. Collapsed slots get their target set to
//! [`IGNORE_VALUE`] and are removed by [`retain_survivors`] before encoding.
//!
//! Property words are `f64` bit patterns.

use serde::Deserialize;
use std::fmt;
use std::ops::Range;

/// Target value marking a collapsed slot
///
/// Internal ids stay below `2^63`, so the sentinel never collides with a node.
pub const IGNORE_VALUE: u64 = u64::MAX;

/// Rule combining the property values of parallel relationships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Aggregation {
    /// Keep parallel relationships apart
    #[default]
    None,
    /// Sum of all values
    Sum,
    /// Largest value
    Max,
    /// Smallest value
    Min,
    /// First value seen
    Single,
}

impl Aggregation {
    /// Whether this rule collapses parallel relationships
    #[must_use]
    pub const fn collapses(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Combine the survivor's `running` value with a collapsed `value`
    #[must_use]
    #[inline]
    pub fn merge(self, running: f64, value: f64) -> f64 {
        match self {
            Self::Sum => running + value,
            Self::Max => running.max(value),
            Self::Min => running.min(value),
            Self::Single | Self::None => running,
        }
    }

    #[inline]
    fn merge_bits(self, running: u64, value: u64) -> u64 {
        match self {
            Self::Single | Self::None => running,
            _ => self
                .merge(f64::from_bits(running), f64::from_bits(value))
                .to_bits(),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "NONE",
            Self::Sum => "SUM",
            Self::Max => "MAX",
            Self::Min => "MIN",
            Self::Single => "SINGLE",
        };
        f.write_str(name)
    }
}

/// Collapse duplicate targets in `targets[range]`
///
/// `properties[c][range]` is the channel combined with `aggregations[c]`. The
/// first slot of every distinct target survives and keeps its position; every
/// other slot of that target is marked with [`IGNORE_VALUE`]. Sorted runs are
/// collapsed in one pass, unsorted runs by a forward scan. No extra memory is
/// allocated.
///
/// Returns the number of surviving slots.
pub fn preaggregate(
    targets: &mut [u64],
    properties: &mut [Vec<u64>],
    range: Range<usize>,
    aggregations: &[Aggregation],
) -> usize {
    debug_assert_eq!(properties.len(), aggregations.len());
    let run = &targets[range.clone()];
    if run.len() < 2 {
        return run.len();
    }
    if run.windows(2).all(|w| w[0] <= w[1]) {
        collapse_sorted(targets, properties, range, aggregations)
    } else {
        collapse_unsorted(targets, properties, range, aggregations)
    }
}

fn absorb(
    properties: &mut [Vec<u64>],
    aggregations: &[Aggregation],
    survivor: usize,
    duplicate: usize,
) {
    for (channel, aggregation) in properties.iter_mut().zip(aggregations) {
        channel[survivor] = aggregation.merge_bits(channel[survivor], channel[duplicate]);
    }
}

fn collapse_sorted(
    targets: &mut [u64],
    properties: &mut [Vec<u64>],
    range: Range<usize>,
    aggregations: &[Aggregation],
) -> usize {
    let mut survivor = range.start;
    let mut survivors = 1;
    for slot in range.start + 1..range.end {
        if targets[slot] == targets[survivor] {
            absorb(properties, aggregations, survivor, slot);
            targets[slot] = IGNORE_VALUE;
        } else {
            survivor = slot;
            survivors += 1;
        }
    }
    survivors
}

fn collapse_unsorted(
    targets: &mut [u64],
    properties: &mut [Vec<u64>],
    range: Range<usize>,
    aggregations: &[Aggregation],
) -> usize {
    let mut survivors = 0;
    for survivor in range.clone() {
        let target = targets[survivor];
        if target == IGNORE_VALUE {
            continue;
        }
        survivors += 1;
        for slot in survivor + 1..range.end {
            if targets[slot] == target {
                absorb(properties, aggregations, survivor, slot);
                targets[slot] = IGNORE_VALUE;
            }
        }
    }
    survivors
}

/// Move surviving slots of `targets[range]` to the front of the range
///
/// Keeps the relative order of survivors and returns their count.
pub fn retain_survivors(
    targets: &mut [u64],
    properties: &mut [Vec<u64>],
    range: Range<usize>,
) -> usize {
    let mut write = range.start;
    for read in range.clone() {
        if targets[read] == IGNORE_VALUE {
            continue;
        }
        if read != write {
            targets[write] = targets[read];
            for channel in properties.iter_mut() {
                channel[write] = channel[read];
            }
        }
        write += 1;
    }
    write - range.start
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(values: &[f64]) -> Vec<u64> {
        values.iter().map(|v| v.to_bits()).collect()
    }

    fn floats(words: &[u64]) -> Vec<f64> {
        words.iter().map(|&w| f64::from_bits(w)).collect()
    }

    #[test]
    fn test_unsorted_run_with_three_channels() {
        let mut targets = vec![3, 1, 3, 2, 2, 1];
        let mut properties = vec![
            words(&[1.0, 2.0, 4.0, 8.0, 16.0, 32.0]),
            words(&[5.0, 1.0, 7.0, 3.0, 9.0, 0.5]),
            words(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0]),
        ];
        let aggregations = [Aggregation::Sum, Aggregation::Max, Aggregation::Single];

        let survivors = preaggregate(&mut targets, &mut properties, 0..6, &aggregations);

        assert_eq!(survivors, 3);
        assert_eq!(
            targets,
            vec![3, 1, IGNORE_VALUE, 2, IGNORE_VALUE, IGNORE_VALUE]
        );
        // target 3 survives at slot 0, target 1 at slot 1, target 2 at slot 3
        assert_eq!(f64::from_bits(properties[0][0]), 5.0);
        assert_eq!(f64::from_bits(properties[0][1]), 34.0);
        assert_eq!(f64::from_bits(properties[0][3]), 24.0);
        assert_eq!(f64::from_bits(properties[1][0]), 7.0);
        assert_eq!(f64::from_bits(properties[1][3]), 9.0);
        assert_eq!(f64::from_bits(properties[2][0]), 10.0);
        assert_eq!(f64::from_bits(properties[2][1]), 20.0);

        let kept = retain_survivors(&mut targets, &mut properties, 0..6);
        assert_eq!(kept, 3);
        assert_eq!(&targets[..kept], &[3, 1, 2]);
        assert_eq!(floats(&properties[0][..kept]), vec![5.0, 34.0, 24.0]);
    }

    #[test]
    fn test_sorted_run_single_pass() {
        let mut targets = vec![1, 1, 2, 3, 3, 3];
        let mut properties = vec![words(&[4.0, 2.0, 1.0, 9.0, 3.0, 6.0])];

        let survivors = preaggregate(&mut targets, &mut properties, 0..6, &[Aggregation::Min]);

        assert_eq!(survivors, 3);
        assert_eq!(
            targets,
            vec![1, IGNORE_VALUE, 2, 3, IGNORE_VALUE, IGNORE_VALUE]
        );
        assert_eq!(floats(&properties[0]), vec![2.0, 2.0, 1.0, 3.0, 3.0, 6.0]);
    }

    #[test]
    fn test_only_range_is_touched() {
        let mut targets = vec![7, 7, 5, 5, 7, 7];
        let mut properties: Vec<Vec<u64>> = Vec::new();

        let survivors = preaggregate(&mut targets, &mut properties, 2..4, &[]);

        assert_eq!(survivors, 1);
        assert_eq!(targets, vec![7, 7, 5, IGNORE_VALUE, 7, 7]);
    }

    #[test]
    fn test_no_duplicates_is_identity() {
        let mut targets = vec![4, 2, 9];
        let mut properties = vec![words(&[1.0, 2.0, 3.0])];

        assert_eq!(
            preaggregate(&mut targets, &mut properties, 0..3, &[Aggregation::Sum]),
            3
        );
        assert_eq!(targets, vec![4, 2, 9]);
        assert_eq!(retain_survivors(&mut targets, &mut properties, 0..3), 3);
    }

    #[test]
    fn test_merge_rules() {
        assert_eq!(Aggregation::Sum.merge(1.5, 2.0), 3.5);
        assert_eq!(Aggregation::Max.merge(1.5, 2.0), 2.0);
        assert_eq!(Aggregation::Min.merge(1.5, 2.0), 1.5);
        assert_eq!(Aggregation::Single.merge(1.5, 2.0), 1.5);
        assert!(!Aggregation::None.collapses());
        assert!(Aggregation::Single.collapses());
    }
}
