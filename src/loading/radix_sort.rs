//! LSD radix sort over flat, strided records
//!
//! A batch of relationships is a `Vec<u64>` in which every record occupies
//! `stride` consecutive words. Records are sorted by a list of key fields,
//! most significant first, using one stable counting pass per byte. Bytes
//! above the highest set bit of a key are skipped.

const RADIX_BITS: u32 = 8;
const RADIX: usize = 1 << RADIX_BITS;

/// Sort `records` by `keys` (field offsets, most significant first)
///
/// `scratch` is reused across calls and ends up with unspecified contents.
/// The sort is stable.
#[allow(clippy::cast_possible_truncation)]
pub fn sort_strided(records: &mut Vec<u64>, stride: usize, keys: &[usize], scratch: &mut Vec<u64>) {
    debug_assert!(stride > 0 && records.len() % stride == 0);
    debug_assert!(keys.iter().all(|&k| k < stride));
    let count = records.len() / stride;
    if count < 2 {
        return;
    }
    scratch.clear();
    scratch.resize(records.len(), 0);

    let mut histogram = [0_usize; RADIX];
    for &key in keys.iter().rev() {
        let combined = records
            .iter()
            .skip(key)
            .step_by(stride)
            .fold(0_u64, |acc, &v| acc | v);
        let significant_bits = u64::BITS - combined.leading_zeros();

        let mut shift = 0;
        while shift < significant_bits {
            histogram.fill(0);
            for record in records.chunks_exact(stride) {
                histogram[((record[key] >> shift) as usize) & (RADIX - 1)] += 1;
            }
            let mut offset = 0;
            for bucket in &mut histogram {
                let size = *bucket;
                *bucket = offset;
                offset += size;
            }
            for record in records.chunks_exact(stride) {
                let bucket = &mut histogram[((record[key] >> shift) as usize) & (RADIX - 1)];
                let to = *bucket * stride;
                scratch[to..to + stride].copy_from_slice(record);
                *bucket += 1;
            }
            std::mem::swap(records, scratch);
            shift += RADIX_BITS;
        }
    }
}

/// Sort `targets` ascending, permuting every property channel along
///
/// Uses `scratch` to interleave targets and properties into strided records.
pub fn sort_adjacency(targets: &mut [u64], properties: &mut [Vec<u64>], scratch: &mut (Vec<u64>, Vec<u64>)) {
    if properties.is_empty() {
        targets.sort_unstable();
        return;
    }
    let stride = 1 + properties.len();
    let (interleaved, spare) = scratch;
    interleaved.clear();
    interleaved.reserve(targets.len() * stride);
    for (slot, &target) in targets.iter().enumerate() {
        interleaved.push(target);
        interleaved.extend(properties.iter().map(|channel| channel[slot]));
    }

    sort_strided(interleaved, stride, &[0], spare);

    for (slot, record) in interleaved.chunks_exact(stride).enumerate() {
        targets[slot] = record[0];
        for (channel, &value) in properties.iter_mut().zip(&record[1..]) {
            channel[slot] = value;
        }
    }
}
