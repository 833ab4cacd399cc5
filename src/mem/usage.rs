//! Byte sizes of the containers used by the import

use std::mem::size_of;

/// Bytes of a `Vec` header
pub const VEC_HEADER_BYTES: u64 = size_of::<Vec<u8>>() as u64;

/// Bytes of `len` elements of `bytes_per_element` each, plus the `Vec` header
#[must_use]
pub const fn size_of_vec(len: u64, bytes_per_element: u64) -> u64 {
    VEC_HEADER_BYTES.saturating_add(len.saturating_mul(bytes_per_element))
}

/// Bytes of a bitset over `bits` bits, in 64-bit words
#[must_use]
pub const fn size_of_bitset(bits: u64) -> u64 {
    size_of_vec(bits.div_ceil(64), 8)
}

/// Bytes of a swiss-table hash map holding `entries` entries of
/// `entry_bytes` each
///
/// Tables keep a load factor of 7/8 over power-of-two bucket counts, with one
/// control byte per bucket.
#[must_use]
pub fn size_of_hash_map(entries: u64, entry_bytes: u64) -> u64 {
    if entries == 0 {
        return 48;
    }
    let buckets = (entries.saturating_mul(8) / 7).max(4).next_power_of_two();
    48 + buckets.saturating_mul(entry_bytes + 1)
}

/// Number of bytes `value` takes as a var-long
#[must_use]
pub const fn vlong_size(value: u64) -> u64 {
    crate::compress::varlong::encoded_size(value) as u64
}

const UNITS: [&str; 7] = ["Bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

/// `bytes` in binary units
///
/// Moves to the next unit only past 16 KiB of the current one, so `1200 KiB`
/// stays distinguishable from `1100 KiB`.
#[must_use]
pub fn human_readable(mut bytes: u64) -> String {
    for unit in UNITS {
        if bytes >> 14 == 0 {
            return format!("{bytes} {unit}");
        }
        bytes >>= 10;
    }
    format!("{bytes} ZiB")
}
