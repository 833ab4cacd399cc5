//! Adjacency compression
//!
//! Two interchangeable codecs ([`Codec::VarLong`], [`Codec::Packed`]) share
//! orthogonal [`CompressionFlags`]. Long-lived compressed sequences are owned
//! through [`CompressedHandle`]s in a [`SlabArena`]; store pages hold plain
//! encoded bytes.

pub mod aggregation;
pub mod codec;
pub mod flags;
pub mod handle;
pub mod packing;
pub mod varlong;

pub use aggregation::{preaggregate, retain_survivors, Aggregation, IGNORE_VALUE};
pub use codec::{decompress, AdjacencyDecoder, Codec};
pub use flags::CompressionFlags;
pub use handle::{CompressedHandle, HandleId, SlabArena};
