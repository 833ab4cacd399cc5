//! Explicitly released compressed memory
//!
//! Compressed adjacency lists that outlive a single import step live in a
//! [`SlabArena`]. A slot is addressed by a [`HandleId`] made of the slot index
//! and a generation counter; releasing a slot bumps its generation, so stale
//! ids are rejected even after the slot has been handed out again.

use super::codec::Codec;
use super::flags::CompressionFlags;
use crate::error::{CsrError, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Index handle into a [`SlabArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    slot: u32,
    generation: u32,
}

impl HandleId {
    /// Arena slot
    #[must_use]
    pub const fn slot(self) -> u32 {
        self.slot
    }

    /// Generation the slot had when this id was issued
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    bytes: Option<Box<[u8]>>,
}

#[derive(Debug, Default)]
struct Slab {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live_bytes: usize,
}

/// Slab allocator for compressed byte regions
///
/// Cheap to share: clone the surrounding [`Arc`].
#[derive(Debug, Default)]
pub struct SlabArena {
    slab: Mutex<Slab>,
}

impl SlabArena {
    /// Empty arena
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store `bytes`, reusing a released slot when one is available
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::CapacityOverflow`] if the arena ran out of slot ids.
    pub fn allocate(&self, bytes: Vec<u8>) -> Result<HandleId> {
        let mut slab = self.slab.lock();
        let len = bytes.len();
        let bytes = Some(bytes.into_boxed_slice());
        if let Some(slot) = slab.free.pop() {
            slab.live_bytes += len;
            let entry = &mut slab.slots[slot as usize];
            entry.bytes = bytes;
            return Ok(HandleId {
                slot,
                generation: entry.generation,
            });
        }
        let Ok(slot) = u32::try_from(slab.slots.len()) else {
            return Err(CsrError::CapacityOverflow {
                requested: slab.slots.len() as u64 + 1,
                ceiling: u32::MAX as usize,
            });
        };
        slab.live_bytes += len;
        slab.slots.push(Slot {
            generation: 0,
            bytes,
        });
        Ok(HandleId {
            slot,
            generation: 0,
        })
    }

    /// Release the region behind `id`
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::DoubleRelease`] if `id` was already released,
    /// including when its slot has been reused since.
    pub fn release(&self, id: HandleId) -> Result<()> {
        let mut slab = self.slab.lock();
        let live = slab
            .slots
            .get(id.slot as usize)
            .is_some_and(|s| s.generation == id.generation && s.bytes.is_some());
        if !live {
            return Err(CsrError::DoubleRelease { slot: id.slot });
        }
        let entry = &mut slab.slots[id.slot as usize];
        let freed = entry.bytes.take().map_or(0, |b| b.len());
        entry.generation = entry.generation.wrapping_add(1);
        slab.live_bytes -= freed;
        slab.free.push(id.slot);
        Ok(())
    }

    /// Run `f` over the bytes behind `id`
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::UseAfterFree`] if `id` was released.
    pub fn with_bytes<T>(&self, id: HandleId, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        let slab = self.slab.lock();
        match slab.slots.get(id.slot as usize) {
            Some(Slot {
                generation,
                bytes: Some(bytes),
            }) if *generation == id.generation => Ok(f(&bytes[..])),
            _ => Err(CsrError::UseAfterFree { slot: id.slot }),
        }
    }

    /// Whether `id` still refers to a live region
    #[must_use]
    pub fn is_live(&self, id: HandleId) -> bool {
        self.with_bytes(id, |_| ()).is_ok()
    }

    /// Bytes currently held by live regions
    #[must_use]
    pub fn live_bytes(&self) -> usize {
        self.slab.lock().live_bytes
    }

    /// Number of live regions
    #[must_use]
    pub fn live_handles(&self) -> usize {
        let slab = self.slab.lock();
        slab.slots.len() - slab.free.len()
    }
}

/// Owned compressed sequence backed by a [`SlabArena`]
///
/// Must be released with [`CompressedHandle::free`]. A second `free` fails
/// with [`CsrError::DoubleRelease`]; decoding after `free` fails with
/// [`CsrError::UseAfterFree`].
#[derive(Debug)]
pub struct CompressedHandle {
    arena: Arc<SlabArena>,
    id: HandleId,
    codec: Codec,
    flags: CompressionFlags,
    length: usize,
    bytes_used: usize,
    released: bool,
}

impl CompressedHandle {
    pub(crate) fn new(
        arena: Arc<SlabArena>,
        id: HandleId,
        codec: Codec,
        flags: CompressionFlags,
        length: usize,
        bytes_used: usize,
    ) -> Self {
        Self {
            arena,
            id,
            codec,
            flags,
            length,
            bytes_used,
            released: false,
        }
    }

    /// Number of encoded values
    #[must_use]
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Encoded size in bytes
    #[must_use]
    pub const fn bytes_used(&self) -> usize {
        self.bytes_used
    }

    /// Codec that produced the bytes
    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    /// Flags applied before encoding
    #[must_use]
    pub const fn flags(&self) -> CompressionFlags {
        self.flags
    }

    /// Arena id of the region
    #[must_use]
    pub const fn id(&self) -> HandleId {
        self.id
    }

    /// Whether [`CompressedHandle::free`] succeeded already
    #[must_use]
    pub const fn is_released(&self) -> bool {
        self.released
    }

    /// Release the backing region
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::DoubleRelease`] on the second call.
    pub fn free(&mut self) -> Result<()> {
        if self.released {
            return Err(CsrError::DoubleRelease { slot: self.id.slot });
        }
        self.arena.release(self.id)?;
        self.released = true;
        Ok(())
    }

    /// Run `f` over the encoded bytes
    ///
    /// # Errors
    ///
    /// Returns [`CsrError::UseAfterFree`] once the handle was released.
    pub fn with_bytes<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T> {
        if self.released {
            return Err(CsrError::UseAfterFree { slot: self.id.slot });
        }
        self.arena.with_bytes(self.id, f)
    }
}

impl Drop for CompressedHandle {
    fn drop(&mut self) {
        if !self.released {
            tracing::warn!(
                slot = self.id.slot,
                bytes = self.bytes_used,
                "compressed handle dropped without free(), releasing"
            );
            // the region cannot have been released through this handle
            let _ = self.arena.release(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_read() {
        let arena = SlabArena::new();
        let id = arena.allocate(vec![1, 2, 3]).unwrap();

        assert_eq!(arena.with_bytes(id, <[u8]>::to_vec).unwrap(), vec![1, 2, 3]);
        assert_eq!(arena.live_bytes(), 3);
        assert_eq!(arena.live_handles(), 1);
    }

    #[test]
    fn test_release_twice_is_detected() {
        let arena = SlabArena::new();
        let id = arena.allocate(vec![9]).unwrap();

        arena.release(id).unwrap();
        assert!(matches!(
            arena.release(id),
            Err(CsrError::DoubleRelease { slot: 0 })
        ));
        assert_eq!(arena.live_bytes(), 0);
    }

    #[test]
    fn test_stale_id_after_slot_reuse() {
        let arena = SlabArena::new();
        let stale = arena.allocate(vec![1]).unwrap();
        arena.release(stale).unwrap();

        let fresh = arena.allocate(vec![2, 2]).unwrap();
        assert_eq!(fresh.slot(), stale.slot());
        assert_ne!(fresh.generation(), stale.generation());

        assert!(matches!(
            arena.with_bytes(stale, |b| b.len()),
            Err(CsrError::UseAfterFree { .. })
        ));
        assert!(matches!(
            arena.release(stale),
            Err(CsrError::DoubleRelease { .. })
        ));
        assert!(arena.is_live(fresh));
    }
}
