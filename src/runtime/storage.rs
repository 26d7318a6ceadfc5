//! Wraparound-free backing storage for stream buffers
//!
//! A circular buffer of `capacity` items must hand out *contiguous* views of
//! up to `capacity - 1` items starting at any index, even when the logical
//! range crosses the wrap point. [`RingStorage`] is the pluggable strategy
//! seam; [`MirroredSlab`] is the portable implementation: one allocation of
//! `capacity + capacity - 1` item slots where [`publish`](RingStorage::publish)
//! replicates freshly written bytes into the mirror tail (and folds
//! wrapped-over bytes back to the head), so every window is physically
//! contiguous without any OS mapping tricks.
//!
//! Payload access is deliberately lock-free: the single producer and each
//! reader own disjoint item ranges (enforced by the buffer's cursor
//! bookkeeping), so the `UnsafeCell` accesses never alias mutably.

use std::cell::UnsafeCell;

use tracing::warn;

/// Platform addressing granularity used for capacity rounding, in bytes.
///
/// Buffers are sized so `capacity * item_size` is a multiple of this,
/// which keeps the ring's wrap point item-aligned for every item size.
pub const GRANULARITY: usize = 4096;

const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Round `nitems` up to the smallest count whose byte size is a multiple of
/// [`GRANULARITY`]. Emits a diagnostic if rounding more than doubles the
/// request.
pub fn round_capacity(nitems: usize, item_size: usize) -> usize {
    assert!(nitems > 0, "capacity must be > 0");
    assert!(item_size > 0, "item size must be > 0");

    // Smallest item count occupying a whole number of granularity units.
    let chunk = GRANULARITY / gcd(item_size, GRANULARITY);
    let rounded = nitems.div_ceil(chunk) * chunk;

    if rounded > nitems * 2 {
        warn!(
            requested = nitems,
            rounded,
            item_size,
            "buffer capacity rounded up more than 2x to satisfy granularity"
        );
    }
    rounded
}

/// Pluggable ring storage strategy.
///
/// Implementations guarantee that any item range of up to `capacity - 1`
/// items starting below `capacity` maps to contiguous bytes.
pub trait RingStorage: Send + Sync {
    fn capacity_items(&self) -> usize;

    fn item_size(&self) -> usize;

    /// Contiguous read view of `len_items` items starting at `start_item`.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the range holds published data that no
    /// writer currently mutates, and `len_items <= capacity - 1`.
    unsafe fn view(&self, start_item: usize, len_items: usize) -> &[u8];

    /// Contiguous write view of `len_items` items starting at `start_item`.
    ///
    /// # Safety
    ///
    /// The caller must be the sole producer and the range must not overlap
    /// any reader's unconsumed data; `len_items <= capacity - 1`.
    #[allow(clippy::mut_from_ref)]
    unsafe fn view_mut(&self, start_item: usize, len_items: usize) -> &mut [u8];

    /// Make a just-written range visible through every aliased window.
    ///
    /// Must be called by the producer after filling a range obtained from
    /// [`view_mut`](Self::view_mut) and before advancing the write cursor.
    fn publish(&self, start_item: usize, len_items: usize);
}

/// Mirror-by-copy ring storage.
///
/// Layout (in items): `[ primary: capacity | mirror: capacity - 1 ]` where
/// mirror slot `capacity + i` duplicates primary slot `i`. Reads of up to
/// `capacity - 1` items from any start index stay inside the allocation and
/// see current data because `publish` keeps both copies in sync.
///
/// Backing is a `u64` slab so the base pointer is 8-byte aligned, which lets
/// item views be reinterpreted as typed slices for common sample types.
pub struct MirroredSlab {
    words: Box<[UnsafeCell<u64>]>,
    capacity_items: usize,
    item_size: usize,
}

// SAFETY: all payload access goes through the raw-pointer views whose
// exclusivity is guaranteed by the owning buffer's cursor discipline.
unsafe impl Send for MirroredSlab {}
unsafe impl Sync for MirroredSlab {}

impl MirroredSlab {
    /// Allocate storage for a ring of `capacity_items` items.
    ///
    /// `capacity_items` should already be granularity-rounded via
    /// [`round_capacity`].
    pub fn new(capacity_items: usize, item_size: usize) -> Self {
        assert!(capacity_items >= 2, "ring capacity must be at least 2 items");
        assert!(item_size > 0, "item size must be > 0");

        let total_bytes = (capacity_items + capacity_items - 1) * item_size;
        let words = (0..total_bytes.div_ceil(8))
            .map(|_| UnsafeCell::new(0u64))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            words,
            capacity_items,
            item_size,
        }
    }

    #[inline]
    fn base_ptr(&self) -> *mut u8 {
        self.words.as_ptr() as *mut u8
    }

    #[inline]
    fn capacity_bytes(&self) -> usize {
        self.capacity_items * self.item_size
    }

    /// Bytes of the primary region that have a mirror slot (all but the
    /// last item).
    #[inline]
    fn mirror_bytes(&self) -> usize {
        (self.capacity_items - 1) * self.item_size
    }
}

impl RingStorage for MirroredSlab {
    fn capacity_items(&self) -> usize {
        self.capacity_items
    }

    fn item_size(&self) -> usize {
        self.item_size
    }

    unsafe fn view(&self, start_item: usize, len_items: usize) -> &[u8] {
        debug_assert!(start_item < self.capacity_items);
        debug_assert!(len_items <= self.capacity_items - 1);
        let start = start_item * self.item_size;
        std::slice::from_raw_parts(self.base_ptr().add(start), len_items * self.item_size)
    }

    unsafe fn view_mut(&self, start_item: usize, len_items: usize) -> &mut [u8] {
        debug_assert!(start_item < self.capacity_items);
        debug_assert!(len_items <= self.capacity_items - 1);
        let start = start_item * self.item_size;
        std::slice::from_raw_parts_mut(self.base_ptr().add(start), len_items * self.item_size)
    }

    fn publish(&self, start_item: usize, len_items: usize) {
        let start = start_item * self.item_size;
        let end = start + len_items * self.item_size;
        let cap = self.capacity_bytes();
        let base = self.base_ptr();

        // Fold the part written past the wrap point back onto the head.
        // The wrapped bytes already sit in their own mirror slots, so no
        // further replication is needed for them.
        if end > cap {
            let wrapped = end - cap;
            // SAFETY: source [cap, end) and destination [0, wrapped) are
            // disjoint (wrapped <= capacity - 1 items < cap), and both lie
            // in unpublished producer-owned territory.
            unsafe {
                std::ptr::copy_nonoverlapping(base.add(cap), base, wrapped);
            }
        }

        // Replicate the primary part into the mirror tail.
        let primary_end = end.min(self.mirror_bytes()).min(cap);
        if primary_end > start {
            // SAFETY: destination [start + cap, primary_end + cap) is fully
            // inside the allocation (primary_end <= mirror_bytes) and
            // disjoint from the source; both ranges mirror producer-owned
            // items no reader may touch until the cursor advances.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    base.add(start),
                    base.add(start + cap),
                    primary_end - start,
                );
            }
        }
    }
}

impl std::fmt::Debug for MirroredSlab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MirroredSlab")
            .field("capacity_items", &self.capacity_items)
            .field("item_size", &self.item_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_capacity_exact() {
        // 1024 items x 4 bytes = 4096, already a granularity multiple
        assert_eq!(round_capacity(1024, 4), 1024);
    }

    #[test]
    fn test_round_capacity_rounds_up() {
        // 4096 / gcd(3, 4096) = 4096 items per chunk for 3-byte items
        assert_eq!(round_capacity(100, 3), 4096);
        // 8-byte items: chunk is 512 items
        assert_eq!(round_capacity(100, 8), 512);
        assert_eq!(round_capacity(513, 8), 1024);
    }

    #[test]
    fn test_view_roundtrip_no_wrap() {
        let slab = MirroredSlab::new(16, 4);
        unsafe {
            let w = slab.view_mut(0, 4);
            w.copy_from_slice(&[1u8; 16]);
        }
        slab.publish(0, 4);
        let r = unsafe { slab.view(0, 4) };
        assert!(r.iter().all(|&b| b == 1));
    }

    #[test]
    fn test_wrapped_write_is_contiguous_to_read() {
        let slab = MirroredSlab::new(8, 2);

        // Write 5 items starting at index 6: items land at extended
        // positions 6..11, i.e. logical 6, 7, 0, 1, 2.
        unsafe {
            let w = slab.view_mut(6, 5);
            for (i, chunk) in w.chunks_mut(2).enumerate() {
                chunk.fill(i as u8 + 10);
            }
        }
        slab.publish(6, 5);

        // Logical head must hold the wrapped items.
        let head = unsafe { slab.view(0, 3) };
        assert_eq!(head, &[12, 12, 13, 13, 14, 14]);

        // A contiguous read across the wrap sees all five in order.
        let all = unsafe { slab.view(6, 5) };
        assert_eq!(all, &[10, 10, 11, 11, 12, 12, 13, 13, 14, 14]);
    }

    #[test]
    fn test_mirror_tracks_head_writes() {
        let slab = MirroredSlab::new(8, 2);

        // Write to the head region, then read a window that wraps into it.
        unsafe {
            slab.view_mut(0, 3).copy_from_slice(&[7u8; 6]);
        }
        slab.publish(0, 3);

        // Window starting at 7 of length 3 covers logical items 7, 0, 1.
        let win = unsafe { slab.view(7, 3) };
        assert_eq!(&win[2..], &[7u8; 4]);
    }

    #[test]
    fn test_base_alignment() {
        let slab = MirroredSlab::new(16, 4);
        let ptr = unsafe { slab.view(0, 1).as_ptr() };
        assert_eq!(ptr as usize % 8, 0);
    }
}
