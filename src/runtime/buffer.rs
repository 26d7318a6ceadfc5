//! Shared circular stream buffers
//!
//! A [`Buffer`] is the single-producer, multi-reader ring that carries items
//! between connected blocks. The producer side is the unique
//! [`BufferWriter`]; each consumer holds a [`BufferReader`] cursor. Payload
//! bytes live in lock-free [`RingStorage`]; only the cursor bookkeeping,
//! the tag collection and the reader registry sit behind a mutex, so the
//! critical sections are O(1) and never wrap the bulk copy.
//!
//! Reader registration uses an arena-plus-handle scheme: the buffer owns a
//! table of cursor records keyed by [`ReaderId`], and readers hold an
//! `Arc<Buffer>` plus their id — the buffer never points back at a reader,
//! so there is no ownership cycle to break by hand.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::storage::{round_capacity, MirroredSlab, RingStorage};
use super::tag::Tag;

/// Handle into a buffer's reader-cursor table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(u64);

#[derive(Debug, Clone, Copy)]
struct ReaderCursor {
    /// Absolute offset of the next unread item
    read_offset: u64,
}

struct BufferState {
    /// Absolute offset of the next item to be written; monotonic
    write_offset: u64,
    tags: Vec<Tag>,
    /// Offsets strictly below this have been pruned
    tag_floor: u64,
    readers: HashMap<ReaderId, ReaderCursor>,
    next_reader: u64,
    done: bool,
}

impl BufferState {
    fn space_available(&self, capacity: usize) -> usize {
        let max_behind = self
            .readers
            .values()
            .map(|r| (self.write_offset - r.read_offset) as usize)
            .max()
            .unwrap_or(0);
        capacity - 1 - max_behind
    }

    fn min_read_offset(&self) -> u64 {
        self.readers
            .values()
            .map(|r| r.read_offset)
            .min()
            .unwrap_or(self.write_offset)
    }
}

/// The shared ring. Constructed through [`Buffer::new`], which hands back
/// the unique producer handle.
pub struct Buffer {
    storage: Box<dyn RingStorage>,
    capacity: usize,
    item_size: usize,
    state: Mutex<BufferState>,
    /// Producer parks here until a reader frees space
    space_cond: Condvar,
    /// Readers park here until the producer commits items or finishes
    data_cond: Condvar,
}

impl Buffer {
    /// Allocate a buffer of at least `nitems` items of `item_size` bytes,
    /// rounded up to the addressing granularity, and return the producer
    /// handle.
    pub fn new(nitems: usize, item_size: usize) -> BufferWriter {
        let capacity = round_capacity(nitems, item_size);
        Self::with_storage(Box::new(MirroredSlab::new(capacity, item_size)))
    }

    /// Build a buffer over a caller-provided storage strategy.
    pub fn with_storage(storage: Box<dyn RingStorage>) -> BufferWriter {
        let capacity = storage.capacity_items();
        let item_size = storage.item_size();
        let buffer = Arc::new(Buffer {
            storage,
            capacity,
            item_size,
            state: Mutex::new(BufferState {
                write_offset: 0,
                tags: Vec::new(),
                tag_floor: 0,
                readers: HashMap::new(),
                next_reader: 0,
                done: false,
            }),
            space_cond: Condvar::new(),
            data_cond: Condvar::new(),
        });
        BufferWriter { buffer }
    }

    /// Capacity in items. Per reader, at most `capacity() - 1` items can
    /// ever be outstanding.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn index_of(&self, offset: u64) -> usize {
        (offset % self.capacity as u64) as usize
    }

    fn prune_tags_locked(state: &mut BufferState, min_offset: u64) {
        if min_offset > state.tag_floor {
            state.tags.retain(|t| t.offset >= min_offset);
            state.tag_floor = min_offset;
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Readers hold an Arc to the buffer, so a populated table here means
        // a reader leaked its registration without running Drop.
        debug_assert!(
            self.lock().readers.is_empty(),
            "buffer dropped with live readers"
        );
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity)
            .field("item_size", &self.item_size)
            .field("write_offset", &state.write_offset)
            .field("readers", &state.readers.len())
            .field("done", &state.done)
            .finish()
    }
}

/// Snapshot of the producer's writable region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteRegion {
    /// Absolute offset of the first writable item
    pub offset: u64,
    /// Ring index of the first writable item
    pub index: usize,
    /// Writable item count (`<= capacity - 1`)
    pub space: usize,
}

/// Snapshot of a reader's unconsumed region.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadRegion {
    pub offset: u64,
    pub index: usize,
    pub available: usize,
}

/// Unique producer handle for one [`Buffer`].
///
/// Deliberately not `Clone`: the ring is single-producer, and exclusive
/// ownership of the writer is what makes the unsynchronized payload writes
/// sound.
pub struct BufferWriter {
    buffer: Arc<Buffer>,
}

impl BufferWriter {
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity
    }

    pub fn item_size(&self) -> usize {
        self.buffer.item_size
    }

    /// Attach a fresh reader at the current write offset: it observes only
    /// items produced from now on.
    pub fn add_reader(&self) -> BufferReader {
        let offset = self.buffer.lock().write_offset;
        self.add_reader_at(offset)
    }

    /// Attach a reader at an absolute stream offset, clamped to the window
    /// of items still retained in the ring
    /// (`[write_offset - (capacity - 1), write_offset]`).
    pub fn add_reader_at(&self, offset: u64) -> BufferReader {
        let mut state = self.buffer.lock();
        let low = state
            .write_offset
            .saturating_sub(self.buffer.capacity as u64 - 1);
        let offset = offset.clamp(low, state.write_offset);
        let id = ReaderId(state.next_reader);
        state.next_reader += 1;
        state.readers.insert(id, ReaderCursor { read_offset: offset });
        BufferReader {
            buffer: Arc::clone(&self.buffer),
            id,
        }
    }

    pub fn num_readers(&self) -> usize {
        self.buffer.lock().readers.len()
    }

    /// Free space in items: `capacity - 1` with no readers, otherwise
    /// `capacity - 1 - max(distance behind)` — the slowest reader throttles
    /// the producer. Advancing readers also lets the buffer prune tags that
    /// every reader has moved past.
    pub fn space_available(&self) -> usize {
        let mut state = self.buffer.lock();
        let min = state.min_read_offset();
        Buffer::prune_tags_locked(&mut state, min);
        state.space_available(self.buffer.capacity)
    }

    /// Block until at least `n` items of space are free or the timeout
    /// elapses. Returns the space seen last.
    pub fn wait_for_space(&self, n: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut state = self.buffer.lock();
        loop {
            let space = state.space_available(self.buffer.capacity);
            if space >= n {
                return space;
            }
            let now = Instant::now();
            if now >= deadline {
                return space;
            }
            let (guard, _) = self
                .buffer
                .space_cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }

    pub(crate) fn write_region(&self) -> WriteRegion {
        let state = self.buffer.lock();
        let space = state.space_available(self.buffer.capacity);
        WriteRegion {
            offset: state.write_offset,
            index: self.buffer.index_of(state.write_offset),
            space,
        }
    }

    /// Raw writable byte view for a region obtained from
    /// [`write_region`](Self::write_region).
    ///
    /// Sound because `&mut self` pins the sole producer and the region
    /// excludes every reader's unconsumed items.
    pub(crate) fn region_bytes_mut(&mut self, region: WriteRegion) -> &mut [u8] {
        // SAFETY: single producer (exclusive &mut), range limited to the
        // free region computed under the lock.
        unsafe { self.buffer.storage.view_mut(region.index, region.space) }
    }

    /// Advance the write cursor by `n` items previously filled in the
    /// region returned by [`write_region`](Self::write_region).
    pub fn commit(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let (index, space) = {
            let state = self.buffer.lock();
            (
                self.buffer.index_of(state.write_offset),
                state.space_available(self.buffer.capacity),
            )
        };
        assert!(n <= space, "commit of {} items exceeds free space {}", n, space);

        // Replicate into the mirror before the items become visible.
        self.buffer.storage.publish(index, n);

        let mut state = self.buffer.lock();
        assert!(!state.done, "commit on a finished buffer");
        state.write_offset += n as u64;
        drop(state);
        self.buffer.data_cond.notify_all();
    }

    /// Copy `data` into the ring, as many whole items as fit, and commit
    /// them. Returns the number of items written.
    pub fn produce(&mut self, data: &[u8]) -> usize {
        let region = self.write_region();
        let nitems = (data.len() / self.buffer.item_size).min(region.space);
        if nitems == 0 {
            return 0;
        }
        let nbytes = nitems * self.buffer.item_size;
        self.region_bytes_mut(region)[..nbytes].copy_from_slice(&data[..nbytes]);
        self.commit(nitems);
        nitems
    }

    /// Attach a tag to the stream. The offset is absolute; readers see it
    /// through [`BufferReader::get_tags_in_range`].
    pub fn add_tag(&self, tag: Tag) {
        self.buffer.lock().tags.push(tag);
    }

    /// Drop all tags with `offset < min_offset`. Tags at or above the floor
    /// are never touched. Normally driven from the `space_available` path,
    /// but safe to run as an independent sweep.
    pub fn prune_tags(&self, min_offset: u64) {
        let mut state = self.buffer.lock();
        Buffer::prune_tags_locked(&mut state, min_offset);
    }

    /// Mark the stream complete and wake every waiter. No further commits
    /// are valid afterwards.
    pub fn finish(&mut self) {
        let mut state = self.buffer.lock();
        state.done = true;
        drop(state);
        self.buffer.data_cond.notify_all();
        self.buffer.space_cond.notify_all();
    }

    pub fn is_done(&self) -> bool {
        self.buffer.lock().done
    }
}

impl Drop for BufferWriter {
    /// A writer that goes away without an explicit `finish` (error paths,
    /// external stop) must still release readers blocked on more data.
    fn drop(&mut self) {
        self.finish();
    }
}

/// One consumer's cursor into a shared [`Buffer`].
pub struct BufferReader {
    buffer: Arc<Buffer>,
    id: ReaderId,
}

impl BufferReader {
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn item_size(&self) -> usize {
        self.buffer.item_size
    }

    fn cursor(&self, state: &BufferState) -> ReaderCursor {
        state.readers[&self.id]
    }

    /// Unconsumed items: absolute write offset minus this reader's read
    /// offset. Never exceeds `capacity - 1`.
    pub fn items_available(&self) -> usize {
        let state = self.buffer.lock();
        (state.write_offset - self.cursor(&state).read_offset) as usize
    }

    /// Absolute offset of the next unread item.
    pub fn read_offset(&self) -> u64 {
        let state = self.buffer.lock();
        self.cursor(&state).read_offset
    }

    /// Producer finished and every item has been consumed by this reader.
    pub fn is_finished(&self) -> bool {
        let state = self.buffer.lock();
        state.done && state.write_offset == self.cursor(&state).read_offset
    }

    /// Producer has signalled completion (items may remain to drain).
    pub fn producer_done(&self) -> bool {
        self.buffer.lock().done
    }

    /// Block until `n` items are available, the producer finishes, or the
    /// timeout elapses. Returns `(available, producer_done)`.
    pub fn wait_for_items(&self, n: usize, timeout: Duration) -> (usize, bool) {
        let deadline = Instant::now() + timeout;
        let mut state = self.buffer.lock();
        loop {
            let avail = (state.write_offset - self.cursor(&state).read_offset) as usize;
            if avail >= n || state.done {
                return (avail, state.done);
            }
            let now = Instant::now();
            if now >= deadline {
                return (avail, state.done);
            }
            let (guard, _) = self
                .buffer
                .data_cond
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
        }
    }

    pub(crate) fn read_region(&self) -> ReadRegion {
        let state = self.buffer.lock();
        let cursor = self.cursor(&state);
        ReadRegion {
            offset: cursor.read_offset,
            index: self.buffer.index_of(cursor.read_offset),
            available: (state.write_offset - cursor.read_offset) as usize,
        }
    }

    /// Raw byte view of a region obtained from
    /// [`read_region`](Self::read_region).
    pub(crate) fn region_bytes(&self, region: ReadRegion) -> &[u8] {
        // SAFETY: the region holds committed items the producer will not
        // rewrite until this cursor advances past them.
        unsafe { self.buffer.storage.view(region.index, region.available) }
    }

    /// Advance the cursor by `n` consumed items and wake the producer.
    pub fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let mut state = self.buffer.lock();
        let write_offset = state.write_offset;
        let cursor = state.readers.get_mut(&self.id).expect("reader deregistered");
        let avail = (write_offset - cursor.read_offset) as usize;
        assert!(n <= avail, "consume of {} items exceeds available {}", n, avail);
        cursor.read_offset += n as u64;
        drop(state);
        self.buffer.space_cond.notify_all();
    }

    /// Tags with `start <= offset < end`, optionally restricted to one key.
    /// A linear scan over the shared collection; order is unspecified.
    pub fn get_tags_in_range(&self, start: u64, end: u64, key: Option<&str>) -> Vec<Tag> {
        let state = self.buffer.lock();
        state
            .tags
            .iter()
            .filter(|t| t.offset >= start && t.offset < end)
            .filter(|t| key.map_or(true, |k| &*t.key == k))
            .cloned()
            .collect()
    }
}

impl Drop for BufferReader {
    fn drop(&mut self) {
        let mut state = self.buffer.lock();
        state.readers.remove(&self.id);
        drop(state);
        // A departing laggard may have been the backpressure bound.
        self.buffer.space_cond.notify_all();
    }
}

impl std::fmt::Debug for BufferReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferReader")
            .field("id", &self.id)
            .field("items_available", &self.items_available())
            .finish()
    }
}
