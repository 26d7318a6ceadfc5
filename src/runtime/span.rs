//! Per-invocation views over stream buffers
//!
//! The executor hands each `work` call one [`InputSpan`] per connected
//! input port and one [`OutputSpan`] per connected output port. Spans are
//! contiguous windows (the ring storage guarantees no wrap seam) carrying
//! the absolute offset of their first item. Blocks self-report what they
//! touched via [`InputSpan::consume`] / [`OutputSpan::produce`]; the
//! executor applies the reported counts after `work` returns and never
//! infers them.

use std::mem;

use super::buffer::{BufferReader, BufferWriter};
use super::tag::{Tag, TagValue};

fn cast_slice<T: Copy>(bytes: &[u8], item_size: usize) -> &[T] {
    assert_eq!(
        mem::size_of::<T>(),
        item_size,
        "typed view of {}-byte items as {} ({} bytes)",
        item_size,
        std::any::type_name::<T>(),
        mem::size_of::<T>()
    );
    let ptr = bytes.as_ptr();
    assert_eq!(
        ptr as usize % mem::align_of::<T>(),
        0,
        "ring storage not aligned for {}",
        std::any::type_name::<T>()
    );
    // SAFETY: length is an exact multiple of size_of::<T>, alignment is
    // checked above, and the bytes were produced as items of T by the
    // peer block.
    unsafe { std::slice::from_raw_parts(ptr.cast::<T>(), bytes.len() / item_size) }
}

fn cast_slice_mut<T: Copy>(bytes: &mut [u8], item_size: usize) -> &mut [T] {
    assert_eq!(
        mem::size_of::<T>(),
        item_size,
        "typed view of {}-byte items as {} ({} bytes)",
        item_size,
        std::any::type_name::<T>(),
        mem::size_of::<T>()
    );
    let ptr = bytes.as_mut_ptr();
    assert_eq!(
        ptr as usize % mem::align_of::<T>(),
        0,
        "ring storage not aligned for {}",
        std::any::type_name::<T>()
    );
    // SAFETY: as in cast_slice, plus exclusivity inherited from &mut.
    unsafe { std::slice::from_raw_parts_mut(ptr.cast::<T>(), bytes.len() / item_size) }
}

/// Read view of one input port's available items.
pub struct InputSpan<'a> {
    reader: &'a BufferReader,
    data: &'a [u8],
    item_size: usize,
    offset: u64,
    consumed: usize,
}

impl<'a> InputSpan<'a> {
    pub(crate) fn new(reader: &'a BufferReader) -> Self {
        let region = reader.read_region();
        Self {
            data: reader.region_bytes(region),
            item_size: reader.item_size(),
            offset: region.offset,
            consumed: 0,
            reader,
        }
    }

    /// Items visible in this span.
    pub fn items(&self) -> usize {
        self.data.len() / self.item_size
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Absolute stream offset of the first item.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Raw item bytes.
    pub fn bytes(&self) -> &[u8] {
        self.data
    }

    /// Items reinterpreted as `T`. Panics if `size_of::<T>()` differs from
    /// the port's item size.
    pub fn as_slice<T: Copy + 'static>(&self) -> &[T] {
        cast_slice(self.data, self.item_size)
    }

    /// The producer has signalled done; once this span's items are consumed
    /// there will never be more.
    pub fn finished(&self) -> bool {
        self.reader.producer_done()
    }

    /// Report `n` items consumed. Cumulative within one `work` call; the
    /// executor advances the cursor by the total after `work` returns.
    /// Consuming less than [`items`](Self::items) retains the trailing
    /// items (history) for the next invocation.
    pub fn consume(&mut self, n: usize) {
        assert!(
            self.consumed + n <= self.items(),
            "consume of {} items exceeds span of {}",
            self.consumed + n,
            self.items()
        );
        self.consumed += n;
    }

    pub(crate) fn consumed(&self) -> usize {
        self.consumed
    }

    /// Tags attached within this span's offset range.
    pub fn tags(&self) -> Vec<Tag> {
        self.reader
            .get_tags_in_range(self.offset, self.offset + self.items() as u64, None)
    }

    /// Tags within this span's range carrying `key`.
    pub fn tags_with_key(&self, key: &str) -> Vec<Tag> {
        self.reader
            .get_tags_in_range(self.offset, self.offset + self.items() as u64, Some(key))
    }
}

/// Write view of one output port's free space.
pub struct OutputSpan<'a> {
    data: &'a mut [u8],
    item_size: usize,
    offset: u64,
    produced: Option<usize>,
    tags: Vec<Tag>,
}

impl<'a> OutputSpan<'a> {
    pub(crate) fn new(writer: &'a mut BufferWriter) -> Self {
        let region = writer.write_region();
        let item_size = writer.item_size();
        Self {
            data: writer.region_bytes_mut(region),
            item_size,
            offset: region.offset,
            produced: None,
            tags: Vec::new(),
        }
    }

    /// Free item slots in this span.
    pub fn items(&self) -> usize {
        self.data.len() / self.item_size
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    /// Absolute stream offset the first produced item will carry.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data
    }

    /// Free slots reinterpreted as `T`. Panics if `size_of::<T>()` differs
    /// from the port's item size.
    pub fn as_mut_slice<T: Copy + 'static>(&mut self) -> &mut [T] {
        cast_slice_mut(self.data, self.item_size)
    }

    /// Report `n` items produced into this span. Cumulative within one
    /// `work` call. Outputs that never call this inherit the count from
    /// `WorkReturn::Produced`.
    pub fn produce(&mut self, n: usize) {
        let total = self.produced.unwrap_or(0) + n;
        assert!(
            total <= self.items(),
            "produce of {} items exceeds span of {}",
            total,
            self.items()
        );
        self.produced = Some(total);
    }

    /// Attach a tag to the item `rel_offset` positions into this span.
    pub fn add_tag(&mut self, rel_offset: usize, key: impl Into<std::sync::Arc<str>>, value: TagValue) {
        assert!(
            rel_offset <= self.items(),
            "tag offset {} beyond span of {}",
            rel_offset,
            self.items()
        );
        self.tags
            .push(Tag::new(self.offset + rel_offset as u64, key, value));
    }

    pub(crate) fn into_report(self) -> (Option<usize>, Vec<Tag>) {
        (self.produced, self.tags)
    }
}
