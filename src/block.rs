//! Raw native blocks: scoped allocation, writer and reader.
//!
//! # Ownership
//! A [`RawBlock`] owns exactly one allocation obtained from a
//! [`BlockAllocator`] and gives it back in `Drop`, so every exit path of the
//! call that created it (including `?` on an error) releases the memory.
//!
//! # Embedded addresses
//! Pointer-valued fields are never stored as Rust pointers.  The writer
//! computes them as `base_address + segment_offset` at the moment it fills
//! the header; the reader turns them back into offsets with
//! `address - base_address`.  `0` is the null sentinel for an absent
//! segment.  A block must not be moved or copied after filling, since the
//! embedded addresses refer to its original location.
//!
//! # Endianness
//! Fields are written in the target's native byte order: the consumer is a
//! native API in the same process, not a file or a wire.

use std::alloc::{self, Layout};
use std::io::{self, Cursor, Read, Write};
use std::ptr::NonNull;

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

use crate::error::BlockError;
use crate::layout::{plan, Plan, Segment, PTR_SIZE};

/// Null sentinel for pointer-valued fields.
pub const NULL_ADDRESS: usize = 0;

/// Size in bytes of a native identifier (GUID).
pub const GUID_SIZE: usize = 16;

/// Alignment of every block's base address.
pub const BLOCK_ALIGN: usize = std::mem::align_of::<usize>();

// ── Allocation ───────────────────────────────────────────────────────────────

/// Source of raw block memory.
///
/// Blocks are zero-filled by [`RawBlock`] after acquisition, so
/// implementations need not initialize the memory themselves.
///
/// # Safety
/// A successful `acquire` must return a pointer valid for reads and writes
/// of `layout.size()` bytes, aligned to `layout.align()`, that stays valid
/// and unaliased until it is passed back to `release` with the same layout.
pub unsafe trait BlockAllocator {
    fn acquire(&self, layout: Layout) -> Result<NonNull<u8>, BlockError>;

    /// # Safety
    /// `ptr` must come from `acquire` on this allocator with the same `layout`
    /// and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

unsafe impl<A: BlockAllocator + ?Sized> BlockAllocator for &A {
    fn acquire(&self, layout: Layout) -> Result<NonNull<u8>, BlockError> {
        (**self).acquire(layout)
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        (**self).release(ptr, layout)
    }
}

/// Process heap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

unsafe impl BlockAllocator for SystemAllocator {
    fn acquire(&self, layout: Layout) -> Result<NonNull<u8>, BlockError> {
        if layout.size() == 0 {
            return Err(BlockError::layout("zero-sized allocation"));
        }
        // Safety: the layout has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(BlockError::AllocationFailure { size: layout.size() })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        alloc::dealloc(ptr.as_ptr(), layout)
    }
}

// ── RawBlock ─────────────────────────────────────────────────────────────────

/// One zero-initialized native allocation, released on drop.
pub struct RawBlock<A: BlockAllocator = SystemAllocator> {
    ptr:    NonNull<u8>,
    layout: Layout,
    alloc:  A,
}

impl<A: BlockAllocator> RawBlock<A> {
    pub fn allocate(size: usize, alloc: A) -> Result<Self, BlockError> {
        if size == 0 {
            return Err(BlockError::layout("zero-sized block"));
        }
        let layout = Layout::from_size_align(size, BLOCK_ALIGN)
            .map_err(|e| BlockError::layout(e.to_string()))?;
        let ptr = alloc.acquire(layout)?;
        // Safety: the `BlockAllocator` contract makes `ptr` valid for
        // `size` writable bytes.
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(Self { ptr, layout, alloc })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Pointer handed to the native call.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn base_address(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        // Safety: the allocation is initialized and lives as long as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len()) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // Safety: as above, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len()) }
    }

    pub fn view(&self) -> BlockView<'_> {
        BlockView::new(self.as_bytes())
    }
}

impl<A: BlockAllocator> Drop for RawBlock<A> {
    fn drop(&mut self) {
        // Safety: `ptr`/`layout` came from `self.alloc.acquire`.
        unsafe { self.alloc.release(self.ptr, self.layout) }
    }
}

impl<A: BlockAllocator> std::fmt::Debug for RawBlock<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawBlock")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("len", &self.len())
            .finish()
    }
}

// ── Record cursors ───────────────────────────────────────────────────────────

/// Field-by-field writer over one native record.  Pointer fields are
/// aligned to pointer width relative to the start of the record.
pub struct RecordWriter<'a> {
    cursor: Cursor<&'a mut [u8]>,
}

impl<'a> RecordWriter<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { cursor: Cursor::new(buf) }
    }

    fn align(&mut self, align: usize) -> io::Result<()> {
        let pos = self.cursor.position() as usize;
        let aligned = crate::layout::align_up(pos, align);
        if aligned > self.cursor.get_ref().len() {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "record too small for field"));
        }
        // Padding bytes are already zero.
        self.cursor.set_position(aligned as u64);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> io::Result<()> {
        self.cursor.write_u32::<NativeEndian>(value)
    }

    pub fn put_i32(&mut self, value: i32) -> io::Result<()> {
        self.cursor.write_i32::<NativeEndian>(value)
    }

    pub fn put_addr(&mut self, address: usize) -> io::Result<()> {
        self.align(PTR_SIZE)?;
        self.cursor.write_uint::<NativeEndian>(address as u64, PTR_SIZE)
    }

    /// Native GUID layout: `u32`, `u16`, `u16` in native order, 8 raw bytes.
    pub fn put_guid(&mut self, guid: &Uuid) -> io::Result<()> {
        let (d1, d2, d3, d4) = guid.as_fields();
        self.cursor.write_u32::<NativeEndian>(d1)?;
        self.cursor.write_u16::<NativeEndian>(d2)?;
        self.cursor.write_u16::<NativeEndian>(d3)?;
        self.cursor.write_all(d4)
    }

    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }
}

/// Field-by-field reader mirroring [`RecordWriter`].
pub struct RecordReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> RecordReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { cursor: Cursor::new(buf) }
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        self.cursor.read_u32::<NativeEndian>()
    }

    pub fn i32(&mut self) -> io::Result<i32> {
        self.cursor.read_i32::<NativeEndian>()
    }

    pub fn addr(&mut self) -> io::Result<usize> {
        let pos = self.cursor.position() as usize;
        self.cursor.set_position(crate::layout::align_up(pos, PTR_SIZE) as u64);
        Ok(self.cursor.read_uint::<NativeEndian>(PTR_SIZE)? as usize)
    }

    pub fn guid(&mut self) -> io::Result<Uuid> {
        let d1 = self.cursor.read_u32::<NativeEndian>()?;
        let d2 = self.cursor.read_u16::<NativeEndian>()?;
        let d3 = self.cursor.read_u16::<NativeEndian>()?;
        let mut d4 = [0u8; 8];
        self.cursor.read_exact(&mut d4)?;
        Ok(Uuid::from_fields(d1, d2, d3, &d4))
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

/// Plans, allocates and fills one block.
pub struct BlockWriter<A: BlockAllocator = SystemAllocator> {
    alloc: A,
}

impl BlockWriter<SystemAllocator> {
    pub fn system() -> Self {
        Self::new(SystemAllocator)
    }
}

impl<A: BlockAllocator> BlockWriter<A> {
    pub fn new(alloc: A) -> Self {
        Self { alloc }
    }

    /// Allocate a block for `header_size` + `segments` and run `fill` on it.
    ///
    /// If `fill` fails the block is dropped (and released) before the error
    /// is returned, so a partially written block never escapes.
    pub fn write<F>(
        self,
        header_size: usize,
        segments:    &[Segment],
        fill:        F,
    ) -> Result<RawBlock<A>, BlockError>
    where
        F: FnOnce(&mut BlockContents<'_>) -> Result<(), BlockError>,
    {
        let plan = plan(header_size, segments)?;
        let mut block = RawBlock::allocate(plan.total_size, self.alloc)?;
        let base = block.base_address();
        {
            let mut contents = BlockContents {
                plan:  &plan,
                base,
                bytes: block.as_bytes_mut(),
            };
            fill(&mut contents)?;
        }
        tracing::debug!(
            base = format_args!("{base:#x}"),
            size = plan.total_size,
            segments = segments.len(),
            "filled block"
        );
        Ok(block)
    }
}

/// The block being filled, addressed by segment index.
pub struct BlockContents<'a> {
    plan:  &'a Plan,
    base:  usize,
    bytes: &'a mut [u8],
}

impl<'a> BlockContents<'a> {
    pub fn plan(&self) -> &Plan {
        self.plan
    }

    pub fn base_address(&self) -> usize {
        self.base
    }

    /// Absolute address of a segment, or [`NULL_ADDRESS`] if it is empty.
    pub fn address(&self, segment: usize) -> usize {
        if self.plan.segments[segment].is_empty() {
            NULL_ADDRESS
        } else {
            self.base + self.plan.offset(segment)
        }
    }

    /// Absolute address of element `index` inside a segment.
    pub fn element_address(&self, segment: usize, index: usize) -> Result<usize, BlockError> {
        let seg = self.plan.segments[segment];
        if index >= seg.count {
            return Err(BlockError::SizeMismatch {
                what:     "segment element index",
                expected: seg.count,
                actual:   index + 1,
            });
        }
        Ok(self.base + self.plan.offset(segment) + index * seg.element_size)
    }

    pub fn header(&mut self) -> RecordWriter<'_> {
        let size = self.plan.header_size;
        RecordWriter::new(&mut self.bytes[..size])
    }

    /// Writer for element `index` of a segment of fixed-size records.
    pub fn record(&mut self, segment: usize, index: usize) -> Result<RecordWriter<'_>, BlockError> {
        let start = self.element_address(segment, index)? - self.base;
        let size = self.plan.segments[segment].element_size;
        Ok(RecordWriter::new(&mut self.bytes[start..start + size]))
    }

    /// Writer spanning a whole segment.
    pub fn segment(&mut self, segment: usize) -> RecordWriter<'_> {
        let range = self.plan.range(segment);
        RecordWriter::new(&mut self.bytes[range])
    }

    pub fn write_u32s(&mut self, segment: usize, values: &[u32]) -> Result<(), BlockError> {
        self.check_count(segment, values.len())?;
        let mut w = self.segment(segment);
        for &v in values {
            w.put_u32(v)?;
        }
        Ok(())
    }

    pub fn write_i32s(&mut self, segment: usize, values: &[i32]) -> Result<(), BlockError> {
        self.check_count(segment, values.len())?;
        let mut w = self.segment(segment);
        for &v in values {
            w.put_i32(v)?;
        }
        Ok(())
    }

    fn check_count(&self, segment: usize, actual: usize) -> Result<(), BlockError> {
        let expected = self.plan.segments[segment].count;
        if expected != actual {
            return Err(BlockError::SizeMismatch { what: "segment elements", expected, actual });
        }
        Ok(())
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Read-only view over a filled block, owned or supplied by the native side.
#[derive(Clone, Copy)]
pub struct BlockView<'a> {
    bytes: &'a [u8],
}

impl<'a> BlockView<'a> {
    /// View over bytes that live at their filled location.  Embedded
    /// addresses are resolved against `bytes.as_ptr()`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// # Safety
    /// `ptr` must be valid for reads of `len` initialized bytes for `'a`.
    pub unsafe fn from_raw_parts(ptr: *const u8, len: usize) -> Self {
        Self::new(std::slice::from_raw_parts(ptr, len))
    }

    pub fn base_address(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Turn an embedded address back into a block offset.  The null
    /// sentinel resolves to `None`.
    pub fn resolve(&self, address: usize) -> Result<Option<usize>, BlockError> {
        if address == NULL_ADDRESS {
            return Ok(None);
        }
        let base = self.base_address();
        match address.checked_sub(base) {
            Some(offset) if offset < self.len() => Ok(Some(offset)),
            _ => Err(BlockError::AddressOutOfBlock { address, base, len: self.len() }),
        }
    }

    pub fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], BlockError> {
        let end = offset.checked_add(len).filter(|&end| end <= self.len());
        match end {
            Some(end) => Ok(&self.bytes[offset..end]),
            None => Err(BlockError::OutOfBounds { offset, len, block_len: self.len() }),
        }
    }

    pub fn record(&self, offset: usize, size: usize) -> Result<RecordReader<'a>, BlockError> {
        Ok(RecordReader::new(self.slice(offset, size)?))
    }

    pub fn header(&self, size: usize) -> Result<RecordReader<'a>, BlockError> {
        self.record(0, size)
    }

    /// `count` 4-byte words at `address`; `None` for the null sentinel.
    pub fn read_u32s(&self, address: usize, count: usize) -> Result<Option<Vec<u32>>, BlockError> {
        self.read_words(address, count, |r| r.u32())
    }

    pub fn read_i32s(&self, address: usize, count: usize) -> Result<Option<Vec<i32>>, BlockError> {
        self.read_words(address, count, |r| r.i32())
    }

    fn read_words<T>(
        &self,
        address: usize,
        count:   usize,
        read:    impl Fn(&mut RecordReader<'a>) -> io::Result<T>,
    ) -> Result<Option<Vec<T>>, BlockError> {
        let Some(offset) = self.resolve(address)? else {
            return Ok(None);
        };
        let len = count.checked_mul(4)
            .ok_or_else(|| BlockError::layout(format!("word count {count} overflows")))?;
        let mut r = self.record(offset, len)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(read(&mut r)?);
        }
        Ok(Some(out))
    }

    pub fn read_guid(&self, address: usize) -> Result<Option<Uuid>, BlockError> {
        match self.resolve(address)? {
            Some(offset) => Ok(Some(self.record(offset, GUID_SIZE)?.guid()?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for BlockView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockView")
            .field("base", &format_args!("{:#x}", self.base_address()))
            .field("len", &self.len())
            .finish()
    }
}
