//! Layout planning for single-allocation native blocks.
//!
//! A block is a fixed header followed by variable-length segments packed
//! back to back:
//!
//! ```text
//! [ header | segment 0 | segment 1 | ... | segment n-1 ]
//! ```
//!
//! Segment offsets are cumulative sums of `element_size * count`.  No
//! padding is inserted between segments; the native ABI packs 4-byte words
//! and 16-byte identifiers, so word alignment follows from ordering.
//!
//! Records (headers, per-element structs) are declared once as a list of
//! [`Field`]s and their C-ABI size is computed by [`record_size`].

use crate::error::BlockError;

/// Width of a pointer-valued field on this target.
pub const PTR_SIZE: usize = std::mem::size_of::<usize>();

/// Field kinds found in native records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// 4-byte integer (`DWORD` / `LONG`).
    U32,
    /// Pointer-width absolute address.
    Addr,
}

impl Field {
    pub const fn size(self) -> usize {
        match self {
            Field::U32  => 4,
            Field::Addr => PTR_SIZE,
        }
    }
}

pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) / align * align
}

/// C-ABI size of a record made of `fields`: every field naturally aligned,
/// trailing padding up to the widest field.
pub const fn record_size(fields: &[Field]) -> usize {
    record_prefix_size(fields, fields.len())
}

/// Size of a record made of the first `len` entries of `fields`.  Native
/// structs that grew over revisions keep their older, shorter sizes valid.
pub const fn record_prefix_size(fields: &[Field], len: usize) -> usize {
    let mut offset = 0;
    let mut max_align = 1;
    let mut i = 0;
    while i < len {
        let size = fields[i].size();
        offset = align_up(offset, size) + size;
        if size > max_align {
            max_align = size;
        }
        i += 1;
    }
    align_up(offset, max_align)
}

/// One variable-length segment: `count` elements of `element_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub element_size: usize,
    pub count:        usize,
}

impl Segment {
    pub const fn new(element_size: usize, count: usize) -> Self {
        Self { element_size, count }
    }

    /// Build a segment from a count that arrived as a signed native integer.
    pub fn from_signed(element_size: usize, count: i64) -> Result<Self, BlockError> {
        let count = usize::try_from(count)
            .map_err(|_| BlockError::layout(format!("negative segment count {count}")))?;
        Ok(Self::new(element_size, count))
    }

    pub fn byte_len(&self) -> Option<usize> {
        self.element_size.checked_mul(self.count)
    }

    pub fn is_empty(&self) -> bool {
        self.element_size == 0 || self.count == 0
    }
}

/// Result of [`plan`]: where each segment starts and how big the block is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub header_size: usize,
    pub segments:    Vec<Segment>,
    pub offsets:     Vec<usize>,
    pub total_size:  usize,
}

impl Plan {
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Byte range of segment `index` within the block.
    pub fn range(&self, index: usize) -> std::ops::Range<usize> {
        let start = self.offsets[index];
        let s = self.segments[index];
        start..start + s.element_size * s.count
    }
}

/// Compute segment offsets and the total block size.
pub fn plan(header_size: usize, segments: &[Segment]) -> Result<Plan, BlockError> {
    let mut offsets = Vec::with_capacity(segments.len());
    let mut cursor = header_size;
    for (i, seg) in segments.iter().enumerate() {
        offsets.push(cursor);
        let len = seg.byte_len()
            .ok_or_else(|| BlockError::layout(format!("segment {i} size overflows")))?;
        cursor = cursor.checked_add(len)
            .ok_or_else(|| BlockError::layout(format!("block size overflows at segment {i}")))?;
    }
    tracing::trace!(header_size, segments = segments.len(), total_size = cursor, "planned block");
    Ok(Plan {
        header_size,
        segments: segments.to_vec(),
        offsets,
        total_size: cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_cumulative() {
        let p = plan(32, &[Segment::new(4, 3), Segment::new(16, 2), Segment::new(4, 0)]).unwrap();
        assert_eq!(p.offsets, vec![32, 44, 76]);
        assert_eq!(p.total_size, 76);
        assert_eq!(p.range(1), 44..76);
        assert!(p.range(2).is_empty());
    }

    #[test]
    fn header_only() {
        let p = plan(20, &[]).unwrap();
        assert!(p.offsets.is_empty());
        assert_eq!(p.total_size, 20);
    }

    #[test]
    fn negative_count_rejected() {
        assert!(matches!(Segment::from_signed(4, -1), Err(BlockError::InvalidLayout(_))));
        assert_eq!(Segment::from_signed(4, 7).unwrap(), Segment::new(4, 7));
    }

    #[test]
    fn overflow_rejected() {
        let r = plan(8, &[Segment::new(usize::MAX, 2)]);
        assert!(matches!(r, Err(BlockError::InvalidLayout(_))));
        let r = plan(8, &[Segment::new(1, usize::MAX)]);
        assert!(matches!(r, Err(BlockError::InvalidLayout(_))));
    }

    #[test]
    fn record_sizes_follow_c_rules() {
        assert_eq!(record_size(&[Field::U32; 5]), 20);
        assert_eq!(record_size(&[]), 0);
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(record_size(&[Field::U32, Field::Addr]), 16);
            assert_eq!(record_size(&[Field::Addr, Field::U32]), 16);
            assert_eq!(record_size(&[Field::Addr, Field::U32, Field::U32, Field::U32]), 24);
        }
        #[cfg(target_pointer_width = "32")]
        {
            assert_eq!(record_size(&[Field::U32, Field::Addr]), 8);
            assert_eq!(record_size(&[Field::Addr, Field::U32, Field::U32, Field::U32]), 16);
        }
    }
}
