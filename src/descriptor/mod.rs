//! Device report layout descriptor ("data format") codec.
//!
//! # Block layout
//! ```text
//! header   { header_size, record_size, flags, report_size, record_count, records* }
//! records  record_count × { identifier*, offset, type_word, options }
//! ids      dense array of 16-byte identifiers, one per record that has one
//! ```
//! A record without an identifier stores the null address in its
//! identifier slot and takes no space in the identifier array.
//!
//! # Type word
//! The native ABI packs the instance index into bits 8–23 of the type tag:
//! `type_word = tag | ((instance as u16 as u32) << 8)`.  An instance of `-1`
//! therefore yields the "any instance" bit pattern `0x00FF_FF00`.

pub mod formats;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::block::{
    BlockAllocator, BlockView, BlockWriter, RawBlock, RecordReader, SystemAllocator, GUID_SIZE,
};
use crate::error::BlockError;
use crate::layout::{record_size, Field, Segment};

const HEADER_FIELDS: &[Field] = &[
    Field::U32,  // header_size
    Field::U32,  // record_size
    Field::U32,  // flags
    Field::U32,  // report_size
    Field::U32,  // record_count
    Field::Addr, // records
];

const RECORD_FIELDS: &[Field] = &[
    Field::Addr, // identifier
    Field::U32,  // offset
    Field::U32,  // type_word
    Field::U32,  // options
];

pub const HEADER_SIZE: usize = record_size(HEADER_FIELDS);
pub const RECORD_SIZE: usize = record_size(RECORD_FIELDS);

const SEG_RECORDS: usize = 0;
const SEG_IDS: usize = 1;

/// Bits 8–23 of a type word hold the instance index.
pub const INSTANCE_MASK: u32 = 0x00FF_FF00;

/// Instance index meaning "match any instance".
pub const ANY_INSTANCE: i16 = -1;

bitflags! {
    /// Global descriptor options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct DataFormatFlags: u32 {
        const ABSOLUTE_AXIS = 0x0000_0001;
        const RELATIVE_AXIS = 0x0000_0002;
    }
}

bitflags! {
    /// Data-type tag of one control: low-byte type bits plus high kind bits.
    /// Bits 8–23 belong to the instance index and are never part of the tag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ObjectType: u32 {
        const RELATIVE_AXIS     = 0x0000_0001;
        const ABSOLUTE_AXIS     = 0x0000_0002;
        const AXIS              = 0x0000_0003;
        const PUSH_BUTTON       = 0x0000_0004;
        const TOGGLE_BUTTON     = 0x0000_0008;
        const BUTTON            = 0x0000_000C;
        const POV               = 0x0000_0010;
        const COLLECTION        = 0x0000_0040;
        const NO_DATA           = 0x0000_0080;
        const FF_ACTUATOR       = 0x0100_0000;
        const FF_EFFECT_TRIGGER = 0x0200_0000;
        const VENDOR_DEFINED    = 0x0400_0000;
        const ALIAS             = 0x0800_0000;
        const OUTPUT            = 0x1000_0000;
        const OPTIONAL          = 0x8000_0000;
    }
}

bitflags! {
    /// Per-control options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ObjectOptions: u32 {
        const FF_ACTUATOR       = 0x0000_0001;
        const FF_EFFECT_TRIGGER = 0x0000_0002;
        const ASPECT_POSITION   = 0x0000_0100;
        const ASPECT_VELOCITY   = 0x0000_0200;
        const ASPECT_ACCEL      = 0x0000_0300;
        const ASPECT_FORCE      = 0x0000_0400;
        const ASPECT_MASK       = 0x0000_0F00;
        const POLLED            = 0x0000_8000;
        const GUID_IS_USAGE     = 0x0001_0000;
    }
}

impl ObjectType {
    /// Bytes this control occupies in the device report.
    pub fn data_width(self) -> u32 {
        if self.intersects(ObjectType::AXIS | ObjectType::POV) {
            4
        } else if self.intersects(ObjectType::BUTTON) {
            1
        } else {
            0
        }
    }
}

/// Pack a tag and instance index into one native type word.
pub fn pack_type_word(tag: ObjectType, instance: i16) -> u32 {
    (tag.bits() & !INSTANCE_MASK) | ((instance as u16 as u32) << 8)
}

/// Split a native type word into its tag and instance index.
pub fn unpack_type_word(word: u32) -> (ObjectType, i16) {
    let instance = ((word & INSTANCE_MASK) >> 8) as u16 as i16;
    (ObjectType::from_bits_retain(word & !INSTANCE_MASK), instance)
}

/// One logical control inside a device report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFormatEntry {
    /// Control-type identifier; `None` matches any type.
    pub guid:        Option<Uuid>,
    /// Byte offset of the control's value within the report.
    pub offset:      u32,
    pub object_type: ObjectType,
    /// Instance index, [`ANY_INSTANCE`] for "any".
    pub instance:    i16,
    pub options:     ObjectOptions,
}

impl ObjectFormatEntry {
    pub fn new(guid: Option<Uuid>, offset: u32, object_type: ObjectType) -> Self {
        Self {
            guid,
            offset,
            object_type,
            instance: ANY_INSTANCE,
            options: ObjectOptions::empty(),
        }
    }

    pub fn with_instance(mut self, instance: i16) -> Self {
        self.instance = instance;
        self
    }

    pub fn with_options(mut self, options: ObjectOptions) -> Self {
        self.options = options;
        self
    }

    pub fn type_word(&self) -> u32 {
        pack_type_word(self.object_type, self.instance)
    }
}

/// Ordered description of a device report.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReportDescriptor {
    flags:       DataFormatFlags,
    report_size: u32,
    objects:     Vec<ObjectFormatEntry>,
}

impl DeviceReportDescriptor {
    /// Build a descriptor, checking that every control fits in the report.
    pub fn new(
        flags:       DataFormatFlags,
        report_size: u32,
        objects:     Vec<ObjectFormatEntry>,
    ) -> Result<Self, BlockError> {
        for (i, obj) in objects.iter().enumerate() {
            let end = obj.offset as u64 + obj.object_type.data_width() as u64;
            if end > report_size as u64 {
                return Err(BlockError::layout(format!(
                    "object {i} at offset {} (width {}) overflows {report_size}-byte report",
                    obj.offset,
                    obj.object_type.data_width(),
                )));
            }
        }
        Ok(Self { flags, report_size, objects })
    }

    pub fn flags(&self) -> DataFormatFlags {
        self.flags
    }

    pub fn report_size(&self) -> u32 {
        self.report_size
    }

    pub fn objects(&self) -> &[ObjectFormatEntry] {
        &self.objects
    }

    /// Number of entries that occupy a slot in the dense identifier array.
    pub fn identifier_count(&self) -> usize {
        self.objects.iter().filter(|o| o.guid.is_some()).count()
    }

    pub fn segments(&self) -> [Segment; 2] {
        [
            Segment::new(RECORD_SIZE, self.objects.len()),
            Segment::new(GUID_SIZE, self.identifier_count()),
        ]
    }
}

impl<'de> Deserialize<'de> for DeviceReportDescriptor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            flags:       DataFormatFlags,
            report_size: u32,
            #[serde(default)]
            objects:     Vec<ObjectFormatEntry>,
        }
        let raw = Raw::deserialize(deserializer)?;
        DeviceReportDescriptor::new(raw.flags, raw.report_size, raw.objects)
            .map_err(serde::de::Error::custom)
    }
}

// ── Codec ────────────────────────────────────────────────────────────────────

/// Encode a descriptor into a fresh block from the process heap.
pub fn encode(desc: &DeviceReportDescriptor) -> Result<RawBlock, BlockError> {
    encode_in(desc, SystemAllocator)
}

/// Encode a descriptor into a block obtained from `alloc`.
pub fn encode_in<A: BlockAllocator>(
    desc:  &DeviceReportDescriptor,
    alloc: A,
) -> Result<RawBlock<A>, BlockError> {
    let segments = desc.segments();
    let count = u32::try_from(desc.objects.len())
        .map_err(|_| BlockError::layout("too many object records"))?;

    let block = BlockWriter::new(alloc).write(HEADER_SIZE, &segments, |c| {
        let records = c.address(SEG_RECORDS);
        {
            let mut h = c.header();
            h.put_u32(HEADER_SIZE as u32)?;
            h.put_u32(RECORD_SIZE as u32)?;
            h.put_u32(desc.flags.bits())?;
            h.put_u32(desc.report_size)?;
            h.put_u32(count)?;
            h.put_addr(records)?;
        }

        let mut slot = 0;
        for (i, obj) in desc.objects.iter().enumerate() {
            let id_addr = match &obj.guid {
                Some(guid) => {
                    let addr = c.element_address(SEG_IDS, slot)?;
                    c.record(SEG_IDS, slot)?.put_guid(guid)?;
                    slot += 1;
                    addr
                }
                None => crate::block::NULL_ADDRESS,
            };
            let mut r = c.record(SEG_RECORDS, i)?;
            r.put_addr(id_addr)?;
            r.put_u32(obj.offset)?;
            r.put_u32(obj.type_word())?;
            r.put_u32(obj.options.bits())?;
        }
        Ok(())
    })?;

    tracing::debug!(
        objects = desc.objects.len(),
        identifiers = desc.identifier_count(),
        size = block.len(),
        "encoded data format"
    );
    Ok(block)
}

/// Encode, hand the block to `f` (the native "set data format" call),
/// release it before returning.
pub fn with_encoded<R>(
    desc: &DeviceReportDescriptor,
    f:    impl FnOnce(&mut RawBlock) -> R,
) -> Result<R, BlockError> {
    let mut block = encode(desc)?;
    Ok(f(&mut block))
}

/// Rebuild a descriptor from a filled data-format block.
///
/// The native side only consumes these blocks; decoding exists for
/// diagnostics and round-trip checks.
pub fn decode(view: &BlockView<'_>) -> Result<DeviceReportDescriptor, BlockError> {
    let mut h = view.header(HEADER_SIZE)?;
    let header_size = h.u32()? as usize;
    let rec_size = h.u32()? as usize;
    let flags = DataFormatFlags::from_bits_retain(h.u32()?);
    let report_size = h.u32()?;
    let count = h.u32()? as usize;
    let records = h.addr()?;

    if header_size != HEADER_SIZE {
        return Err(BlockError::layout(format!(
            "data format header size {header_size}, expected {HEADER_SIZE}"
        )));
    }
    if rec_size != RECORD_SIZE {
        return Err(BlockError::layout(format!(
            "object record size {rec_size}, expected {RECORD_SIZE}"
        )));
    }

    // The record array must fit in the block before `count` sizes anything.
    let table = match view.resolve(records)? {
        Some(first) => {
            let len = count.checked_mul(RECORD_SIZE)
                .ok_or_else(|| BlockError::layout(format!("record count {count} overflows")))?;
            view.slice(first, len)?
        }
        None if count == 0 => &[][..],
        None => {
            return Err(BlockError::SizeMismatch { what: "object records", expected: count, actual: 0 })
        }
    };

    let mut objects = Vec::with_capacity(count);
    for chunk in table.chunks_exact(RECORD_SIZE) {
        let mut r = RecordReader::new(chunk);
        let guid = view.read_guid(r.addr()?)?;
        let offset = r.u32()?;
        let (object_type, instance) = unpack_type_word(r.u32()?);
        let options = ObjectOptions::from_bits_retain(r.u32()?);
        objects.push(ObjectFormatEntry { guid, offset, object_type, instance, options });
    }

    DeviceReportDescriptor::new(flags, report_size, objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_native_structs() {
        #[cfg(target_pointer_width = "64")]
        {
            assert_eq!(HEADER_SIZE, 32);
            assert_eq!(RECORD_SIZE, 24);
        }
        #[cfg(target_pointer_width = "32")]
        {
            assert_eq!(HEADER_SIZE, 24);
            assert_eq!(RECORD_SIZE, 16);
        }
    }

    #[test]
    fn any_instance_sets_all_instance_bits() {
        assert_eq!(pack_type_word(ObjectType::AXIS, ANY_INSTANCE), 0x00FF_FF03);
        assert_eq!(pack_type_word(ObjectType::BUTTON | ObjectType::OPTIONAL, 5), 0x8000_050C);
    }

    #[test]
    fn tag_instance_bits_are_ignored() {
        let noisy = ObjectType::from_bits_retain(0x0012_3404);
        assert_eq!(pack_type_word(noisy, 0), 0x0000_0004);
    }

    #[test]
    fn width_check_rejects_overflowing_entry() {
        let axis = ObjectFormatEntry::new(None, 8, ObjectType::ABSOLUTE_AXIS);
        assert!(DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 12, vec![axis.clone()]).is_ok());
        assert!(matches!(
            DeviceReportDescriptor::new(DataFormatFlags::ABSOLUTE_AXIS, 11, vec![axis]),
            Err(BlockError::InvalidLayout(_))
        ));
    }
}
