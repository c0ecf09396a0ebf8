//! Force-feedback effect parameter block codec.
//!
//! # Block layout
//! ```text
//! header     { header_size, flags, duration, sample_period, gain,
//!              trigger_button, trigger_repeat_interval, axis_count,
//!              axes*, direction*, envelope*, payload_byte_size, payload*,
//!              start_delay }
//! axes       axis_count × u32
//! direction  axis_count × i32
//! envelope   0 or 1 × { header_size, attack_level, attack_time, fade_level, fade_time }
//! payload    record_count × kind record        (see [`payload`])
//! samples    custom force sample array         (custom kind only)
//! ```
//! Every `*` field holds an absolute address into the same block, or `0`
//! when the segment is absent.

pub mod payload;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::block::{BlockAllocator, BlockView, BlockWriter, RawBlock, SystemAllocator};
use crate::config::EffectCodecConfig;
use crate::error::BlockError;
use crate::layout::{record_prefix_size, record_size, Field, Segment};

pub use payload::{
    Condition, ConstantForce, CustomForce, EffectKind, Periodic, RampForce, TypeSpecific,
};

const HEADER_FIELDS: &[Field] = &[
    Field::U32,  // header_size
    Field::U32,  // flags
    Field::U32,  // duration
    Field::U32,  // sample_period
    Field::U32,  // gain
    Field::U32,  // trigger_button
    Field::U32,  // trigger_repeat_interval
    Field::U32,  // axis_count
    Field::Addr, // axes
    Field::Addr, // direction
    Field::Addr, // envelope
    Field::U32,  // payload_byte_size
    Field::Addr, // payload
    Field::U32,  // start_delay
];

const ENVELOPE_FIELDS: &[Field] = &[Field::U32; 5];

pub const HEADER_SIZE: usize = record_size(HEADER_FIELDS);
/// Earlier header revision, ending before `start_delay`.
pub const LEGACY_HEADER_SIZE: usize = record_prefix_size(HEADER_FIELDS, HEADER_FIELDS.len() - 1);
pub const ENVELOPE_SIZE: usize = record_size(ENVELOPE_FIELDS);

const SEG_AXES: usize = 0;
const SEG_DIRECTION: usize = 1;
const SEG_ENVELOPE: usize = 2;
pub(crate) const SEG_PAYLOAD: usize = 3;
pub(crate) const SEG_SAMPLES: usize = 4;

/// Duration or repeat value meaning "forever".
pub const INFINITE: u32 = 0xFFFF_FFFF;
/// Trigger button value meaning "no trigger".
pub const NO_TRIGGER: u32 = 0xFFFF_FFFF;
/// Nominal full scale for gains, magnitudes and coefficients.
pub const NOMINAL_MAX: u32 = 10_000;

bitflags! {
    /// Interpretation of the axis and direction arrays.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EffectFlags: u32 {
        const OBJECT_IDS     = 0x0000_0001;
        const OBJECT_OFFSETS = 0x0000_0002;
        const CARTESIAN      = 0x0000_0010;
        const POLAR          = 0x0000_0020;
        const SPHERICAL      = 0x0000_0040;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EffectEnvelope {
    pub attack_level: i32,
    pub attack_time:  u32,
    pub fade_level:   i32,
    pub fade_time:    u32,
}

/// Structured form of one effect parameter block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParameterBlock {
    pub flags:                   EffectFlags,
    pub duration:                u32,
    pub sample_period:           u32,
    pub gain:                    u32,
    pub trigger_button:          u32,
    pub trigger_repeat_interval: u32,
    /// Axis identifiers or report offsets, depending on `flags`.
    pub axes:                    Vec<u32>,
    /// One direction component per axis.
    pub direction:               Vec<i32>,
    pub envelope:                Option<EffectEnvelope>,
    pub type_specific:           Option<TypeSpecific>,
    pub start_delay:             u32,
}

impl Default for EffectParameterBlock {
    fn default() -> Self {
        Self {
            flags:                   EffectFlags::OBJECT_OFFSETS | EffectFlags::CARTESIAN,
            duration:                INFINITE,
            sample_period:           0,
            gain:                    NOMINAL_MAX,
            trigger_button:          NO_TRIGGER,
            trigger_repeat_interval: 0,
            axes:                    Vec::new(),
            direction:               Vec::new(),
            envelope:                None,
            type_specific:           None,
            start_delay:             0,
        }
    }
}

impl EffectParameterBlock {
    pub fn with_axes(mut self, axes: Vec<u32>, direction: Vec<i32>) -> Self {
        self.axes = axes;
        self.direction = direction;
        self
    }

    pub fn with_envelope(mut self, envelope: EffectEnvelope) -> Self {
        self.envelope = Some(envelope);
        self
    }

    pub fn with_type_specific(mut self, payload: TypeSpecific) -> Self {
        self.type_specific = Some(payload);
        self
    }

    fn segments(&self) -> [Segment; 5] {
        let n = self.axes.len();
        let (record, records, samples) = match &self.type_specific {
            Some(p) => (p.kind().record_size(), p.record_count(), p.sample_count()),
            None => (0, 0, 0),
        };
        [
            Segment::new(4, n),
            Segment::new(4, n),
            Segment::new(ENVELOPE_SIZE, self.envelope.is_some() as usize),
            Segment::new(record, records),
            Segment::new(4, samples),
        ]
    }
}

/// Settle the effect kind from an explicit value and the populated payload.
pub fn resolve_kind(
    explicit: Option<EffectKind>,
    payload:  Option<&TypeSpecific>,
) -> Result<Option<EffectKind>, BlockError> {
    match (explicit, payload.map(TypeSpecific::kind)) {
        (Some(expected), Some(found)) if expected != found => {
            Err(BlockError::InvalidVariant { expected, found })
        }
        (Some(kind), _) | (None, Some(kind)) => Ok(Some(kind)),
        (None, None) => Ok(None),
    }
}

fn to_u32(value: usize, what: &str) -> Result<u32, BlockError> {
    u32::try_from(value).map_err(|_| BlockError::layout(format!("{what} {value} exceeds u32")))
}

// ── Codec ────────────────────────────────────────────────────────────────────

/// Encoder / pre-allocator for effect parameter blocks.
#[derive(Debug, Clone, Default)]
pub struct EffectCodec<A: BlockAllocator + Clone = SystemAllocator> {
    config: EffectCodecConfig,
    alloc:  A,
}

impl EffectCodec<SystemAllocator> {
    pub fn new(config: EffectCodecConfig) -> Self {
        Self::with_allocator(config, SystemAllocator)
    }
}

impl<A: BlockAllocator + Clone> EffectCodec<A> {
    pub fn with_allocator(config: EffectCodecConfig, alloc: A) -> Self {
        Self { config, alloc }
    }

    pub fn config(&self) -> &EffectCodecConfig {
        &self.config
    }

    /// Encode `params` into a fresh block.
    ///
    /// `kind` may be omitted, in which case the populated payload variant
    /// decides.  Every consistency check runs before allocation.
    pub fn encode(
        &self,
        params: &EffectParameterBlock,
        kind:   Option<EffectKind>,
    ) -> Result<RawBlock<A>, BlockError> {
        let kind = resolve_kind(kind, params.type_specific.as_ref())?;

        let n = params.axes.len();
        if params.direction.len() != n {
            return Err(BlockError::SizeMismatch {
                what:     "direction components",
                expected: n,
                actual:   params.direction.len(),
            });
        }
        if let Some(TypeSpecific::Condition(records)) = &params.type_specific {
            if records.len() != n {
                return Err(BlockError::SizeMismatch {
                    what:     "condition records",
                    expected: n,
                    actual:   records.len(),
                });
            }
        }

        let axis_count = to_u32(n, "axis count")?;
        let payload_bytes = to_u32(
            params.type_specific.as_ref().map_or(0, TypeSpecific::byte_size),
            "payload size",
        )?;
        let segments = params.segments();

        let block = BlockWriter::new(self.alloc.clone()).write(HEADER_SIZE, &segments, |c| {
            let addrs = [
                c.address(SEG_AXES),
                c.address(SEG_DIRECTION),
                c.address(SEG_ENVELOPE),
                c.address(SEG_PAYLOAD),
            ];
            {
                let mut h = c.header();
                h.put_u32(HEADER_SIZE as u32)?;
                h.put_u32(params.flags.bits())?;
                h.put_u32(params.duration)?;
                h.put_u32(params.sample_period)?;
                h.put_u32(params.gain)?;
                h.put_u32(params.trigger_button)?;
                h.put_u32(params.trigger_repeat_interval)?;
                h.put_u32(axis_count)?;
                h.put_addr(addrs[0])?;
                h.put_addr(addrs[1])?;
                h.put_addr(addrs[2])?;
                h.put_u32(payload_bytes)?;
                h.put_addr(addrs[3])?;
                h.put_u32(params.start_delay)?;
            }
            c.write_u32s(SEG_AXES, &params.axes)?;
            c.write_i32s(SEG_DIRECTION, &params.direction)?;
            if let Some(env) = &params.envelope {
                let mut r = c.record(SEG_ENVELOPE, 0)?;
                r.put_u32(ENVELOPE_SIZE as u32)?;
                r.put_i32(env.attack_level)?;
                r.put_u32(env.attack_time)?;
                r.put_i32(env.fade_level)?;
                r.put_u32(env.fade_time)?;
            }
            if let Some(payload) = &params.type_specific {
                payload.write(c)?;
            }
            Ok(())
        })?;

        tracing::debug!(
            kind = kind.map(EffectKind::name).unwrap_or("none"),
            axes = n,
            payload_bytes,
            size = block.len(),
            "encoded effect parameters"
        );
        Ok(block)
    }

    /// Block for the native side to fill: no axes, an envelope slot and a
    /// payload region sized for `kind`.  Condition payloads reserve
    /// `max_condition_axes` records.
    pub fn allocate_empty(&self, flags: EffectFlags, kind: EffectKind) -> Result<RawBlock<A>, BlockError> {
        self.allocate(flags, kind, 0, self.config.max_condition_axes)
    }

    /// Like [`allocate_empty`](Self::allocate_empty) but also reserves
    /// `axis_capacity` axis and direction slots, and sizes a condition
    /// payload for the same number of axes.
    pub fn allocate_for_axes(
        &self,
        flags:         EffectFlags,
        kind:          EffectKind,
        axis_capacity: usize,
    ) -> Result<RawBlock<A>, BlockError> {
        self.allocate(flags, kind, axis_capacity, axis_capacity)
    }

    fn allocate(
        &self,
        flags:      EffectFlags,
        kind:       EffectKind,
        axes:       usize,
        conditions: usize,
    ) -> Result<RawBlock<A>, BlockError> {
        let records = match kind {
            EffectKind::Condition => conditions,
            _ => 1,
        };
        let samples = match kind {
            EffectKind::CustomForce => self.config.custom_sample_capacity,
            _ => 0,
        };
        let segments = [
            Segment::new(4, axes),
            Segment::new(4, axes),
            Segment::new(ENVELOPE_SIZE, 1),
            Segment::new(kind.record_size(), records),
            Segment::new(4, samples),
        ];
        let axis_count = to_u32(axes, "axis capacity")?;
        let payload_bytes = to_u32(kind.record_size() * records, "payload size")?;
        let sample_count = to_u32(samples, "sample capacity")?;

        let block = BlockWriter::new(self.alloc.clone()).write(HEADER_SIZE, &segments, |c| {
            let addrs = [
                c.address(SEG_AXES),
                c.address(SEG_DIRECTION),
                c.address(SEG_ENVELOPE),
                c.address(SEG_PAYLOAD),
                c.address(SEG_SAMPLES),
            ];
            {
                let mut h = c.header();
                h.put_u32(HEADER_SIZE as u32)?;
                h.put_u32(flags.bits())?;
                for _ in 0..5 {
                    h.put_u32(0)?; // duration .. trigger_repeat_interval
                }
                h.put_u32(axis_count)?;
                h.put_addr(addrs[0])?;
                h.put_addr(addrs[1])?;
                h.put_addr(addrs[2])?;
                h.put_u32(payload_bytes)?;
                h.put_addr(addrs[3])?;
                h.put_u32(0)?;
            }
            c.record(SEG_ENVELOPE, 0)?.put_u32(ENVELOPE_SIZE as u32)?;
            if kind == EffectKind::CustomForce {
                let mut r = c.record(SEG_PAYLOAD, 0)?;
                r.put_u32(0)?;
                r.put_u32(0)?;
                r.put_u32(sample_count)?;
                r.put_addr(addrs[4])?;
            }
            Ok(())
        })?;

        tracing::debug!(kind = kind.name(), axes, records, size = block.len(), "allocated empty effect block");
        Ok(block)
    }

    /// Encode, hand the block to `f`, release it before returning.
    pub fn with_encoded<R>(
        &self,
        params: &EffectParameterBlock,
        kind:   Option<EffectKind>,
        f:      impl FnOnce(&mut RawBlock<A>) -> R,
    ) -> Result<R, BlockError> {
        let mut block = self.encode(params, kind)?;
        Ok(f(&mut block))
    }

    /// Allocate an empty block, let `fill` populate it (the native "get
    /// parameters" call), then decode it.  The block is released on every
    /// path.
    pub fn with_empty<E>(
        &self,
        flags: EffectFlags,
        kind:  EffectKind,
        fill:  impl FnOnce(&mut RawBlock<A>) -> Result<(), E>,
    ) -> Result<EffectParameterBlock, E>
    where
        E: From<BlockError>,
    {
        let mut block = self.allocate_empty(flags, kind)?;
        fill(&mut block)?;
        Ok(decode(&block.view(), kind)?)
    }
}

/// Encode with the default codec on the process heap.
pub fn encode(params: &EffectParameterBlock, kind: Option<EffectKind>) -> Result<RawBlock, BlockError> {
    EffectCodec::new(EffectCodecConfig::default()).encode(params, kind)
}

/// Rebuild an [`EffectParameterBlock`] from a filled block.
///
/// The axis count in the header sizes the axis and direction arrays and,
/// for conditions, the payload record count.  A null direction address
/// with a non-zero axis count decodes as all-zero directions.  A condition
/// block with zero axes has no records and decodes with no payload; a null
/// payload address under a non-zero payload size is a `SizeMismatch`.
pub fn decode(view: &BlockView<'_>, kind: EffectKind) -> Result<EffectParameterBlock, BlockError> {
    let header_size = view.header(4)?.u32()? as usize;
    let legacy = match header_size {
        HEADER_SIZE => false,
        LEGACY_HEADER_SIZE => {
            tracing::warn!(header_size, "decoding legacy effect header without start delay");
            true
        }
        other => {
            return Err(BlockError::layout(format!(
                "effect header size {other}, expected {HEADER_SIZE}"
            )))
        }
    };

    let mut h = view.header(header_size)?;
    h.u32()?;
    let flags = EffectFlags::from_bits_retain(h.u32()?);
    let duration = h.u32()?;
    let sample_period = h.u32()?;
    let gain = h.u32()?;
    let trigger_button = h.u32()?;
    let trigger_repeat_interval = h.u32()?;
    let n = h.u32()? as usize;
    let axes_addr = h.addr()?;
    let direction_addr = h.addr()?;
    let envelope_addr = h.addr()?;
    let payload_bytes = h.u32()? as usize;
    let payload_addr = h.addr()?;
    let start_delay = if legacy { 0 } else { h.u32()? };

    let axes = match view.read_u32s(axes_addr, n)? {
        Some(axes) => axes,
        None if n == 0 => Vec::new(),
        None => return Err(BlockError::SizeMismatch { what: "axes", expected: n, actual: 0 }),
    };
    let direction = view.read_i32s(direction_addr, n)?.unwrap_or_else(|| vec![0; n]);

    let envelope = match view.resolve(envelope_addr)? {
        Some(offset) => {
            let mut r = view.record(offset, ENVELOPE_SIZE)?;
            let size = r.u32()? as usize;
            if size != ENVELOPE_SIZE {
                return Err(BlockError::layout(format!(
                    "envelope size {size}, expected {ENVELOPE_SIZE}"
                )));
            }
            Some(EffectEnvelope {
                attack_level: r.i32()?,
                attack_time:  r.u32()?,
                fade_level:   r.i32()?,
                fade_time:    r.u32()?,
            })
        }
        None => None,
    };

    // A condition payload with no axes carries no records and reads as absent,
    // matching what encode writes for an empty condition list.
    let type_specific = match view.resolve(payload_addr)? {
        None if payload_bytes > 0 => {
            return Err(BlockError::SizeMismatch {
                what:     "type-specific payload",
                expected: payload_bytes,
                actual:   0,
            })
        }
        Some(offset) if payload_bytes > 0 && kind.record_count(n) > 0 => {
            Some(TypeSpecific::read(view, kind, offset, payload_bytes, n)?)
        }
        _ => None,
    };

    tracing::debug!(kind = kind.name(), axes = n, payload_bytes, "decoded effect parameters");
    Ok(EffectParameterBlock {
        flags,
        duration,
        sample_period,
        gain,
        trigger_button,
        trigger_repeat_interval,
        axes,
        direction,
        envelope,
        type_specific,
        start_delay,
    })
}
