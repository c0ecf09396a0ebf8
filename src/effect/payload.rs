//! Type-specific effect payloads.
//!
//! | Kind      | Record                                                   | Records     |
//! |-----------|----------------------------------------------------------|-------------|
//! | constant  | `{ magnitude }`                                          | 1           |
//! | ramp      | `{ start, end }`                                         | 1           |
//! | periodic  | `{ magnitude, offset, phase, period }`                   | 1           |
//! | condition | `{ offset, +coeff, -coeff, +saturation, -saturation, dead_band }` | axis count |
//! | custom    | `{ channels, sample_period, sample_count, samples* }`    | 1 + samples |

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{SEG_PAYLOAD, SEG_SAMPLES};
use crate::block::{BlockContents, BlockView};
use crate::error::BlockError;
use crate::layout::{record_size, Field};

const CONSTANT_FIELDS:  &[Field] = &[Field::U32];
const RAMP_FIELDS:      &[Field] = &[Field::U32; 2];
const PERIODIC_FIELDS:  &[Field] = &[Field::U32; 4];
const CONDITION_FIELDS: &[Field] = &[Field::U32; 6];
const CUSTOM_FIELDS:    &[Field] = &[Field::U32, Field::U32, Field::U32, Field::Addr];

/// Discriminant selecting the payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    ConstantForce,
    RampForce,
    Periodic,
    Condition,
    CustomForce,
}

impl EffectKind {
    pub const ALL: [EffectKind; 5] = [
        EffectKind::ConstantForce,
        EffectKind::RampForce,
        EffectKind::Periodic,
        EffectKind::Condition,
        EffectKind::CustomForce,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::ConstantForce => "constant",
            EffectKind::RampForce     => "ramp",
            EffectKind::Periodic      => "periodic",
            EffectKind::Condition     => "condition",
            EffectKind::CustomForce   => "custom",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "constant" | "constant_force" => Some(EffectKind::ConstantForce),
            "ramp" | "ramp_force"         => Some(EffectKind::RampForce),
            "periodic"                    => Some(EffectKind::Periodic),
            "condition"                   => Some(EffectKind::Condition),
            "custom" | "custom_force"     => Some(EffectKind::CustomForce),
            _                             => None,
        }
    }

    /// Size of one payload record.
    pub const fn record_size(self) -> usize {
        match self {
            EffectKind::ConstantForce => record_size(CONSTANT_FIELDS),
            EffectKind::RampForce     => record_size(RAMP_FIELDS),
            EffectKind::Periodic      => record_size(PERIODIC_FIELDS),
            EffectKind::Condition     => record_size(CONDITION_FIELDS),
            EffectKind::CustomForce   => record_size(CUSTOM_FIELDS),
        }
    }

    /// Payload records for a block with `axis_count` axes.
    pub fn record_count(self, axis_count: usize) -> usize {
        match self {
            EffectKind::Condition => axis_count,
            _ => 1,
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for EffectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::from_name(s).ok_or_else(|| format!("unknown effect kind '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConstantForce {
    pub magnitude: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RampForce {
    pub start: i32,
    pub end:   i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Periodic {
    pub magnitude: u32,
    pub offset:    i32,
    pub phase:     u32,
    pub period:    u32,
}

/// Spring/damper/inertia/friction coefficients for one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Condition {
    pub offset:               i32,
    pub positive_coefficient: i32,
    pub negative_coefficient: i32,
    pub positive_saturation:  u32,
    pub negative_saturation:  u32,
    pub dead_band:            i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomForce {
    pub channels:      u32,
    pub sample_period: u32,
    pub samples:       Vec<i32>,
}

/// Payload carried alongside an effect, one variant per [`EffectKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum TypeSpecific {
    ConstantForce(ConstantForce),
    RampForce(RampForce),
    Periodic(Periodic),
    /// One record per axis, in axis order.
    Condition(Vec<Condition>),
    CustomForce(CustomForce),
}

impl TypeSpecific {
    pub fn kind(&self) -> EffectKind {
        match self {
            TypeSpecific::ConstantForce(_) => EffectKind::ConstantForce,
            TypeSpecific::RampForce(_)     => EffectKind::RampForce,
            TypeSpecific::Periodic(_)      => EffectKind::Periodic,
            TypeSpecific::Condition(_)     => EffectKind::Condition,
            TypeSpecific::CustomForce(_)   => EffectKind::CustomForce,
        }
    }

    pub fn record_count(&self) -> usize {
        match self {
            TypeSpecific::Condition(c) => c.len(),
            _ => 1,
        }
    }

    /// Elements of the inner sample array (custom force only).
    pub fn sample_count(&self) -> usize {
        match self {
            TypeSpecific::CustomForce(c) => c.samples.len(),
            _ => 0,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.kind().record_size() * self.record_count()
    }

    pub(crate) fn write(&self, c: &mut BlockContents<'_>) -> Result<(), BlockError> {
        match self {
            TypeSpecific::ConstantForce(p) => {
                c.record(SEG_PAYLOAD, 0)?.put_i32(p.magnitude)?;
            }
            TypeSpecific::RampForce(p) => {
                let mut r = c.record(SEG_PAYLOAD, 0)?;
                r.put_i32(p.start)?;
                r.put_i32(p.end)?;
            }
            TypeSpecific::Periodic(p) => {
                let mut r = c.record(SEG_PAYLOAD, 0)?;
                r.put_u32(p.magnitude)?;
                r.put_i32(p.offset)?;
                r.put_u32(p.phase)?;
                r.put_u32(p.period)?;
            }
            TypeSpecific::Condition(records) => {
                for (i, p) in records.iter().enumerate() {
                    let mut r = c.record(SEG_PAYLOAD, i)?;
                    r.put_i32(p.offset)?;
                    r.put_i32(p.positive_coefficient)?;
                    r.put_i32(p.negative_coefficient)?;
                    r.put_u32(p.positive_saturation)?;
                    r.put_u32(p.negative_saturation)?;
                    r.put_i32(p.dead_band)?;
                }
            }
            TypeSpecific::CustomForce(p) => {
                let samples = c.address(SEG_SAMPLES);
                let count = u32::try_from(p.samples.len())
                    .map_err(|_| BlockError::layout("too many custom force samples"))?;
                {
                    let mut r = c.record(SEG_PAYLOAD, 0)?;
                    r.put_u32(p.channels)?;
                    r.put_u32(p.sample_period)?;
                    r.put_u32(count)?;
                    r.put_addr(samples)?;
                }
                c.write_i32s(SEG_SAMPLES, &p.samples)?;
            }
        }
        Ok(())
    }

    /// Read the payload found at block `offset`.  `byte_size` is the size
    /// the header declares; it must cover every record the kind requires.
    pub(crate) fn read(
        view:       &BlockView<'_>,
        kind:       EffectKind,
        offset:     usize,
        byte_size:  usize,
        axis_count: usize,
    ) -> Result<Self, BlockError> {
        let size = kind.record_size();
        let count = kind.record_count(axis_count);
        let needed = size.checked_mul(count)
            .ok_or_else(|| BlockError::layout(format!("{count} {kind} records overflow")))?;
        if byte_size < needed {
            return Err(BlockError::SizeMismatch {
                what:     "type-specific payload bytes",
                expected: needed,
                actual:   byte_size,
            });
        }
        view.slice(offset, byte_size)?;

        let payload = match kind {
            EffectKind::ConstantForce => {
                let mut r = view.record(offset, size)?;
                TypeSpecific::ConstantForce(ConstantForce { magnitude: r.i32()? })
            }
            EffectKind::RampForce => {
                let mut r = view.record(offset, size)?;
                TypeSpecific::RampForce(RampForce { start: r.i32()?, end: r.i32()? })
            }
            EffectKind::Periodic => {
                let mut r = view.record(offset, size)?;
                TypeSpecific::Periodic(Periodic {
                    magnitude: r.u32()?,
                    offset:    r.i32()?,
                    phase:     r.u32()?,
                    period:    r.u32()?,
                })
            }
            EffectKind::Condition => {
                let mut records = Vec::with_capacity(count);
                for i in 0..count {
                    let mut r = view.record(offset + i * size, size)?;
                    records.push(Condition {
                        offset:               r.i32()?,
                        positive_coefficient: r.i32()?,
                        negative_coefficient: r.i32()?,
                        positive_saturation:  r.u32()?,
                        negative_saturation:  r.u32()?,
                        dead_band:            r.i32()?,
                    });
                }
                TypeSpecific::Condition(records)
            }
            EffectKind::CustomForce => {
                let mut r = view.record(offset, size)?;
                let channels = r.u32()?;
                let sample_period = r.u32()?;
                let sample_count = r.u32()? as usize;
                let samples = match view.read_i32s(r.addr()?, sample_count)? {
                    Some(samples) => samples,
                    None if sample_count == 0 => Vec::new(),
                    None => {
                        return Err(BlockError::SizeMismatch {
                            what:     "custom force samples",
                            expected: sample_count,
                            actual:   0,
                        })
                    }
                };
                TypeSpecific::CustomForce(CustomForce { channels, sample_period, samples })
            }
        };
        Ok(payload)
    }
}
