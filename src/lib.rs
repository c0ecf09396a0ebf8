pub mod layout;
pub mod block;
pub mod error;
pub mod config;
pub mod descriptor;
pub mod effect;

pub use layout::{plan, Plan, Segment};
pub use block::{BlockAllocator, BlockView, BlockWriter, RawBlock, SystemAllocator};
pub use error::BlockError;
pub use config::EffectCodecConfig;
pub use descriptor::{DeviceReportDescriptor, ObjectFormatEntry};
pub use effect::{EffectCodec, EffectKind, EffectParameterBlock, TypeSpecific};
