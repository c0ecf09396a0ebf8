use std::io;
use thiserror::Error;

use crate::effect::EffectKind;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("Invalid layout: {0}")]
    InvalidLayout(String),
    /// The allocator could not provide the block.  Never retried.
    #[error("Allocation of {size} bytes failed")]
    AllocationFailure { size: usize },
    #[error("Payload variant {found} does not match effect kind {expected}")]
    InvalidVariant { expected: EffectKind, found: EffectKind },
    #[error("Size mismatch for {what}: expected {expected}, found {actual}")]
    SizeMismatch { what: &'static str, expected: usize, actual: usize },
    #[error("Address {address:#x} lies outside block {base:#x}+{len}")]
    AddressOutOfBlock { address: usize, base: usize, len: usize },
    #[error("Access of {len} bytes at offset {offset} exceeds block size {block_len}")]
    OutOfBounds { offset: usize, len: usize, block_len: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BlockError {
    pub(crate) fn layout(msg: impl Into<String>) -> Self {
        BlockError::InvalidLayout(msg.into())
    }
}
