use thiserror::Error;

use crate::format::FourCC;

/// Conditions that make a stream unusable as a container.
///
/// These travel inside [`anyhow::Error`]; use `downcast_ref::<FormError>()` to
/// tell them apart from I/O or handler failures.
#[derive(Debug, Error)]
pub enum FormError {
    #[error("invalid form magic: expected \"RFRM\", found {found:?}")]
    InvalidMagic { found: FourCC },

    #[error("unexpected end of stream at offset {offset:#x} (need {need} bytes, have {have})")]
    TruncatedStream { offset: u64, need: u64, have: u64 },

    #[error("invalid metadata footer size {size:#x} for stream of length {len:#x}")]
    InvalidFooterSize { size: u32, len: u64 },
}

impl FormError {
    #[inline]
    pub(crate) fn truncated(offset: u64, need: u64, end: u64) -> Self {
        Self::TruncatedStream { offset, need, have: end.saturating_sub(offset) }
    }
}
