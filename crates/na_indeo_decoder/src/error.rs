use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecoderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// Motion vector or block position that would leave the band buffer.
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    #[error("Allocation failed: {0}")]
    Allocation(String),

    #[error("End of stream")]
    EndOfStream,
}

pub type Result<T> = std::result::Result<T, DecoderError>;

/// Shorthand for the common `InvalidData` error path.
#[inline]
pub(crate) fn invalid<T>(msg: impl Into<String>) -> Result<T> {
    Err(DecoderError::InvalidData(msg.into()))
}

#[inline]
pub(crate) fn unsupported<T>(msg: impl Into<String>) -> Result<T> {
    Err(DecoderError::Unsupported(msg.into()))
}
