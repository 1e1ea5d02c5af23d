//! Decoder-wide error type.
//!
//! Mirrors the five error kinds of the design (`InvalidBitstream`,
//! `UnsupportedFeature`, `MissingReference`, `OutOfMemory`, `Cancelled`) and
//! bridges the `io::Error` values that the per-struct bitstream parsers
//! (`VideoParameterSet::from_rbsp_reader` and friends) already return.

use std::io;

pub type Result<T> = std::result::Result<T, DecoderError>;

#[derive(Debug, thiserror::Error)]
pub enum DecoderError {
    /// Grammar violation, overflow, reserved value, unsupported reserved type.
    #[error("invalid bitstream: {0}")]
    InvalidBitstream(String),

    /// A feature the decoder chose not to implement.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A required reference POC is not in the DPB and substitution isn't permitted.
    #[error("missing reference picture: poc={poc}")]
    MissingReference { poc: i32 },

    /// DPB full or allocation failed.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// Shutdown was requested.
    #[error("decoder cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DecoderError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidBitstream(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFeature(msg.into())
    }

    /// `true` for errors that only abort the current NAL/slice/frame rather
    /// than the whole decoder, per the propagation policy in the design.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}
