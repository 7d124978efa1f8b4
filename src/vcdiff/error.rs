// Decoder error type.

use std::io;

use super::varint::VarintError;

/// Every way a decode session can fail.
///
/// Running out of buffered input is not represented here: the engine keeps
/// the bytes and waits for the next chunk.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed varint in {field}")]
    MalformedVarint { field: &'static str },

    #[error("invalid delta: {0}")]
    InvalidFormat(String),

    #[error("invalid custom code table: {0}")]
    InvalidCustomTable(String),

    #[error("unsupported: {0}")]
    UnsupportedFeature(String),

    #[error("COPY address {address} is not below the current position {here}")]
    AddressOutOfRange { address: u64, here: u64 },

    #[error("target window length mismatch: header declares {expected}, instructions produce {actual}")]
    WindowLengthMismatch { expected: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("{what} of {size} bytes exceeds the limit of {limit} bytes")]
    SizeLimitExceeded {
        what: &'static str,
        size: u64,
        limit: u64,
    },

    #[error("{0}")]
    InvalidLifecycleCall(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("output sink failed: {0}")]
    Output(#[from] io::Error),
}

impl DecodeError {
    /// Map a varint failure inside a buffered section, where running out of
    /// bytes means the section was too short.
    pub(crate) fn from_section_varint(err: VarintError, field: &'static str) -> Self {
        match err {
            VarintError::Malformed => Self::MalformedVarint { field },
            VarintError::Incomplete => Self::InvalidFormat(format!("{field} truncated")),
        }
    }
}
