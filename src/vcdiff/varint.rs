// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first.
// Each byte has bit 7 set except the final byte.
//
// Decoded values live in the non-negative domain of a signed integer: a
// 32-bit field may hold at most 0x7FFF_FFFF and is at most 5 bytes long, a
// 64-bit field (window checksums) at most 0x7FFF_FFFF_FFFF_FFFF in 9 bytes.
// Leading 0x80 groups are legal as long as the byte limit holds.

use std::io::{self, Write};

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
const MAX_VARINT_LEN: usize = 10;

/// Byte limit for the 32-bit domain (ceil(31/7)).
pub const MAX_U32_LEN: usize = 5;

/// Byte limit for the 64-bit domain (ceil(63/7)).
pub const MAX_U64_LEN: usize = 9;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a `u64` as a VCDIFF variable-length integer into `buf`.
/// Returns the number of bytes written (1..=10), stored at the end of `buf`.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F; // clear MSB on last byte
    MAX_VARINT_LEN - i
}

/// Encode a `u64` and write to a `Write` sink.
pub fn write_u64<W: Write>(w: &mut W, num: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    w.write_all(&buf[MAX_VARINT_LEN - len..])
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a 32-bit field. Returns `(value, bytes_consumed)`.
///
/// Nothing is consumed on error: `Incomplete` means the caller should retry
/// with more bytes, `Malformed` is permanent.
pub fn read_u32(data: &[u8]) -> Result<(u32, usize), VarintError> {
    let (val, len) = read_bounded(data, MAX_U32_LEN, i32::MAX as u64)?;
    Ok((val as u32, len))
}

/// Decode a 64-bit field. Returns `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarintError> {
    read_bounded(data, MAX_U64_LEN, i64::MAX as u64)
}

fn read_bounded(data: &[u8], max_len: usize, max_value: u64) -> Result<(u64, usize), VarintError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().take(max_len).enumerate() {
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if val > max_value {
                return Err(VarintError::Malformed);
            }
            return Ok((val, i + 1));
        }
    }
    if data.len() >= max_len {
        Err(VarintError::Malformed)
    } else {
        Err(VarintError::Incomplete)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VarintError {
    /// More bytes are needed to finish the integer.
    #[error("varint truncated")]
    Incomplete,
    /// Too many continuation bytes, or the value does not fit its domain.
    #[error("malformed varint")]
    Malformed,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
