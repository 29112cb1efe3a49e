// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first, bit 7 set on every
// byte except the last. Values are non-negative signed integers: 31 bits
// for the `i32` flavour (addresses, sizes) and 63 bits for the `i64`
// flavour (checksums).
//
// A truncated integer is `VarintError::EndOfData`, which a streaming
// caller treats as "buffer more input and retry". An integer that would
// not fit is `VarintError::Overflow`, which is a hard error.

use thiserror::Error;

/// Maximum encoded length of a 31-bit value (ceil(31/7)).
pub const MAX_I32_LEN: usize = 5;

/// Maximum encoded length of a 63-bit value (ceil(63/7)).
pub const MAX_I64_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarintError {
    /// Input ended before the terminating byte.
    #[error("variable-length integer is truncated")]
    EndOfData,
    /// The value does not fit the target width, or is non-minimal beyond it.
    #[error("variable-length integer overflows its target width")]
    Overflow,
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode `value` into the tail of `buf`, returning the start index.
///
/// The encoded bytes are `buf[start..]`.
#[inline]
fn encode_tail<const N: usize>(mut value: u64, buf: &mut [u8; N]) -> usize {
    let mut i = N;
    loop {
        i -= 1;
        buf[i] = (value as u8 & 0x7F) | 0x80;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    buf[N - 1] &= 0x7F;
    i
}

/// Append `value` to `out`. Negative values are rejected with a logged
/// error and nothing is written.
pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    if value < 0 {
        log::error!("attempt to encode negative value {value} as a varint");
        return;
    }
    let mut buf = [0u8; MAX_I32_LEN];
    let start = encode_tail(value as u64, &mut buf);
    out.extend_from_slice(&buf[start..]);
}

/// Append a 63-bit `value` to `out`.
pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    if value < 0 {
        log::error!("attempt to encode negative value {value} as a varint");
        return;
    }
    let mut buf = [0u8; MAX_I64_LEN];
    let start = encode_tail(value as u64, &mut buf);
    out.extend_from_slice(&buf[start..]);
}

/// Encoded byte length of `value` (0 for negative values, which are never
/// written).
#[inline]
pub fn encoded_len_i32(value: i32) -> usize {
    if value < 0 {
        return 0;
    }
    encoded_len(value as u64)
}

#[inline]
pub fn encoded_len_i64(value: i64) -> usize {
    if value < 0 {
        return 0;
    }
    encoded_len(value as u64)
}

#[inline]
fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

#[inline]
fn parse(data: &[u8], max_value: u64, max_len: usize) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if i >= max_len || value > (max_value >> 7) {
            return Err(VarintError::Overflow);
        }
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if value > max_value {
                return Err(VarintError::Overflow);
            }
            return Ok((value, i + 1));
        }
    }
    Err(VarintError::EndOfData)
}

/// Parse a 31-bit varint from the front of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn parse_i32(data: &[u8]) -> Result<(i32, usize), VarintError> {
    let (value, len) = parse(data, i32::MAX as u64, MAX_I32_LEN)?;
    Ok((value as i32, len))
}

/// Parse a 63-bit varint from the front of `data`.
pub fn parse_i64(data: &[u8]) -> Result<(i64, usize), VarintError> {
    let (value, len) = parse(data, i64::MAX as u64, MAX_I64_LEN)?;
    Ok((value as i64, len))
}

/// Parse a 31-bit varint at `*pos`, advancing `*pos` on success only.
#[inline]
pub fn read_i32(data: &[u8], pos: &mut usize) -> Result<i32, VarintError> {
    let rest = data.get(*pos..).ok_or(VarintError::EndOfData)?;
    let (value, len) = parse_i32(rest)?;
    *pos += len;
    Ok(value)
}

/// Parse a 63-bit varint at `*pos`, advancing `*pos` on success only.
#[inline]
pub fn read_i64(data: &[u8], pos: &mut usize) -> Result<i64, VarintError> {
    let rest = data.get(*pos..).ok_or(VarintError::EndOfData)?;
    let (value, len) = parse_i64(rest)?;
    *pos += len;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
