//! Variable-length integer codecs used for every length prefix and numeric
//! field on the wire.
//!
//! Unsigned values are little-endian base-128: seven data bits per byte with
//! 0x80 as the continuation flag. Signed values use a distinct first byte,
//! `c n d d d d d d` (continuation, negative, six magnitude bits) followed
//! by ordinary base-128 groups, so a length sentinel like -1 stays one byte.
//! A 64-bit value never needs more than [`MAX_VARINT_LEN`] bytes.

use std::io::{self, Read, Write};

use crate::error::{PackError, Result};

/// Upper bound on the encoded length of any 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes [`put_var_uint`] will use for `i`.
pub fn size_var_uint(i: u64) -> usize {
    let mut i = i;
    let mut n = 0;
    loop {
        n += 1;
        i >>= 7;
        if i == 0 {
            return n;
        }
    }
}

/// Number of bytes [`put_var_int`] will use for `i`.
pub fn size_var_int(i: i64) -> usize {
    let mut mag = i.unsigned_abs() >> 6;
    let mut n = 1;
    while mag != 0 {
        n += 1;
        mag >>= 7;
    }
    n
}

/// Encodes `i` into `buf`, returning how many bytes were written.
/// `buf` must hold at least [`size_var_uint`]`(i)` bytes.
pub fn put_var_uint(i: u64, buf: &mut [u8]) -> usize {
    let mut i = i;
    let mut n = 0;
    while i > 0x7f {
        buf[n] = (i & 0x7f) as u8 | 0x80;
        n += 1;
        i >>= 7;
    }
    buf[n] = (i & 0x7f) as u8;
    n + 1
}

/// Encodes `i` into `buf`, returning how many bytes were written.
/// `buf` must hold at least [`size_var_int`]`(i)` bytes.
pub fn put_var_int(i: i64, buf: &mut [u8]) -> usize {
    // unsigned_abs keeps i64::MIN meaningful: its magnitude 2^63 still fits
    // the ten-byte envelope.
    let mut mag = i.unsigned_abs();

    let mut first = (mag & 0x3f) as u8;
    if i < 0 {
        first |= 0x40;
    }
    mag >>= 6;
    if mag != 0 {
        first |= 0x80;
    }
    buf[0] = first;
    let mut n = 1;

    if mag == 0 {
        return n;
    }

    while mag > 0x7f {
        buf[n] = (mag & 0x7f) as u8 | 0x80;
        n += 1;
        mag >>= 7;
    }
    buf[n] = (mag & 0x7f) as u8;
    n + 1
}

/// Decodes a varuint from the front of `buf`, returning `(bytes_read, value)`.
pub fn get_var_uint(buf: &[u8]) -> Result<(usize, u64)> {
    let mut shift = 0u32;
    let mut result = 0u64;
    let mut n = 0;
    loop {
        let Some(&byte) = buf.get(n) else {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        };
        n += 1;
        result |= u64::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((n, result));
        }
        if shift > 64 {
            return Err(PackError::InvalidPackedUint);
        }
    }
}

/// Decodes a varint from the front of `buf`, returning `(bytes_read, value)`.
pub fn get_var_int(buf: &[u8]) -> Result<(usize, i64)> {
    let Some(&first) = buf.first() else {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    };
    let mut n = 1;
    let mut mag = u64::from(first & 0x3f);
    let negative = first & 0x40 != 0;
    let mut shift = 6u32;

    if first & 0x80 != 0 {
        loop {
            let Some(&byte) = buf.get(n) else {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            };
            n += 1;
            mag |= u64::from(byte & 0x7f) << shift;
            shift += 7;
            if byte & 0x80 == 0 {
                break;
            }
            if shift > 64 {
                return Err(PackError::InvalidPackedInt);
            }
        }
    }

    Ok((n, apply_sign(mag, negative)))
}

/// Writes `i` to `w` as a varuint, returning how many bytes were written.
pub fn write_var_uint(w: &mut impl Write, i: u64) -> Result<usize> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let n = put_var_uint(i, &mut buf);
    w.write_all(&buf[..n])?;
    Ok(n)
}

/// Writes `i` to `w` as a varint, returning how many bytes were written.
pub fn write_var_int(w: &mut impl Write, i: i64) -> Result<usize> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let n = put_var_int(i, &mut buf);
    w.write_all(&buf[..n])?;
    Ok(n)
}

/// Reads a varuint from `w`, returning `(bytes_read, value)`.
pub fn read_var_uint(r: &mut impl Read) -> Result<(usize, u64)> {
    let mut total = 0;
    let mut shift = 0u32;
    let mut result = 0u64;
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        total += 1;
        result |= u64::from(byte[0] & 0x7f) << shift;
        shift += 7;
        if byte[0] & 0x80 == 0 {
            return Ok((total, result));
        }
        if shift > 64 {
            return Err(PackError::InvalidPackedUint);
        }
    }
}

/// Reads a varint from `r`, returning `(bytes_read, value)`.
pub fn read_var_int(r: &mut impl Read) -> Result<(usize, i64)> {
    let mut byte = [0u8; 1];
    r.read_exact(&mut byte)?;
    let mut total = 1;

    let mut mag = u64::from(byte[0] & 0x3f);
    let negative = byte[0] & 0x40 != 0;
    let mut shift = 6u32;

    if byte[0] & 0x80 != 0 {
        loop {
            r.read_exact(&mut byte)?;
            total += 1;
            mag |= u64::from(byte[0] & 0x7f) << shift;
            shift += 7;
            if byte[0] & 0x80 == 0 {
                break;
            }
            if shift > 64 {
                return Err(PackError::InvalidPackedInt);
            }
        }
    }

    Ok((total, apply_sign(mag, negative)))
}

/// Negative zero collapses onto zero; a magnitude of 2^63 lands on i64::MIN.
fn apply_sign(mag: u64, negative: bool) -> i64 {
    if negative {
        (mag as i64).wrapping_neg()
    } else {
        mag as i64
    }
}
