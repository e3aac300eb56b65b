//! Base-128 varints and length-prefixed byte strings.
//!
//! Only the handful of primitives the market request needs. Values are
//! 32-bit; an encoding never exceeds five bytes.

use std::io::{self, Read};

use crate::error::{Error, Result};

/// Maximum encoded size of a 32-bit varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Appends `n` as a varint, least significant group first.
///
/// Zero encodes as a single `0x00` byte.
pub fn write_varint(buf: &mut Vec<u8>, mut n: u32) {
    loop {
        // Truncation keeps the low seven bits.
        #[allow(clippy::cast_possible_truncation)]
        let low = (n & 0x7f) as u8;
        n >>= 7;
        if n == 0 {
            buf.push(low);
            return;
        }
        buf.push(low | 0x80);
    }
}

/// Returns the number of bytes `write_varint` emits for `n`.
#[must_use]
pub const fn varint_len(n: u32) -> usize {
    match n {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x001f_ffff => 3,
        0x0020_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Reads one varint from `reader`.
///
/// # Errors
///
/// Returns `UnexpectedEof` if the stream ends mid-value and `InvalidData`
/// if the encoding runs past five bytes or overflows 32 bits.
pub fn read_varint<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let low = u32::from(byte[0] & 0x7f);
        let shift = 7 * i;
        // The fifth group only has four usable bits.
        if i == MAX_VARINT_LEN - 1 && low > 0x0f {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "varint overflows 32 bits"));
        }
        value |= low << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(io::Error::new(io::ErrorKind::InvalidData, "varint longer than 5 bytes"))
}

/// Appends `bytes` preceded by its length as a varint.
///
/// # Errors
///
/// Returns [`Error::FieldTooLarge`] if the length does not fit in 32 bits.
pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| Error::FieldTooLarge { len: bytes.len() })?;
    write_varint(buf, len);
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a length-prefixed byte string written by [`write_bytes`].
///
/// # Errors
///
/// Returns an error if the prefix is malformed or the stream is shorter
/// than the declared length.
pub fn read_bytes<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = read_varint(reader)? as usize;
    let mut data = vec![0u8; len];
    reader.read_exact(&mut data)?;
    Ok(data)
}
