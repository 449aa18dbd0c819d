//! Variable-length integer encoding
//!
//! Every header field, record count, position delta and string length in the
//! store is written as a varint: the `i32` is reinterpreted as a `u32` and
//! emitted least-significant group first, seven bits per byte, with the high
//! bit of each byte marking a continuation.
//!
//! Small non-negative values take a single byte. Negative values always take
//! the full five bytes since their sign bit lives in the top group.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::{Result, core::utils::extension_read, error::FormatError};

/// Maximum number of bytes a 32-bit varint can occupy
pub const MAX_VARINT_BYTES: usize = 5;

/// Number of bytes `value` occupies once encoded
#[must_use]
pub fn encoded_len(value: i32) -> usize {
    let mut value = value as u32;
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Appends the varint encoding of `value` to `writer`
pub fn write_i32<W: Write>(writer: &mut W, value: i32) -> Result<()> {
    let mut value = value as u32;
    while value >= 0x80 {
        writer.write_u8((value as u8) | 0x80)?;
        value >>= 7;
    }
    writer.write_u8(value as u8)?;
    Ok(())
}

/// Reads one varint from `reader`
///
/// Exactly the bytes produced by [`write_i32`] are consumed. A stream that ends
/// mid-value is a [`FormatError::UnexpectedEndOfStream`].
pub fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut value = 0u32;
    for i in 0..MAX_VARINT_BYTES {
        let byte = match reader.read_u8() {
            Ok(byte) => byte,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(FormatError::UnexpectedEndOfStream("varint").into());
            }
            Err(e) => return Err(e.into()),
        };
        accumulate(&mut value, byte, i)?;
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(FormatError::MalformedVarint.into())
}

/// Decodes one varint from `bytes` starting at `offset`, advancing it past the value
pub fn decode_i32(bytes: &[u8], offset: &mut usize) -> Result<i32> {
    let mut value = 0u32;
    for i in 0..MAX_VARINT_BYTES {
        let Some(&byte) = bytes.get(*offset) else {
            return Err(FormatError::UnexpectedEndOfStream("varint").into());
        };
        *offset += 1;
        accumulate(&mut value, byte, i)?;
        if byte & 0x80 == 0 {
            return Ok(value as i32);
        }
    }
    Err(FormatError::MalformedVarint.into())
}

/// Folds the low seven bits of the `i`-th byte into `value`
#[inline]
fn accumulate(value: &mut u32, byte: u8, i: usize) -> Result<()> {
    // the fifth byte only has room for the top four bits of a u32
    if i == MAX_VARINT_BYTES - 1 && byte & 0xF0 != 0 {
        return Err(FormatError::MalformedVarint.into());
    }
    *value |= u32::from(byte & 0x7F) << (7 * i);
    Ok(())
}

/// Writes a varint length prefix followed by the UTF-8 bytes of `value`
pub fn write_str<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    write_i32(writer, value.len() as i32)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

/// Reads a varint-prefixed UTF-8 string from `reader`
pub fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = read_len(read_i32(reader)?)?;
    let mut buf = Vec::new();
    extension_read(reader, &mut buf, len, "string")?;
    Ok(String::from_utf8(buf).map_err(FormatError::from)?)
}

/// Decodes a varint-prefixed UTF-8 string from `bytes` starting at `offset`
pub fn decode_string(bytes: &[u8], offset: &mut usize) -> Result<String> {
    let len = read_len(decode_i32(bytes, offset)?)?;
    let Some(slice) = bytes.get(*offset..*offset + len) else {
        return Err(FormatError::UnexpectedEndOfStream("string").into());
    };
    *offset += len;
    Ok(String::from_utf8(slice.to_vec()).map_err(FormatError::from)?)
}

fn read_len(len: i32) -> Result<usize> {
    usize::try_from(len).map_err(|_| FormatError::NegativeLength(len).into())
}
