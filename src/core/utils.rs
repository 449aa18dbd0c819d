use std::io::{self, Read};

use crate::{Result, error::FormatError};

/// Fills `dst` from `reader`, reporting a short stream as a format error on `what`
pub(crate) fn read_exact_or_eos<R: io::Read>(
    reader: &mut R,
    dst: &mut [u8],
    what: &'static str,
) -> Result<()> {
    match reader.read_exact(dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(FormatError::UnexpectedEndOfStream(what).into())
        }
        Err(e) => Err(e.into()),
    }
}

/// Replaces the contents of `dst` with exactly `size` bytes from `reader`
///
/// `size` usually comes from the stream itself, so the buffer only grows as bytes
/// actually arrive and a short stream fails without allocating `size` up front.
pub(crate) fn extension_read<R: io::Read>(
    reader: &mut R,
    dst: &mut Vec<u8>,
    size: usize,
    what: &'static str,
) -> Result<()> {
    dst.clear();
    let read = reader.by_ref().take(size as u64).read_to_end(dst)?;
    if read < size {
        return Err(FormatError::UnexpectedEndOfStream(what).into());
    }
    Ok(())
}

/// Reads a single byte that must be 0 or 1
pub(crate) fn read_flag<R: io::Read>(reader: &mut R, field: &'static str) -> Result<bool> {
    let mut buf = [0u8; 1];
    read_exact_or_eos(reader, &mut buf, field)?;
    match buf[0] {
        0 => Ok(false),
        1 => Ok(true),
        value => Err(FormatError::InvalidFlag { field, value }.into()),
    }
}
