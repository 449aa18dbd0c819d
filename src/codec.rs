use zstd::zstd_safe;

use crate::{
    DEFAULT_COMPRESSION_LEVEL, MAX_BLOCK_BYTES, Result,
    error::{CodecError, Error},
};

/// A block-oriented, lossless byte compressor
///
/// The store format does not depend on a particular algorithm: anything that can
/// bound its output, round-trip a buffer, and report the decompressed size of a
/// payload from the payload itself satisfies the block layout.
pub trait Codec {
    /// Upper bound on the compressed size of `len` input bytes
    fn bound(&self, len: usize) -> usize;

    /// Compresses `src` into `dst`, replacing its contents
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()>;

    /// Number of bytes `src` decompresses to, as declared by its own framing
    fn decompressed_len(&self, src: &[u8]) -> Result<usize>;

    /// Decompresses `src` into `dst`, which will hold exactly `expected_len` bytes
    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>, expected_len: usize) -> Result<()>;
}

/// ZSTD implementation of [`Codec`] with reusable contexts
///
/// Frames are written with their content size and a checksum so that payload
/// corruption surfaces as a decompression error.
pub struct ZstdCodec {
    level: i32,
    cctx: zstd_safe::CCtx<'static>,
    dctx: zstd_safe::DCtx<'static>,
}
impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}
impl Clone for ZstdCodec {
    fn clone(&self) -> Self {
        Self::new(self.level)
    }
}
impl ZstdCodec {
    #[must_use]
    pub fn new(level: i32) -> Self {
        Self {
            level,
            cctx: zstd_safe::CCtx::create(),
            dctx: zstd_safe::DCtx::create(),
        }
    }

    #[must_use]
    pub fn level(&self) -> i32 {
        self.level
    }

    /// Sets the sticky compression parameters
    ///
    /// Called before every compression since a failed call may reset the context.
    fn init_compressor(&mut self) -> Result<()> {
        self.cctx
            .set_parameter(zstd_safe::CParameter::CompressionLevel(self.level))
            .map_err(compression_error)?;
        self.cctx
            .set_parameter(zstd_safe::CParameter::ChecksumFlag(true))
            .map_err(compression_error)?;
        self.cctx
            .set_parameter(zstd_safe::CParameter::ContentSizeFlag(true))
            .map_err(compression_error)?;
        Ok(())
    }
}
impl Codec for ZstdCodec {
    fn bound(&self, len: usize) -> usize {
        zstd_safe::compress_bound(len)
    }

    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<()> {
        self.init_compressor()?;

        // size the destination to the worst case before compressing into it
        dst.clear();
        dst.resize(self.bound(src.len()), 0);

        let true_size = self
            .cctx
            .compress2(dst.as_mut_slice(), src)
            .map_err(compression_error)?;

        // clip to the true size
        dst.truncate(true_size);
        Ok(())
    }

    fn decompressed_len(&self, src: &[u8]) -> Result<usize> {
        let size = match zstd_safe::get_frame_content_size(src) {
            Ok(Some(size)) => size,
            Ok(None) => return Err(CodecError::MissingContentSize.into()),
            Err(_) => return Err(CodecError::Decompression("Invalid frame header").into()),
        };
        match usize::try_from(size) {
            Ok(size) if size <= MAX_BLOCK_BYTES => Ok(size),
            _ => Err(CodecError::ContentSizeTooLarge {
                size,
                max: MAX_BLOCK_BYTES,
            }
            .into()),
        }
    }

    fn decompress(&mut self, src: &[u8], dst: &mut Vec<u8>, expected_len: usize) -> Result<()> {
        dst.clear();
        // one spare byte so that an oversized frame is reported as a mismatch
        dst.resize(expected_len + 1, 0);

        let actual = self
            .dctx
            .decompress(dst.as_mut_slice(), src)
            .map_err(|code| CodecError::Decompression(zstd_safe::get_error_name(code)))?;
        if actual != expected_len {
            return Err(CodecError::SizeMismatch {
                expected: expected_len,
                actual,
            }
            .into());
        }
        dst.truncate(actual);
        Ok(())
    }
}

fn compression_error(code: zstd_safe::ErrorCode) -> Error {
    CodecError::Compression(zstd_safe::get_error_name(code)).into()
}
