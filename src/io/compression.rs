//! BGZF block codec: the compressor collaborator used by the parallel writer
//!
//! # BGZF Format
//!
//! A BGZF file is a series of independent gzip members. Each member carries
//! an extra field with the `BC` subfield recording its own compressed size,
//! which is what makes random access at block boundaries possible. The stream
//! ends with a fixed 28-byte empty member, [`BGZF_EOF`].
//!
//! The writer never looks inside a block. It hands a raw slot and an empty
//! compressed slot to a [`BlockCompressor`] and copies whatever comes back to
//! the sink, so any codec producing valid BGZF members can be plugged in.

use crate::error::{BgzfError, Result};
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::{self, Write};

/// Largest size of a BGZF block, compressed or not (BSIZE is a u16 of size - 1)
pub const BGZF_MAX_BLOCK_SIZE: usize = 65536;

/// Nominal uncompressed bytes per block (0xFF00)
///
/// Leaves room for the deflate stored-block overhead plus header and trailer,
/// so even incompressible input fits in [`BGZF_MAX_BLOCK_SIZE`].
pub const BGZF_BLOCK_SIZE: usize = 0xFF00;

/// Empty BGZF block that marks the logical end of a stream
pub const BGZF_EOF: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // Header (10 bytes)
    6, 0, 66, 67, 2, 0, 27, 0, // Extra field with BSIZE=27 (8 bytes)
    3, 0, // Empty deflate block (2 bytes)
    0, 0, 0, 0, // CRC32 (4 bytes)
    0, 0, 0, 0, // ISIZE=0 (4 bytes)
];

/// Validated deflate compression level
///
/// `-1` selects the codec default; `0` stores blocks uncompressed; `9` is the
/// slowest and smallest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompressionLevel(i32);

impl CompressionLevel {
    /// Lowest accepted level (codec default)
    pub const MIN: i32 = -1;
    /// Highest accepted level
    pub const MAX: i32 = 9;
    /// Codec default level
    pub const DEFAULT: CompressionLevel = CompressionLevel(-1);

    /// Validate a raw level
    ///
    /// # Errors
    ///
    /// [`BgzfError::InvalidCompressionLevel`] for values outside `[-1, 9]`.
    pub fn new(level: i32) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(BgzfError::InvalidCompressionLevel(level))
        }
    }

    /// Raw level value
    pub fn get(self) -> i32 {
        self.0
    }

    /// Matching flate2 setting
    pub fn to_flate2(self) -> Compression {
        match self.0 {
            level if level < 0 => Compression::default(),
            level => Compression::new(level as u32),
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Turns one raw block into one complete BGZF block
///
/// Implementations must be stateless with respect to the call: the writer
/// invokes `compress` concurrently from several worker threads, each on its
/// own disjoint `raw`/`dst` pair.
pub trait BlockCompressor: Send + Sync {
    /// Compress `raw` at `level`, replacing the contents of `dst`
    ///
    /// On success `dst` holds exactly one BGZF block of at most
    /// [`BGZF_MAX_BLOCK_SIZE`] bytes.
    fn compress(&self, raw: &[u8], level: CompressionLevel, dst: &mut Vec<u8>) -> io::Result<()>;
}

/// Default compressor: raw deflate via flate2 wrapped in a BGZF frame
#[derive(Debug, Default, Clone, Copy)]
pub struct DeflateCompressor;

impl BlockCompressor for DeflateCompressor {
    /// # BGZF Block Structure
    ///
    /// Standard gzip header (10 bytes):
    /// - ID1=31, ID2=139 (gzip magic)
    /// - CM=8 (deflate)
    /// - FLG=4 (FEXTRA flag set)
    /// - MTIME=0 (no timestamp)
    /// - XFL=0
    /// - OS=255 (unknown)
    ///
    /// Extra field (8 bytes):
    /// - XLEN=6
    /// - SI1=66 ('B'), SI2=67 ('C'), SLEN=2
    /// - BSIZE (little-endian u16): block_size - 1
    ///
    /// Compressed data + CRC32 + ISIZE
    fn compress(&self, raw: &[u8], level: CompressionLevel, dst: &mut Vec<u8>) -> io::Result<()> {
        if raw.len() > BGZF_MAX_BLOCK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Raw block of {} bytes exceeds BGZF limit of {} bytes",
                    raw.len(),
                    BGZF_MAX_BLOCK_SIZE
                ),
            ));
        }

        dst.clear();

        dst.extend_from_slice(&[31, 139, 8, 4, 0, 0, 0, 0, 0, 255]);
        dst.extend_from_slice(&6u16.to_le_bytes()); // XLEN=6
        dst.push(66); // SI1='B'
        dst.push(67); // SI2='C'
        dst.extend_from_slice(&2u16.to_le_bytes()); // SLEN=2

        // BSIZE placeholder, patched once the total is known
        let bsize_pos = dst.len();
        dst.extend_from_slice(&0u16.to_le_bytes());

        let mut deflate = DeflateEncoder::new(&mut *dst, level.to_flate2());
        deflate.write_all(raw)?;
        deflate.finish()?;

        dst.extend_from_slice(&crc32fast::hash(raw).to_le_bytes());
        dst.extend_from_slice(&(raw.len() as u32).to_le_bytes());

        let total_size = dst.len();
        if total_size > BGZF_MAX_BLOCK_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Compressed block of {} bytes exceeds BGZF limit of {} bytes",
                    total_size, BGZF_MAX_BLOCK_SIZE
                ),
            ));
        }

        let bsize = (total_size - 1) as u16;
        dst[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());
        Ok(())
    }
}
