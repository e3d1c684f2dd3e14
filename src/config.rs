//! Writer configuration
//!
//! All knobs live in [`WriterConfig`]. Validation happens in one place,
//! [`WriterConfig::validate`], which the writer calls before it touches the
//! sink, so a bad configuration never produces partial output.

use crate::error::{BgzfError, Result};
use crate::io::compression::{CompressionLevel, BGZF_BLOCK_SIZE, BGZF_MAX_BLOCK_SIZE};

/// Outstanding compression tasks allowed per worker
///
/// The ordering window holds `WINDOW_TASKS_PER_WORKER × max(workers, 1)`
/// handles, which bounds both the producer stall and the arena size.
pub const WINDOW_TASKS_PER_WORKER: usize = 16;

/// Configuration for [`ParallelBgzfWriter`](crate::ParallelBgzfWriter)
///
/// # Example
///
/// ```
/// use ordered_bgzf::WriterConfig;
///
/// let config = WriterConfig::default()
///     .with_level(6)
///     .with_workers(4)
///     .with_stream_name("calls.vcf.gz");
/// assert_eq!(config.window_capacity(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Compression level in `[-1, 9]`; `-1` is the codec default
    pub level: i32,
    /// Worker threads; `None` uses the global rayon pool size, `Some(0)`
    /// compresses inline on the calling thread
    pub workers: Option<usize>,
    /// Nominal uncompressed bytes per block, at most [`BGZF_BLOCK_SIZE`]
    pub block_size: usize,
    /// Capacity of each arena slot
    pub max_block_size: usize,
    /// Identifier reported in I/O errors
    pub stream_name: Option<String>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            level: CompressionLevel::DEFAULT.get(),
            workers: None,
            block_size: BGZF_BLOCK_SIZE,
            max_block_size: BGZF_MAX_BLOCK_SIZE,
            stream_name: None,
        }
    }
}

impl WriterConfig {
    /// Set the compression level
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    /// Set the number of worker threads
    ///
    /// Set to 0 to compress on the calling thread.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the nominal uncompressed block size
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the arena slot capacity
    pub fn with_max_block_size(mut self, max_block_size: usize) -> Self {
        self.max_block_size = max_block_size;
        self
    }

    /// Set the stream identifier used in error messages
    pub fn with_stream_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = Some(name.into());
        self
    }

    /// Check every setting and return the validated compression level
    ///
    /// # Errors
    ///
    /// - [`BgzfError::InvalidCompressionLevel`] for a level outside `[-1, 9]`
    /// - [`BgzfError::InvalidBlockSize`] when `max_block_size` exceeds the
    ///   BGZF limit, or `block_size` is 0 or above the smaller of
    ///   `max_block_size` and [`BGZF_BLOCK_SIZE`]
    pub fn validate(&self) -> Result<CompressionLevel> {
        let level = CompressionLevel::new(self.level)?;

        if self.max_block_size == 0 || self.max_block_size > BGZF_MAX_BLOCK_SIZE {
            return Err(BgzfError::InvalidBlockSize {
                block_size: self.max_block_size,
                max_block_size: BGZF_MAX_BLOCK_SIZE,
            });
        }
        // Incompressible input must still fit in one BGZF block
        let limit = self.max_block_size.min(BGZF_BLOCK_SIZE);
        if self.block_size == 0 || self.block_size > limit {
            return Err(BgzfError::InvalidBlockSize {
                block_size: self.block_size,
                max_block_size: limit,
            });
        }

        Ok(level)
    }

    /// Worker count after resolving the default
    pub fn resolved_workers(&self) -> usize {
        self.workers.unwrap_or_else(rayon::current_num_threads)
    }

    /// Ordering window capacity for the resolved worker count
    pub fn window_capacity(&self) -> usize {
        window_capacity_for(self.resolved_workers())
    }
}

/// `K = 16 × max(workers, 1)`
pub fn window_capacity_for(workers: usize) -> usize {
    WINDOW_TASKS_PER_WORKER * workers.max(1)
}
