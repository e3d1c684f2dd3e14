//! Error types for ordered-bgzf

use std::io;
use thiserror::Error;

/// Result type alias for ordered-bgzf operations
pub type Result<T> = std::result::Result<T, BgzfError>;

/// Error types that can occur while writing a BGZF stream
#[derive(Debug, Error)]
pub enum BgzfError {
    /// Compression level outside `[-1, 9]`
    #[error("Invalid compression level {0}: expected a value in [-1, 9]")]
    InvalidCompressionLevel(i32),

    /// Nominal or maximum block size out of range
    #[error("Invalid block size {block_size}: must be in 1..={max_block_size}")]
    InvalidBlockSize {
        /// Requested size
        block_size: usize,
        /// Largest size accepted
        max_block_size: usize,
    },

    /// Sink write, flush or close failure
    #[error("I/O error on {stream} during {context}: {source}")]
    Io {
        /// Identifier of the output stream
        stream: String,
        /// Operation that failed
        context: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// A worker failed to compress a block
    #[error("Compression of block {block} failed: {message}")]
    CompressionTask {
        /// Zero-based submission index of the block
        block: u64,
        /// Error message from the worker
        message: String,
    },

    /// The writer hit a fatal error earlier and can no longer be used
    #[error("Writer is unusable after an earlier fatal error")]
    Poisoned,
}

impl BgzfError {
    /// Whether this error was raised by configuration validation
    ///
    /// Configuration errors are raised before any sink I/O takes place.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidCompressionLevel(_) | Self::InvalidBlockSize { .. }
        )
    }

    pub(crate) fn io(stream: &str, context: &'static str, source: io::Error) -> Self {
        Self::Io {
            stream: stream.to_string(),
            context,
            source,
        }
    }
}

impl From<BgzfError> for io::Error {
    fn from(err: BgzfError) -> Self {
        match err {
            BgzfError::Io { source, .. } => source,
            BgzfError::InvalidCompressionLevel(_) | BgzfError::InvalidBlockSize { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
