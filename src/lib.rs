//! ordered-bgzf: parallel BGZF writer with strict block ordering
//!
//! # Overview
//!
//! BGZF (the block-gzip container behind BAM, BCF, tabix-indexed VCF and
//! friends) is a series of independently compressed blocks closed by a fixed
//! empty block. Because blocks are independent they can be compressed in
//! parallel, but they must land on disk in the order they were written.
//!
//! [`ParallelBgzfWriter`] compresses blocks on a rayon pool, keeps up to
//! `16 × workers` of them in flight, and writes them strictly in submission
//! order, blocking the caller rather than queueing without bound.
//!
//! ## Key Features
//!
//! - **Ordered**: output block order always matches submission order
//! - **Bounded**: fixed pre-allocated buffer arena, no per-block allocation
//! - **Observable**: a write hook sees each raw/compressed pair before it is written
//! - **Standard**: output is readable by any gzip or BGZF reader
//!
//! ## Quick Start
//!
//! ```no_run
//! use ordered_bgzf::{ParallelBgzfWriter, WriterConfig};
//! use ordered_bgzf::io::DataSink;
//!
//! # fn main() -> ordered_bgzf::Result<()> {
//! let config = WriterConfig::default().with_workers(4);
//! let mut writer = ParallelBgzfWriter::from_sink(DataSink::from_path("out.bgz"), config)?;
//!
//! for i in 0..1_000_000 {
//!     writer.write(format!("record {}\n", i).as_bytes())?;
//! }
//! writer.close()?; // appends the EOF marker
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`config`]: writer configuration
//! - [`error`]: error type
//! - [`io`]: the writer and its collaborators (arena, dispatcher, window, sink, codec)

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod io;

// Re-export commonly used types
pub use config::WriterConfig;
pub use error::{BgzfError, Result};
pub use io::{
    BlockCompressor, BlockObserver, CompressionLevel, DeflateCompressor, ParallelBgzfWriter,
    WriterStats, BGZF_BLOCK_SIZE, BGZF_EOF, BGZF_MAX_BLOCK_SIZE,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
