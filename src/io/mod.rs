//! I/O module: the parallel BGZF writer and its collaborators
//!
//! Leaf to root: [`arena`] owns the block buffers, [`dispatch`] runs
//! compression tasks, [`window`] keeps their results in order, [`sink`]
//! writes them out, and [`writer`] ties the pieces together.

pub mod arena;
pub mod compression;
pub mod dispatch;
pub mod observer;
pub mod sink;
pub mod window;
pub mod writer;

pub use compression::{
    BlockCompressor, CompressionLevel, DeflateCompressor, BGZF_BLOCK_SIZE, BGZF_EOF,
    BGZF_MAX_BLOCK_SIZE,
};
pub use observer::BlockObserver;
pub use sink::DataSink;
pub use writer::{ParallelBgzfWriter, WriterStats};
