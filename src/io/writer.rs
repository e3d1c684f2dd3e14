//! Parallel BGZF writer
//!
//! # Architecture
//!
//! One producer thread (the caller) does everything except compression:
//!
//! 1. `write` copies bytes into the current raw slot until it would overflow
//! 2. A full slot is submitted to the worker pool and its handle pushed onto
//!    the [`OrderingWindow`]; the writer moves on to the next arena pair
//! 3. Resolved handles at the front of the window are retired: the observer
//!    sees the block, then the compressed bytes go to the sink and the pair
//!    returns to the [`BufferArena`]
//! 4. `flush` waits for every outstanding block; `close` also appends the
//!    EOF marker
//!
//! # Memory Guarantees
//!
//! With `K = 16 × max(workers, 1)` the window holds at most `K` handles and
//! the arena holds `K + 1` pairs of `max_block_size` bytes each:
//! - 4 workers: 65 pairs × 2 × 64 KB ≈ 8.1 MB
//! - 8 workers: 129 pairs × 2 × 64 KB ≈ 16.1 MB
//!
//! Nothing else grows with the amount of data written.

use crate::config::{window_capacity_for, WriterConfig};
use crate::error::{BgzfError, Result};
use crate::io::arena::{BufferArena, SlotPair};
use crate::io::compression::{BlockCompressor, CompressionLevel, DeflateCompressor};
use crate::io::dispatch::{Dispatcher, FinishedBlock};
use crate::io::observer::{BlockObserver, SharedObserver};
use crate::io::sink::{BlockSink, DataSink, UNNAMED_STREAM};
use crate::io::window::OrderingWindow;
use rayon::ThreadPool;
use std::io::{self, Write};
use std::mem;
use std::sync::Arc;

/// Counters describing what a writer has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Blocks handed to the worker pool
    pub blocks_submitted: u64,
    /// Data blocks written to the sink (EOF marker excluded)
    pub blocks_written: u64,
    /// Uncompressed bytes accepted by `write`
    pub bytes_in: u64,
    /// Compressed bytes written to the sink
    pub bytes_out: u64,
    /// Most handles ever outstanding in the ordering window
    pub peak_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Open,
    Poisoned,
    Closed,
}

/// BGZF writer that compresses blocks in parallel and writes them in order
///
/// # Example
///
/// ```
/// use ordered_bgzf::{ParallelBgzfWriter, WriterConfig};
///
/// # fn main() -> ordered_bgzf::Result<()> {
/// let config = WriterConfig::default().with_workers(2).with_level(6);
/// let mut writer = ParallelBgzfWriter::with_config(Vec::new(), config)?;
///
/// writer.write(b"@read1\nACGT\n+\nIIII\n")?;
/// let bytes = writer.finish()?;
///
/// // One data block followed by the 28-byte EOF marker
/// assert_eq!(&bytes[bytes.len() - 28..], &ordered_bgzf::BGZF_EOF);
/// # Ok(())
/// # }
/// ```
pub struct ParallelBgzfWriter<W: Write> {
    sink: Option<BlockSink<W>>,
    arena: BufferArena,
    window: OrderingWindow,
    dispatcher: Dispatcher,
    current: SlotPair,
    cursor: usize,
    block_size: usize,
    observer: Option<SharedObserver>,
    state: WriterState,
    bytes_in: u64,
}

impl<W: Write> ParallelBgzfWriter<W> {
    /// Writer with the default configuration (level -1, global pool size)
    pub fn new(inner: W) -> Result<Self> {
        Self::with_config(inner, WriterConfig::default())
    }

    /// Writer with a dedicated worker pool sized by `config`
    ///
    /// # Errors
    ///
    /// Configuration errors from [`WriterConfig::validate`]; nothing is
    /// written to `inner` in that case.
    pub fn with_config(inner: W, config: WriterConfig) -> Result<Self> {
        Self::with_compressor(inner, config, Arc::new(DeflateCompressor))
    }

    /// Writer using a custom block compressor
    pub fn with_compressor(
        inner: W,
        config: WriterConfig,
        compressor: Arc<dyn BlockCompressor>,
    ) -> Result<Self> {
        let level = config.validate()?;
        let dispatcher = Dispatcher::spawn(config.resolved_workers(), compressor, level);
        Ok(Self::assemble(inner, &config, dispatcher))
    }

    /// Writer sharing an existing rayon pool
    ///
    /// The worker count (and so the window size) is the pool's thread count;
    /// `config.workers` is ignored.
    pub fn with_thread_pool(inner: W, config: WriterConfig, pool: Arc<ThreadPool>) -> Result<Self> {
        let level = config.validate()?;
        let dispatcher = Dispatcher::with_pool(pool, Arc::new(DeflateCompressor), level);
        Ok(Self::assemble(inner, &config, dispatcher))
    }

    fn assemble(inner: W, config: &WriterConfig, dispatcher: Dispatcher) -> Self {
        let capacity = window_capacity_for(dispatcher.workers());
        let mut arena = BufferArena::new(capacity, config.max_block_size);
        let current = arena.checkout(0).unwrap_or_default();
        let stream = config
            .stream_name
            .clone()
            .unwrap_or_else(|| UNNAMED_STREAM.to_string());

        log::debug!(
            "bgzf writer on {}: {} workers, window {}, {} arena slots of {} bytes, block size {}, level {}",
            stream,
            dispatcher.workers(),
            capacity,
            arena.slot_count(),
            arena.slot_capacity(),
            config.block_size,
            dispatcher.level().get()
        );

        Self {
            sink: Some(BlockSink::new(inner, stream)),
            arena,
            window: OrderingWindow::new(capacity),
            dispatcher,
            current,
            cursor: 0,
            block_size: config.block_size,
            observer: None,
            state: WriterState::Open,
            bytes_in: 0,
        }
    }

    /// Register the hook invoked for every block submitted from now on
    pub fn set_write_handler<O: BlockObserver + 'static>(&mut self, observer: O) {
        self.observer = Some(SharedObserver::new(observer));
    }

    /// Stop observing blocks submitted from now on
    pub fn clear_write_handler(&mut self) {
        self.observer = None;
    }

    /// Accept all of `buf`, submitting blocks as the current one fills up
    ///
    /// Always returns `buf.len()` on success, however large `buf` is.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        let result = self.accumulate(buf);
        self.poison_on_err(result)
    }

    /// Submit the current partial block, if any
    ///
    /// Format writers call this to start a record on a block boundary.
    pub fn flush_block(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.submit_current();
        self.poison_on_err(result)
    }

    /// Submit the current block, wait for every outstanding block to be
    /// written, then flush the sink
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        let result = self.flush_all();
        self.poison_on_err(result)
    }

    /// Flush, append the EOF marker, release the arena and return the sink
    pub fn finish(mut self) -> Result<W> {
        self.ensure_open()?;
        let result = self.finalize();
        self.poison_on_err(result)?;

        self.sink
            .take()
            .map(BlockSink::into_inner)
            .ok_or(BgzfError::Poisoned)
    }

    /// Flush, append the EOF marker, release the arena and close the sink
    pub fn close(self) -> Result<()> {
        self.finish().map(drop)
    }

    /// Snapshot of the writer's counters
    pub fn stats(&self) -> WriterStats {
        let (blocks_written, bytes_out) = self
            .sink
            .as_ref()
            .map(|sink| (sink.blocks_written(), sink.bytes_out()))
            .unwrap_or_default();

        WriterStats {
            blocks_submitted: self.dispatcher.submitted(),
            blocks_written,
            bytes_in: self.bytes_in,
            bytes_out,
            peak_in_flight: self.window.peak(),
        }
    }

    /// Ordering window capacity `K`
    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Compression threads (0 when compressing inline)
    pub fn workers(&self) -> usize {
        self.dispatcher.workers()
    }

    /// Compression level applied to every block
    pub fn level(&self) -> CompressionLevel {
        self.dispatcher.level()
    }

    /// Bytes waiting in the current, not yet submitted block
    pub fn pending_bytes(&self) -> usize {
        self.current.raw.len()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            WriterState::Open => Ok(()),
            WriterState::Poisoned | WriterState::Closed => Err(BgzfError::Poisoned),
        }
    }

    fn poison_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let dropped = self.window.discard();
            log::debug!("bgzf writer failed ({}), discarding {} outstanding blocks", e, dropped);
            self.state = WriterState::Poisoned;
        }
        result
    }

    fn accumulate(&mut self, buf: &[u8]) -> Result<usize> {
        let mut remaining = buf;

        loop {
            let space = self.block_size - self.current.raw.len();
            if remaining.len() <= space {
                break;
            }
            let (head, tail) = remaining.split_at(space);
            self.current.raw.extend_from_slice(head);
            remaining = tail;
            self.submit_current()?;
        }

        self.current.raw.extend_from_slice(remaining);
        self.bytes_in += buf.len() as u64;
        Ok(buf.len())
    }

    fn submit_current(&mut self) -> Result<()> {
        let Self {
            sink,
            arena,
            window,
            dispatcher,
            current,
            cursor,
            observer,
            ..
        } = self;
        let sink = sink.as_mut().ok_or(BgzfError::Poisoned)?;

        if current.raw.is_empty() {
            return Ok(());
        }

        if window.is_full() {
            window.drain_front(|block| retire(sink, arena, block))?;
        }

        let handle = dispatcher.submit(*cursor, mem::take(current), observer.clone());
        window.push(handle, |block| retire(sink, arena, block))?;

        *cursor = arena.next_index(*cursor);
        *current = loop {
            if let Some(pair) = arena.checkout(*cursor) {
                break pair;
            }
            // Only reachable if the arena were smaller than the window allows
            if !window.drain_front(|block| retire(sink, arena, block))? {
                break SlotPair::default();
            }
        };

        window.drain_ready(|block| retire(sink, arena, block))?;
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        self.submit_current()?;

        let Self { sink, arena, window, .. } = self;
        let sink = sink.as_mut().ok_or(BgzfError::Poisoned)?;
        window.drain_all(|block| retire(sink, arena, block))?;
        sink.flush()
    }

    fn finalize(&mut self) -> Result<()> {
        self.flush_all()?;

        let sink = self.sink.as_mut().ok_or(BgzfError::Poisoned)?;
        sink.write_eof()?;
        sink.flush()?;

        log::debug!(
            "bgzf writer on {} closed: {} blocks, {} bytes in, {} bytes out",
            sink.stream(),
            sink.blocks_written(),
            self.bytes_in,
            sink.bytes_out()
        );

        self.state = WriterState::Closed;
        self.arena.release();
        self.current = SlotPair::default();
        Ok(())
    }
}

/// Hand a finished block to the sink and its buffers back to the arena
fn retire<W: Write>(sink: &mut BlockSink<W>, arena: &mut BufferArena, block: FinishedBlock) -> Result<()> {
    log::trace!(
        "retire block {} (slot {}, {} -> {} bytes)",
        block.seq,
        block.slot,
        block.buffers.raw.len(),
        block.buffers.compressed.len()
    );

    sink.write_result(
        &block.buffers.raw,
        &block.buffers.compressed,
        block.observer.as_ref(),
    )?;
    arena.checkin(block.slot, block.buffers);
    Ok(())
}

impl ParallelBgzfWriter<Box<dyn Write + Send>> {
    /// Open `sink` and build a writer for it
    ///
    /// The configuration is validated before the destination is created.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ordered_bgzf::{ParallelBgzfWriter, WriterConfig};
    /// use ordered_bgzf::io::DataSink;
    ///
    /// # fn main() -> ordered_bgzf::Result<()> {
    /// let sink = DataSink::from_path("calls.vcf.gz");
    /// let mut writer = ParallelBgzfWriter::from_sink(sink, WriterConfig::default())?;
    /// writer.write(b"##fileformat=VCFv4.3\n")?;
    /// writer.close()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_sink(sink: DataSink, config: WriterConfig) -> Result<Self> {
        config.validate()?;
        let inner = sink.open()?;
        let config = if config.stream_name.is_none() {
            config.with_stream_name(sink.name())
        } else {
            config
        };
        Self::with_config(inner, config)
    }
}

impl<W: Write> Write for ParallelBgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        ParallelBgzfWriter::write(self, buf).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        ParallelBgzfWriter::flush(self).map_err(io::Error::from)
    }
}

impl<W: Write> Drop for ParallelBgzfWriter<W> {
    fn drop(&mut self) {
        match self.state {
            WriterState::Closed => {}
            WriterState::Open => {
                // Best-effort close; call close()/finish() to see errors
                if let Err(e) = self.finalize() {
                    log::warn!("bgzf writer dropped without close, finalizing failed: {}", e);
                    self.window.discard();
                }
            }
            WriterState::Poisoned => {
                log::warn!("bgzf writer dropped after a fatal error; output is incomplete");
            }
        }
    }
}

impl<W: Write> std::fmt::Debug for ParallelBgzfWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelBgzfWriter")
            .field("state", &self.state)
            .field("workers", &self.dispatcher.workers())
            .field("window", &self.window.len())
            .field("pending_bytes", &self.current.raw.len())
            .field("stats", &self.stats())
            .finish()
    }
}
