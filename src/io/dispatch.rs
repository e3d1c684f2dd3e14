//! Task dispatcher: hands filled raw slots to the worker pool
//!
//! Each submission becomes one rayon task that owns its [`SlotPair`] until it
//! finishes, then sends the pair back over a one-shot channel. The
//! [`TaskHandle`] on the producer side is the receiving end: polling it is a
//! non-blocking `try_recv`, waiting on it is a blocking `recv`.

use crate::error::{BgzfError, Result};
use crate::io::arena::SlotPair;
use crate::io::compression::{BlockCompressor, CompressionLevel};
use crate::io::observer::SharedObserver;
use rayon::ThreadPool;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

/// A block whose compression task has resolved successfully
#[derive(Debug)]
pub struct FinishedBlock {
    /// Zero-based submission index
    pub seq: u64,
    /// Arena pair the block lives in
    pub slot: usize,
    /// Raw bytes and the compressed block built from them
    pub buffers: SlotPair,
    pub(crate) observer: Option<SharedObserver>,
}

type TaskOutcome = std::result::Result<SlotPair, String>;

#[derive(Debug)]
enum HandleState {
    Pending(Receiver<TaskOutcome>),
    Done(TaskOutcome),
}

/// Handle to one in-flight compression task
#[derive(Debug)]
pub struct TaskHandle {
    seq: u64,
    slot: usize,
    state: HandleState,
    observer: Option<SharedObserver>,
}

impl TaskHandle {
    /// Submission index of the block
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Arena pair owned by the task
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Non-blocking completion check
    pub fn is_done(&mut self) -> bool {
        let outcome = match &self.state {
            HandleState::Done(_) => return true,
            HandleState::Pending(rx) => match rx.try_recv() {
                Ok(outcome) => outcome,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => Err(WORKER_VANISHED.to_string()),
            },
        };
        self.state = HandleState::Done(outcome);
        true
    }

    /// Block until the task resolves
    ///
    /// # Errors
    ///
    /// [`BgzfError::CompressionTask`] if the compressor returned an error,
    /// panicked, or the worker went away without answering.
    pub fn wait(self) -> Result<FinishedBlock> {
        let outcome = match self.state {
            HandleState::Done(outcome) => outcome,
            HandleState::Pending(rx) if rayon::current_thread_index().is_some() => wait_on_worker(&rx),
            HandleState::Pending(rx) => rx.recv().unwrap_or_else(|_| Err(WORKER_VANISHED.to_string())),
        };

        match outcome {
            Ok(buffers) => Ok(FinishedBlock {
                seq: self.seq,
                slot: self.slot,
                buffers,
                observer: self.observer,
            }),
            Err(message) => Err(BgzfError::CompressionTask {
                block: self.seq,
                message,
            }),
        }
    }
}

const WORKER_VANISHED: &str = "worker exited without returning a result";

/// Wait for a result while running on a rayon worker thread
///
/// A blocking `recv` here could park the only thread able to run the task
/// (a writer driven from inside its own single-thread pool). Run pending
/// pool work in the meantime instead.
fn wait_on_worker(rx: &Receiver<TaskOutcome>) -> TaskOutcome {
    loop {
        match rx.try_recv() {
            Ok(outcome) => return outcome,
            Err(TryRecvError::Disconnected) => return Err(WORKER_VANISHED.to_string()),
            Err(TryRecvError::Empty) => match rayon::yield_now() {
                Some(rayon::Yield::Executed) => {}
                _ => std::thread::yield_now(),
            },
        }
    }
}

/// Where compression runs
enum Executor {
    /// On the calling thread, during `submit`
    Inline,
    /// On a rayon pool
    Pool(Arc<ThreadPool>),
}

/// Submits raw slots for compression and numbers them
pub struct Dispatcher {
    executor: Executor,
    compressor: Arc<dyn BlockCompressor>,
    level: CompressionLevel,
    submitted: u64,
}

impl Dispatcher {
    /// Dispatcher compressing on the calling thread
    pub fn inline(compressor: Arc<dyn BlockCompressor>, level: CompressionLevel) -> Self {
        Self {
            executor: Executor::Inline,
            compressor,
            level,
            submitted: 0,
        }
    }

    /// Dispatcher using an existing pool
    pub fn with_pool(
        pool: Arc<ThreadPool>,
        compressor: Arc<dyn BlockCompressor>,
        level: CompressionLevel,
    ) -> Self {
        Self {
            executor: Executor::Pool(pool),
            compressor,
            level,
            submitted: 0,
        }
    }

    /// Dispatcher with a dedicated pool of `workers` threads
    ///
    /// `workers == 0` compresses inline. Falls back to inline compression if
    /// the pool cannot be created (e.g., thread limits).
    pub fn spawn(workers: usize, compressor: Arc<dyn BlockCompressor>, level: CompressionLevel) -> Self {
        if workers == 0 {
            return Self::inline(compressor, level);
        }

        match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bgzf-worker-{}", i))
            .build()
        {
            Ok(pool) => Self::with_pool(Arc::new(pool), compressor, level),
            Err(e) => {
                log::warn!("Could not start {} bgzf workers ({}), compressing inline", workers, e);
                Self::inline(compressor, level)
            }
        }
    }

    /// Threads doing compression (0 when inline)
    pub fn workers(&self) -> usize {
        match &self.executor {
            Executor::Inline => 0,
            Executor::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Compression level applied to every block
    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Blocks submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Start compressing `buffers.raw` into `buffers.compressed`
    pub(crate) fn submit(
        &mut self,
        slot: usize,
        buffers: SlotPair,
        observer: Option<SharedObserver>,
    ) -> TaskHandle {
        let seq = self.submitted;
        self.submitted += 1;

        log::trace!("submit block {} (slot {}, {} bytes)", seq, slot, buffers.raw.len());

        let state = match &self.executor {
            Executor::Inline => {
                HandleState::Done(run_task(self.compressor.as_ref(), self.level, buffers))
            }
            Executor::Pool(pool) => {
                let (tx, rx) = mpsc::sync_channel(1);
                let compressor = Arc::clone(&self.compressor);
                let level = self.level;
                pool.spawn(move || {
                    // Receiver is gone once the writer is poisoned
                    let _ = tx.send(run_task(compressor.as_ref(), level, buffers));
                });
                HandleState::Pending(rx)
            }
        };

        TaskHandle {
            seq,
            slot,
            state,
            observer,
        }
    }
}

fn run_task(compressor: &dyn BlockCompressor, level: CompressionLevel, mut buffers: SlotPair) -> TaskOutcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let SlotPair { raw, compressed } = &mut buffers;
        compressor.compress(raw, level, compressed)
    }));

    match result {
        Ok(Ok(())) => Ok(buffers),
        Ok(Err(e)) => Err(e.to_string()),
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("compressor panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("compressor panicked: {}", msg)
    } else {
        "compressor panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::compression::DeflateCompressor;
    use std::io;

    fn pair(data: &[u8]) -> SlotPair {
        SlotPair {
            raw: data.to_vec(),
            compressed: Vec::new(),
        }
    }

    struct Failing;

    impl BlockCompressor for Failing {
        fn compress(&self, _raw: &[u8], _level: CompressionLevel, _dst: &mut Vec<u8>) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
        }
    }

    struct Panicking;

    impl BlockCompressor for Panicking {
        fn compress(&self, _raw: &[u8], _level: CompressionLevel, _dst: &mut Vec<u8>) -> io::Result<()> {
            panic!("boom")
        }
    }

    #[test]
    fn test_inline_handles_are_born_done() {
        let mut dispatcher = Dispatcher::inline(Arc::new(DeflateCompressor), CompressionLevel::DEFAULT);
        assert_eq!(dispatcher.workers(), 0);

        let mut handle = dispatcher.submit(3, pair(b"ACGT"), None);
        assert!(handle.is_done());
        assert_eq!(handle.seq(), 0);
        assert_eq!(handle.slot(), 3);

        let block = handle.wait().unwrap();
        assert_eq!(block.buffers.raw, b"ACGT");
        assert_eq!(&block.buffers.compressed[..2], &[31, 139]);
        assert_eq!(dispatcher.submitted(), 1);
    }

    #[test]
    fn test_pool_tasks_resolve_in_any_order_but_keep_identity() {
        let mut dispatcher = Dispatcher::spawn(4, Arc::new(DeflateCompressor), CompressionLevel::DEFAULT);
        assert_eq!(dispatcher.workers(), 4);

        let handles: Vec<_> = (0..32u8)
            .map(|i| dispatcher.submit(i as usize, pair(&[i; 100]), None))
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let block = handle.wait().unwrap();
            assert_eq!(block.seq, i as u64);
            assert_eq!(block.slot, i);
            assert_eq!(block.buffers.raw, vec![i as u8; 100]);
        }
    }

    #[test]
    fn test_compressor_error_surfaces_at_wait() {
        let mut dispatcher = Dispatcher::spawn(2, Arc::new(Failing), CompressionLevel::DEFAULT);
        let handle = dispatcher.submit(0, pair(b"x"), None);
        match handle.wait() {
            Err(BgzfError::CompressionTask { block, message }) => {
                assert_eq!(block, 0);
                assert!(message.contains("disk on fire"));
            }
            other => panic!("expected CompressionTask error, got {:?}", other),
        }
    }

    #[test]
    fn test_compressor_panic_is_contained() {
        let mut dispatcher = Dispatcher::spawn(1, Arc::new(Panicking), CompressionLevel::DEFAULT);
        let _ = dispatcher.submit(0, pair(b"x"), None);
        let handle = dispatcher.submit(1, pair(b"y"), None);
        match handle.wait() {
            Err(BgzfError::CompressionTask { block, message }) => {
                assert_eq!(block, 1);
                assert!(message.contains("boom"));
            }
            other => panic!("expected CompressionTask error, got {:?}", other),
        }
    }
}
