//! Write-observation hook
//!
//! An observer sees every block exactly once, in stream order, with both its
//! uncompressed and compressed bytes, before the compressed bytes reach the
//! sink. Index builders use this to record block offsets.

use std::sync::{Arc, Mutex};

/// Callback invoked for each block before it is written
///
/// Any `FnMut(&[u8], &[u8]) + Send` closure is an observer.
///
/// # Example
///
/// ```
/// use ordered_bgzf::ParallelBgzfWriter;
///
/// # fn main() -> ordered_bgzf::Result<()> {
/// let mut offsets = Vec::new();
/// let mut offset = 0u64;
/// let (tx, rx) = std::sync::mpsc::channel();
///
/// let mut writer = ParallelBgzfWriter::new(Vec::new())?;
/// writer.set_write_handler(move |_raw: &[u8], compressed: &[u8]| {
///     tx.send(offset).ok();
///     offset += compressed.len() as u64;
/// });
/// writer.write(b"chr1\t100\n")?;
/// writer.finish()?;
///
/// offsets.extend(rx.try_iter());
/// assert_eq!(offsets, vec![0]);
/// # Ok(())
/// # }
/// ```
pub trait BlockObserver: Send {
    /// Observe one block
    fn on_block(&mut self, raw: &[u8], compressed: &[u8]);
}

impl<F> BlockObserver for F
where
    F: FnMut(&[u8], &[u8]) + Send,
{
    fn on_block(&mut self, raw: &[u8], compressed: &[u8]) {
        self(raw, compressed)
    }
}

/// Observer handle carried by every in-flight block
///
/// Each task keeps the observer that was registered when it was submitted,
/// so replacing the handler only affects later blocks.
#[derive(Clone)]
pub(crate) struct SharedObserver(Arc<Mutex<Box<dyn BlockObserver>>>);

impl SharedObserver {
    pub(crate) fn new<O: BlockObserver + 'static>(observer: O) -> Self {
        let observer: Box<dyn BlockObserver> = Box::new(observer);
        Self(Arc::new(Mutex::new(observer)))
    }

    pub(crate) fn notify(&self, raw: &[u8], compressed: &[u8]) {
        let mut observer = match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Block observer panicked earlier, continuing with its state");
                poisoned.into_inner()
            }
        };
        observer.on_block(raw, compressed);
    }
}

impl std::fmt::Debug for SharedObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SharedObserver")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_closure_observer_sees_both_representations() {
        let (tx, rx) = mpsc::channel();
        let observer = SharedObserver::new(move |raw: &[u8], compressed: &[u8]| {
            tx.send((raw.to_vec(), compressed.to_vec())).unwrap();
        });

        observer.notify(b"raw", b"packed");
        let clone = observer.clone();
        clone.notify(b"raw2", b"packed2");

        let seen: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                (b"raw".to_vec(), b"packed".to_vec()),
                (b"raw2".to_vec(), b"packed2".to_vec()),
            ]
        );
    }

    struct Counter {
        blocks: usize,
        tx: mpsc::Sender<usize>,
    }

    impl BlockObserver for Counter {
        fn on_block(&mut self, _raw: &[u8], _compressed: &[u8]) {
            self.blocks += 1;
            self.tx.send(self.blocks).unwrap();
        }
    }

    #[test]
    fn test_struct_observer_keeps_state() {
        let (tx, rx) = mpsc::channel();
        let observer = SharedObserver::new(Counter { blocks: 0, tx });
        for _ in 0..3 {
            observer.notify(b"", b"");
        }
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
