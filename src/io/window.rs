//! Ordering window: bounded FIFO of in-flight compression tasks
//!
//! Workers may finish in any order, but BGZF blocks must hit the sink in the
//! order they were submitted. The window only ever looks at its front entry:
//!
//! - [`OrderingWindow::drain_ready`] retires front entries that have already
//!   resolved and stops at the first pending one.
//! - [`OrderingWindow::push`] blocks on the front entry when the window is
//!   full. This is the producer's backpressure: it waits for the oldest task
//!   instead of queueing without bound.
//! - [`OrderingWindow::drain_all`] waits for and retires everything, oldest
//!   first.
//!
//! Retiring a block is delegated to a caller-supplied closure (write to the
//! sink, return the buffers to the arena). If a task failed, the error is
//! returned and nothing behind it is retired.

use crate::error::Result;
use crate::io::dispatch::{FinishedBlock, TaskHandle};
use std::collections::VecDeque;

/// Bounded in-order queue of [`TaskHandle`]s
#[derive(Debug)]
pub struct OrderingWindow {
    handles: VecDeque<TaskHandle>,
    capacity: usize,
    peak: usize,
}

impl OrderingWindow {
    /// Window holding at most `capacity` handles (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handles: VecDeque::with_capacity(capacity),
            capacity,
            peak: 0,
        }
    }

    /// Maximum number of outstanding handles
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Outstanding handles
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing is outstanding
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Whether a push would have to wait first
    pub fn is_full(&self) -> bool {
        self.handles.len() >= self.capacity
    }

    /// Largest occupancy seen so far
    pub fn peak(&self) -> usize {
        self.peak
    }

    /// Append `handle`, first waiting on the oldest entry if the window is full
    pub fn push<F>(&mut self, handle: TaskHandle, mut retire: F) -> Result<()>
    where
        F: FnMut(FinishedBlock) -> Result<()>,
    {
        if self.is_full() {
            self.drain_front(&mut retire)?;
        }

        self.handles.push_back(handle);
        self.peak = self.peak.max(self.handles.len());
        Ok(())
    }

    /// Wait for the oldest entry and retire it
    ///
    /// Returns `false` when the window was already empty.
    pub fn drain_front<F>(&mut self, mut retire: F) -> Result<bool>
    where
        F: FnMut(FinishedBlock) -> Result<()>,
    {
        match self.handles.pop_front() {
            Some(handle) => {
                retire(handle.wait()?)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Retire leading entries that have already resolved, without blocking
    ///
    /// Returns the number of blocks retired.
    pub fn drain_ready<F>(&mut self, mut retire: F) -> Result<usize>
    where
        F: FnMut(FinishedBlock) -> Result<()>,
    {
        let mut retired = 0;
        while let Some(front) = self.handles.front_mut() {
            if !front.is_done() {
                break;
            }
            if let Some(handle) = self.handles.pop_front() {
                retire(handle.wait()?)?;
                retired += 1;
            }
        }
        Ok(retired)
    }

    /// Wait for and retire every entry, oldest first
    pub fn drain_all<F>(&mut self, mut retire: F) -> Result<usize>
    where
        F: FnMut(FinishedBlock) -> Result<()>,
    {
        let mut retired = 0;
        while self.drain_front(&mut retire)? {
            retired += 1;
        }
        Ok(retired)
    }

    /// Drop every outstanding handle without retiring it
    ///
    /// Tasks still running finish in the background and their results are
    /// discarded.
    pub fn discard(&mut self) -> usize {
        let dropped = self.handles.len();
        self.handles.clear();
        dropped
    }
}
