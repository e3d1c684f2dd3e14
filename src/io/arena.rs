//! Buffer arena: the fixed pool of raw/compressed slot pairs
//!
//! The arena is sized once, at writer construction, to `K + 1` pairs
//! (`2K + 2` slots) where `K` is the ordering window capacity. At most `K`
//! pairs are ever held by in-flight tasks and one more is being filled by the
//! writer, so the next pair in rotation is always back home by the time it is
//! needed.
//!
//! Ownership of a pair moves out of the arena on [`BufferArena::checkout`]
//! and back on [`BufferArena::checkin`]. A slot that is checked out cannot be
//! handed out again, which turns the "never reuse a slot that a task still
//! references" rule into something the type system and a runtime check
//! enforce, rather than an assumption about pointer offsets.

/// One raw slot and its matching compressed slot
#[derive(Debug, Default)]
pub struct SlotPair {
    /// Uncompressed bytes accumulated for the block
    pub raw: Vec<u8>,
    /// Compressed BGZF block produced from `raw`
    pub compressed: Vec<u8>,
}

impl SlotPair {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            compressed: Vec::with_capacity(capacity),
        }
    }

    fn reset(&mut self) {
        self.raw.clear();
        self.compressed.clear();
    }
}

/// Pre-allocated, index-rotated pool of [`SlotPair`]s
#[derive(Debug)]
pub struct BufferArena {
    slots: Vec<Option<SlotPair>>,
    slot_capacity: usize,
}

impl BufferArena {
    /// Allocate `window_capacity + 1` pairs of `slot_capacity` bytes each
    pub fn new(window_capacity: usize, slot_capacity: usize) -> Self {
        let pairs = window_capacity.max(1) + 1;
        let slots = (0..pairs)
            .map(|_| Some(SlotPair::with_capacity(slot_capacity)))
            .collect();

        Self {
            slots,
            slot_capacity,
        }
    }

    /// Number of raw/compressed pairs
    pub fn pair_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of individual slots (`2K + 2`)
    pub fn slot_count(&self) -> usize {
        self.slots.len() * 2
    }

    /// Bytes per slot
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity
    }

    /// Index of the pair after `index`, wrapping at the end of the arena
    pub fn next_index(&self, index: usize) -> usize {
        (index + 1) % self.slots.len()
    }

    /// Take pair `index` out of the arena, emptied and ready for new data
    ///
    /// Returns `None` if the pair is still checked out or the arena has been
    /// released.
    pub fn checkout(&mut self, index: usize) -> Option<SlotPair> {
        let mut pair = self.slots.get_mut(index)?.take()?;
        pair.reset();
        Some(pair)
    }

    /// Return pair `index` to the arena
    pub fn checkin(&mut self, index: usize, pair: SlotPair) {
        debug_assert!(index < self.slots.len(), "pair index {} out of range", index);
        if let Some(slot) = self.slots.get_mut(index) {
            debug_assert!(slot.is_none(), "pair {} checked in twice", index);
            *slot = Some(pair);
        }
    }

    /// Whether pair `index` is currently in the arena
    pub fn is_available(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Bytes currently reserved by pairs sitting in the arena
    pub fn resident_bytes(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .map(|pair| pair.raw.capacity() + pair.compressed.capacity())
            .sum()
    }

    /// Free every pair; later checkouts return `None`
    pub fn release(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizing_is_two_k_plus_two_slots() {
        let arena = BufferArena::new(16, 1024);
        assert_eq!(arena.pair_count(), 17);
        assert_eq!(arena.slot_count(), 34);
        assert_eq!(arena.slot_capacity(), 1024);
        assert!(arena.resident_bytes() >= 34 * 1024);
    }

    #[test]
    fn test_rotation_wraps() {
        let arena = BufferArena::new(2, 16);
        assert_eq!(arena.next_index(0), 1);
        assert_eq!(arena.next_index(1), 2);
        assert_eq!(arena.next_index(2), 0);
    }

    #[test]
    fn test_checked_out_pair_is_not_reassigned() {
        let mut arena = BufferArena::new(2, 16);
        let mut pair = arena.checkout(1).unwrap();
        assert!(!arena.is_available(1));
        assert!(arena.checkout(1).is_none());

        pair.raw.extend_from_slice(b"stale");
        arena.checkin(1, pair);
        assert!(arena.is_available(1));

        let pair = arena.checkout(1).unwrap();
        assert!(pair.raw.is_empty());
        assert!(pair.raw.capacity() >= 16);
    }

    #[test]
    fn test_out_of_range_checkout() {
        let mut arena = BufferArena::new(1, 16);
        assert!(arena.checkout(5).is_none());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "out of range")]
    fn test_checkin_out_of_range_is_caught() {
        let mut arena = BufferArena::new(1, 16);
        arena.checkin(7, SlotPair::default());
    }

    #[test]
    fn test_release_frees_everything() {
        let mut arena = BufferArena::new(4, 256);
        arena.release();
        assert_eq!(arena.resident_bytes(), 0);
        assert!(arena.checkout(0).is_none());
    }
}
