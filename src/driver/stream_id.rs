//! Stream id allocation.
//!
//! A connection multiplexes requests over 128 stream ids. Id 0 is held by
//! the connection itself for handshake traffic; ids 1 through 127 are lent
//! to callers. Allocation and release are O(1) over a fixed free stack.

/// Number of stream ids on a v1 connection.
pub const MAX_STREAMS: usize = 128;

/// Stream id used for OPTIONS, STARTUP, CREDENTIALS and REGISTER.
pub const RESERVED_STREAM_ID: i8 = 0;

/// Stream id allocator.
#[derive(Debug, Clone)]
pub struct StreamIdAllocator {
    /// Free ids; the top of the stack is handed out next
    free: Vec<i8>,
    in_use: [bool; MAX_STREAMS],
}

impl StreamIdAllocator {
    pub fn new() -> Self {
        // Pushed in reverse so the lowest id is handed out first.
        let free: Vec<i8> = (1..MAX_STREAMS as i16).rev().map(|id| id as i8).collect();
        let mut in_use = [false; MAX_STREAMS];
        in_use[RESERVED_STREAM_ID as usize] = true;
        Self { free, in_use }
    }

    /// Take a free id, or `None` when every usable id is in flight.
    pub fn allocate(&mut self) -> Option<i8> {
        let id = self.free.pop()?;
        self.in_use[id as usize] = true;
        Some(id)
    }

    /// Return an id to the pool.
    ///
    /// Returns `false` and leaves the allocator untouched when `id` is the
    /// reserved id or is not currently allocated.
    pub fn release(&mut self, id: i8) -> bool {
        if id == RESERVED_STREAM_ID || !self.has(id) {
            return false;
        }
        self.in_use[id as usize] = false;
        self.free.push(id);
        true
    }

    /// Whether `id` is currently allocated. The reserved id always is.
    pub fn has(&self, id: i8) -> bool {
        id >= 0 && self.in_use[id as usize]
    }

    /// Ids lent to callers.
    pub fn in_flight(&self) -> usize {
        MAX_STREAMS - 1 - self.free.len()
    }

    /// Ids still available.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Usable ids (excluding the reserved one).
    pub fn capacity(&self) -> usize {
        MAX_STREAMS - 1
    }

    /// Release every lent id.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for StreamIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocate_all() {
        let mut ids = StreamIdAllocator::new();
        let mut seen = HashSet::new();
        for _ in 0..MAX_STREAMS - 1 {
            let id = ids.allocate().unwrap();
            assert_ne!(id, RESERVED_STREAM_ID);
            assert!(id > 0);
            assert!(seen.insert(id), "id {} handed out twice", id);
        }
        assert_eq!(ids.in_flight(), 127);
        assert_eq!(ids.allocate(), None);
    }

    #[test]
    fn test_lowest_first() {
        let mut ids = StreamIdAllocator::new();
        assert_eq!(ids.allocate(), Some(1));
        assert_eq!(ids.allocate(), Some(2));
    }

    #[test]
    fn test_release_and_reuse() {
        let mut ids = StreamIdAllocator::new();
        let held: Vec<_> = (0..MAX_STREAMS - 1).map(|_| ids.allocate().unwrap()).collect();
        assert!(ids.release(held[10]));
        assert!(!ids.has(held[10]));
        assert_eq!(ids.allocate(), Some(held[10]));
        assert_eq!(ids.allocate(), None);
    }

    #[test]
    fn test_release_guards() {
        let mut ids = StreamIdAllocator::new();
        assert!(!ids.release(5), "never allocated");
        assert!(!ids.release(RESERVED_STREAM_ID));
        assert!(!ids.release(-1));
        let id = ids.allocate().unwrap();
        assert!(ids.release(id));
        assert!(!ids.release(id), "double release");
        assert_eq!(ids.available(), ids.capacity());
    }

    #[test]
    fn test_has() {
        let mut ids = StreamIdAllocator::new();
        assert!(ids.has(RESERVED_STREAM_ID));
        assert!(!ids.has(-1));
        let id = ids.allocate().unwrap();
        assert!(ids.has(id));
        ids.reset();
        assert!(!ids.has(id));
        assert_eq!(ids.in_flight(), 0);
    }
}
