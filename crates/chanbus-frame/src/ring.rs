use std::collections::VecDeque;

/// Bounded byte FIFO backing the transport's receive and transmit sides.
#[derive(Debug)]
pub struct ByteRing {
    bytes: VecDeque<u8>,
    capacity: usize,
}

impl ByteRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free space left before the ring is full.
    pub fn room(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    pub fn is_full(&self) -> bool {
        self.room() == 0
    }

    /// Append as much of `data` as fits; returns the number of bytes taken.
    pub fn push_slice(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.room());
        self.bytes.extend(&data[..n]);
        n
    }

    /// Append all of `data`, or nothing if it does not fit.
    pub fn push_all(&mut self, data: &[u8]) -> bool {
        if data.len() > self.room() {
            return false;
        }
        self.bytes.extend(data);
        true
    }

    /// Longest contiguous run at the front of the ring.
    pub fn front_slice(&self) -> &[u8] {
        self.bytes.as_slices().0
    }

    /// Rearrange storage so every queued byte is one slice.
    pub fn make_contiguous(&mut self) -> &[u8] {
        self.bytes.make_contiguous()
    }

    /// Drop `n` bytes from the front.
    pub fn consume(&mut self, n: usize) {
        let n = n.min(self.bytes.len());
        self.bytes.drain(..n);
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_slice_stops_at_capacity() {
        let mut ring = ByteRing::new(4);
        assert_eq!(ring.push_slice(b"abcdef"), 4);
        assert!(ring.is_full());
        assert_eq!(ring.push_slice(b"g"), 0);
        assert_eq!(ring.make_contiguous(), b"abcd");
    }

    #[test]
    fn push_all_is_all_or_nothing() {
        let mut ring = ByteRing::new(5);
        assert!(ring.push_all(b"abc"));
        assert!(!ring.push_all(b"def"));
        assert_eq!(ring.len(), 3);
        assert!(ring.push_all(b"de"));
        assert_eq!(ring.room(), 0);
    }

    #[test]
    fn consume_across_wraparound() {
        let mut ring = ByteRing::new(6);
        ring.push_slice(b"abcdef");
        ring.consume(4);
        ring.push_slice(b"ghij");

        assert_eq!(ring.len(), 6);
        assert_eq!(ring.make_contiguous(), b"efghij");

        ring.consume(100);
        assert!(ring.is_empty());
    }

    #[test]
    fn front_slice_is_prefix_of_contents() {
        let mut ring = ByteRing::new(8);
        ring.push_slice(b"12345678");
        ring.consume(6);
        ring.push_slice(b"9abc");

        let front = ring.front_slice().to_vec();
        let all = ring.make_contiguous().to_vec();
        assert!(!front.is_empty());
        assert!(all.starts_with(&front));
        assert_eq!(all, b"789abc");
    }
}
