/// Default number of scancodes buffered between the clock interrupt and the
/// foreground loop.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Bounded FIFO of raw scancodes. When full, new bytes are dropped and the
/// queued ones are left alone.
#[derive(Debug, Clone)]
pub struct ScancodeQueue {
    data: Box<[u8]>,
    read_pos: usize,
    count: usize,
}

impl Default for ScancodeQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl ScancodeQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            read_pos: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.data.len()
    }

    /// Appends `scancode`, or returns false if the queue is full.
    pub fn enqueue(&mut self, scancode: u8) -> bool {
        if self.is_full() {
            return false;
        }
        let write_pos = (self.read_pos + self.count) % self.data.len();
        self.data[write_pos] = scancode;
        self.count += 1;
        true
    }

    pub fn dequeue(&mut self) -> Option<u8> {
        if self.count == 0 {
            return None;
        }
        let scancode = self.data[self.read_pos];
        self.read_pos = (self.read_pos + 1) % self.data.len();
        self.count -= 1;
        Some(scancode)
    }

    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::partial(4, &hex!("1C 32"))]
    #[case::exactly_full(4, &hex!("1C 32 21 23"))]
    #[case::default_capacity(DEFAULT_QUEUE_CAPACITY, &hex!("E0 75 E0 F0 75 12 1C F0 1C F0 12"))]
    fn test_fifo_order(#[case] capacity: usize, #[case] input: &[u8]) {
        let mut queue = ScancodeQueue::new(capacity);
        for &byte in input {
            assert!(queue.enqueue(byte));
        }
        assert_eq!(queue.len(), input.len());
        let output: Vec<u8> = std::iter::from_fn(|| queue.dequeue()).collect();
        assert_eq!(output, input);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_newest() {
        let mut queue = ScancodeQueue::new(3);
        assert!(queue.enqueue(0x1C));
        assert!(queue.enqueue(0x32));
        assert!(queue.enqueue(0x21));
        assert!(queue.is_full());
        assert!(!queue.enqueue(0x23));
        assert!(!queue.enqueue(0x24));
        assert_eq!(queue.len(), 3);

        assert_eq!(queue.dequeue(), Some(0x1C));
        assert!(queue.enqueue(0x2B));
        assert_eq!(queue.dequeue(), Some(0x32));
        assert_eq!(queue.dequeue(), Some(0x21));
        assert_eq!(queue.dequeue(), Some(0x2B));
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_wraps_around() {
        let mut queue = ScancodeQueue::new(2);
        for byte in 0..10 {
            assert!(queue.enqueue(byte));
            assert_eq!(queue.dequeue(), Some(byte));
        }
        assert_eq!(queue.dequeue(), None);
    }

    #[test]
    fn test_zero_capacity_drops_everything() {
        let mut queue = ScancodeQueue::new(0);
        assert!(!queue.enqueue(0x1C));
        assert_eq!(queue.dequeue(), None);
    }
}
