//! Pre-generated probe payload ring.
//!
//! Generating random payload bytes per send would dominate the loop, so a
//! fixed pool is filled once at run start and workers cycle through it.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use rand::RngCore;

/// Ring of random payload buffers shared by all workers of a run.
pub struct PayloadPool {
    buffers: Vec<Bytes>,
    next: AtomicUsize,
}

impl PayloadPool {
    /// Build a pool of `count` buffers of `size` bytes each.
    pub fn new(size: usize, count: usize) -> Self {
        let count = count.max(1);
        let mut rng = rand::thread_rng();
        let buffers = (0..count)
            .map(|_| {
                let mut buf = vec![0u8; size];
                rng.fill_bytes(&mut buf);
                Bytes::from(buf)
            })
            .collect();
        Self {
            buffers,
            next: AtomicUsize::new(0),
        }
    }

    /// Next payload in the ring. Cheap clone; the underlying buffer is
    /// shared.
    pub fn next(&self) -> Bytes {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.buffers.len();
        self.buffers[idx].clone()
    }

    pub fn payload_size(&self) -> usize {
        self.buffers[0].len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_cycles() {
        let pool = PayloadPool::new(16, 3);
        assert_eq!(pool.payload_size(), 16);

        let a = pool.next();
        let b = pool.next();
        let c = pool.next();
        let a2 = pool.next();

        assert_eq!(a.len(), 16);
        assert_eq!(b.len(), 16);
        assert_eq!(c.len(), 16);
        // Fourth draw wraps back to the first buffer.
        assert_eq!(a, a2);
    }

    #[test]
    fn test_zero_count_clamped() {
        let pool = PayloadPool::new(8, 0);
        assert_eq!(pool.next().len(), 8);
    }
}
