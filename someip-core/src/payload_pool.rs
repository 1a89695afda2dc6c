//! A small pool of reusable payload buffers, grounded on the chunk-pool pattern
//! (`t51core::networking::chunkpool::ChunkPool`): the stream reader allocates at most one
//! payload buffer per in-flight message (spec §4.2's bounded-work invariant) and returns it to
//! the pool once the message has been handed off, instead of allocating fresh `Vec`s per
//! message.

pub struct PayloadPool {
    pool: Vec<Vec<u8>>,
}

impl PayloadPool {
    pub fn new() -> PayloadPool {
        PayloadPool { pool: Vec::new() }
    }

    /// Hands out a buffer with at least `size` capacity, reusing a pooled one if big enough.
    pub fn alloc(&mut self, size: usize) -> Vec<u8> {
        if let Some(pos) = self.pool.iter().position(|buf| buf.capacity() >= size) {
            let mut buf = self.pool.swap_remove(pos);
            buf.clear();
            buf.resize(size, 0);
            buf
        } else {
            vec![0u8; size]
        }
    }

    /// Returns a buffer to the pool for reuse by a later `alloc`.
    pub fn reclaim(&mut self, buf: Vec<u8>) {
        const MAX_POOLED: usize = 16;
        if self.pool.len() < MAX_POOLED {
            self.pool.push(buf);
        }
    }
}

impl Default for PayloadPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaimed_buffer_is_reused() {
        let mut pool = PayloadPool::new();
        let buf = pool.alloc(128);
        let ptr_before = buf.as_ptr();
        pool.reclaim(buf);

        let reused = pool.alloc(64);
        assert_eq!(reused.as_ptr(), ptr_before);
        assert_eq!(reused.len(), 64);
    }

    #[test]
    fn pool_caps_retained_buffers() {
        let mut pool = PayloadPool::new();
        for _ in 0..32 {
            pool.reclaim(vec![0u8; 8]);
        }
        assert!(pool.pool.len() <= 16);
    }
}
