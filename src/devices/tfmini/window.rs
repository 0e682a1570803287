//! Fixed-capacity rolling window over the most recent bytes
//!
//! The write position wraps, so pushing a byte is O(1) and never allocates.

/// Ring buffer holding the last `N` bytes pushed
///
/// Once `N` bytes have been pushed the window is full and stays full: each
/// new byte overwrites the oldest one. Logical index 0 is always the oldest
/// byte held.
#[derive(Debug, Clone)]
pub struct FrameWindow<const N: usize> {
    data: [u8; N],
    head: usize, // Next write position (oldest byte once full)
    len: usize,  // Bytes held, saturates at N
}

impl<const N: usize> FrameWindow<N> {
    /// Create a new empty window
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            len: 0,
        }
    }

    /// Append a byte, dropping the oldest one when full
    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.data[self.head] = byte;
        self.head = (self.head + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

    /// Number of bytes held
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// True once `N` bytes have been pushed since creation or the last clear
    #[inline]
    pub fn is_full(&self) -> bool {
        self.len == N
    }

    /// Read byte at logical index (0 = oldest)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.oldest() + index) % N])
        } else {
            None
        }
    }

    /// Copy of the full window in arrival order, or `None` while warming up
    pub fn snapshot(&self) -> Option<[u8; N]> {
        if !self.is_full() {
            return None;
        }
        let mut out = [0u8; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.data[(self.head + i) % N];
        }
        Some(out)
    }

    /// Forget all bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    #[inline]
    fn oldest(&self) -> usize {
        (self.head + N - self.len) % N
    }
}

impl<const N: usize> Default for FrameWindow<N> {
    fn default() -> Self {
        Self::new()
    }
}
