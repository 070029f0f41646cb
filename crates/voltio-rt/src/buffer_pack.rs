//! Preallocated stereo buffer pool for the processing graph.

/// Pool of stereo buffers addressed by small indices.
///
/// Sized once via [`BufferPack::set_max_block_size`] before processing
/// starts; nothing here allocates afterwards. All operations take an
/// explicit sample count so a short block only touches its prefix.
pub struct BufferPack {
    buffers: Vec<[Vec<f32>; 2]>,
    max_block_size: usize,
}

impl BufferPack {
    /// Creates a pack of `count` stereo buffers with no capacity yet.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            buffers: (0..count).map(|_| [Vec::new(), Vec::new()]).collect(),
            max_block_size: 0,
        }
    }

    /// Number of buffers in the pack.
    #[must_use]
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Current per-buffer capacity in samples.
    #[must_use]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Resizes every buffer to `len` samples per channel and zeroes it.
    /// Must not be called while audio is being processed.
    pub fn set_max_block_size(&mut self, len: usize) {
        for [left, right] in &mut self.buffers {
            left.clear();
            left.resize(len, 0.0);
            right.clear();
            right.resize(len, 0.0);
        }
        self.max_block_size = len;
    }

    /// Mutable access to both channels of one buffer.
    #[must_use]
    pub fn channels_mut(&mut self, index: usize, len: usize) -> (&mut [f32], &mut [f32]) {
        let [left, right] = &mut self.buffers[index];
        (&mut left[..len], &mut right[..len])
    }

    /// Read access to both channels of one buffer.
    #[must_use]
    pub fn channels(&self, index: usize, len: usize) -> (&[f32], &[f32]) {
        let [left, right] = &self.buffers[index];
        (&left[..len], &right[..len])
    }

    /// Disjoint mutable access to two distinct buffers.
    fn two_mut(&mut self, a: usize, b: usize) -> (&mut [Vec<f32>; 2], &mut [Vec<f32>; 2]) {
        debug_assert_ne!(a, b);
        if a < b {
            let (lo, hi) = self.buffers.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.buffers.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        }
    }

    /// Zeroes the first `len` samples of a buffer.
    pub fn clear(&mut self, index: usize, len: usize) {
        let [left, right] = &mut self.buffers[index];
        left[..len].fill(0.0);
        right[..len].fill(0.0);
    }

    /// Zeroes every buffer in full.
    pub fn clear_all(&mut self) {
        let len = self.max_block_size;
        for index in 0..self.buffers.len() {
            self.clear(index, len);
        }
    }

    /// Copies `len` samples from `src` into `dst`.
    pub fn copy(&mut self, dst: usize, src: usize, len: usize) {
        let (d, s) = self.two_mut(dst, src);
        d[0][..len].copy_from_slice(&s[0][..len]);
        d[1][..len].copy_from_slice(&s[1][..len]);
    }

    /// Adds `len` samples of `src` into `dst`.
    pub fn mix(&mut self, dst: usize, src: usize, len: usize) {
        let (d, s) = self.two_mut(dst, src);
        for (dx, &sx) in d[0][..len].iter_mut().zip(&s[0][..len]) {
            *dx += sx;
        }
        for (dx, &sx) in d[1][..len].iter_mut().zip(&s[1][..len]) {
            *dx += sx;
        }
    }

    /// Copies external input channels into a buffer.
    pub fn write_input(&mut self, index: usize, left: &[f32], right: &[f32]) {
        let [l, r] = &mut self.buffers[index];
        l[..left.len()].copy_from_slice(left);
        r[..right.len()].copy_from_slice(right);
    }

    /// Copies a buffer out to external output channels.
    pub fn read_output(&self, index: usize, left: &mut [f32], right: &mut [f32]) {
        let [l, r] = &self.buffers[index];
        left.copy_from_slice(&l[..left.len()]);
        right.copy_from_slice(&r[..right.len()]);
    }
}
