//! A growable byte buffer tuned for incremental frame decoding.
//!
//! Unlike a general-purpose `Vec<u8>`, [`FrameBuffer`] keeps a write cursor
//! (`ptr`) separate from its backing storage, so callers can request extra
//! space, hand the resulting slice to a socket read, and then "claim" only
//! the bytes that were actually filled in.

/// Borrowed view over the bytes currently held in a [`FrameBuffer`].
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    bytes: &'a [u8],
}

impl<'a> BufferView<'a> {
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    ptr: usize,
}

impl FrameBuffer {
    pub fn new(initial_capacity: usize) -> Self {
        FrameBuffer {
            buf: vec![0u8; initial_capacity],
            ptr: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Write cursor back to zero without shrinking the backing storage.
    pub fn reset(&mut self) {
        self.ptr = 0;
    }

    pub fn ensure_fit(&mut self, size: usize) {
        if self.buf.len() < size {
            self.buf.resize(size, 0);
        }
    }

    pub fn ensure_extra_space(&mut self, extra: usize) {
        self.ensure_fit(self.ptr + extra);
    }

    pub fn push_back(&mut self, byte: u8) {
        self.buf[self.ptr] = byte;
        self.ptr += 1;
    }

    /// Reserves `size` bytes at the cursor and returns a mutable slice over
    /// them, advancing the cursor past them. Caller fills the slice in.
    pub fn get_space(&mut self, size: usize) -> &mut [u8] {
        let start = self.ptr;
        self.ptr += size;
        &mut self.buf[start..self.ptr]
    }

    /// Advances the cursor without writing, for callers (socket reads) that
    /// already wrote directly into the region returned by [`Self::tail`].
    pub fn claim_space(&mut self, size: usize) {
        self.ptr += size;
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.ensure_extra_space(bytes.len());
        self.get_space(bytes.len()).copy_from_slice(bytes);
    }

    pub fn head(&self) -> &[u8] {
        &self.buf[..self.ptr]
    }

    /// Mutable slice starting right after the last claimed byte, sized to
    /// the full remaining backing storage — the natural target for a
    /// non-blocking socket read.
    pub fn tail(&mut self) -> &mut [u8] {
        &mut self.buf[self.ptr..]
    }

    pub fn size(&self) -> usize {
        self.ptr
    }

    pub fn view(&self) -> BufferView<'_> {
        BufferView {
            bytes: &self.buf[..self.ptr],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_back_advances_cursor() {
        let mut buf = FrameBuffer::new(4);
        buf.push_back(1);
        buf.push_back(2);
        assert_eq!(buf.size(), 2);
        assert_eq!(buf.head(), &[1, 2]);
    }

    #[test]
    fn ensure_extra_space_grows_backing_storage() {
        let mut buf = FrameBuffer::new(2);
        buf.push_back(1);
        buf.push_back(2);
        buf.ensure_extra_space(10);
        assert!(buf.capacity() >= 12);
        assert_eq!(buf.head(), &[1, 2]);
    }

    #[test]
    fn claim_space_reflects_socket_style_fill() {
        let mut buf = FrameBuffer::new(16);
        buf.ensure_extra_space(4);
        buf.tail()[..4].copy_from_slice(&[9, 9, 9, 9]);
        buf.claim_space(4);
        assert_eq!(buf.head(), &[9, 9, 9, 9]);
    }

    #[test]
    fn reset_keeps_capacity_but_clears_cursor() {
        let mut buf = FrameBuffer::new(4);
        buf.push_back(1);
        let cap = buf.capacity();
        buf.reset();
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.capacity(), cap);
    }
}
