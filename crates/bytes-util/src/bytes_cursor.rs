use std::io;

use bytes::Bytes;

/// A read cursor over a shared [`Bytes`] buffer.
///
/// Slices taken from it are reference counted views into the same allocation,
/// so payloads can be handed downstream without copying.
pub type BytesCursor = io::Cursor<Bytes>;

/// Zero-copy helpers for [`BytesCursor`].
pub trait BytesCursorExt {
    /// Number of bytes left between the cursor position and the end of the buffer.
    fn remaining(&self) -> usize;

    /// Takes everything left in the cursor. O(1), never fails.
    fn extract_remaining(&mut self) -> Bytes;

    /// Takes exactly `size` bytes and advances the cursor past them.
    ///
    /// Fails with [`io::ErrorKind::UnexpectedEof`] when fewer than `size`
    /// bytes are left; the cursor is not moved in that case.
    fn extract_bytes(&mut self, size: usize) -> io::Result<Bytes>;

    /// Advances the cursor by `size` bytes without producing them.
    fn skip(&mut self, size: usize) -> io::Result<()>;
}

impl BytesCursorExt for BytesCursor {
    fn remaining(&self) -> usize {
        self.get_ref()
            .len()
            .saturating_sub(self.position() as usize)
    }

    fn extract_remaining(&mut self) -> Bytes {
        let size = self.remaining();
        self.extract_bytes(size).unwrap_or_default()
    }

    fn extract_bytes(&mut self, size: usize) -> io::Result<Bytes> {
        if size == 0 {
            return Ok(Bytes::new());
        }

        if size > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("need {size} bytes, {} left", self.remaining()),
            ));
        }

        let start = self.position() as usize;
        let slice = self.get_ref().slice(start..start + size);
        self.set_position((start + size) as u64);

        Ok(slice)
    }

    fn skip(&mut self, size: usize) -> io::Result<()> {
        if size > self.remaining() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("cannot skip {size} bytes, {} left", self.remaining()),
            ));
        }
        self.set_position(self.position() + size as u64);
        Ok(())
    }
}
