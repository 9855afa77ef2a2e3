use std::io;

use bytes::{BufMut, Bytes, BytesMut};

/// A growable big-endian writer.
///
/// Also implements [`io::Write`], so [`byteorder::WriteBytesExt`] and encoders
/// that take `impl io::Write` can target it directly.
#[derive(Debug, Default, Clone)]
pub struct BytesWriter {
    buf: BytesMut,
}

impl BytesWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Appends one byte.
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.put_u8(value);
        self
    }

    /// Appends a big-endian u16.
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buf.put_u16(value);
        self
    }

    /// Appends the low 24 bits of `value`, big-endian.
    pub fn write_u24(&mut self, value: u32) -> &mut Self {
        self.buf.put_uint(u64::from(value & 0x00FF_FFFF), 3);
        self
    }

    /// Appends a signed 24-bit value in two's complement, big-endian.
    pub fn write_i24(&mut self, value: i32) -> &mut Self {
        self.write_u24(value as u32)
    }

    /// Appends a big-endian u32.
    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Appends a big-endian IEEE-754 double.
    pub fn write_f64(&mut self, value: f64) -> &mut Self {
        self.buf.put_f64(value);
        self
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The written bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns the frozen buffer.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

impl io::Write for BytesWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
