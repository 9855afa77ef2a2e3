use std::io;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use bytes_util::{BytesCursor, BytesCursorExt, BytesWriter};

/// Four byte Annex-B start code.
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// Three byte Annex-B start code.
pub const SHORT_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Rewrites length-prefixed (AVCC) NAL units into start-code-prefixed
/// (Annex-B) units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NaluReformatter {
    length_size: u8,
}

impl NaluReformatter {
    /// `length_size` is the prefix width from the decoder configuration
    /// record. Values outside 1..=4 are clamped.
    pub fn new(length_size: u8) -> Self {
        Self {
            length_size: length_size.clamp(1, 4),
        }
    }

    /// Prefix width in bytes.
    pub fn length_size(&self) -> u8 {
        self.length_size
    }

    /// Splits a payload into its NAL units without copying them.
    ///
    /// Fails with [`io::ErrorKind::InvalidData`] when a length prefix is cut
    /// off or points past the end of the payload.
    pub fn split(&self, payload: Bytes) -> io::Result<Vec<Bytes>> {
        let mut reader = BytesCursor::new(payload);
        let mut units = Vec::new();

        while reader.remaining() > 0 {
            if reader.remaining() < self.length_size as usize {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "{} trailing bytes cannot hold a {} byte NAL length",
                        reader.remaining(),
                        self.length_size
                    ),
                ));
            }

            let len = reader.read_uint::<BigEndian>(self.length_size as usize)? as usize;
            let unit = reader.extract_bytes(len).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("NAL unit of {len} bytes overruns the payload"),
                )
            })?;

            if !unit.is_empty() {
                units.push(unit);
            }
        }

        Ok(units)
    }

    /// Concatenates every NAL unit of `payload`, each behind a four byte
    /// start code.
    pub fn reformat(&self, payload: Bytes) -> io::Result<Bytes> {
        let units = self.split(payload)?;

        let total = units.iter().map(|unit| START_CODE.len() + unit.len()).sum();
        let mut writer = BytesWriter::with_capacity(total);
        for unit in &units {
            writer.write_bytes(&START_CODE).write_bytes(unit);
        }

        Ok(writer.freeze())
    }
}
