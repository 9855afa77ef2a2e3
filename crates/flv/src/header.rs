use std::fmt::Display;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use bytes_util::{BytesCursor, BytesWriter};
use tracing::debug;

use crate::error::FlvError;

pub const FLV_HEADER_SIZE: usize = 9;

const FLV_SIGNATURE: u32 = 0x464C56;
const HAS_VIDEO_FLAG: u8 = 0b0000_0001;
const HAS_AUDIO_FLAG: u8 = 0b0000_0100;

/// The 9 byte FLV file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlvHeader {
    /// 'FLV' for conforming files; not enforced
    pub signature: u32,
    /// Usually 1
    pub version: u8,
    pub has_audio: bool,
    pub has_video: bool,
    /// Header length announced by the file, always 9
    pub data_offset: u32,
}

impl Display for FlvHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "FLV v{} [audio: {}, video: {}, header length: {}]",
            self.version, self.has_audio, self.has_video, self.data_offset
        )
    }
}

impl FlvHeader {
    /// Parses the file header from exactly the 9 bytes that start the file.
    ///
    /// The signature is not checked. A header length other than 9 is rejected
    /// since the first tag would then not follow the header directly.
    pub fn parse(reader: &mut BytesCursor) -> Result<Self, FlvError> {
        let signature = reader.read_u24::<BigEndian>()?;
        if signature != FLV_SIGNATURE {
            debug!("Unexpected FLV signature {:#08x}", signature);
        }

        let version = reader.read_u8()?;
        let flags = reader.read_u8()?;
        let data_offset = reader.read_u32::<BigEndian>()?;

        if data_offset as usize != FLV_HEADER_SIZE {
            return Err(FlvError::InvalidHeader(format!(
                "header length {data_offset}, expected {FLV_HEADER_SIZE}"
            )));
        }

        Ok(FlvHeader {
            signature,
            version,
            has_audio: flags & HAS_AUDIO_FLAG != 0,
            has_video: flags & HAS_VIDEO_FLAG != 0,
            data_offset,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut flags = 0;
        if self.has_audio {
            flags |= HAS_AUDIO_FLAG;
        }
        if self.has_video {
            flags |= HAS_VIDEO_FLAG;
        }

        let mut writer = BytesWriter::with_capacity(FLV_HEADER_SIZE);
        writer
            .write_u24(self.signature)
            .write_u8(self.version)
            .write_u8(flags)
            .write_u32(self.data_offset);
        writer.freeze()
    }
}

impl Default for FlvHeader {
    fn default() -> Self {
        Self {
            signature: FLV_SIGNATURE,
            version: 1,
            has_audio: false,
            has_video: false,
            data_offset: FLV_HEADER_SIZE as u32,
        }
    }
}
