use std::io;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use bytes_util::{BytesCursor, BytesWriter};

use crate::tag::HNS_PER_MS;

/// Length of packet type plus composition time.
pub const AVC_PACKET_HEADER_SIZE: usize = 4;

/// FLV AVC Packet Type
/// Defined in the FLV specification. Chapter 1 - AVCVIDEODATA
/// The AVC packet type is used to determine if the video data is a sequence
/// header or a NALU.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvcPacketType {
    /// AVCDecoderConfigurationRecord
    SequenceHeader = 0,
    /// One or more length prefixed NAL units
    Nalu = 1,
    /// Empty body, lower level end of sequence not required
    EndOfSequence = 2,
}

impl TryFrom<u8> for AvcPacketType {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SequenceHeader),
            1 => Ok(Self::Nalu),
            2 => Ok(Self::EndOfSequence),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid AVC packet type: {value}"),
            )),
        }
    }
}

/// The four bytes that follow the video sub-header of an AVC tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcPacketHeader {
    pub packet_type: AvcPacketType,
    /// Signed 24 bit offset from decode to presentation time
    pub composition_time_ms: i32,
}

impl AvcPacketHeader {
    pub fn parse(reader: &mut BytesCursor) -> io::Result<Self> {
        let packet_type = AvcPacketType::try_from(reader.read_u8()?)?;
        let composition_time_ms = reader.read_i24::<BigEndian>()?;

        Ok(Self {
            packet_type,
            composition_time_ms,
        })
    }

    pub fn encode(&self) -> Bytes {
        let mut writer = BytesWriter::with_capacity(AVC_PACKET_HEADER_SIZE);
        writer
            .write_u8(self.packet_type as u8)
            .write_i24(self.composition_time_ms);
        writer.freeze()
    }

    pub fn composition_offset_hns(&self) -> i64 {
        self.composition_time_ms as i64 * HNS_PER_MS as i64
    }
}
