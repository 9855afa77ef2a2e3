use std::io;

/// FLV AAC Packet Type
/// Defined in the FLV specification. Chapter 1 - AACAUDIODATA
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AacPacketType {
    /// AudioSpecificConfig
    SequenceHeader = 0x00,
    /// Raw AAC frame data
    Raw = 0x01,
}

impl TryFrom<u8> for AacPacketType {
    type Error = io::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(AacPacketType::SequenceHeader),
            0x01 => Ok(AacPacketType::Raw),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid AAC packet type: {value}"),
            )),
        }
    }
}
