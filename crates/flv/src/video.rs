//! # FLV Video Module
//!
//! The one byte video sub-header and the per-tag packet header built on it.
//!
//! ```text
//! FrameType(4) CodecID(4)
//! ```
//!
//! AVC tags carry four more bytes, see [`AvcPacketHeader`].

use std::fmt;

use crate::avc::{AvcPacketHeader, AvcPacketType};
use crate::error::FlvError;
use crate::tag::TagHeader;

/// FLV Frame Type
/// Defined in the FLV specification. Chapter 1 - VIDEODATA
///
/// Reserved values are kept as [`VideoFrameType::Unknown`] and never count as
/// key frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFrameType {
    /// A frame that can be decoded on its own
    KeyFrame,
    /// A frame that depends on previous frames
    InterFrame,
    /// H.263 only
    DisposableInterFrame,
    /// Server use only
    GeneratedKeyFrame,
    /// Video info or command frame
    VideoInfoFrame,
    Unknown(u8),
}

impl From<u8> for VideoFrameType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::KeyFrame,
            2 => Self::InterFrame,
            3 => Self::DisposableInterFrame,
            4 => Self::GeneratedKeyFrame,
            5 => Self::VideoInfoFrame,
            other => Self::Unknown(other),
        }
    }
}

impl VideoFrameType {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::KeyFrame => 1,
            Self::InterFrame => 2,
            Self::DisposableInterFrame => 3,
            Self::GeneratedKeyFrame => 4,
            Self::VideoInfoFrame => 5,
            Self::Unknown(raw) => *raw,
        }
    }
}

/// FLV Video Codec ID
/// Defined in the FLV specification. Chapter 1 - VIDEODATA
///
/// Ids outside the table (enhanced FLV, reserved values) are kept as
/// [`VideoCodecId::Unknown`] so the track can be rejected on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecId {
    Jpeg,
    SorensonH263,
    ScreenVideo,
    On2VP6,
    On2VP6Alpha,
    ScreenVideo2,
    Avc,
    Unknown(u8),
}

impl From<u8> for VideoCodecId {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Jpeg,
            2 => Self::SorensonH263,
            3 => Self::ScreenVideo,
            4 => Self::On2VP6,
            5 => Self::On2VP6Alpha,
            6 => Self::ScreenVideo2,
            7 => Self::Avc,
            other => Self::Unknown(other),
        }
    }
}

impl VideoCodecId {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Jpeg => 1,
            Self::SorensonH263 => 2,
            Self::ScreenVideo => 3,
            Self::On2VP6 => 4,
            Self::On2VP6Alpha => 5,
            Self::ScreenVideo2 => 6,
            Self::Avc => 7,
            Self::Unknown(raw) => *raw,
        }
    }
}

/// The decoded video sub-header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoHeader {
    pub frame_type: VideoFrameType,
    pub codec_id: VideoCodecId,
}

impl VideoHeader {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            frame_type: VideoFrameType::from(byte >> 4),
            codec_id: VideoCodecId::from(byte & 0x0F),
        }
    }

    pub fn to_byte(&self) -> u8 {
        (self.frame_type.as_u8() << 4) | (self.codec_id.as_u8() & 0x0F)
    }

    pub fn is_avc(&self) -> bool {
        self.codec_id == VideoCodecId::Avc
    }

    pub fn is_key_frame(&self) -> bool {
        self.frame_type == VideoFrameType::KeyFrame
    }
}

impl fmt::Display for VideoHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.codec_id, self.frame_type)
    }
}

/// Everything known about a video tag before its payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoPacketHeader {
    pub tag: TagHeader,
    pub video: VideoHeader,
    /// Present once read, AVC only
    pub avc: Option<AvcPacketHeader>,
}

impl VideoPacketHeader {
    /// Fails when the tag body cannot even hold the sub-header.
    pub fn new(tag: TagHeader, video: VideoHeader) -> Result<Self, FlvError> {
        let header = Self {
            tag,
            video,
            avc: None,
        };

        if tag.data_size < header.sub_header_len() {
            return Err(FlvError::SubHeaderTooLarge {
                data_size: tag.data_size,
                sub_header: header.sub_header_len(),
            });
        }
        Ok(header)
    }

    pub fn with_avc(mut self, avc: AvcPacketHeader) -> Self {
        self.avc = Some(avc);
        self
    }

    pub fn sub_header_len(&self) -> u32 {
        if self.video.is_avc() { 5 } else { 1 }
    }

    pub fn payload_length(&self) -> u32 {
        self.tag.data_size - self.sub_header_len()
    }

    pub fn payload_offset(&self) -> u64 {
        self.tag.payload_offset + self.sub_header_len() as u64
    }

    pub fn timestamp_hns(&self) -> u64 {
        self.tag.timestamp_hns
    }

    pub fn packet_type(&self) -> Option<AvcPacketType> {
        self.avc.map(|avc| avc.packet_type)
    }

    pub fn composition_offset_hns(&self) -> i64 {
        self.avc.map_or(0, |avc| avc.composition_offset_hns())
    }
}
