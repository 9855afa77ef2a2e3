//! # FLV Audio Module
//!
//! The one byte audio sub-header and the per-tag packet header built on it.
//!
//! Bit layout of the sub-header, most significant bit first:
//!
//! ```text
//! SoundFormat(4) SoundRate(2) SoundSize(1) SoundType(1)
//! ```
//!
//! AAC tags carry one more byte, the [`AacPacketType`].

use std::fmt;

use crate::aac::AacPacketType;
use crate::error::FlvError;
use crate::tag::TagHeader;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundFormat {
    /// Uncompressed PCM audio, platform endian
    Pcm = 0,
    /// ADPCM compressed audio
    AdPcm = 1,
    Mp3 = 2,
    PcmLe = 3,
    Nellymoser16khzMono = 4,
    Nellymoser8khzMono = 5,
    Nellymoser = 6,
    G711ALaw = 7,
    G711MuLaw = 8,
    Reserved9 = 9,
    Aac = 10,
    Speex = 11,
    Reserved12 = 12,
    Reserved13 = 13,
    Mp38k = 14,
    DeviceSpecific = 15,
}

impl SoundFormat {
    /// Maps the 4 bit codec id; every value has a variant.
    pub fn from_bits(value: u8) -> Self {
        match value & 0x0F {
            0 => SoundFormat::Pcm,
            1 => SoundFormat::AdPcm,
            2 => SoundFormat::Mp3,
            3 => SoundFormat::PcmLe,
            4 => SoundFormat::Nellymoser16khzMono,
            5 => SoundFormat::Nellymoser8khzMono,
            6 => SoundFormat::Nellymoser,
            7 => SoundFormat::G711ALaw,
            8 => SoundFormat::G711MuLaw,
            9 => SoundFormat::Reserved9,
            10 => SoundFormat::Aac,
            11 => SoundFormat::Speex,
            12 => SoundFormat::Reserved12,
            13 => SoundFormat::Reserved13,
            14 => SoundFormat::Mp38k,
            _ => SoundFormat::DeviceSpecific,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundRate {
    Hz5512 = 0,
    Hz11025 = 1,
    Hz22050 = 2,
    Hz44100 = 3,
}

impl SoundRate {
    pub fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0 => SoundRate::Hz5512,
            1 => SoundRate::Hz11025,
            2 => SoundRate::Hz22050,
            _ => SoundRate::Hz44100,
        }
    }

    /// 44100 * 2^code / 8
    pub fn hz(&self) -> u32 {
        44100 * (1 << (*self as u32)) / 8
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSize {
    Bits8 = 0,
    Bits16 = 1,
}

impl SoundSize {
    pub fn bits(&self) -> u8 {
        match self {
            SoundSize::Bits8 => 8,
            SoundSize::Bits16 => 16,
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundType {
    Mono = 0,
    Stereo = 1,
}

impl SoundType {
    pub fn channels(&self) -> u8 {
        match self {
            SoundType::Mono => 1,
            SoundType::Stereo => 2,
        }
    }
}

/// The decoded audio sub-header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioHeader {
    pub sound_format: SoundFormat,
    pub sound_rate: SoundRate,
    pub sound_size: SoundSize,
    pub sound_type: SoundType,
}

impl AudioHeader {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            sound_format: SoundFormat::from_bits(byte >> 4),
            sound_rate: SoundRate::from_bits(byte >> 2),
            sound_size: if (byte >> 1) & 1 == 0 {
                SoundSize::Bits8
            } else {
                SoundSize::Bits16
            },
            sound_type: if byte & 1 == 0 {
                SoundType::Mono
            } else {
                SoundType::Stereo
            },
        }
    }

    pub fn to_byte(&self) -> u8 {
        ((self.sound_format as u8) << 4)
            | ((self.sound_rate as u8) << 2)
            | ((self.sound_size as u8) << 1)
            | self.sound_type as u8
    }

    pub fn is_aac(&self) -> bool {
        self.sound_format == SoundFormat::Aac
    }
}

impl fmt::Display for AudioHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}Hz {}bit {}ch",
            self.sound_format,
            self.sound_rate.hz(),
            self.sound_size.bits(),
            self.sound_type.channels()
        )
    }
}

/// Everything known about an audio tag before its payload is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPacketHeader {
    pub tag: TagHeader,
    pub audio: AudioHeader,
    /// Present once read, AAC only
    pub aac_packet_type: Option<AacPacketType>,
}

impl AudioPacketHeader {
    /// Fails when the tag body cannot even hold the sub-header.
    pub fn new(tag: TagHeader, audio: AudioHeader) -> Result<Self, FlvError> {
        let header = Self {
            tag,
            audio,
            aac_packet_type: None,
        };

        if tag.data_size < header.sub_header_len() {
            return Err(FlvError::SubHeaderTooLarge {
                data_size: tag.data_size,
                sub_header: header.sub_header_len(),
            });
        }
        Ok(header)
    }

    pub fn with_aac_packet_type(mut self, packet_type: AacPacketType) -> Self {
        self.aac_packet_type = Some(packet_type);
        self
    }

    pub fn sub_header_len(&self) -> u32 {
        if self.audio.is_aac() { 2 } else { 1 }
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

    pub fn is_sequence_header(&self) -> bool {
        self.aac_packet_type == Some(AacPacketType::SequenceHeader)
    }

    /// Nominal rate from the sub-header; MP3 8 kHz overrides the rate bits.
    pub fn sample_rate(&self) -> u32 {
        match self.audio.sound_format {
            SoundFormat::Mp38k => 8000,
            _ => self.audio.sound_rate.hz(),
        }
    }

    pub fn channels(&self) -> u8 {
        self.audio.sound_type.channels()
    }

    pub fn bits_per_sample(&self) -> u8 {
        self.audio.sound_size.bits()
    }
}
