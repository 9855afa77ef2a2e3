//! Decoding of the AAC `AudioSpecificConfig` prefix.
//!
//! FLV sends the config once, as the payload of the AAC sequence-header
//! packet. Only the leading fields are decoded here; they are what a stream
//! descriptor needs (object type, sampling rate, channel layout). The raw
//! bytes are forwarded untouched for the decoder itself.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

use std::io;

/// The leading fields of an AudioSpecificConfig.
/// ISO/IEC 14496-3:2019(E) - 1.6.2.1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct PartialAudioSpecificConfig {
    /// Audio Object Type
    pub audio_object_type: AudioObjectType,
    /// Sampling frequency in Hz
    pub sampling_frequency: u32,
    /// Channel configuration, 0 means defined in-band by a program config element
    pub channel_configuration: u8,
}

/// Audio Object Type
/// ISO/IEC 14496-3:2019(E) - 1.5.1.1 (Table 1.17)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AudioObjectType {
    /// AAC main
    AacMain,
    /// AAC LC
    AacLowComplexity,
    /// AAC SSR
    AacScalableSampleRate,
    /// AAC LTP
    AacLongTermPrediction,
    /// Spectral band replication (HE-AAC)
    Sbr,
    /// Parametric stereo (HE-AAC v2)
    ParametricStereo,
    /// Any other object type
    Unknown(u16),
}

impl From<u16> for AudioObjectType {
    fn from(value: u16) -> Self {
        match value {
            1 => Self::AacMain,
            2 => Self::AacLowComplexity,
            3 => Self::AacScalableSampleRate,
            4 => Self::AacLongTermPrediction,
            5 => Self::Sbr,
            29 => Self::ParametricStereo,
            other => Self::Unknown(other),
        }
    }
}

impl From<AudioObjectType> for u16 {
    fn from(value: AudioObjectType) -> Self {
        match value {
            AudioObjectType::AacMain => 1,
            AudioObjectType::AacLowComplexity => 2,
            AudioObjectType::AacScalableSampleRate => 3,
            AudioObjectType::AacLongTermPrediction => 4,
            AudioObjectType::Sbr => 5,
            AudioObjectType::ParametricStereo => 29,
            AudioObjectType::Unknown(other) => other,
        }
    }
}

/// Frequencies addressed by the 4-bit sampling frequency index.
/// ISO/IEC 14496-3:2019(E) - 1.6.2.4 (Table 1.22)
const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Index value announcing an explicit 24-bit frequency.
const FREQUENCY_ESCAPE: u32 = 0xF;

/// Object type value announcing a 6-bit extension.
const OBJECT_TYPE_ESCAPE: u32 = 31;

/// Maps a sampling frequency index to Hz; reserved and escape values yield `None`.
pub fn sampling_frequency_from_index(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(index as usize).copied()
}

/// MSB-first reader over a byte slice.
struct BitCursor<'a> {
    data: &'a [u8],
    bit: usize,
}

impl<'a> BitCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit: 0 }
    }

    fn take(&mut self, count: usize) -> io::Result<u32> {
        if self.bit + count > self.data.len() * 8 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "audio specific config too short",
            ));
        }

        let mut value = 0u32;
        for _ in 0..count {
            let byte = self.data[self.bit / 8];
            let shift = 7 - (self.bit % 8);
            value = (value << 1) | u32::from((byte >> shift) & 1);
            self.bit += 1;
        }
        Ok(value)
    }
}

impl PartialAudioSpecificConfig {
    /// Decodes object type, sampling frequency and channel configuration.
    ///
    /// Both escape forms are honoured: object type 31 followed by a 6-bit
    /// extension, and frequency index 15 followed by an explicit 24-bit rate.
    pub fn parse(data: &[u8]) -> io::Result<Self> {
        let mut bits = BitCursor::new(data);

        let mut audio_object_type = bits.take(5)?;
        if audio_object_type == OBJECT_TYPE_ESCAPE {
            audio_object_type = 32 + bits.take(6)?;
        }

        let index = bits.take(4)?;
        let sampling_frequency = if index == FREQUENCY_ESCAPE {
            bits.take(24)?
        } else {
            sampling_frequency_from_index(index as u8).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("reserved sampling frequency index {index}"),
                )
            })?
        };

        let channel_configuration = bits.take(4)? as u8;

        Ok(Self {
            audio_object_type: AudioObjectType::from(audio_object_type as u16),
            sampling_frequency,
            channel_configuration,
        })
    }

    /// Number of output channels implied by the channel configuration.
    ///
    /// Configuration 7 is 7.1; 0 (program config element) yields `None`.
    pub fn channel_count(&self) -> Option<u8> {
        match self.channel_configuration {
            1..=6 => Some(self.channel_configuration),
            7 => Some(8),
            _ => None,
        }
    }
}
