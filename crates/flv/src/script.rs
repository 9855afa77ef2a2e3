//! # FLV Script Data
//!
//! Decoding of the `onMetaData` script tag into [`Metadata`].
//!
//! The tag body is two AMF0 values: the string name and an ECMA array of
//! properties. Only well-known properties are materialized; everything else
//! is skipped in place so that exotic writer extensions never break decoding.

use amf0::{Amf0Decoder, Amf0Marker, Amf0ReadError, Amf0Value};

use crate::error::FlvError;
use crate::tag::HNS_PER_MS;

const ON_METADATA: &str = "onMetaData";
const HNS_PER_SECOND: f64 = 10_000_000.0;

/// One entry of the keyframe index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyframe {
    /// File offset of the keyframe tag
    pub position: u64,
    /// Presentation time in 100 ns units
    pub time_hns: u64,
}

impl Keyframe {
    pub fn time_ms(&self) -> u64 {
        self.time_hns / HNS_PER_MS
    }
}

/// The `keyframes` object some writers put into `onMetaData`.
///
/// Entries are kept sorted by time. Lists of unequal length are truncated to
/// the shorter one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyframeIndex {
    positions: Vec<u64>,
    times_hns: Vec<u64>,
}

impl KeyframeIndex {
    pub fn new(positions: Vec<u64>, times_hns: Vec<u64>) -> Self {
        let mut entries: Vec<(u64, u64)> = times_hns.into_iter().zip(positions).collect();
        entries.sort_by_key(|(time, _)| *time);
        let (times_hns, positions) = entries.into_iter().unzip();

        Self {
            positions,
            times_hns,
        }
    }

    pub fn len(&self) -> usize {
        self.times_hns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times_hns.is_empty()
    }

    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    pub fn times_hns(&self) -> &[u64] {
        &self.times_hns
    }

    pub fn iter(&self) -> impl Iterator<Item = Keyframe> + '_ {
        self.positions
            .iter()
            .zip(&self.times_hns)
            .map(|(&position, &time_hns)| Keyframe { position, time_hns })
    }

    /// The last keyframe at or before `time_hns`, or the first keyframe when
    /// `time_hns` precedes all of them.
    pub fn lookup(&self, time_hns: u64) -> Option<Keyframe> {
        if self.is_empty() {
            return None;
        }

        let after = self.times_hns.partition_point(|&time| time <= time_hns);
        let index = after.saturating_sub(1);
        Some(Keyframe {
            position: self.positions[index],
            time_hns: self.times_hns[index],
        })
    }

    fn decode(decoder: &mut Amf0Decoder<'_>) -> Result<Option<Self>, Amf0ReadError> {
        if !matches!(
            decoder.peek_marker()?,
            Amf0Marker::Object | Amf0Marker::EcmaArray
        ) {
            decoder.skip_value()?;
            return Ok(None);
        }

        decoder.read_map_header()?;
        let mut positions = Vec::new();
        let mut times = Vec::new();

        while let Some(key) = decoder.next_property()? {
            match key.as_ref() {
                "filepositions" => positions = numbers(decoder)?,
                "times" => times = numbers(decoder)?,
                _ => decoder.skip_value()?,
            }
        }

        let positions = positions.into_iter().map(|pos| pos.max(0.0) as u64).collect();
        let times_hns = times.into_iter().map(seconds_to_hns).collect();
        Ok(Some(Self::new(positions, times_hns)))
    }
}

/// Decoded `onMetaData` properties.
///
/// Properties that were absent, or present with an unexpected AMF type, keep
/// their default value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    /// Seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// kbit/s
    pub video_data_rate: f64,
    pub video_codec_id: Option<u8>,
    pub audio_codec_id: Option<u8>,
    /// Hz
    pub audio_sample_rate: u32,
    pub audio_sample_size: u32,
    /// kbit/s
    pub audio_data_rate: f64,
    pub stereo: bool,
    pub file_size: u64,
    pub data_size: u64,
    pub audio_size: u64,
    /// Seconds
    pub audio_delay: f64,
    /// Seconds
    pub last_timestamp: f64,
    /// Seconds
    pub last_keyframe_timestamp: f64,
    pub keyframes: KeyframeIndex,
    pub has_audio: bool,
    pub has_video: bool,
    pub has_metadata: bool,
    pub can_seek_to_end: bool,
    /// Number of well-known properties that were decoded
    pub recognized_properties: usize,
}

impl Metadata {
    /// Decodes a script tag body.
    ///
    /// Returns `Ok(None)` when the script object is not named `onMetaData`.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, FlvError> {
        let mut decoder = Amf0Decoder::new(payload);

        let name = decoder.decode_with_type(Amf0Marker::String)?;
        if name.as_str() != Some(ON_METADATA) {
            return Ok(None);
        }

        decoder.read_map_header()?;

        let mut metadata = Metadata::default();
        while let Some(key) = decoder.next_property()? {
            if metadata.apply(&key, &mut decoder)? {
                metadata.recognized_properties += 1;
            }
        }

        Ok(Some(metadata))
    }

    /// Presentation length in 100 ns units.
    pub fn duration_hns(&self) -> u64 {
        seconds_to_hns(self.duration)
    }

    /// Video bitrate in bit/s.
    pub fn video_bitrate(&self) -> u32 {
        (self.video_data_rate.max(0.0) * 1000.0) as u32
    }

    /// Audio bitrate in bit/s.
    pub fn audio_bitrate(&self) -> u32 {
        (self.audio_data_rate.max(0.0) * 1000.0) as u32
    }

    fn apply(&mut self, key: &str, decoder: &mut Amf0Decoder<'_>) -> Result<bool, Amf0ReadError> {
        let stored = match key {
            "duration" => store(&mut self.duration, number(decoder)?),
            "width" => store(&mut self.width, number(decoder)?.map(|v| v as u32)),
            "height" => store(&mut self.height, number(decoder)?.map(|v| v as u32)),
            "framerate" => store(&mut self.frame_rate, number(decoder)?),
            "videodatarate" => store(&mut self.video_data_rate, number(decoder)?),
            "videocodecid" => store(
                &mut self.video_codec_id,
                number(decoder)?.map(|v| Some(v as u8)),
            ),
            "audiocodecid" => store(
                &mut self.audio_codec_id,
                number(decoder)?.map(|v| Some(v as u8)),
            ),
            "audiosamplerate" => store(
                &mut self.audio_sample_rate,
                number(decoder)?.map(|v| sample_rate(v as u32)),
            ),
            "audiosamplesize" => store(
                &mut self.audio_sample_size,
                number(decoder)?.map(|v| v as u32),
            ),
            "audiodatarate" => store(&mut self.audio_data_rate, number(decoder)?),
            "stereo" => store(&mut self.stereo, flag(decoder)?),
            "filesize" => store(&mut self.file_size, number(decoder)?.map(|v| v as u64)),
            "datasize" => store(&mut self.data_size, number(decoder)?.map(|v| v as u64)),
            "audiosize" => store(&mut self.audio_size, number(decoder)?.map(|v| v as u64)),
            "audiodelay" => store(&mut self.audio_delay, number(decoder)?),
            "lasttimestamp" => store(&mut self.last_timestamp, number(decoder)?),
            "lastkeyframetimestamp" => store(&mut self.last_keyframe_timestamp, number(decoder)?),
            "keyframes" => store(&mut self.keyframes, KeyframeIndex::decode(decoder)?),
            "hasAudio" => store(&mut self.has_audio, flag(decoder)?),
            "hasVideo" => store(&mut self.has_video, flag(decoder)?),
            "hasMetadata" => store(&mut self.has_metadata, flag(decoder)?),
            "canSeekToEnd" => store(&mut self.can_seek_to_end, flag(decoder)?),
            _ => {
                decoder.skip_value()?;
                false
            }
        };
        Ok(stored)
    }
}

fn store<T>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Codes below 4 are FLV sound rate codes rather than Hz.
fn sample_rate(value: u32) -> u32 {
    if value < 4 {
        44100 * (1 << value) / 8
    } else {
        value
    }
}

fn seconds_to_hns(seconds: f64) -> u64 {
    (seconds.max(0.0) * HNS_PER_SECOND).round() as u64
}

/// Decodes a number, or skips a value of any other type.
fn number(decoder: &mut Amf0Decoder<'_>) -> Result<Option<f64>, Amf0ReadError> {
    if decoder.peek_marker()? == Amf0Marker::Number {
        return Ok(decoder.decode()?.as_number());
    }
    decoder.skip_value()?;
    Ok(None)
}

/// Decodes a boolean, accepting numbers as well; skips anything else.
fn flag(decoder: &mut Amf0Decoder<'_>) -> Result<Option<bool>, Amf0ReadError> {
    if matches!(
        decoder.peek_marker()?,
        Amf0Marker::Boolean | Amf0Marker::Number
    ) {
        return Ok(decoder.decode()?.as_bool());
    }
    decoder.skip_value()?;
    Ok(None)
}

/// Decodes a strict array of numbers; non-numeric entries are dropped.
fn numbers(decoder: &mut Amf0Decoder<'_>) -> Result<Vec<f64>, Amf0ReadError> {
    if decoder.peek_marker()? != Amf0Marker::StrictArray {
        decoder.skip_value()?;
        return Ok(Vec::new());
    }

    match decoder.decode()? {
        Amf0Value::StrictArray(values) => Ok(values.iter().filter_map(|v| v.as_number()).collect()),
        _ => Ok(Vec::new()),
    }
}
