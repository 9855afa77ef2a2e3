//! # Stream Descriptors
//!
//! What the engine tells its caller about each track once header discovery
//! is done, and the selection the caller hands back on start.

use std::fmt;

use bytes::Bytes;

/// The two elementary streams an FLV file can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Video,
    Audio,
}

impl TrackKind {
    pub const ALL: [TrackKind; 2] = [TrackKind::Video, TrackKind::Audio];

    /// Stable stream identifier: 0 for video, 1 for audio.
    pub fn stream_id(self) -> u32 {
        match self {
            TrackKind::Video => 0,
            TrackKind::Audio => 1,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.stream_id() as usize
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Video => write!(f, "video"),
            TrackKind::Audio => write!(f, "audio"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Avc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoMediaType {
    pub codec: VideoCodec,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    /// bit/s, 0 when unknown
    pub bitrate: u32,
    pub profile: u8,
    pub level: u8,
    pub nal_length_size: u8,
    /// First SPS and first PPS, each behind a 16-bit length
    pub sequence_header: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    Mp3,
    /// Signed 16 bit or unsigned 8 bit samples, platform endian
    Pcm,
    PcmLe,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioMediaType {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channels: u8,
    pub bits_per_sample: u8,
    /// bit/s, 0 when unknown
    pub bitrate: u32,
    /// Raw AudioSpecificConfig, AAC only
    pub audio_specific_config: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaType {
    Video(VideoMediaType),
    Audio(AudioMediaType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub id: u32,
    pub kind: TrackKind,
    pub media_type: MediaType,
}

impl StreamDescriptor {
    pub fn video(media_type: VideoMediaType) -> Self {
        Self {
            id: TrackKind::Video.stream_id(),
            kind: TrackKind::Video,
            media_type: MediaType::Video(media_type),
        }
    }

    pub fn audio(media_type: AudioMediaType) -> Self {
        Self {
            id: TrackKind::Audio.stream_id(),
            kind: TrackKind::Audio,
            media_type: MediaType::Audio(media_type),
        }
    }
}

/// All streams of the presentation, each selected or deselected.
///
/// A fresh descriptor has every stream selected.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationDescriptor {
    streams: Vec<(StreamDescriptor, bool)>,
    duration_hns: u64,
}

impl PresentationDescriptor {
    pub fn new(streams: Vec<StreamDescriptor>, duration_hns: u64) -> Self {
        Self {
            streams: streams.into_iter().map(|stream| (stream, true)).collect(),
            duration_hns,
        }
    }

    /// Presentation length in 100 ns units, 0 when unknown.
    pub fn duration_hns(&self) -> u64 {
        self.duration_hns
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.iter().map(|(stream, _)| stream)
    }

    pub fn stream(&self, kind: TrackKind) -> Option<&StreamDescriptor> {
        self.streams().find(|stream| stream.kind == kind)
    }

    pub fn is_selected(&self, kind: TrackKind) -> bool {
        self.streams
            .iter()
            .any(|(stream, selected)| stream.kind == kind && *selected)
    }

    /// Returns false when the presentation has no such stream.
    pub fn select(&mut self, kind: TrackKind) -> bool {
        self.set_selected(kind, true)
    }

    /// Returns false when the presentation has no such stream.
    pub fn deselect(&mut self, kind: TrackKind) -> bool {
        self.set_selected(kind, false)
    }

    fn set_selected(&mut self, kind: TrackKind, value: bool) -> bool {
        match self.streams.iter_mut().find(|(stream, _)| stream.kind == kind) {
            Some((_, selected)) => {
                *selected = value;
                true
            }
            None => false,
        }
    }

    pub fn selected(&self) -> impl Iterator<Item = TrackKind> + '_ {
        self.streams
            .iter()
            .filter(|(_, selected)| *selected)
            .map(|(stream, _)| stream.kind)
    }

    /// True when both describe the same set of stream ids.
    pub(crate) fn same_streams(&self, other: &PresentationDescriptor) -> bool {
        let mut ours: Vec<u32> = self.streams().map(|stream| stream.id).collect();
        let mut theirs: Vec<u32> = other.streams().map(|stream| stream.id).collect();
        ours.sort_unstable();
        theirs.sort_unstable();
        ours == theirs
    }
}
