//! # Header Discovery
//!
//! While a source is opening it reads the file header and then walks the
//! leading tags, decoding `onMetaData` and the first packet of each media
//! type together with its codec configuration. The walk ends as soon as
//! every announced track is described, at the end of the file, or after the
//! configured number of tags.

use std::io::SeekFrom;
use std::sync::Arc;

use aac::PartialAudioSpecificConfig;
use bytes::Bytes;
use flv::{
    AudioPacketHeader, AvcPacketType, FLV_HEADER_SIZE, FlvError, FlvHeader, Metadata,
    PREVIOUS_TAG_SIZE_LEN, SoundFormat, TagHeader, TagParser, TagType, VideoPacketHeader,
};
use h264::AvcConfig;
use tracing::{debug, trace, warn};

use crate::config::MAX_SAMPLE_QUEUE_DEPTH;
use crate::descriptor::{
    AudioCodec, AudioMediaType, PresentationDescriptor, StreamDescriptor, TrackKind, VideoCodec,
    VideoMediaType,
};
use crate::error::SourceError;
use crate::source::{ReadStep, SourceInner, SourceShared, SourceState};
use crate::stream::Track;

/// What discovery has learned about the file so far.
#[derive(Debug, Default)]
pub(crate) struct FileHeaderState {
    pub(crate) file_header: Option<FlvHeader>,
    pub(crate) metadata: Option<Metadata>,
    /// No further `onMetaData` is waited for
    pub(crate) meta_settled: bool,
    pub(crate) has_script_data: bool,
    pub(crate) first_audio: Option<AudioPacketHeader>,
    pub(crate) first_video: Option<VideoPacketHeader>,
    pub(crate) avc_config: Option<AvcConfig>,
    /// Raw AudioSpecificConfig from the first AAC sequence header
    pub(crate) aac_config: Option<Bytes>,
    pub(crate) first_media_tag_offset: Option<u64>,
}

impl FileHeaderState {
    /// Offset of the first audio or video tag header.
    pub(crate) fn first_media_offset(&self) -> u64 {
        self.first_media_tag_offset
            .unwrap_or((FLV_HEADER_SIZE + PREVIOUS_TAG_SIZE_LEN) as u64)
    }

    fn expects_video(&self) -> bool {
        self.first_video.is_some()
            || self.file_header.is_some_and(|header| header.has_video)
            || self
                .metadata
                .as_ref()
                .is_some_and(|metadata| metadata.has_video || metadata.video_codec_id.is_some())
    }

    fn expects_audio(&self) -> bool {
        self.first_audio.is_some()
            || self.file_header.is_some_and(|header| header.has_audio)
            || self
                .metadata
                .as_ref()
                .is_some_and(|metadata| metadata.has_audio || metadata.audio_codec_id.is_some())
    }

    fn video_ready(&self) -> bool {
        self.first_video
            .is_some_and(|header| !header.video.is_avc() || self.avc_config.is_some())
    }

    fn audio_ready(&self) -> bool {
        self.first_audio
            .is_some_and(|header| !header.audio.is_aac() || self.aac_config.is_some())
    }

    fn wants_video_scan(&self) -> bool {
        !self.video_ready()
    }

    fn wants_audio_scan(&self) -> bool {
        !self.audio_ready()
    }

    /// Metadata is settled, a media tag was seen, and every expected track
    /// has its first packet and codec configuration.
    pub(crate) fn is_ready(&self) -> bool {
        self.meta_settled
            && self.first_media_tag_offset.is_some()
            && (!self.expects_video() || self.video_ready())
            && (!self.expects_audio() || self.audio_ready())
    }

    /// `None` when the file has no video tag.
    pub(crate) fn video_descriptor(&self) -> Option<Result<StreamDescriptor, SourceError>> {
        self.first_video.map(|first| self.build_video(first))
    }

    /// `None` when the file has no audio tag.
    pub(crate) fn audio_descriptor(&self) -> Option<Result<StreamDescriptor, SourceError>> {
        self.first_audio.map(|first| self.build_audio(first))
    }

    fn build_video(&self, first: VideoPacketHeader) -> Result<StreamDescriptor, SourceError> {
        if !first.video.is_avc() {
            return Err(SourceError::UnsupportedCodec(format!(
                "video codec {:?}",
                first.video.codec_id
            )));
        }
        let config = self.avc_config.as_ref().ok_or_else(|| {
            SourceError::UnsupportedCodec("AVC stream without a sequence header".to_string())
        })?;

        let fallback = Metadata::default();
        let metadata = self.metadata.as_ref().unwrap_or(&fallback);

        Ok(StreamDescriptor::video(VideoMediaType {
            codec: VideoCodec::Avc,
            width: metadata.width,
            height: metadata.height,
            frame_rate: metadata.frame_rate,
            bitrate: metadata.video_bitrate(),
            profile: config.profile,
            level: config.level,
            nal_length_size: config.nal_length_size,
            sequence_header: config.sequence_header().unwrap_or_default(),
        }))
    }

    fn build_audio(&self, first: AudioPacketHeader) -> Result<StreamDescriptor, SourceError> {
        let codec = match first.audio.sound_format {
            SoundFormat::Aac => AudioCodec::Aac,
            SoundFormat::Mp3 | SoundFormat::Mp38k => AudioCodec::Mp3,
            SoundFormat::Pcm => AudioCodec::Pcm,
            SoundFormat::PcmLe => AudioCodec::PcmLe,
            other => {
                return Err(SourceError::UnsupportedCodec(format!("audio codec {other:?}")));
            }
        };

        let mut sample_rate = first.sample_rate();
        let mut channels = first.channels();
        let audio_specific_config = match codec {
            AudioCodec::Aac => self.aac_config.clone(),
            _ => None,
        };
        if let Some(asc) = &audio_specific_config {
            match PartialAudioSpecificConfig::parse(asc) {
                Ok(parsed) => {
                    sample_rate = parsed.sampling_frequency;
                    channels = parsed.channel_count().unwrap_or(channels);
                }
                Err(err) => warn!(error = %err, "Ignoring malformed AudioSpecificConfig"),
            }
        }

        let bitrate = self.metadata.as_ref().map_or(0, Metadata::audio_bitrate);

        Ok(StreamDescriptor::audio(AudioMediaType {
            codec,
            sample_rate,
            channels,
            bits_per_sample: first.bits_per_sample(),
            bitrate,
            audio_specific_config,
        }))
    }
}

impl SourceShared {
    /// Handles a read completion while the source is opening.
    pub(crate) fn discover(
        self: &Arc<Self>,
        inner: &mut SourceInner,
        step: ReadStep,
        data: Bytes,
        offset: u64,
    ) -> Result<(), SourceError> {
        match step {
            ReadStep::FileHeader => {
                let header = TagParser::flv_header(data)?;
                debug!(%header, "Read FLV header");
                inner.header.file_header = Some(header);
                self.read_tag_header(inner)
            }
            ReadStep::TagHeader => {
                let payload_offset = offset + data.len() as u64;
                let tag = TagParser::tag_header(data, payload_offset)?;
                self.discover_tag(inner, tag)
            }
            ReadStep::ScriptPayload(tag) => {
                let payload = TagParser::payload(data, tag.data_size as usize)?;
                match Metadata::decode(&payload)? {
                    Some(metadata) => {
                        debug!(
                            duration = metadata.duration,
                            properties = metadata.recognized_properties,
                            keyframes = metadata.keyframes.len(),
                            "Decoded onMetaData"
                        );
                        inner.header.metadata = Some(metadata);
                        inner.header.meta_settled = true;
                    }
                    None => trace!(offset = tag.tag_offset(), "Ignoring script tag"),
                }
                self.continue_discovery(inner)
            }
            ReadStep::AudioHeader(tag) => {
                let header = TagParser::audio_header(tag, data)?;
                if inner.header.first_audio.is_none() {
                    debug!(
                        audio = %header.audio,
                        offset = tag.tag_offset(),
                        "Found first audio tag"
                    );
                    inner.header.first_audio = Some(header);
                }
                if header.audio.is_aac() && inner.header.aac_config.is_none() {
                    return self.issue_read(
                        inner,
                        ReadStep::AacPacketType(header),
                        None,
                        TagParser::AAC_PACKET_TYPE_LEN,
                    );
                }
                Self::skip(inner, tag.data_size - TagParser::AUDIO_HEADER_LEN as u32)?;
                self.continue_discovery(inner)
            }
            ReadStep::AacPacketType(header) => {
                let header = TagParser::aac_packet_type(header, data)?;
                if header.is_sequence_header() {
                    let len = header.payload_length() as usize;
                    return self.issue_read(inner, ReadStep::AudioPayload(header), None, len);
                }
                Self::skip(inner, header.payload_length())?;
                self.continue_discovery(inner)
            }
            ReadStep::AudioPayload(header) => {
                let payload = TagParser::payload(data, header.payload_length() as usize)?;
                debug!(len = payload.len(), "Found AAC sequence header");
                inner.header.aac_config = Some(payload);
                self.continue_discovery(inner)
            }
            ReadStep::VideoHeader(tag) => {
                let header = TagParser::video_header(tag, data)?;
                if inner.header.first_video.is_none() {
                    debug!(
                        video = %header.video,
                        offset = tag.tag_offset(),
                        "Found first video tag"
                    );
                    inner.header.first_video = Some(header);
                }
                if header.video.is_avc() && inner.header.avc_config.is_none() {
                    return self.issue_read(
                        inner,
                        ReadStep::AvcPacketHeader(header),
                        None,
                        TagParser::AVC_PACKET_HEADER_LEN,
                    );
                }
                Self::skip(inner, tag.data_size - TagParser::VIDEO_HEADER_LEN as u32)?;
                self.continue_discovery(inner)
            }
            ReadStep::AvcPacketHeader(header) => {
                let header = TagParser::avc_packet_header(header, data)?;
                if header.packet_type() == Some(AvcPacketType::SequenceHeader) {
                    let len = header.payload_length() as usize;
                    return self.issue_read(inner, ReadStep::VideoPayload(header), None, len);
                }
                Self::skip(inner, header.payload_length())?;
                self.continue_discovery(inner)
            }
            ReadStep::VideoPayload(header) => {
                let payload = TagParser::payload(data, header.payload_length() as usize)?;
                let config = TagParser::avc_config(payload)?;
                debug!(
                    profile = config.profile,
                    level = config.level,
                    nal_length_size = config.nal_length_size,
                    "Found AVC sequence header"
                );
                inner.header.avc_config = Some(config);
                self.continue_discovery(inner)
            }
        }
    }

    fn discover_tag(
        self: &Arc<Self>,
        inner: &mut SourceInner,
        tag: TagHeader,
    ) -> Result<(), SourceError> {
        if tag.is_eof() {
            debug!(tags = inner.scanned_tags, "Reached end of file while opening");
            return self.finish_open(inner);
        }
        inner.scanned_tags += 1;

        match tag.tag_type {
            TagType::ScriptData if inner.header.metadata.is_none() && tag.data_size > 0 => {
                inner.header.has_script_data = true;
                self.issue_read(
                    inner,
                    ReadStep::ScriptPayload(tag),
                    None,
                    tag.data_size as usize,
                )
            }
            TagType::Audio | TagType::Video if tag.data_size > 0 => {
                let state = &mut inner.header;
                state.first_media_tag_offset.get_or_insert(tag.tag_offset());
                if !state.meta_settled {
                    if !state.has_script_data {
                        trace!("No script tag ahead of the first media tag");
                    }
                    state.meta_settled = true;
                }

                let (wanted, step, len) = if tag.tag_type == TagType::Audio {
                    (
                        state.wants_audio_scan(),
                        ReadStep::AudioHeader(tag),
                        TagParser::AUDIO_HEADER_LEN,
                    )
                } else {
                    (
                        state.wants_video_scan(),
                        ReadStep::VideoHeader(tag),
                        TagParser::VIDEO_HEADER_LEN,
                    )
                };
                if wanted {
                    return self.issue_read(inner, step, None, len);
                }
                Self::skip(inner, tag.data_size)?;
                self.continue_discovery(inner)
            }
            _ => {
                trace!(tag = %tag, "Skipping tag while opening");
                Self::skip(inner, tag.data_size)?;
                self.continue_discovery(inner)
            }
        }
    }

    fn continue_discovery(self: &Arc<Self>, inner: &mut SourceInner) -> Result<(), SourceError> {
        let limit_reached = self
            .config
            .discovery_tag_limit
            .is_some_and(|limit| inner.scanned_tags >= limit);
        if limit_reached {
            debug!(tags = inner.scanned_tags, "Discovery tag limit reached");
        }

        if limit_reached || inner.header.is_ready() {
            return self.finish_open(inner);
        }
        self.read_tag_header(inner)
    }

    /// Describes the tracks, rewinds to the first media tag and completes the
    /// pending open.
    fn finish_open(self: &Arc<Self>, inner: &mut SourceInner) -> Result<(), SourceError> {
        let header = &inner.header;

        let mut streams = Vec::with_capacity(TrackKind::ALL.len());
        for (kind, descriptor) in [
            (TrackKind::Video, header.video_descriptor()),
            (TrackKind::Audio, header.audio_descriptor()),
        ] {
            match descriptor {
                Some(Ok(descriptor)) => streams.push(descriptor),
                Some(Err(err)) => warn!(track = %kind, error = %err, "Skipping track"),
                None => trace!(track = %kind, "No such track in file"),
            }
        }

        if streams.is_empty() {
            return Err(SourceError::NoStreams);
        }
        if self.config.require_metadata && header.metadata.is_none() {
            return Err(FlvError::MissingMetadata.into());
        }

        let duration_hns = header.metadata.as_ref().map_or(0, Metadata::duration_hns);
        let first_media = header.first_media_offset();

        let depth = self.config.sample_queue_depth.clamp(1, MAX_SAMPLE_QUEUE_DEPTH);
        for stream in &streams {
            inner.tracks[stream.kind.index()] = Some(Track::new(stream.kind, depth));
        }

        let stream = inner.stream.as_ref().ok_or(SourceError::Shutdown)?;
        stream.seek(SeekFrom::Start(first_media))?;
        inner.skip_prefix = false;
        inner.avc_config = inner.header.avc_config.clone();
        inner.avc_config_sent = false;

        let presentation = PresentationDescriptor::new(streams, duration_hns);
        inner.presentation = Some(presentation.clone());
        inner.state = SourceState::Stopped;
        debug!(
            streams = presentation.len(),
            duration_hns,
            first_media,
            tags = inner.scanned_tags,
            "FLV source opened"
        );

        if let Some(reply) = inner.open_reply.take() {
            let _ = reply.send(Ok(presentation));
        }
        Ok(())
    }
}
