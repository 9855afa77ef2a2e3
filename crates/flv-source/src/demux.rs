//! # Demux Loop
//!
//! Once started, the engine reads tag after tag for as long as some active
//! track has room in its queue. Samples for a track that is already full
//! wait in that track's overflow. Audio bodies are delivered as they are;
//! AVC bodies are rewritten to start-code framing, and the first one after a
//! start or a configuration change is preceded by the codec configuration.

use std::sync::Arc;

use bytes::Bytes;
use flv::{AvcPacketType, TagHeader, TagParser, TagType, VideoPacketHeader};
use tracing::{debug, trace, warn};

use crate::descriptor::TrackKind;
use crate::error::SourceError;
use crate::event::Sample;
use crate::source::{ReadStep, SourceInner, SourceShared, SourceState};
use crate::stream::Track;

impl SourceShared {
    /// Issues the next read if the source is running, idle and wanted.
    pub(crate) fn pump(self: &Arc<Self>, inner: &mut SourceInner) {
        if !matches!(inner.state, SourceState::Started | SourceState::Paused)
            || inner.read_in_flight
        {
            return;
        }

        if !inner.tracks.iter().flatten().any(Track::needs_data) {
            return;
        }
        if let Err(err) = self.read_tag_header(inner) {
            self.fail(inner, err);
        }
    }

    /// Handles a read completion while the source is started or paused.
    pub(crate) fn demux(
        self: &Arc<Self>,
        inner: &mut SourceInner,
        step: ReadStep,
        data: Bytes,
        offset: u64,
    ) -> Result<(), SourceError> {
        match step {
            ReadStep::TagHeader => {
                let payload_offset = offset + data.len() as u64;
                let tag = TagParser::tag_header(data, payload_offset)?;
                self.demux_tag(inner, tag)
            }
            ReadStep::AudioHeader(tag) => {
                let header = TagParser::audio_header(tag, data)?;
                if header.audio.is_aac() {
                    return self.issue_read(
                        inner,
                        ReadStep::AacPacketType(header),
                        None,
                        TagParser::AAC_PACKET_TYPE_LEN,
                    );
                }
                let len = header.payload_length() as usize;
                self.issue_read(inner, ReadStep::AudioPayload(header), None, len)
            }
            ReadStep::AacPacketType(header) => {
                let header = TagParser::aac_packet_type(header, data)?;
                let len = header.payload_length() as usize;
                self.issue_read(inner, ReadStep::AudioPayload(header), None, len)
            }
            ReadStep::AudioPayload(header) => {
                let payload = TagParser::payload(data, header.payload_length() as usize)?;
                let sample = Sample::new(payload, header.timestamp_hns());
                self.deliver(inner, TrackKind::Audio, sample);
                self.pump(inner);
                Ok(())
            }
            ReadStep::VideoHeader(tag) => {
                let header = TagParser::video_header(tag, data)?;
                if !header.video.is_avc() {
                    trace!(video = %header.video, "Skipping non-AVC video tag");
                    Self::skip(inner, header.payload_length())?;
                    self.pump(inner);
                    return Ok(());
                }
                self.issue_read(
                    inner,
                    ReadStep::AvcPacketHeader(header),
                    None,
                    TagParser::AVC_PACKET_HEADER_LEN,
                )
            }
            ReadStep::AvcPacketHeader(header) => {
                let header = TagParser::avc_packet_header(header, data)?;
                match header.packet_type() {
                    Some(AvcPacketType::SequenceHeader | AvcPacketType::Nalu) => {
                        let len = header.payload_length() as usize;
                        self.issue_read(inner, ReadStep::VideoPayload(header), None, len)
                    }
                    _ => {
                        trace!(offset = header.tag.tag_offset(), "Skipping AVC end of sequence");
                        Self::skip(inner, header.payload_length())?;
                        self.pump(inner);
                        Ok(())
                    }
                }
            }
            ReadStep::VideoPayload(header) => {
                let payload = TagParser::payload(data, header.payload_length() as usize)?;
                if header.packet_type() == Some(AvcPacketType::SequenceHeader) {
                    Self::replace_avc_config(inner, payload)?;
                } else {
                    self.deliver_nal_units(inner, header, payload)?;
                }
                self.pump(inner);
                Ok(())
            }
            ReadStep::FileHeader | ReadStep::ScriptPayload(_) => Ok(()),
        }
    }

    fn demux_tag(
        self: &Arc<Self>,
        inner: &mut SourceInner,
        tag: TagHeader,
    ) -> Result<(), SourceError> {
        if tag.is_eof() {
            debug!(offset = tag.payload_offset, "Reached end of file");
            for kind in TrackKind::ALL {
                let signal = match inner.tracks[kind.index()].as_mut() {
                    Some(track) if track.is_active() => track.end_of_stream(&self.events),
                    _ => continue,
                };
                self.on_signal(inner, signal);
            }
            return Ok(());
        }

        let kind = match tag.tag_type {
            TagType::Audio => Some(TrackKind::Audio),
            TagType::Video => Some(TrackKind::Video),
            _ => None,
        };

        match kind {
            Some(kind) if tag.data_size > 0 && inner.is_track_active(kind) => {
                let (step, len) = match kind {
                    TrackKind::Audio => (ReadStep::AudioHeader(tag), TagParser::AUDIO_HEADER_LEN),
                    TrackKind::Video => (ReadStep::VideoHeader(tag), TagParser::VIDEO_HEADER_LEN),
                };
                self.issue_read(inner, step, None, len)
            }
            _ => {
                trace!(tag = %tag, "Skipping tag");
                Self::skip(inner, tag.data_size)?;
                self.pump(inner);
                Ok(())
            }
        }
    }

    /// An in-band sequence header replaces the configuration; a different
    /// one is sent again ahead of the next NAL units.
    fn replace_avc_config(inner: &mut SourceInner, payload: Bytes) -> Result<(), SourceError> {
        let config = TagParser::avc_config(payload)?;
        if inner.avc_config.as_ref() != Some(&config) {
            debug!(
                profile = config.profile,
                level = config.level,
                "AVC configuration changed"
            );
            inner.avc_config = Some(config);
            inner.avc_config_sent = false;
        }
        Ok(())
    }

    fn deliver_nal_units(
        self: &Arc<Self>,
        inner: &mut SourceInner,
        header: VideoPacketHeader,
        payload: Bytes,
    ) -> Result<(), SourceError> {
        let Some(config) = inner.avc_config.as_ref() else {
            warn!(
                offset = header.tag.tag_offset(),
                "Dropping NAL units ahead of any AVC configuration"
            );
            return Ok(());
        };
        let nal_units = TagParser::nal_units(config, payload)?;

        let mut buffers = Vec::with_capacity(2);
        if !inner.avc_config_sent {
            if let Some(private_data) = config.code_private_data() {
                buffers.push(private_data);
            }
            inner.avc_config_sent = true;
        }
        buffers.push(nal_units);

        let sample = Sample {
            buffers,
            timestamp_hns: header.timestamp_hns(),
            composition_offset_hns: header.composition_offset_hns(),
            key_frame: header.video.is_key_frame(),
        };
        self.deliver(inner, TrackKind::Video, sample);
        Ok(())
    }

    fn deliver(&self, inner: &mut SourceInner, kind: TrackKind, sample: Sample) {
        let Some(track) = inner.tracks[kind.index()].as_mut() else {
            return;
        };
        let signal = track.deliver(sample, &self.events);
        self.on_signal(inner, signal);
    }
}
