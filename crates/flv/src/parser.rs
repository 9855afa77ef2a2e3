//! # FLV Tag Parser
//!
//! Byte-exact decoding of the pieces of an FLV file, one read at a time.
//!
//! Every decode step comes in two halves. The caller first learns how many
//! bytes to read (the `*_LEN` constants, or the length carried by a packet
//! header), reads them from wherever the data lives, and then hands exactly
//! those bytes to the matching decode function. A read that came back short
//! is reported as [`FlvError::ShortRead`]; there is no resynchronization.
//!
//! ```text
//! FLV header (9) | prev tag size (4) | tag header (11) | sub-header (1) |
//!   [AAC packet type (1) | AVC packet type + composition time (4)] | payload | ...
//! ```

use std::io::Cursor;

use bytes::Bytes;
use h264::AvcConfig;

use crate::aac::AacPacketType;
use crate::audio::{AudioHeader, AudioPacketHeader};
use crate::avc::{AVC_PACKET_HEADER_SIZE, AvcPacketHeader};
use crate::error::FlvError;
use crate::header::{FLV_HEADER_SIZE, FlvHeader};
use crate::tag::{PREVIOUS_TAG_SIZE_LEN, TAG_HEADER_SIZE, TagHeader};
use crate::video::{VideoHeader, VideoPacketHeader};

/// Stateless decoder for the individual reads that make up an FLV file.
pub struct TagParser;

impl TagParser {
    pub const FILE_HEADER_LEN: usize = FLV_HEADER_SIZE;
    pub const PREVIOUS_TAG_SIZE_LEN: usize = PREVIOUS_TAG_SIZE_LEN;
    pub const TAG_HEADER_LEN: usize = TAG_HEADER_SIZE;
    pub const AUDIO_HEADER_LEN: usize = 1;
    pub const VIDEO_HEADER_LEN: usize = 1;
    pub const AAC_PACKET_TYPE_LEN: usize = 1;
    pub const AVC_PACKET_HEADER_LEN: usize = AVC_PACKET_HEADER_SIZE;

    pub fn flv_header(data: Bytes) -> Result<FlvHeader, FlvError> {
        FlvError::expect_len(Self::FILE_HEADER_LEN, data.len())?;
        FlvHeader::parse(&mut Cursor::new(data))
    }

    /// `payload_offset` is the stream position right after the read.
    ///
    /// An empty read is the end of the file and yields an EOF header.
    pub fn tag_header(data: Bytes, payload_offset: u64) -> Result<TagHeader, FlvError> {
        if data.is_empty() {
            return Ok(TagHeader::eof(payload_offset));
        }
        FlvError::expect_len(Self::TAG_HEADER_LEN, data.len())?;
        TagHeader::parse(&mut Cursor::new(data), payload_offset)
    }

    pub fn audio_header(tag: TagHeader, data: Bytes) -> Result<AudioPacketHeader, FlvError> {
        FlvError::expect_len(Self::AUDIO_HEADER_LEN, data.len())?;
        AudioPacketHeader::new(tag, AudioHeader::from_byte(data[0]))
    }

    pub fn video_header(tag: TagHeader, data: Bytes) -> Result<VideoPacketHeader, FlvError> {
        FlvError::expect_len(Self::VIDEO_HEADER_LEN, data.len())?;
        VideoPacketHeader::new(tag, VideoHeader::from_byte(data[0]))
    }

    pub fn aac_packet_type(
        header: AudioPacketHeader,
        data: Bytes,
    ) -> Result<AudioPacketHeader, FlvError> {
        FlvError::expect_len(Self::AAC_PACKET_TYPE_LEN, data.len())?;
        Ok(header.with_aac_packet_type(AacPacketType::try_from(data[0])?))
    }

    pub fn avc_packet_header(
        header: VideoPacketHeader,
        data: Bytes,
    ) -> Result<VideoPacketHeader, FlvError> {
        FlvError::expect_len(Self::AVC_PACKET_HEADER_LEN, data.len())?;
        Ok(header.with_avc(AvcPacketHeader::parse(&mut Cursor::new(data))?))
    }

    /// Checks that a payload read returned everything that was asked for.
    pub fn payload(data: Bytes, expected: usize) -> Result<Bytes, FlvError> {
        FlvError::expect_len(expected, data.len())?;
        Ok(data)
    }

    /// Decodes the body of an AVC sequence-header packet.
    pub fn avc_config(data: Bytes) -> Result<AvcConfig, FlvError> {
        AvcConfig::parse(&mut Cursor::new(data)).map_err(FlvError::AvcConfig)
    }

    /// Rewrites the body of an AVC NALU packet into start-code framing.
    pub fn nal_units(config: &AvcConfig, data: Bytes) -> Result<Bytes, FlvError> {
        config.reformatter().reformat(data).map_err(FlvError::Nalu)
    }
}

#[cfg(test)]
#[cfg_attr(all(test, coverage_nightly), coverage(off))]
mod tests {
    use super::*;
    use crate::aac::AacPacketType;
    use crate::avc::AvcPacketType;
    use crate::tag::TagType;
    use crate::video::VideoCodecId;

    fn tag(tag_type: TagType, data_size: u32) -> TagHeader {
        TagHeader {
            tag_type,
            filter: false,
            data_size,
            timestamp_hns: 0,
            stream_id: 0,
            payload_offset: 24,
        }
    }

    #[test]
    fn test_flv_header_length() {
        let header =
            TagParser::flv_header(Bytes::from_static(b"FLV\x01\x05\x00\x00\x00\x09")).unwrap();
        assert!(header.has_audio && header.has_video);

        let err = TagParser::flv_header(Bytes::from_static(b"FLV\x01")).unwrap_err();
        assert!(matches!(
            err,
            FlvError::ShortRead {
                expected: 9,
                actual: 4
            }
        ));
    }

    #[test]
    fn test_tag_header_eof_on_empty_read() {
        let header = TagParser::tag_header(Bytes::new(), 120).unwrap();
        assert!(header.is_eof());
        assert_eq!(header.payload_offset, 120);
    }

    #[test]
    fn test_tag_header_short_read() {
        let err =
            TagParser::tag_header(Bytes::from_static(&[0x09, 0x00, 0x00]), 0).unwrap_err();
        assert!(matches!(err, FlvError::ShortRead { expected: 11, .. }));
    }

    #[test]
    fn test_audio_chain() {
        let header =
            TagParser::audio_header(tag(TagType::Audio, 6), Bytes::from_static(&[0xAF])).unwrap();
        let header = TagParser::aac_packet_type(header, Bytes::from_static(&[0x01])).unwrap();
        assert_eq!(header.aac_packet_type, Some(AacPacketType::Raw));
        assert_eq!(header.payload_length(), 4);

        let payload = TagParser::payload(Bytes::from_static(&[1, 2, 3, 4]), 4).unwrap();
        assert_eq!(payload.len(), 4);
        assert!(TagParser::payload(Bytes::from_static(&[1, 2]), 4).is_err());
    }

    #[test]
    fn test_invalid_aac_packet_type() {
        let header =
            TagParser::audio_header(tag(TagType::Audio, 6), Bytes::from_static(&[0xAF])).unwrap();
        let err = TagParser::aac_packet_type(header, Bytes::from_static(&[0x05])).unwrap_err();
        assert!(matches!(err, FlvError::Io(_)));
    }

    #[test]
    fn test_video_chain() {
        let header =
            TagParser::video_header(tag(TagType::Video, 9), Bytes::from_static(&[0x17])).unwrap();
        let header =
            TagParser::avc_packet_header(header, Bytes::from_static(&[0x01, 0x00, 0x00, 0x21]))
                .unwrap();
        assert_eq!(header.packet_type(), Some(AvcPacketType::Nalu));
        assert_eq!(header.payload_length(), 4);
        assert_eq!(header.composition_offset_hns(), 330_000);
    }

    #[test]
    fn test_unknown_video_codec() {
        let header =
            TagParser::video_header(tag(TagType::Video, 9), Bytes::from_static(&[0x1C])).unwrap();
        assert_eq!(header.video.codec_id, VideoCodecId::Unknown(12));
        assert_eq!(header.sub_header_len(), 1);
        assert_eq!(header.payload_length(), 8);
    }

    #[test]
    fn test_avc_config_errors() {
        let err = TagParser::avc_config(Bytes::from_static(&[0x01, 0x64])).unwrap_err();
        assert!(matches!(err, FlvError::AvcConfig(_)));
    }

    #[test]
    fn test_nal_units() {
        let config = AvcConfig {
            configuration_version: 1,
            profile: 0x64,
            profile_compatibility: 0,
            level: 0x1f,
            nal_length_size: 4,
            sps: vec![Bytes::from_static(&[0x67])],
            pps: vec![Bytes::from_static(&[0x68])],
        };

        let out =
            TagParser::nal_units(&config, Bytes::from_static(&[0, 0, 0, 1, 0x65])).unwrap();
        assert_eq!(out, Bytes::from_static(&[0, 0, 0, 1, 0x65]));

        let err =
            TagParser::nal_units(&config, Bytes::from_static(&[0, 0, 0, 7, 0x65])).unwrap_err();
        assert!(matches!(err, FlvError::Nalu(_)));
    }
}
