use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use bytes_util::{BytesCursor, BytesWriter};

use crate::error::FlvError;

/// Length of a tag header on the wire.
pub const TAG_HEADER_SIZE: usize = 11;

/// Length of the PreviousTagSize field that precedes every tag header.
pub const PREVIOUS_TAG_SIZE_LEN: usize = 4;

/// 100 ns units per millisecond, the time base of [`TagHeader::timestamp_hns`].
pub const HNS_PER_MS: u64 = 10_000;

const TAG_TYPE_MASK: u8 = 0b0001_1111;
const FILTER_FLAG: u8 = 0b0010_0000;

/// FLV Tag Type
///
/// Defined by:
/// - video_file_format_spec_v10.pdf (Chapter 1 - The FLV File Format - FLV tags)
/// - video_file_format_spec_v10_1.pdf (Annex E.4.1 - FLV Tag)
///
/// A header of type 0 with an empty body, or no header at all, ends the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagType {
    Audio,
    Video,
    ScriptData,
    Eof,
    Other(u8),
}

impl TagType {
    fn from_raw(raw: u8, data_size: u32) -> Self {
        match raw {
            8 => TagType::Audio,
            9 => TagType::Video,
            18 => TagType::ScriptData,
            0 if data_size == 0 => TagType::Eof,
            other => TagType::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            TagType::Audio => 8,
            TagType::Video => 9,
            TagType::ScriptData => 18,
            TagType::Eof => 0,
            TagType::Other(raw) => *raw,
        }
    }
}

/// The 11 byte header in front of every tag body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub tag_type: TagType,
    /// Set when the body is encrypted or otherwise pre-processed
    pub filter: bool,
    /// Body length, excluding this header
    pub data_size: u32,
    /// Presentation time in 100 ns units
    pub timestamp_hns: u64,
    /// Always 0 in conforming files
    pub stream_id: u32,
    /// Absolute file offset of the first body byte
    pub payload_offset: u64,
}

impl TagHeader {
    /// A synthetic end-of-stream header, used when the stream ran out of bytes.
    pub fn eof(payload_offset: u64) -> Self {
        Self {
            tag_type: TagType::Eof,
            filter: false,
            data_size: 0,
            timestamp_hns: 0,
            stream_id: 0,
            payload_offset,
        }
    }

    /// Decodes a header. `payload_offset` is the stream position right after
    /// the header, which the caller knows from its read.
    pub fn parse(reader: &mut BytesCursor, payload_offset: u64) -> Result<Self, FlvError> {
        let flags = reader.read_u8()?;
        let data_size = reader.read_u24::<BigEndian>()?;
        // 24 low bits followed by an 8 bit extension holding bits 24-31
        let timestamp_ms = reader.read_u24::<BigEndian>()? | ((reader.read_u8()? as u32) << 24);
        let stream_id = reader.read_u24::<BigEndian>()?;

        Ok(TagHeader {
            tag_type: TagType::from_raw(flags & TAG_TYPE_MASK, data_size),
            filter: flags & FILTER_FLAG != 0,
            data_size,
            timestamp_hns: timestamp_ms as u64 * HNS_PER_MS,
            stream_id,
            payload_offset,
        })
    }

    pub fn timestamp_ms(&self) -> u32 {
        (self.timestamp_hns / HNS_PER_MS) as u32
    }

    /// File offset of the tag itself, i.e. of its header.
    pub fn tag_offset(&self) -> u64 {
        self.payload_offset.saturating_sub(TAG_HEADER_SIZE as u64)
    }

    pub fn is_eof(&self) -> bool {
        self.tag_type == TagType::Eof
    }

    pub fn encode(&self) -> Bytes {
        let mut flags = self.tag_type.as_u8() & TAG_TYPE_MASK;
        if self.filter {
            flags |= FILTER_FLAG;
        }
        let timestamp_ms = self.timestamp_ms();

        let mut writer = BytesWriter::with_capacity(TAG_HEADER_SIZE);
        writer
            .write_u8(flags)
            .write_u24(self.data_size)
            .write_u24(timestamp_ms)
            .write_u8((timestamp_ms >> 24) as u8)
            .write_u24(self.stream_id);
        writer.freeze()
    }
}

impl std::fmt::Display for TagHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:?} tag @{} [{} bytes, {}ms]",
            self.tag_type,
            self.tag_offset(),
            self.data_size,
            self.timestamp_ms()
        )
    }
}
