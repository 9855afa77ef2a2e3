//! Helpers shared by the engine tests: tracing setup and a builder for small
//! FLV files.

use std::borrow::Cow;
use std::io::{self, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};

use amf0::{Amf0Encoder, Amf0Value};
use async_trait::async_trait;
use bytes::Bytes;
use bytes_util::BytesWriter;
use flv::{FlvHeader, HNS_PER_MS, TAG_HEADER_SIZE, TagHeader, TagType};
use h264::AvcConfig;
use tokio::sync::Notify;

use crate::byte_stream::{ByteStream, MemoryByteStream, StreamCapabilities};

/// Macro to initialize tracing for tests
///
/// Usage:
/// - `init_test_tracing!()` - uses DEBUG level (default)
/// - `init_test_tracing!(INFO)` - uses specified level
macro_rules! init_test_tracing {
    () => {
        init_test_tracing!(DEBUG);
    };
    ($level:ident) => {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::$level)
            .with_test_writer()
            .try_init();
    };
}

/// AAC LC, 44.1 kHz, stereo
pub(crate) const AAC_LC_STEREO_44K: [u8; 2] = [0x12, 0x10];

pub(crate) fn avc_config() -> AvcConfig {
    AvcConfig {
        configuration_version: 1,
        profile: 0x42,
        profile_compatibility: 0xC0,
        level: 0x1E,
        nal_length_size: 4,
        sps: vec![Bytes::from_static(&[0x67, 0x42, 0xC0, 0x1E, 0xD9])],
        pps: vec![Bytes::from_static(&[0x68, 0xCE, 0x3C, 0x80])],
    }
}

/// Writes an FLV file tag by tag, previous-tag-size fields included.
pub(crate) struct FlvFileBuilder {
    writer: BytesWriter,
}

impl FlvFileBuilder {
    pub(crate) fn new(has_audio: bool, has_video: bool) -> Self {
        Self::with_header(FlvHeader {
            has_audio,
            has_video,
            ..FlvHeader::default()
        })
    }

    pub(crate) fn with_header(header: FlvHeader) -> Self {
        let mut writer = BytesWriter::new();
        writer.write_bytes(&header.encode()).write_u32(0);
        Self { writer }
    }

    pub(crate) fn tag(mut self, tag_type: TagType, timestamp_ms: u32, body: &[u8]) -> Self {
        let header = TagHeader {
            tag_type,
            filter: false,
            data_size: body.len() as u32,
            timestamp_hns: timestamp_ms as u64 * HNS_PER_MS,
            stream_id: 0,
            payload_offset: 0,
        };
        self.writer
            .write_bytes(&header.encode())
            .write_bytes(body)
            .write_u32((TAG_HEADER_SIZE + body.len()) as u32);
        self
    }

    pub(crate) fn metadata(self, properties: &[(&str, Amf0Value<'static>)]) -> Self {
        let properties: Vec<(Cow<'_, str>, Amf0Value<'_>)> = properties
            .iter()
            .map(|(key, value)| (Cow::Borrowed(*key), value.clone()))
            .collect();

        let mut body = BytesWriter::new();
        Amf0Encoder::encode_string(&mut body, "onMetaData").unwrap();
        Amf0Encoder::encode_ecma_array(&mut body, &properties).unwrap();
        self.tag(TagType::ScriptData, 0, body.as_slice())
    }

    pub(crate) fn avc_sequence_header(self, timestamp_ms: u32, config: &AvcConfig) -> Self {
        let mut body = BytesWriter::new();
        body.write_u8(0x17).write_u8(0).write_i24(0);
        config.build(&mut body).unwrap();
        self.tag(TagType::Video, timestamp_ms, body.as_slice())
    }

    /// NAL units are written behind 4 byte lengths.
    pub(crate) fn avc_nalu(
        self,
        timestamp_ms: u32,
        key_frame: bool,
        composition_time_ms: i32,
        nal_units: &[&[u8]],
    ) -> Self {
        let mut body = BytesWriter::new();
        body.write_u8(if key_frame { 0x17 } else { 0x27 })
            .write_u8(1)
            .write_i24(composition_time_ms);
        for nal in nal_units {
            body.write_u32(nal.len() as u32).write_bytes(nal);
        }
        self.tag(TagType::Video, timestamp_ms, body.as_slice())
    }

    pub(crate) fn avc_end_of_sequence(self, timestamp_ms: u32) -> Self {
        self.tag(TagType::Video, timestamp_ms, &[0x17, 0x02, 0x00, 0x00, 0x00])
    }

    pub(crate) fn aac_sequence_header(self, timestamp_ms: u32, asc: &[u8]) -> Self {
        let mut body = BytesWriter::new();
        body.write_u8(0xAF).write_u8(0).write_bytes(asc);
        self.tag(TagType::Audio, timestamp_ms, body.as_slice())
    }

    pub(crate) fn aac_raw(self, timestamp_ms: u32, frame: &[u8]) -> Self {
        let mut body = BytesWriter::new();
        body.write_u8(0xAF).write_u8(1).write_bytes(frame);
        self.tag(TagType::Audio, timestamp_ms, body.as_slice())
    }

    /// One audio tag with a raw sub-header byte, for non-AAC codecs.
    pub(crate) fn audio(self, timestamp_ms: u32, sub_header: u8, frame: &[u8]) -> Self {
        let mut body = BytesWriter::new();
        body.write_u8(sub_header).write_bytes(frame);
        self.tag(TagType::Audio, timestamp_ms, body.as_slice())
    }

    /// Type 0 with an empty body.
    pub(crate) fn eof(self) -> Self {
        self.tag(TagType::Eof, 0, &[])
    }

    pub(crate) fn build(self) -> Bytes {
        self.writer.freeze()
    }
}

/// The file used by most engine tests: onMetaData announcing AVC and AAC, both
/// sequence headers, one AVC key frame and an EOF tag.
pub(crate) fn synthetic_file() -> Bytes {
    FlvFileBuilder::new(false, false)
        .metadata(&[
            ("duration", Amf0Value::Number(1.0)),
            ("width", Amf0Value::Number(640.0)),
            ("height", Amf0Value::Number(480.0)),
            ("videocodecid", Amf0Value::Number(7.0)),
            ("audiocodecid", Amf0Value::Number(10.0)),
        ])
        .avc_sequence_header(0, &avc_config())
        .aac_sequence_header(0, &AAC_LC_STEREO_44K)
        .avc_nalu(0, true, 0, &[&[0x65, 0x88, 0x84, 0x00]])
        .eof()
        .build()
}

/// A memory stream whose reads can be held back until the test lets them go.
#[derive(Debug)]
pub(crate) struct GatedByteStream {
    inner: MemoryByteStream,
    gated: AtomicBool,
    waiting: Notify,
    release: Notify,
}

impl GatedByteStream {
    pub(crate) fn new(data: Bytes) -> Self {
        Self {
            inner: MemoryByteStream::new(data),
            gated: AtomicBool::new(false),
            waiting: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Reads issued from now on wait for [`GatedByteStream::open_gate`].
    pub(crate) fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    /// Lets the held read finish and stops holding later ones.
    pub(crate) fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.release.notify_one();
    }

    /// Resolves once a read is held at the gate.
    pub(crate) async fn read_held(&self) {
        self.waiting.notified().await;
    }
}

#[async_trait]
impl ByteStream for GatedByteStream {
    fn capabilities(&self) -> StreamCapabilities {
        self.inner.capabilities()
    }

    fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }

    fn position(&self) -> io::Result<u64> {
        self.inner.position()
    }

    async fn read(&self, len: usize) -> io::Result<Bytes> {
        if self.gated.load(Ordering::SeqCst) {
            self.waiting.notify_one();
            self.release.notified().await;
        }
        self.inner.read(len).await
    }
}
