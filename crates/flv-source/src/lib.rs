//! # FLV Source
//!
//! An asynchronous demux engine for FLV files. It reads through a
//! [`ByteStream`], describes the audio and video tracks it finds, and hands
//! out samples on request with per-track flow control.
//!
//! ## Usage
//!
//! ```ignore
//! let (source, mut events) = FlvSource::new(SourceConfig::default());
//! let presentation = source.open(Arc::new(FileByteStream::open(path)?)).await?;
//! source.start(&presentation, StartPosition::At(0))?;
//!
//! let video = source.stream(TrackKind::Video).unwrap();
//! video.request_sample(Some(RequestToken(1)))?;
//! while let Some(event) = events.recv().await {
//!     // SourceEvent::Sample { track, sample, token }, EndOfStream, ...
//! }
//! ```
//!
//! ## Features
//!
//! - Readiness-gated open: tracks are described once their codec
//!   configuration has been read
//! - AVC samples in start-code framing, with the parameter sets delivered
//!   ahead of the first picture
//! - AAC, MP3 and PCM audio passed through as stored
//! - At most one outstanding read, and at most four queued samples per track
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

#[cfg(test)]
#[macro_use]
mod test_support;

pub mod byte_stream;
pub mod config;
mod demux;
pub mod descriptor;
mod discovery;
pub mod error;
pub mod event;
mod session;
pub mod source;
pub mod stream;

pub use byte_stream::{ByteStream, FileByteStream, MemoryByteStream, StreamCapabilities};
pub use config::{MAX_SAMPLE_QUEUE_DEPTH, SourceConfig, SourceConfigBuilder};
pub use descriptor::{
    AudioCodec, AudioMediaType, MediaType, PresentationDescriptor, StreamDescriptor, TrackKind,
    VideoCodec, VideoMediaType,
};
pub use error::{ErrorKind, SourceError};
pub use event::{RequestToken, Sample, SourceEvent, StartPosition};
pub use source::{FlvSource, SourceCharacteristics, SourceState};
pub use stream::MediaStream;
