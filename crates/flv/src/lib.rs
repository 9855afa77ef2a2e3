//! # FLV
//!
//! Byte-exact decoding of the FLV container: the file header, tag headers,
//! audio and video sub-headers, the AAC/AVC packet headers and the
//! `onMetaData` script object.
//!
//! Decoding is split into fixed-size steps so that a caller driving
//! asynchronous reads can fetch exactly the bytes the next step needs, see
//! [`TagParser`]. The encoders on the header types exist so that streams can
//! be assembled for tests.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

pub mod aac;
pub mod audio;
pub mod avc;
pub mod error;
pub mod header;
pub mod parser;
pub mod script;
pub mod tag;
pub mod video;

pub use aac::AacPacketType;
pub use audio::{AudioHeader, AudioPacketHeader, SoundFormat, SoundRate, SoundSize, SoundType};
pub use avc::{AvcPacketHeader, AvcPacketType};
pub use error::FlvError;
pub use header::{FLV_HEADER_SIZE, FlvHeader};
pub use parser::TagParser;
pub use script::{Keyframe, KeyframeIndex, Metadata};
pub use tag::{HNS_PER_MS, PREVIOUS_TAG_SIZE_LEN, TAG_HEADER_SIZE, TagHeader, TagType};
pub use video::{VideoCodecId, VideoFrameType, VideoHeader, VideoPacketHeader};
