//! H.264 decoder configuration and NAL unit framing.
//!
//! FLV carries AVC in its MP4 flavour: the stream starts with an
//! `AVCDecoderConfigurationRecord` and every coded picture is a run of
//! length-prefixed NAL units. Decoders fed from a demuxer usually want the
//! Annex-B flavour instead, with SPS/PPS sent in band and every unit behind a
//! start code. [`AvcConfig`] and [`NaluReformatter`] do that translation.
//!
//! ```rust
//! use std::io;
//!
//! use bytes::Bytes;
//! use h264::AvcConfig;
//!
//! let record = Bytes::from_static(&[
//!     0x01, 0x42, 0x00, 0x1e, 0xff, 0xe1, 0x00, 0x02, 0x67, 0x42, 0x01, 0x00, 0x01, 0x68,
//! ]);
//! let config = AvcConfig::parse(&mut io::Cursor::new(record)).unwrap();
//!
//! let annex_b = config
//!     .reformatter()
//!     .reformat(Bytes::from_static(&[0x00, 0x00, 0x00, 0x01, 0x65]))
//!     .unwrap();
//! assert_eq!(&annex_b[..], &[0, 0, 0, 1, 0x65]);
//! ```
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod config;
mod nalu;

pub use self::config::AvcConfig;
pub use self::nalu::{NaluReformatter, SHORT_START_CODE, START_CODE};
