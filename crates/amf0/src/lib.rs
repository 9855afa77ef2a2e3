//! A pure-rust implementation of an AMF0 encoder and decoder.
//!
//! FLV embeds its `onMetaData` script object in AMF0. The decoder can either
//! materialize values or walk a map property by property, skipping anything
//! the caller does not recognize.
//!
//! # Examples
//!
//! Walking an `onMetaData` body without materializing it:
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::borrow::Cow;
//!
//! use amf0::{Amf0Decoder, Amf0Encoder, Amf0Marker, Amf0Value};
//!
//! let mut body = Vec::new();
//! Amf0Encoder::encode_string(&mut body, "onMetaData")?;
//! Amf0Encoder::encode_ecma_array(
//!     &mut body,
//!     &[
//!         (Cow::Borrowed("duration"), Amf0Value::Number(12.5)),
//!         (Cow::Borrowed("encoder"), Amf0Value::String("obs".into())),
//!     ],
//! )?;
//!
//! let mut decoder = Amf0Decoder::new(&body);
//! decoder.decode_with_type(Amf0Marker::String)?;
//! decoder.read_map_header()?;
//!
//! let mut duration = None;
//! while let Some(key) = decoder.next_property()? {
//!     match key.as_ref() {
//!         "duration" => duration = decoder.decode()?.as_number(),
//!         _ => decoder.skip_value()?,
//!     }
//! }
//! assert_eq!(duration, Some(12.5));
//! # Ok(())
//! # }
//! ```
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod decode;
mod define;
mod encode;
mod errors;

pub use crate::decode::Amf0Decoder;
pub use crate::define::{Amf0Marker, Amf0Value};
pub use crate::encode::Amf0Encoder;
pub use crate::errors::{Amf0ReadError, Amf0WriteError};
