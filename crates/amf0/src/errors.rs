use std::io;

use super::define::Amf0Marker;

/// Errors that can occur when decoding AMF0 data.
#[derive(Debug, thiserror::Error)]
pub enum Amf0ReadError {
    /// The marker byte is outside the AMF0 range.
    #[error("unknown marker: {0}")]
    UnknownMarker(u8),
    /// The marker is valid AMF0 but cannot be decoded or skipped.
    #[error("unsupported type: {0:?}")]
    UnsupportedType(Amf0Marker),
    /// A string was not valid UTF-8.
    #[error("string parse error: {0}")]
    StringParseError(#[from] std::str::Utf8Error),
    /// The input ended early.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The next value is not of the requested type.
    #[error("wrong type: expected {expected:?}, got {got:?}")]
    WrongType {
        /// requested marker
        expected: Amf0Marker,
        /// marker found in the input
        got: Amf0Marker,
    },
    /// An empty property name was not followed by the object-end marker.
    #[error("missing object end marker, got 0x{0:02x}")]
    MissingObjectEnd(u8),
    /// Containers nested deeper than the decoder allows.
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
}

/// Errors that can occur when encoding AMF0 data.
#[derive(Debug, thiserror::Error)]
pub enum Amf0WriteError {
    /// A string did not fit the 16-bit length of a normal string.
    #[error("normal string too long")]
    NormalStringTooLong,
    /// The underlying writer failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    /// The value has no encoder.
    #[error("unsupported type: {0:?}")]
    UnsupportedType(Amf0Marker),
}
