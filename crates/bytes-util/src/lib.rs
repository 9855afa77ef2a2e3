//! Big-endian byte helpers shared by the container and codec crates.
//!
//! Reading goes through [`BytesCursor`], an [`std::io::Cursor`] over [`bytes::Bytes`],
//! combined with [`byteorder::ReadBytesExt`] for wire integers and
//! [`BytesCursorExt`] for zero-copy slicing. Writing goes through
//! [`BytesWriter`], a growable buffer with big-endian primitives.
//!
//! Nothing in here knows about FLV.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

mod bytes_cursor;
mod bytes_writer;

pub use bytes_cursor::{BytesCursor, BytesCursorExt};
pub use bytes_writer::BytesWriter;
