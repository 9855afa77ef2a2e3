use std::borrow::Cow;
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use num_traits::FromPrimitive;

use super::{Amf0Marker, Amf0ReadError, Amf0Value};

/// Containers nested deeper than this are rejected instead of recursing further.
const MAX_NESTING: usize = 64;

/// An AMF0 Decoder.
///
/// This decoder takes a reference to a byte slice and reads the AMF0 data from
/// it. All returned strings borrow from the original slice.
///
/// Besides materializing values with [`Amf0Decoder::decode`], it can walk a
/// map property by property ([`Amf0Decoder::read_map_header`] and
/// [`Amf0Decoder::next_property`]) and skip any value without building it
/// ([`Amf0Decoder::skip_value`]).
pub struct Amf0Decoder<'a> {
    cursor: Cursor<&'a [u8]>,
    depth: usize,
}

impl<'a> Amf0Decoder<'a> {
    /// Create a new AMF0 decoder.
    pub const fn new(buff: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(buff),
            depth: 0,
        }
    }

    /// Check if the decoder has reached the end of the AMF0 data.
    pub const fn is_empty(&self) -> bool {
        self.cursor.get_ref().len() <= self.cursor.position() as usize
    }

    /// Offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    fn remaining(&self) -> usize {
        self.cursor
            .get_ref()
            .len()
            .saturating_sub(self.cursor.position() as usize)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Amf0ReadError> {
        if len > self.remaining() {
            return Err(Amf0ReadError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("need {len} bytes, {} left", self.remaining()),
            )));
        }
        let start = self.cursor.position() as usize;
        self.cursor.set_position((start + len) as u64);
        let buf: &'a [u8] = *self.cursor.get_ref();
        Ok(&buf[start..start + len])
    }

    fn skip(&mut self, len: usize) -> Result<(), Amf0ReadError> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_marker(&mut self) -> Result<Amf0Marker, Amf0ReadError> {
        let raw = self.cursor.read_u8()?;
        Amf0Marker::from_u8(raw).ok_or(Amf0ReadError::UnknownMarker(raw))
    }

    /// Returns the marker of the next value without consuming it.
    pub fn peek_marker(&mut self) -> Result<Amf0Marker, Amf0ReadError> {
        let pos = self.cursor.position();
        let marker = self.read_marker();
        self.cursor.set_position(pos);
        marker
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, Amf0ReadError>,
    ) -> Result<T, Amf0ReadError> {
        if self.depth >= MAX_NESTING {
            return Err(Amf0ReadError::NestingTooDeep(MAX_NESTING));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Read the next encoded value from the decoder.
    pub fn decode(&mut self) -> Result<Amf0Value<'a>, Amf0ReadError> {
        let marker = self.read_marker()?;

        match marker {
            Amf0Marker::Number => Ok(Amf0Value::Number(self.read_number()?)),
            Amf0Marker::Boolean => Ok(Amf0Value::Boolean(self.read_bool()?)),
            Amf0Marker::String => Ok(Amf0Value::String(self.read_string()?)),
            Amf0Marker::Object => Ok(Amf0Value::Object(
                self.nested(|d| d.read_properties())?.into(),
            )),
            Amf0Marker::EcmaArray => {
                // The count is only a hint; the terminator is authoritative.
                let _count = self.cursor.read_u32::<BigEndian>()?;
                Ok(Amf0Value::Object(self.nested(|d| d.read_properties())?.into()))
            }
            Amf0Marker::StrictArray => Ok(Amf0Value::StrictArray(
                self.nested(|d| d.read_strict_array())?.into(),
            )),
            Amf0Marker::Null => Ok(Amf0Value::Null),
            Amf0Marker::Undefined => Ok(Amf0Value::Undefined),
            Amf0Marker::Reference => Ok(Amf0Value::Reference(
                self.cursor.read_u16::<BigEndian>()?,
            )),
            Amf0Marker::Date => Ok(Amf0Value::Date {
                millis: self.read_number()?,
                time_zone: self.cursor.read_i16::<BigEndian>()?,
            }),
            Amf0Marker::LongString => Ok(Amf0Value::LongString(self.read_long_string()?)),
            _ => Err(Amf0ReadError::UnsupportedType(marker)),
        }
    }

    /// Read the next encoded value from the decoder and check if it matches the
    /// specified marker.
    pub fn decode_with_type(
        &mut self,
        expected: Amf0Marker,
    ) -> Result<Amf0Value<'a>, Amf0ReadError> {
        let got = self.peek_marker()?;
        if got != expected {
            return Err(Amf0ReadError::WrongType { expected, got });
        }

        self.decode()
    }

    /// Consumes the header of an object or ECMA array so that its properties
    /// can be walked with [`Amf0Decoder::next_property`].
    ///
    /// Returns which of the two map kinds was found.
    pub fn read_map_header(&mut self) -> Result<Amf0Marker, Amf0ReadError> {
        let marker = self.read_marker()?;
        match marker {
            Amf0Marker::Object => {}
            Amf0Marker::EcmaArray => {
                let _count = self.cursor.read_u32::<BigEndian>()?;
            }
            got => {
                return Err(Amf0ReadError::WrongType {
                    expected: Amf0Marker::EcmaArray,
                    got,
                });
            }
        }
        Ok(marker)
    }

    /// Reads the next property name of the map being walked.
    ///
    /// Returns `None` at the empty-name terminator, which must be followed by
    /// the object-end marker. Running out of input at a property boundary also
    /// ends the map, since some writers drop the terminator of the last
    /// top-level array.
    ///
    /// The caller must consume the value with [`Amf0Decoder::decode`] or
    /// [`Amf0Decoder::skip_value`] before asking for the next name.
    pub fn next_property(&mut self) -> Result<Option<Cow<'a, str>>, Amf0ReadError> {
        if self.is_empty() {
            return Ok(None);
        }

        let name = self.read_string()?;
        if name.is_empty() {
            let end = self.cursor.read_u8()?;
            if end != Amf0Marker::ObjectEnd as u8 {
                return Err(Amf0ReadError::MissingObjectEnd(end));
            }
            return Ok(None);
        }

        Ok(Some(name))
    }

    /// Skips the next value, including any nested containers, without
    /// allocating.
    pub fn skip_value(&mut self) -> Result<(), Amf0ReadError> {
        let marker = self.read_marker()?;

        match marker {
            Amf0Marker::Number => self.skip(8),
            Amf0Marker::Boolean => self.skip(1),
            Amf0Marker::String | Amf0Marker::MovieClip => {
                let len = self.cursor.read_u16::<BigEndian>()?;
                self.skip(len as usize)
            }
            Amf0Marker::LongString | Amf0Marker::XmlDocument => {
                let len = self.cursor.read_u32::<BigEndian>()?;
                self.skip(len as usize)
            }
            Amf0Marker::Object => self.nested(|d| d.skip_properties()),
            Amf0Marker::EcmaArray => {
                self.skip(4)?;
                self.nested(|d| d.skip_properties())
            }
            Amf0Marker::TypedObject => {
                let class_len = self.cursor.read_u16::<BigEndian>()?;
                self.skip(class_len as usize)?;
                self.nested(|d| d.skip_properties())
            }
            Amf0Marker::StrictArray => {
                let count = self.cursor.read_u32::<BigEndian>()?;
                self.nested(|d| {
                    for _ in 0..count {
                        d.skip_value()?;
                    }
                    Ok(())
                })
            }
            Amf0Marker::Reference => self.skip(2),
            Amf0Marker::Date => self.skip(10),
            Amf0Marker::Null
            | Amf0Marker::Undefined
            | Amf0Marker::ObjectEnd
            | Amf0Marker::Unsupported => Ok(()),
            Amf0Marker::Recordset | Amf0Marker::AvmPlusObject => {
                Err(Amf0ReadError::UnsupportedType(marker))
            }
        }
    }

    fn skip_properties(&mut self) -> Result<(), Amf0ReadError> {
        while self.next_property()?.is_some() {
            self.skip_value()?;
        }
        Ok(())
    }

    fn read_number(&mut self) -> Result<f64, Amf0ReadError> {
        Ok(self.cursor.read_f64::<BigEndian>()?)
    }

    fn read_bool(&mut self) -> Result<bool, Amf0ReadError> {
        Ok(self.cursor.read_u8()? > 0)
    }

    fn read_string(&mut self) -> Result<Cow<'a, str>, Amf0ReadError> {
        let len = self.cursor.read_u16::<BigEndian>()?;
        let bytes = self.read_bytes(len as usize)?;

        Ok(Cow::Borrowed(std::str::from_utf8(bytes)?))
    }

    fn read_long_string(&mut self) -> Result<Cow<'a, str>, Amf0ReadError> {
        let len = self.cursor.read_u32::<BigEndian>()?;
        let bytes = self.read_bytes(len as usize)?;

        Ok(Cow::Borrowed(std::str::from_utf8(bytes)?))
    }

    fn read_properties(&mut self) -> Result<Vec<(Cow<'a, str>, Amf0Value<'a>)>, Amf0ReadError> {
        let mut properties = Vec::new();

        while let Some(key) = self.next_property()? {
            let value = self.decode()?;
            properties.push((key, value));
        }

        Ok(properties)
    }

    fn read_strict_array(&mut self) -> Result<Vec<Amf0Value<'a>>, Amf0ReadError> {
        let count = self.cursor.read_u32::<BigEndian>()? as usize;

        // every element takes at least one byte, so the input bounds the allocation
        let mut values = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            values.push(self.decode()?);
        }

        Ok(values)
    }
}
