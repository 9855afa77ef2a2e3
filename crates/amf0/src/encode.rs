use std::borrow::Cow;
use std::io;

use byteorder::{BigEndian, WriteBytesExt};

use super::define::Amf0Marker;
use super::{Amf0Value, Amf0WriteError};

/// AMF0 encoder.
///
/// Allows for encoding an AMF0 to some writer.
pub struct Amf0Encoder;

impl Amf0Encoder {
    /// Encode a generic AMF0 value
    pub fn encode(writer: &mut impl io::Write, value: &Amf0Value) -> Result<(), Amf0WriteError> {
        match value {
            Amf0Value::Number(val) => Self::encode_number(writer, *val),
            Amf0Value::Boolean(val) => Self::encode_bool(writer, *val),
            Amf0Value::String(val) => Self::encode_string(writer, val),
            Amf0Value::Object(val) => Self::encode_object(writer, val),
            Amf0Value::Null => Self::encode_null(writer),
            Amf0Value::Undefined => {
                writer.write_u8(Amf0Marker::Undefined as u8)?;
                Ok(())
            }
            Amf0Value::StrictArray(val) => Self::encode_strict_array(writer, val),
            Amf0Value::Date { millis, time_zone } => Self::encode_date(writer, *millis, *time_zone),
            Amf0Value::LongString(val) => Self::encode_long_string(writer, val),
            Amf0Value::Reference(_) => Err(Amf0WriteError::UnsupportedType(value.marker())),
        }
    }

    /// Write a property name (u16 length + UTF-8 bytes), as used inside objects.
    pub fn encode_property_key(
        writer: &mut impl io::Write,
        key: &str,
    ) -> Result<(), Amf0WriteError> {
        let len = u16::try_from(key.len()).map_err(|_| Amf0WriteError::NormalStringTooLong)?;
        writer.write_u16::<BigEndian>(len)?;
        writer.write_all(key.as_bytes())?;
        Ok(())
    }

    /// Write the empty name plus object end marker that closes an object or ECMA array
    pub fn object_eof(writer: &mut impl io::Write) -> Result<(), Amf0WriteError> {
        writer.write_u24::<BigEndian>(Amf0Marker::ObjectEnd as u32)?;
        Ok(())
    }

    /// Encode an AMF0 number
    pub fn encode_number(writer: &mut impl io::Write, value: f64) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::Number as u8)?;
        writer.write_f64::<BigEndian>(value)?;
        Ok(())
    }

    /// Encode an AMF0 boolean
    pub fn encode_bool(writer: &mut impl io::Write, value: bool) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::Boolean as u8)?;
        writer.write_u8(value as u8)?;
        Ok(())
    }

    /// Encode an AMF0 string
    pub fn encode_string(writer: &mut impl io::Write, value: &str) -> Result<(), Amf0WriteError> {
        if value.len() > (u16::MAX as usize) {
            return Err(Amf0WriteError::NormalStringTooLong);
        }

        writer.write_u8(Amf0Marker::String as u8)?;
        Self::encode_property_key(writer, value)
    }

    /// Encode an AMF0 long string
    pub fn encode_long_string(
        writer: &mut impl io::Write,
        value: &str,
    ) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::LongString as u8)?;
        writer.write_u32::<BigEndian>(value.len() as u32)?;
        writer.write_all(value.as_bytes())?;
        Ok(())
    }

    /// Encode an AMF0 null
    pub fn encode_null(writer: &mut impl io::Write) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::Null as u8)?;
        Ok(())
    }

    /// Encode an AMF0 date
    pub fn encode_date(
        writer: &mut impl io::Write,
        millis: f64,
        time_zone: i16,
    ) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::Date as u8)?;
        writer.write_f64::<BigEndian>(millis)?;
        writer.write_i16::<BigEndian>(time_zone)?;
        Ok(())
    }

    /// Encode an AMF0 object
    pub fn encode_object(
        writer: &mut impl io::Write,
        properties: &[(Cow<'_, str>, Amf0Value<'_>)],
    ) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::Object as u8)?;
        Self::encode_properties(writer, properties)
    }

    /// Encode an AMF0 ECMA array, the container `onMetaData` uses
    pub fn encode_ecma_array(
        writer: &mut impl io::Write,
        properties: &[(Cow<'_, str>, Amf0Value<'_>)],
    ) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::EcmaArray as u8)?;
        writer.write_u32::<BigEndian>(properties.len() as u32)?;
        Self::encode_properties(writer, properties)
    }

    fn encode_properties(
        writer: &mut impl io::Write,
        properties: &[(Cow<'_, str>, Amf0Value<'_>)],
    ) -> Result<(), Amf0WriteError> {
        for (key, value) in properties {
            Self::encode_property_key(writer, key)?;
            Self::encode(writer, value)?;
        }
        Self::object_eof(writer)
    }

    /// Encode an AMF0 strict array
    pub fn encode_strict_array(
        writer: &mut impl io::Write,
        values: &[Amf0Value<'_>],
    ) -> Result<(), Amf0WriteError> {
        writer.write_u8(Amf0Marker::StrictArray as u8)?;
        writer.write_u32::<BigEndian>(values.len() as u32)?;
        for value in values {
            Self::encode(writer, value)?;
        }
        Ok(())
    }
}
