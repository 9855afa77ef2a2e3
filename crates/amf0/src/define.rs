use std::borrow::Cow;

use num_derive::FromPrimitive;

/// AMF0 type markers.
/// Defined in amf0_spec_121207.pdf section 2.1
#[derive(Debug, PartialEq, Eq, Clone, Copy, FromPrimitive)]
#[repr(u8)]
pub enum Amf0Marker {
    /// number-marker
    Number = 0x00,
    /// boolean-marker
    Boolean = 0x01,
    /// string-marker
    String = 0x02,
    /// object-marker
    Object = 0x03,
    /// movieclip-marker, reserved
    MovieClip = 0x04,
    /// null-marker
    Null = 0x05,
    /// undefined-marker
    Undefined = 0x06,
    /// reference-marker
    Reference = 0x07,
    /// ecma-array-marker
    EcmaArray = 0x08,
    /// object-end-marker
    ObjectEnd = 0x09,
    /// strict-array-marker
    StrictArray = 0x0a,
    /// date-marker
    Date = 0x0b,
    /// long-string-marker
    LongString = 0x0c,
    /// unsupported-marker
    Unsupported = 0x0d,
    /// recordset-marker, reserved
    Recordset = 0x0e,
    /// xml-document-marker
    XmlDocument = 0x0f,
    /// typed-object-marker
    TypedObject = 0x10,
    /// avmplus-object-marker (switch to AMF3)
    AvmPlusObject = 0x11,
}

/// A decoded AMF0 value.
///
/// Strings and nested containers borrow from the input when possible.
#[derive(PartialEq, Clone, Debug)]
pub enum Amf0Value<'a> {
    /// section 2.2
    Number(f64),
    /// section 2.3
    Boolean(bool),
    /// section 2.4
    String(Cow<'a, str>),
    /// section 2.5; ECMA arrays decode into this variant as well
    Object(Cow<'a, [(Cow<'a, str>, Amf0Value<'a>)]>),
    /// section 2.7
    Null,
    /// section 2.8
    Undefined,
    /// section 2.9, index into the reference table
    Reference(u16),
    /// section 2.11
    StrictArray(Cow<'a, [Amf0Value<'a>]>),
    /// section 2.13, milliseconds since the epoch plus a time zone that is
    /// required to be 0
    Date {
        /// milliseconds since 1970-01-01 UTC
        millis: f64,
        /// reserved time zone field
        time_zone: i16,
    },
    /// section 2.14
    LongString(Cow<'a, str>),
}

impl Amf0Value<'_> {
    /// The marker that introduces this value on the wire.
    pub fn marker(&self) -> Amf0Marker {
        match self {
            Self::Number(_) => Amf0Marker::Number,
            Self::Boolean(_) => Amf0Marker::Boolean,
            Self::String(_) => Amf0Marker::String,
            Self::Object(_) => Amf0Marker::Object,
            Self::Null => Amf0Marker::Null,
            Self::Undefined => Amf0Marker::Undefined,
            Self::Reference(_) => Amf0Marker::Reference,
            Self::StrictArray(_) => Amf0Marker::StrictArray,
            Self::Date { .. } => Amf0Marker::Date,
            Self::LongString(_) => Amf0Marker::LongString,
        }
    }

    /// Numeric view. Booleans map to 0 and 1.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Boolean(b) => Some(f64::from(u8::from(*b))),
            _ => None,
        }
    }

    /// Boolean view. Numbers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    /// String view for both short and long strings.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::LongString(s) => Some(s),
            _ => None,
        }
    }

    /// Detaches the value from the input buffer.
    pub fn to_owned(&self) -> Amf0Value<'static> {
        match self {
            Self::Number(n) => Amf0Value::Number(*n),
            Self::Boolean(b) => Amf0Value::Boolean(*b),
            Self::String(s) => Amf0Value::String(Cow::Owned(s.to_string())),
            Self::Object(o) => Amf0Value::Object(
                o.iter()
                    .map(|(k, v)| (Cow::Owned(k.to_string()), v.to_owned()))
                    .collect(),
            ),
            Self::Null => Amf0Value::Null,
            Self::Undefined => Amf0Value::Undefined,
            Self::Reference(idx) => Amf0Value::Reference(*idx),
            Self::StrictArray(a) => {
                Amf0Value::StrictArray(a.iter().map(|v| v.to_owned()).collect())
            }
            Self::Date { millis, time_zone } => Amf0Value::Date {
                millis: *millis,
                time_zone: *time_zone,
            },
            Self::LongString(s) => Amf0Value::LongString(Cow::Owned(s.to_string())),
        }
    }
}
