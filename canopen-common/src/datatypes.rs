//! CANopen data types and their byte encoding.
//!
//! A [`DataType`] knows how to turn the little-endian bytes of an object into a
//! typed [`Value`] and back. Everything else (scaling, descriptions, bits) is
//! layered on top in [`crate::codec`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CodecError;

/// CiA 301 basic data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Boolean,
    Integer8,
    Integer16,
    Integer32,
    Integer64,
    Unsigned8,
    Unsigned16,
    Unsigned32,
    Unsigned64,
    Real32,
    Real64,
    VisibleString,
    OctetString,
    UnicodeString,
    Domain,
}

impl DataType {
    /// Look up a data type by its object dictionary code (e.g. `0x0007` for UNSIGNED32).
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0001 => Some(Self::Boolean),
            0x0002 => Some(Self::Integer8),
            0x0003 => Some(Self::Integer16),
            0x0004 => Some(Self::Integer32),
            0x0005 => Some(Self::Unsigned8),
            0x0006 => Some(Self::Unsigned16),
            0x0007 => Some(Self::Unsigned32),
            0x0008 => Some(Self::Real32),
            0x0009 => Some(Self::VisibleString),
            0x000A => Some(Self::OctetString),
            0x000B => Some(Self::UnicodeString),
            0x000F => Some(Self::Domain),
            0x0011 => Some(Self::Real64),
            0x0015 => Some(Self::Integer64),
            0x001B => Some(Self::Unsigned64),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::Boolean => 0x0001,
            Self::Integer8 => 0x0002,
            Self::Integer16 => 0x0003,
            Self::Integer32 => 0x0004,
            Self::Unsigned8 => 0x0005,
            Self::Unsigned16 => 0x0006,
            Self::Unsigned32 => 0x0007,
            Self::Real32 => 0x0008,
            Self::VisibleString => 0x0009,
            Self::OctetString => 0x000A,
            Self::UnicodeString => 0x000B,
            Self::Domain => 0x000F,
            Self::Real64 => 0x0011,
            Self::Integer64 => 0x0015,
            Self::Unsigned64 => 0x001B,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer8 => "INTEGER8",
            Self::Integer16 => "INTEGER16",
            Self::Integer32 => "INTEGER32",
            Self::Integer64 => "INTEGER64",
            Self::Unsigned8 => "UNSIGNED8",
            Self::Unsigned16 => "UNSIGNED16",
            Self::Unsigned32 => "UNSIGNED32",
            Self::Unsigned64 => "UNSIGNED64",
            Self::Real32 => "REAL32",
            Self::Real64 => "REAL64",
            Self::VisibleString => "VISIBLE_STRING",
            Self::OctetString => "OCTET_STRING",
            Self::UnicodeString => "UNICODE_STRING",
            Self::Domain => "DOMAIN",
        }
    }

    /// Width in bytes of fixed-size types, `None` for strings and domains.
    pub fn size(self) -> Option<usize> {
        match self {
            Self::Boolean | Self::Integer8 | Self::Unsigned8 => Some(1),
            Self::Integer16 | Self::Unsigned16 => Some(2),
            Self::Integer32 | Self::Unsigned32 | Self::Real32 => Some(4),
            Self::Integer64 | Self::Unsigned64 | Self::Real64 => Some(8),
            Self::VisibleString | Self::OctetString | Self::UnicodeString | Self::Domain => None,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Integer8 | Self::Integer16 | Self::Integer32 | Self::Integer64
        )
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Self::Unsigned8 | Self::Unsigned16 | Self::Unsigned32 | Self::Unsigned64
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::Real32 | Self::Real64)
    }

    pub fn is_string(self) -> bool {
        matches!(self, Self::VisibleString | Self::UnicodeString)
    }

    /// Validate `data` against the type width and trim it to that width.
    pub fn decode_raw(self, data: &[u8]) -> Result<&[u8], CodecError> {
        match self.size() {
            Some(size) if data.len() < size => Err(CodecError::LengthMismatch {
                data_type: self,
                expected: size,
                actual: data.len(),
            }),
            Some(size) => Ok(&data[..size]),
            None => Ok(data),
        }
    }

    /// Decode little-endian bytes into a typed value.
    ///
    /// Strings that are not valid UTF-8 (or UTF-16) come back unchanged as
    /// [`Value::Bytes`], so they still encode to the same bytes.
    pub fn decode_value(self, data: &[u8]) -> Result<Value, CodecError> {
        let data = self.decode_raw(data)?;
        let value = match self {
            Self::Boolean => Value::Boolean(data[0] != 0),
            Self::Integer8 => Value::Integer(i64::from(data[0] as i8)),
            Self::Integer16 => Value::Integer(i16::from_le_bytes(fixed(data)).into()),
            Self::Integer32 => Value::Integer(i32::from_le_bytes(fixed(data)).into()),
            Self::Integer64 => Value::Integer(i64::from_le_bytes(fixed(data))),
            Self::Unsigned8 => Value::Unsigned(u64::from(data[0])),
            Self::Unsigned16 => Value::Unsigned(u16::from_le_bytes(fixed(data)).into()),
            Self::Unsigned32 => Value::Unsigned(u32::from_le_bytes(fixed(data)).into()),
            Self::Unsigned64 => Value::Unsigned(u64::from_le_bytes(fixed(data))),
            Self::Real32 => Value::Float(f32::from_le_bytes(fixed(data)).into()),
            Self::Real64 => Value::Float(f64::from_le_bytes(fixed(data))),
            Self::VisibleString => {
                // trailing NUL bytes are padding, not text
                let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
                match std::str::from_utf8(&data[..end]) {
                    Ok(text) => Value::Text(text.to_string()),
                    Err(_) => Value::Bytes(data.to_vec()),
                }
            }
            Self::UnicodeString => {
                if data.len() % 2 != 0 {
                    return Err(CodecError::LengthMismatch {
                        data_type: self,
                        expected: data.len() + 1,
                        actual: data.len(),
                    });
                }
                let units: Vec<u16> = data
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                match String::from_utf16(&units) {
                    Ok(text) => Value::Text(text.trim_end_matches('\0').to_string()),
                    Err(_) => Value::Bytes(data.to_vec()),
                }
            }
            Self::OctetString | Self::Domain => Value::Bytes(data.to_vec()),
        };
        Ok(value)
    }

    /// Encode a value into the little-endian bytes of this type.
    ///
    /// Integer types accept any integer value that fits, signed or not.
    pub fn encode_value(self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let bytes = match self {
            Self::Boolean => match value {
                Value::Boolean(b) => vec![u8::from(*b)],
                other => vec![u8::from(self.integer::<bool>(other)?)],
            },
            Self::Integer8 => self.integer::<i8>(value)?.to_le_bytes().to_vec(),
            Self::Integer16 => self.integer::<i16>(value)?.to_le_bytes().to_vec(),
            Self::Integer32 => self.integer::<i32>(value)?.to_le_bytes().to_vec(),
            Self::Integer64 => self.integer::<i64>(value)?.to_le_bytes().to_vec(),
            Self::Unsigned8 => self.integer::<u8>(value)?.to_le_bytes().to_vec(),
            Self::Unsigned16 => self.integer::<u16>(value)?.to_le_bytes().to_vec(),
            Self::Unsigned32 => self.integer::<u32>(value)?.to_le_bytes().to_vec(),
            Self::Unsigned64 => self.integer::<u64>(value)?.to_le_bytes().to_vec(),
            Self::Real32 => {
                let x = self.float(value)?;
                if x.is_finite() && x.abs() > f64::from(f32::MAX) {
                    return Err(self.out_of_range(value));
                }
                (x as f32).to_le_bytes().to_vec()
            }
            Self::Real64 => self.float(value)?.to_le_bytes().to_vec(),
            Self::VisibleString | Self::OctetString | Self::Domain => match value {
                Value::Text(text) => text.as_bytes().to_vec(),
                Value::Bytes(bytes) => bytes.clone(),
                other => return Err(self.type_mismatch(other)),
            },
            Self::UnicodeString => match value {
                Value::Text(text) => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
                Value::Bytes(bytes) => bytes.clone(),
                other => return Err(self.type_mismatch(other)),
            },
        };
        Ok(bytes)
    }

    fn integer<T: TryFrom<i128>>(self, value: &Value) -> Result<T, CodecError> {
        let wide = value.as_i128().ok_or_else(|| self.type_mismatch(value))?;
        T::try_from(wide).map_err(|_| self.out_of_range(value))
    }

    fn float(self, value: &Value) -> Result<f64, CodecError> {
        value.as_f64().ok_or_else(|| self.type_mismatch(value))
    }

    fn type_mismatch(self, value: &Value) -> CodecError {
        CodecError::TypeMismatch {
            data_type: self,
            value: value.to_string(),
        }
    }

    fn out_of_range(self, value: &Value) -> CodecError {
        CodecError::OutOfRange {
            data_type: self,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Copy an already length-checked slice into a fixed array.
fn fixed<const N: usize>(data: &[u8]) -> [u8; N] {
    let mut buf = [0u8; N];
    buf.copy_from_slice(&data[..N]);
    buf
}

/// Decoded value of an object dictionary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Integer view of the value, `None` for floats, text and bytes.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Boolean(b) => Some(i128::from(*b)),
            Self::Integer(i) => Some(i128::from(*i)),
            Self::Unsigned(u) => Some(i128::from(*u)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Unsigned(u) => Some(*u as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Unsigned(_) | Self::Float(_))
    }

    /// Parse user supplied text as a value of `data_type`.
    ///
    /// Integers may be decimal or `0x` prefixed hexadecimal, octet strings and
    /// domains are hexadecimal byte strings.
    pub fn parse(data_type: DataType, text: &str) -> Result<Self, CodecError> {
        let text = text.trim();
        let error = || CodecError::Parse {
            data_type,
            text: text.to_string(),
        };
        let value = match data_type {
            DataType::Boolean => match text.to_ascii_lowercase().as_str() {
                "true" | "1" => Self::Boolean(true),
                "false" | "0" => Self::Boolean(false),
                _ => return Err(error()),
            },
            t if t.is_signed() => {
                let parsed = match strip_hex_prefix(text) {
                    Some(hex) => i64::from_str_radix(hex, 16).ok(),
                    None => text.parse::<i64>().ok(),
                };
                Self::Integer(parsed.ok_or_else(error)?)
            }
            t if t.is_unsigned() => {
                let parsed = match strip_hex_prefix(text) {
                    Some(hex) => u64::from_str_radix(hex, 16).ok(),
                    None => text.parse::<u64>().ok(),
                };
                Self::Unsigned(parsed.ok_or_else(error)?)
            }
            DataType::Real32 | DataType::Real64 => {
                Self::Float(text.parse::<f64>().map_err(|_| error())?)
            }
            DataType::VisibleString | DataType::UnicodeString => Self::Text(text.to_string()),
            _ => Self::Bytes(parse_hex(text).ok_or_else(error)?),
        };
        Ok(value)
    }
}

fn strip_hex_prefix(text: &str) -> Option<&str> {
    text.strip_prefix("0x").or_else(|| text.strip_prefix("0X"))
}

/// Parse a hexadecimal byte string such as `"0a0b0c"` or `"0A 0B 0C"`.
pub fn parse_hex(text: &str) -> Option<Vec<u8>> {
    let digits: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = strip_hex_prefix(&digits).unwrap_or(&digits);
    if digits.len() % 2 != 0 {
        return None;
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(digits.get(i..i + 2)?, 16).ok())
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
            Self::Unsigned(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
            Self::Bytes(v) => write!(f, "{:02X?}", v),
        }
    }
}

macro_rules! value_from {
    ($variant:ident, $target:ty: $($source:ty),*) => {
        $(impl From<$source> for Value {
            fn from(v: $source) -> Self {
                Value::$variant(<$target>::from(v))
            }
        })*
    };
}

value_from!(Integer, i64: i8, i16, i32, i64);
value_from!(Unsigned, u64: u8, u16, u32, u64);
value_from!(Float, f64: f32, f64);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Bytes(v.to_vec())
    }
}
