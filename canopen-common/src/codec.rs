//! Derived views over a decoded [`Value`]: physical scaling, textual
//! descriptions and bit fields.
//!
//! All functions here are pure. The byte level encoding lives in
//! [`DataType::decode_value`] and [`DataType::encode_value`].

use std::collections::BTreeMap;

use crate::datatypes::{DataType, Value};
use crate::error::CodecError;

/// Widest bit selection that still fits the gathered integer.
pub const MAX_SELECTED_BITS: usize = 64;

fn has_scale(factor: Option<f64>) -> Option<f64> {
    factor.filter(|f| *f != 1.0)
}

/// Scale a raw value into its physical representation.
///
/// Without a factor (or with a factor of 1) the value is returned untouched,
/// integers only become floats when an actual scaling happens.
pub fn decode_phys(value: &Value, factor: Option<f64>) -> Value {
    match (has_scale(factor), value.as_f64()) {
        (Some(factor), Some(x)) if value.is_numeric() => Value::Float(x * factor),
        _ => value.clone(),
    }
}

/// Inverse of [`decode_phys`], producing a raw value ready for
/// [`DataType::encode_value`].
///
/// Integer types are rounded to the nearest integer after unscaling.
pub fn encode_phys(data_type: DataType, value: &Value, factor: Option<f64>) -> Result<Value, CodecError> {
    let Some(factor) = has_scale(factor) else {
        return Ok(value.clone());
    };
    let x = value.as_f64().ok_or_else(|| CodecError::TypeMismatch {
        data_type,
        value: value.to_string(),
    })?;
    let raw = x / factor;
    if !data_type.is_integer() {
        return Ok(Value::Float(raw));
    }
    let rounded = raw.round();
    let out_of_range = || CodecError::OutOfRange {
        data_type,
        value: value.to_string(),
    };
    if !rounded.is_finite() {
        return Err(out_of_range());
    }
    if rounded < 0.0 {
        if rounded < i64::MIN as f64 {
            return Err(out_of_range());
        }
        Ok(Value::Integer(rounded as i64))
    } else if rounded > u64::MAX as f64 {
        Err(out_of_range())
    } else {
        Ok(Value::Unsigned(rounded as u64))
    }
}

/// Look up the description of an integer value.
pub fn decode_desc<'a>(value: &Value, descriptions: &'a BTreeMap<i64, String>) -> Result<&'a str, CodecError> {
    value
        .as_i128()
        .and_then(|v| i64::try_from(v).ok())
        .and_then(|key| descriptions.get(&key))
        .map(String::as_str)
        .ok_or_else(|| CodecError::NoDescription(value.to_string()))
}

/// Reverse lookup of a description. Matching is exact and case sensitive.
pub fn encode_desc(text: &str, descriptions: &BTreeMap<i64, String>) -> Result<Value, CodecError> {
    descriptions
        .iter()
        .find(|(_, description)| description.as_str() == text)
        .map(|(raw, _)| Value::Integer(*raw))
        .ok_or_else(|| CodecError::NoDescription(text.to_string()))
}

/// Sort, deduplicate and validate a bit selection against a buffer of `len` bytes.
fn selection(len: usize, bits: &[u32]) -> Result<Vec<u32>, CodecError> {
    if bits.is_empty() {
        return Err(CodecError::InvalidBitSelection("no bits selected"));
    }
    let mut bits = bits.to_vec();
    bits.sort_unstable();
    bits.dedup();
    if bits.len() > MAX_SELECTED_BITS {
        return Err(CodecError::InvalidBitSelection("more than 64 bits selected"));
    }
    let width = u32::try_from(len * 8).unwrap_or(u32::MAX);
    match bits.iter().find(|&&bit| bit >= width) {
        Some(&bit) => Err(CodecError::InvalidBit { bit, width }),
        None => Ok(bits),
    }
}

fn bit(data: &[u8], position: u32) -> bool {
    data[(position / 8) as usize] >> (position % 8) & 1 == 1
}

/// Gather the selected bit positions of a little-endian buffer into an integer.
///
/// The lowest selected position becomes bit 0 of the result, the next one
/// bit 1 and so on. Bit 0 of the buffer is the least significant bit of
/// its integer representation.
pub fn decode_bits(data: &[u8], bits: &[u32]) -> Result<u64, CodecError> {
    let bits = selection(data.len(), bits)?;
    Ok(bits
        .iter()
        .enumerate()
        .filter(|&(_, &position)| bit(data, position))
        .fold(0u64, |acc, (i, _)| acc | 1 << i))
}

/// Scatter `value` into the selected bit positions, leaving every other bit
/// of `data` untouched.
pub fn encode_bits(data: &[u8], bits: &[u32], value: u64) -> Result<Vec<u8>, CodecError> {
    let bits = selection(data.len(), bits)?;
    if bits.len() < MAX_SELECTED_BITS && value >> bits.len() != 0 {
        return Err(CodecError::InvalidBitSelection("value is wider than the selected bits"));
    }
    let mut out = data.to_vec();
    for (i, &position) in bits.iter().enumerate() {
        let byte = &mut out[(position / 8) as usize];
        let mask = 1u8 << (position % 8);
        if value >> i & 1 == 1 {
            *byte |= mask;
        } else {
            *byte &= !mask;
        }
    }
    Ok(out)
}
