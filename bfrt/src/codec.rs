/*
Copyright (c) 2021 VMware, Inc.
SPDX-License-Identifier: MIT
Permission is hereby granted, free of charge, to any person obtaining a copy
of this software and associated documentation files (the "Software"), to deal
in the Software without restriction, including without limitation the rights
to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
copies of the Software, and to permit persons to whom the Software is
furnished to do so, subject to the following conditions:
The above copyright notice and this permission notice shall be included in all
copies or substantial portions of the Software.
THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
SOFTWARE.
*/

//! Conversion between client values and the canonical byte strings carried on the wire.
//!
//! Integers are big-endian and padded to `ceil(bits / 8)` bytes.  Fields annotated as `mac`,
//! `ipv4` or `ipv6` accept and produce their usual textual forms instead.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use proto::bfruntime::data_field;

use std::fmt::{self, Display};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{Error, Result};

/// A client-side field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(u128),
    Bytes(Vec<u8>),
    /// Textual form of an annotated field, or the value of a string field.
    Text(String),
    Bool(bool),
    Float(f32),
    IntArray(Vec<u32>),
    BoolArray(Vec<bool>),
    StrArray(Vec<String>),
}

impl Value {
    pub fn as_int(&self) -> Option<u128> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as u128),
            Value::Bytes(b) if b.len() <= 16 => Some(decode_int(b)),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            _ => None,
        }
    }

    pub fn as_int_array(&self) -> Option<&[u32]> {
        match self {
            Value::IntArray(v) => Some(v),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Text(s) => write!(f, "\"{}\"", s.escape_debug()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Float(x) => write!(f, "{}", x),
            Value::IntArray(v) => write!(f, "{:?}", v),
            Value::BoolArray(v) => write!(f, "{:?}", v),
            Value::StrArray(v) => write!(f, "{:?}", v),
        }
    }
}

macro_rules! value_from_uint {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v.into())
            }
        })*
    };
}
value_from_uint!(u8, u16, u32, u64, u128);

// Integer literals default to i32.  Negative values sign-extend and are then rejected as out
// of range by the encoder.
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as u128)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.into())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<Vec<u32>> for Value {
    fn from(v: Vec<u32>) -> Self {
        Value::IntArray(v)
    }
}

impl From<Vec<bool>> for Value {
    fn from(v: Vec<bool>) -> Self {
        Value::BoolArray(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::StrArray(v)
    }
}

impl From<Ipv4Addr> for Value {
    fn from(v: Ipv4Addr) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Ipv6Addr> for Value {
    fn from(v: Ipv6Addr) -> Self {
        Value::Text(v.to_string())
    }
}

/// Client-side textual format hint for a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Annotation {
    Mac,
    Ipv4,
    Ipv6,
    /// Decode as raw bytes instead of an integer.
    Bytes,
}

impl Annotation {
    /// Canonical length, in bytes, of the textual forms.
    fn len(self) -> Option<usize> {
        match self {
            Annotation::Mac => Some(6),
            Annotation::Ipv4 => Some(4),
            Annotation::Ipv6 => Some(16),
            Annotation::Bytes => None,
        }
    }
}

impl FromStr for Annotation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mac" => Ok(Annotation::Mac),
            "ipv4" => Ok(Annotation::Ipv4),
            "ipv6" => Ok(Annotation::Ipv6),
            "bytes" => Ok(Annotation::Bytes),
            _ => Err(Error::unknown("annotation", s)),
        }
    }
}

impl Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Annotation::Mac => "mac",
            Annotation::Ipv4 => "ipv4",
            Annotation::Ipv6 => "ipv6",
            Annotation::Bytes => "bytes",
        };
        write!(f, "{}", s)
    }
}

/// Scalar type class of a field, as declared by the schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeClass {
    Int,
    Bool,
    Str,
    Bytes,
    Float,
}

/// Everything the codec needs to know about one field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Format {
    pub bit_width: u32,
    pub class: TypeClass,
    pub repeated: bool,
    pub annotation: Option<Annotation>,
    /// Number of significant bits when the value is carried left-aligned in a wider field.
    pub payload_width: Option<u32>,
}

impl Format {
    pub fn int(bit_width: u32) -> Self {
        Format {
            bit_width,
            class: TypeClass::Int,
            repeated: false,
            annotation: None,
            payload_width: None,
        }
    }

    pub fn with_annotation(mut self, annotation: Option<Annotation>) -> Self {
        self.annotation = annotation;
        self
    }

    pub fn n_bytes(&self) -> usize {
        n_bytes(self.bit_width)
    }

    /// Left shift applied to integer values before encoding.
    fn shift(&self) -> u32 {
        match self.payload_width {
            Some(p) if p > 0 && p < self.bit_width => self.bit_width - p,
            _ => 0,
        }
    }
}

pub fn n_bytes(bit_width: u32) -> usize {
    ((bit_width + 7) / 8) as usize
}

/// Encodes `value` as a big-endian byte string of `ceil(bit_width / 8)` bytes.
pub fn encode_int(field: &str, value: u128, bit_width: u32) -> Result<Vec<u8>> {
    if bit_width == 0 || bit_width > 128 {
        return Err(Error::out_of_range(
            field,
            format!("unsupported width {}", bit_width),
        ));
    }
    if bit_width < 128 && value >> bit_width != 0 {
        return Err(Error::out_of_range(
            field,
            format!("{} does not fit in {} bits", value, bit_width),
        ));
    }
    let mut buf = Vec::with_capacity(16);
    // Writing to a Vec cannot fail.
    let _ = buf.write_u128::<BigEndian>(value);
    Ok(buf.split_off(16 - n_bytes(bit_width)))
}

/// Decodes a big-endian byte string of at most 16 bytes.  Longer strings keep their low 16
/// bytes.
pub fn decode_int(bytes: &[u8]) -> u128 {
    let mut buf = [0u8; 16];
    let bytes = &bytes[bytes.len().saturating_sub(16)..];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    BigEndian::read_u128(&buf)
}

/// An all-ones mask for a field of `bit_width` bits.
pub fn all_ones(bit_width: u32) -> Vec<u8> {
    prefix_mask(bit_width, bit_width)
}

/// A mask with the top `prefix_len` bits of a `bit_width`-bit field set.
pub fn prefix_mask(bit_width: u32, prefix_len: u32) -> Vec<u8> {
    let n = n_bytes(bit_width);
    let pad = (n * 8) as u32 - bit_width;
    let mut mask = vec![0u8; n];
    for bit in 0..prefix_len.min(bit_width) {
        let pos = pad + bit;
        mask[(pos / 8) as usize] |= 0x80 >> (pos % 8);
    }
    mask
}

/// Zeroes every bit of `value` below the top `prefix_len` bits of a `bit_width`-bit field.
pub fn apply_mask(value: &[u8], bit_width: u32, prefix_len: u32) -> Vec<u8> {
    and(value, &prefix_mask(bit_width, prefix_len))
}

/// Bytewise AND of two equal-length strings.  The shorter operand is zero-extended on the
/// left.
pub fn and(a: &[u8], b: &[u8]) -> Vec<u8> {
    let n = a.len().max(b.len());
    let pad = |x: &[u8]| {
        let mut v = vec![0u8; n - x.len()];
        v.extend_from_slice(x);
        v
    };
    pad(a)
        .iter()
        .zip(pad(b).iter())
        .map(|(x, y)| x & y)
        .collect()
}

fn parse_mac(field: &str, s: &str) -> Result<Vec<u8>> {
    let octets: Vec<&str> = s.split(':').collect();
    if octets.len() != 6 {
        return Err(Error::out_of_range(field, format!("malformed MAC {}", s)));
    }
    octets
        .iter()
        .map(|o| {
            if o.is_empty() || o.len() > 2 {
                return Err(Error::out_of_range(field, format!("malformed MAC {}", s)));
            }
            u8::from_str_radix(o, 16)
                .map_err(|_| Error::out_of_range(field, format!("malformed MAC {}", s)))
        })
        .collect()
}

fn format_mac(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
}

fn encode_text(field: &str, s: &str, annotation: Annotation) -> Result<Vec<u8>> {
    match annotation {
        Annotation::Mac => parse_mac(field, s),
        Annotation::Ipv4 => Ipv4Addr::from_str(s)
            .map(|a| a.octets().to_vec())
            .map_err(|_| Error::out_of_range(field, format!("malformed IPv4 address {}", s))),
        Annotation::Ipv6 => Ipv6Addr::from_str(s)
            .map(|a| a.octets().to_vec())
            .map_err(|_| Error::out_of_range(field, format!("malformed IPv6 address {}", s))),
        Annotation::Bytes => Err(Error::out_of_range(field, "expected a byte string")),
    }
}

fn decode_text(bytes: &[u8], annotation: Annotation) -> Option<String> {
    match annotation {
        Annotation::Mac if bytes.len() == 6 => Some(format_mac(bytes)),
        Annotation::Ipv4 if bytes.len() == 4 => {
            Some(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string())
        }
        Annotation::Ipv6 if bytes.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            Some(Ipv6Addr::from(octets).to_string())
        }
        _ => None,
    }
}

/// Fits a byte string into `n` bytes: shorter strings are zero-padded on the left, longer ones
/// must carry only leading zeros.
fn fit_bytes(field: &str, bytes: &[u8], fmt: &Format) -> Result<Vec<u8>> {
    let n = fmt.n_bytes();
    if bytes.len() > n {
        let (extra, rest) = bytes.split_at(bytes.len() - n);
        if extra.iter().any(|&b| b != 0) {
            return Err(Error::out_of_range(
                field,
                format!("{} bytes do not fit in {} bits", bytes.len(), fmt.bit_width),
            ));
        }
        return fit_bytes(field, rest, fmt);
    }
    let mut v = vec![0u8; n - bytes.len()];
    v.extend_from_slice(bytes);
    if fmt.bit_width % 8 != 0 && !v.is_empty() && v[0] >> (fmt.bit_width % 8) != 0 {
        return Err(Error::out_of_range(
            field,
            format!("value does not fit in {} bits", fmt.bit_width),
        ));
    }
    Ok(v)
}

/// Encodes a scalar value into its canonical byte string.
pub fn encode_bytes(field: &str, value: &Value, fmt: &Format) -> Result<Vec<u8>> {
    match (value, fmt.annotation) {
        (Value::Text(s), Some(annotation)) if annotation.len().is_some() => {
            let bytes = encode_text(field, s, annotation)?;
            if annotation.len() != Some(fmt.n_bytes()) {
                return Err(Error::out_of_range(
                    field,
                    format!("{} value in a {}-bit field", annotation, fmt.bit_width),
                ));
            }
            Ok(bytes)
        }
        (Value::Text(s), _) => Err(Error::out_of_range(
            field,
            format!("\"{}\" given for an integer field without annotation", s.escape_debug()),
        )),
        (Value::Int(i), _) => {
            let shift = fmt.shift();
            let payload = fmt.bit_width - shift;
            if payload < 128 && i >> payload != 0 {
                return Err(Error::out_of_range(
                    field,
                    format!("{} does not fit in {} bits", i, payload),
                ));
            }
            encode_int(field, i << shift, fmt.bit_width)
        }
        (Value::Bool(b), _) => encode_int(field, *b as u128, fmt.bit_width.max(1)),
        (Value::Bytes(b), _) => fit_bytes(field, b, fmt),
        (v, _) => Err(Error::out_of_range(
            field,
            format!("{} is not a scalar value", v),
        )),
    }
}

/// Inverse of [`encode_bytes`].
pub fn decode_bytes(bytes: &[u8], fmt: &Format) -> Value {
    if let Some(annotation) = fmt.annotation {
        if annotation == Annotation::Bytes {
            return Value::Bytes(bytes.to_vec());
        }
        if let Some(s) = decode_text(bytes, annotation) {
            return Value::Text(s);
        }
    }
    match fmt.class {
        TypeClass::Bool => Value::Bool(bytes.iter().any(|&b| b != 0)),
        TypeClass::Bytes if fmt.bit_width > 128 => Value::Bytes(bytes.to_vec()),
        _ => Value::Int(decode_int(bytes) >> fmt.shift()),
    }
}

/// Encodes a data field value.
pub fn encode_data(field: &str, value: &Value, fmt: &Format) -> Result<data_field::Value> {
    use data_field::Value as Wire;
    Ok(match (fmt.class, value) {
        (_, Value::IntArray(v)) if fmt.repeated => {
            let limit = if fmt.bit_width >= 32 { u32::MAX } else { (1u32 << fmt.bit_width) - 1 };
            if let Some(x) = v.iter().find(|&&x| x > limit) {
                return Err(Error::out_of_range(
                    field,
                    format!("{} does not fit in {} bits", x, fmt.bit_width),
                ));
            }
            Wire::IntArrVal(data_field::IntArray { val: v.clone() })
        }
        (_, Value::BoolArray(v)) if fmt.repeated => {
            Wire::BoolArrVal(data_field::BoolArray { val: v.clone() })
        }
        (_, Value::StrArray(v)) if fmt.repeated => {
            Wire::StrArrVal(data_field::StrArray { val: v.clone() })
        }
        (TypeClass::Bool, v) => match v.as_bool() {
            Some(b) => Wire::BoolVal(b),
            None => return Err(Error::out_of_range(field, format!("{} is not a boolean", v))),
        },
        (TypeClass::Str, Value::Text(s)) => Wire::StrVal(s.clone()),
        (TypeClass::Str, v) => {
            return Err(Error::out_of_range(field, format!("{} is not a string", v)))
        }
        (TypeClass::Float, Value::Float(x)) => Wire::FloatVal(*x),
        (TypeClass::Float, Value::Int(i)) => Wire::FloatVal(*i as f32),
        (TypeClass::Float, v) => {
            return Err(Error::out_of_range(field, format!("{} is not a float", v)))
        }
        (_, v) => Wire::Stream(encode_bytes(field, v, fmt)?),
    })
}

/// Inverse of [`encode_data`].
pub fn decode_data(value: &data_field::Value, fmt: &Format) -> Value {
    use data_field::Value as Wire;
    match value {
        Wire::Stream(bytes) => decode_bytes(bytes, fmt),
        Wire::FloatVal(x) => Value::Float(*x),
        Wire::StrVal(s) => Value::Text(s.clone()),
        Wire::IntArrVal(a) => Value::IntArray(a.val.clone()),
        Wire::BoolArrVal(a) => Value::BoolArray(a.val.clone()),
        Wire::BoolVal(b) => Value::Bool(*b),
        Wire::StrArrVal(a) => Value::StrArray(a.val.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac() -> Format {
        Format::int(48).with_annotation(Some(Annotation::Mac))
    }

    #[test]
    fn integers_are_big_endian_and_padded() {
        assert_eq!(encode_int("f", 0x1ff, 9).unwrap(), vec![0x01, 0xff]);
        assert_eq!(encode_int("f", 5, 32).unwrap(), vec![0, 0, 0, 5]);
        assert_eq!(encode_int("f", u128::MAX, 128).unwrap(), vec![0xff; 16]);
        assert_eq!(decode_int(&[0x01, 0xff]), 0x1ff);
    }

    #[test]
    fn integer_round_trip_at_width_boundaries() {
        for bits in [1u32, 7, 8, 9, 12, 16, 31, 32, 48, 63, 64, 127, 128] {
            let max = if bits == 128 { u128::MAX } else { (1u128 << bits) - 1 };
            for v in [0, 1, max / 3, max] {
                let fmt = Format::int(bits);
                let bytes = encode_bytes("f", &Value::Int(v), &fmt).unwrap();
                assert_eq!(bytes.len(), n_bytes(bits));
                assert_eq!(decode_bytes(&bytes, &fmt), Value::Int(v), "bits {}", bits);
            }
        }
    }

    #[test]
    fn overflow_is_out_of_range() {
        assert!(matches!(
            encode_bytes("port", &Value::Int(512), &Format::int(9)),
            Err(Error::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            encode_bytes("port", &Value::from(-1), &Format::int(32)),
            Err(Error::ValueOutOfRange { .. })
        ));
        assert!(matches!(
            encode_bytes("port", &Value::Bytes(vec![0x02, 0x00]), &Format::int(9)),
            Err(Error::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn annotated_round_trip() {
        let cases = [
            ("11:33:55:77:99:00", mac()),
            ("10.0.0.1", Format::int(32).with_annotation(Some(Annotation::Ipv4))),
            (
                "2001:db8::ff00:42:8329",
                Format::int(128).with_annotation(Some(Annotation::Ipv6)),
            ),
        ];
        for (s, fmt) in cases {
            let bytes = encode_bytes("f", &Value::from(s), &fmt).unwrap();
            assert_eq!(bytes.len(), fmt.n_bytes());
            assert_eq!(decode_bytes(&bytes, &fmt), Value::from(s));
        }
    }

    #[test]
    fn malformed_text_is_out_of_range() {
        for s in ["11:33:55:77:99", "11:33:55:77:99:zz", "11:33:55:77:99:100"] {
            assert!(matches!(
                encode_bytes("dst", &Value::from(s), &mac()),
                Err(Error::ValueOutOfRange { .. })
            ));
        }
        let ipv4 = Format::int(32).with_annotation(Some(Annotation::Ipv4));
        assert!(encode_bytes("dst", &Value::from("10.0.0.256"), &ipv4).is_err());
        assert!(encode_bytes("dst", &Value::from("10.0.0.1"), &Format::int(32)).is_err());
    }

    #[test]
    fn lpm_mask_zeroes_low_bits() {
        let v = encode_int("f", 0x0a0b0c0d, 32).unwrap();
        assert_eq!(apply_mask(&v, 32, 16), vec![0x0a, 0x0b, 0, 0]);
        assert_eq!(apply_mask(&v, 32, 0), vec![0, 0, 0, 0]);
        assert_eq!(apply_mask(&v, 32, 32), v);
        // 9-bit field: the first byte carries a single significant bit.
        assert_eq!(prefix_mask(9, 1), vec![0x01, 0x00]);
        assert_eq!(prefix_mask(9, 9), vec![0x01, 0xff]);
        assert_eq!(all_ones(12), vec![0x0f, 0xff]);
    }

    #[test]
    fn payload_width_left_aligns() {
        let fmt = Format {
            payload_width: Some(64),
            ..Format::int(128)
        };
        let bytes = encode_bytes("md", &Value::Int(0x1234), &fmt).unwrap();
        assert_eq!(decode_int(&bytes), 0x1234u128 << 64);
        assert_eq!(decode_bytes(&bytes, &fmt), Value::Int(0x1234));
        assert!(encode_bytes("md", &Value::Int(1 << 64), &fmt).is_err());

        let empty = Format {
            payload_width: Some(0),
            ..Format::int(128)
        };
        let bytes = encode_bytes("md", &Value::Int(0x1234), &empty).unwrap();
        assert_eq!(decode_bytes(&bytes, &empty), Value::Int(0x1234));
    }

    #[test]
    fn data_values() {
        let boolean = Format {
            class: TypeClass::Bool,
            ..Format::int(1)
        };
        let wire = encode_data("f", &Value::Bool(true), &boolean).unwrap();
        assert_eq!(wire, data_field::Value::BoolVal(true));
        assert_eq!(decode_data(&wire, &boolean), Value::Bool(true));

        let repeated = Format {
            repeated: true,
            ..Format::int(32)
        };
        let wire = encode_data("f", &Value::IntArray(vec![1, 2, 3, 4]), &repeated).unwrap();
        assert_eq!(decode_data(&wire, &repeated), Value::IntArray(vec![1, 2, 3, 4]));

        let bytes = encode_bytes("f", &Value::Bool(true), &Format::int(1)).unwrap();
        assert_eq!(bytes, vec![1]);
    }
}
