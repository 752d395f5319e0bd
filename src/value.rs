//! Typed cell values: scalars plus fixed-length vectors.
//!
//! On-disk bytes are hand-rolled little-endian, not `serde`, because the
//! column header's wire format pins an exact byte layout that a generic
//! serialization format would not guarantee. Grounded on
//! `catalog/mod.rs`'s plain `DataType` enum, generalized with vector
//! variants and a manual codec.

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};

/// A complex number with `f32` components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex32 {
    pub re: f32,
    pub im: f32,
}

/// A complex number with `f64` components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Complex64 {
    pub re: f64,
    pub im: f64,
}

/// The declared type of a column: a scalar kind, or a vector kind with a
/// fixed logical size (element count) fixed at column-creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    StringType,
    Complex32,
    Complex64,
    BooleanVector(usize),
    IntVector(usize),
    LongVector(usize),
    FloatVector(usize),
    DoubleVector(usize),
    Complex32Vector(usize),
    Complex64Vector(usize),
}

impl ValueType {
    /// The type name string stored in a `ColumnHeader`.
    pub fn name(&self) -> String {
        match self {
            ValueType::Boolean => "BOOLEAN".into(),
            ValueType::Byte => "BYTE".into(),
            ValueType::Short => "SHORT".into(),
            ValueType::Int => "INT".into(),
            ValueType::Long => "LONG".into(),
            ValueType::Float => "FLOAT".into(),
            ValueType::Double => "DOUBLE".into(),
            ValueType::StringType => "STRING".into(),
            ValueType::Complex32 => "COMPLEX32".into(),
            ValueType::Complex64 => "COMPLEX64".into(),
            ValueType::BooleanVector(n) => format!("BOOL_VEC[{n}]"),
            ValueType::IntVector(n) => format!("INT_VEC[{n}]"),
            ValueType::LongVector(n) => format!("LONG_VEC[{n}]"),
            ValueType::FloatVector(n) => format!("FLOAT_VEC[{n}]"),
            ValueType::DoubleVector(n) => format!("DOUBLE_VEC[{n}]"),
            ValueType::Complex32Vector(n) => format!("COMPLEX32_VEC[{n}]"),
            ValueType::Complex64Vector(n) => format!("COMPLEX64_VEC[{n}]"),
        }
    }

    /// Base type name without the `[n]` vector-size suffix, as stored in a
    /// `ColumnHeader`'s `type name` field (the logical size is stored in a
    /// separate header field).
    pub fn base_name(&self) -> &'static str {
        match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::Byte => "BYTE",
            ValueType::Short => "SHORT",
            ValueType::Int => "INT",
            ValueType::Long => "LONG",
            ValueType::Float => "FLOAT",
            ValueType::Double => "DOUBLE",
            ValueType::StringType => "STRING",
            ValueType::Complex32 => "COMPLEX32",
            ValueType::Complex64 => "COMPLEX64",
            ValueType::BooleanVector(_) => "BOOL_VEC",
            ValueType::IntVector(_) => "INT_VEC",
            ValueType::LongVector(_) => "LONG_VEC",
            ValueType::FloatVector(_) => "FLOAT_VEC",
            ValueType::DoubleVector(_) => "DOUBLE_VEC",
            ValueType::Complex32Vector(_) => "COMPLEX32_VEC",
            ValueType::Complex64Vector(_) => "COMPLEX64_VEC",
        }
    }

    /// Reconstruct a `ValueType` from a base name and logical size, the
    /// inverse of [`ValueType::base_name`] + [`ValueType::logical_size`].
    pub fn from_parts(base_name: &str, logical_size: i32) -> Result<ValueType> {
        let n = logical_size.max(0) as usize;
        Ok(match base_name {
            "BOOLEAN" => ValueType::Boolean,
            "BYTE" => ValueType::Byte,
            "SHORT" => ValueType::Short,
            "INT" => ValueType::Int,
            "LONG" => ValueType::Long,
            "FLOAT" => ValueType::Float,
            "DOUBLE" => ValueType::Double,
            "STRING" => ValueType::StringType,
            "COMPLEX32" => ValueType::Complex32,
            "COMPLEX64" => ValueType::Complex64,
            "BOOL_VEC" => ValueType::BooleanVector(n),
            "INT_VEC" => ValueType::IntVector(n),
            "LONG_VEC" => ValueType::LongVector(n),
            "FLOAT_VEC" => ValueType::FloatVector(n),
            "DOUBLE_VEC" => ValueType::DoubleVector(n),
            "COMPLEX32_VEC" => ValueType::Complex32Vector(n),
            "COMPLEX64_VEC" => ValueType::Complex64Vector(n),
            other => return Err(DbError::Corruption(format!("unknown column type name {other}"))),
        })
    }

    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            ValueType::BooleanVector(_)
                | ValueType::IntVector(_)
                | ValueType::LongVector(_)
                | ValueType::FloatVector(_)
                | ValueType::DoubleVector(_)
                | ValueType::Complex32Vector(_)
                | ValueType::Complex64Vector(_)
        )
    }

    /// Element count: the vector's declared length, or 1 for scalars.
    pub fn logical_size(&self) -> usize {
        match self {
            ValueType::BooleanVector(n)
            | ValueType::IntVector(n)
            | ValueType::LongVector(n)
            | ValueType::FloatVector(n)
            | ValueType::DoubleVector(n)
            | ValueType::Complex32Vector(n)
            | ValueType::Complex64Vector(n) => *n,
            _ => 1,
        }
    }

    /// Byte length of a serialized value of this type, when fixed
    /// (everything except `StringType`, whose length is data-dependent).
    pub fn physical_size(&self) -> Option<usize> {
        Some(match self {
            ValueType::Boolean | ValueType::Byte => 1,
            ValueType::Short => 2,
            ValueType::Int | ValueType::Float => 4,
            ValueType::Long | ValueType::Double => 8,
            ValueType::Complex32 => 8,
            ValueType::Complex64 => 16,
            ValueType::StringType => return None,
            ValueType::BooleanVector(n) => *n,
            ValueType::IntVector(n) | ValueType::FloatVector(n) => n * 4,
            ValueType::LongVector(n) | ValueType::DoubleVector(n) => n * 8,
            ValueType::Complex32Vector(n) => n * 8,
            ValueType::Complex64Vector(n) => n * 16,
        })
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    StringValue(String),
    Complex32(Complex32),
    Complex64(Complex64),
    BooleanVector(Vec<bool>),
    IntVector(Vec<i32>),
    LongVector(Vec<i64>),
    FloatVector(Vec<f32>),
    DoubleVector(Vec<f64>),
    Complex32Vector(Vec<Complex32>),
    Complex64Vector(Vec<Complex64>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Byte(_) => ValueType::Byte,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::StringValue(_) => ValueType::StringType,
            Value::Complex32(_) => ValueType::Complex32,
            Value::Complex64(_) => ValueType::Complex64,
            Value::BooleanVector(v) => ValueType::BooleanVector(v.len()),
            Value::IntVector(v) => ValueType::IntVector(v.len()),
            Value::LongVector(v) => ValueType::LongVector(v.len()),
            Value::FloatVector(v) => ValueType::FloatVector(v.len()),
            Value::DoubleVector(v) => ValueType::DoubleVector(v.len()),
            Value::Complex32Vector(v) => ValueType::Complex32Vector(v.len()),
            Value::Complex64Vector(v) => ValueType::Complex64Vector(v.len()),
        }
    }

    /// Serialize to bytes. Fixed-width types have no length prefix;
    /// `StringValue` is `u32` length + UTF-8 bytes.
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Value::Boolean(b) => vec![*b as u8],
            Value::Byte(b) => vec![*b as u8],
            Value::Short(v) => v.to_le_bytes().to_vec(),
            Value::Int(v) => v.to_le_bytes().to_vec(),
            Value::Long(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_le_bytes().to_vec(),
            Value::Double(v) => v.to_le_bytes().to_vec(),
            Value::StringValue(s) => {
                let bytes = s.as_bytes();
                let mut out = Vec::with_capacity(4 + bytes.len());
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
                out
            }
            Value::Complex32(c) => {
                let mut out = Vec::with_capacity(8);
                out.extend_from_slice(&c.re.to_le_bytes());
                out.extend_from_slice(&c.im.to_le_bytes());
                out
            }
            Value::Complex64(c) => {
                let mut out = Vec::with_capacity(16);
                out.extend_from_slice(&c.re.to_le_bytes());
                out.extend_from_slice(&c.im.to_le_bytes());
                out
            }
            Value::BooleanVector(v) => v.iter().map(|b| *b as u8).collect(),
            Value::IntVector(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::LongVector(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::FloatVector(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::DoubleVector(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Complex32Vector(v) => v
                .iter()
                .flat_map(|c| c.re.to_le_bytes().into_iter().chain(c.im.to_le_bytes()))
                .collect(),
            Value::Complex64Vector(v) => v
                .iter()
                .flat_map(|c| c.re.to_le_bytes().into_iter().chain(c.im.to_le_bytes()))
                .collect(),
        }
    }

    /// Deserialize bytes previously produced by [`Value::serialize`] for a
    /// value of type `ty`.
    pub fn deserialize(ty: ValueType, buf: &[u8]) -> Result<Value> {
        let bad_len = || DbError::Corruption(format!("short buffer for {}", ty.name()));
        Ok(match ty {
            ValueType::Boolean => Value::Boolean(*buf.first().ok_or_else(bad_len)? != 0),
            ValueType::Byte => Value::Byte(*buf.first().ok_or_else(bad_len)? as i8),
            ValueType::Short => Value::Short(i16::from_le_bytes(buf.get(0..2).ok_or_else(bad_len)?.try_into().unwrap())),
            ValueType::Int => Value::Int(i32::from_le_bytes(buf.get(0..4).ok_or_else(bad_len)?.try_into().unwrap())),
            ValueType::Long => Value::Long(i64::from_le_bytes(buf.get(0..8).ok_or_else(bad_len)?.try_into().unwrap())),
            ValueType::Float => Value::Float(f32::from_le_bytes(buf.get(0..4).ok_or_else(bad_len)?.try_into().unwrap())),
            ValueType::Double => Value::Double(f64::from_le_bytes(buf.get(0..8).ok_or_else(bad_len)?.try_into().unwrap())),
            ValueType::StringType => {
                let len = u32::from_le_bytes(buf.get(0..4).ok_or_else(bad_len)?.try_into().unwrap()) as usize;
                let bytes = buf.get(4..4 + len).ok_or_else(bad_len)?;
                Value::StringValue(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| DbError::Corruption(e.to_string()))?,
                )
            }
            ValueType::Complex32 => {
                let re = f32::from_le_bytes(buf.get(0..4).ok_or_else(bad_len)?.try_into().unwrap());
                let im = f32::from_le_bytes(buf.get(4..8).ok_or_else(bad_len)?.try_into().unwrap());
                Value::Complex32(Complex32 { re, im })
            }
            ValueType::Complex64 => {
                let re = f64::from_le_bytes(buf.get(0..8).ok_or_else(bad_len)?.try_into().unwrap());
                let im = f64::from_le_bytes(buf.get(8..16).ok_or_else(bad_len)?.try_into().unwrap());
                Value::Complex64(Complex64 { re, im })
            }
            ValueType::BooleanVector(n) => {
                let bytes = buf.get(0..n).ok_or_else(bad_len)?;
                Value::BooleanVector(bytes.iter().map(|b| *b != 0).collect())
            }
            ValueType::IntVector(n) => Value::IntVector(read_vec(buf, n, 4, |c| {
                i32::from_le_bytes(c.try_into().unwrap())
            })?),
            ValueType::LongVector(n) => Value::LongVector(read_vec(buf, n, 8, |c| {
                i64::from_le_bytes(c.try_into().unwrap())
            })?),
            ValueType::FloatVector(n) => Value::FloatVector(read_vec(buf, n, 4, |c| {
                f32::from_le_bytes(c.try_into().unwrap())
            })?),
            ValueType::DoubleVector(n) => Value::DoubleVector(read_vec(buf, n, 8, |c| {
                f64::from_le_bytes(c.try_into().unwrap())
            })?),
            ValueType::Complex32Vector(n) => {
                let mut out = Vec::with_capacity(n);
                for i in 0..n {
                    let off = i * 8;
                    let re = f32::from_le_bytes(buf.get(off..off + 4).ok_or_else(bad_len)?.try_into().unwrap());
                    let im = f32::from_le_bytes(buf.get(off + 4..off + 8).ok_or_else(bad_len)?.try_into().unwrap());
                    out.push(Complex32 { re, im });
                }
                Value::Complex32Vector(out)
            }
            ValueType::Complex64Vector(n) => {
                let mut out = Vec::with_capacity(n);
                for i in 0..n {
                    let off = i * 16;
                    let re = f64::from_le_bytes(buf.get(off..off + 8).ok_or_else(bad_len)?.try_into().unwrap());
                    let im = f64::from_le_bytes(buf.get(off + 8..off + 16).ok_or_else(bad_len)?.try_into().unwrap());
                    out.push(Complex64 { re, im });
                }
                Value::Complex64Vector(out)
            }
        })
    }

    /// Read this value as a vector of `f64` components, for use by the kNN
    /// distance kernels. Returns `None` for scalar or boolean-vector values.
    pub fn as_f64_vector(&self) -> Option<Vec<f64>> {
        match self {
            Value::IntVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::LongVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::FloatVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::DoubleVector(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_bit_vector(&self) -> Option<&[bool]> {
        match self {
            Value::BooleanVector(v) => Some(v),
            _ => None,
        }
    }
}

fn read_vec<T>(
    buf: &[u8],
    n: usize,
    width: usize,
    decode: impl Fn(&[u8]) -> T,
) -> Result<Vec<T>> {
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let chunk = buf
            .get(i * width..i * width + width)
            .ok_or_else(|| DbError::Corruption("short buffer for vector element".into()))?;
        out.push(decode(chunk));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn scalar_round_trip_int(v: i32) -> bool {
        let value = Value::Int(v);
        Value::deserialize(value.value_type(), &value.serialize()).unwrap() == value
    }

    #[quickcheck]
    fn scalar_round_trip_double(v: f64) -> bool {
        let value = Value::Double(v);
        Value::deserialize(value.value_type(), &value.serialize()).unwrap() == value
    }

    #[test]
    fn vector_round_trips_and_reports_physical_size() {
        let value = Value::FloatVector(vec![1.0, 2.0, 3.0]);
        let ty = value.value_type();
        assert_eq!(ty.physical_size(), Some(12));
        let bytes = value.serialize();
        assert_eq!(bytes.len(), 12);
        assert_eq!(Value::deserialize(ty, &bytes).unwrap(), value);
    }

    #[test]
    fn string_round_trips() {
        let value = Value::StringValue("hello cottontail".to_string());
        let bytes = value.serialize();
        assert_eq!(Value::deserialize(value.value_type(), &bytes).unwrap(), value);
    }
}
