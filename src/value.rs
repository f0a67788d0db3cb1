//! Numeric types, cell values and counter properties

use crate::error::{MatrixError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric width of a metric column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int32,
    Int64,
    Uint8,
    Uint32,
    Uint64,
    Float32,
    Float64,
}

impl DataType {
    /// Canonical lowercase name (`int64`, `float64`, ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::Uint8 => "uint8",
            DataType::Uint32 => "uint32",
            DataType::Uint64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// True for `float32` and `float64`
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// True for the unsigned widths
    pub fn is_unsigned(&self) -> bool {
        matches!(self, DataType::Uint8 | DataType::Uint32 | DataType::Uint64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int32" => Ok(DataType::Int32),
            // "int" is the platform integer of the collectors
            "int" | "int64" => Ok(DataType::Int64),
            "uint8" => Ok(DataType::Uint8),
            "uint32" => Ok(DataType::Uint32),
            "uint64" => Ok(DataType::Uint64),
            "float32" => Ok(DataType::Float32),
            "float64" => Ok(DataType::Float64),
            other => Err(MatrixError::InvalidDataType(other.to_string())),
        }
    }
}

/// A single cell value, tagged with its width
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    U8(u8),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// Width of this value
    pub fn data_type(&self) -> DataType {
        match self {
            Value::I32(_) => DataType::Int32,
            Value::I64(_) => DataType::Int64,
            Value::U8(_) => DataType::Uint8,
            Value::U32(_) => DataType::Uint32,
            Value::U64(_) => DataType::Uint64,
            Value::F32(_) => DataType::Float32,
            Value::F64(_) => DataType::Float64,
        }
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Value::I32(v) => v as f64,
            Value::I64(v) => v as f64,
            Value::U8(v) => v as f64,
            Value::U32(v) => v as f64,
            Value::U64(v) => v as f64,
            Value::F32(v) => v as f64,
            Value::F64(v) => v,
        }
    }

    /// Signed conversion; floats truncate, out-of-range values saturate
    pub fn to_i64(self) -> i64 {
        match self {
            Value::I32(v) => v as i64,
            Value::I64(v) => v,
            Value::U8(v) => v as i64,
            Value::U32(v) => v as i64,
            Value::U64(v) => i64::try_from(v).unwrap_or(i64::MAX),
            Value::F32(v) => v as i64,
            Value::F64(v) => v as i64,
        }
    }

    /// Unsigned conversion; negative values clamp to zero
    pub fn to_u64(self) -> u64 {
        match self {
            Value::I32(v) => u64::try_from(v).unwrap_or(0),
            Value::I64(v) => u64::try_from(v).unwrap_or(0),
            Value::U8(v) => v as u64,
            Value::U32(v) => v as u64,
            Value::U64(v) => v,
            Value::F32(v) => v as u64,
            Value::F64(v) => v as u64,
        }
    }

    /// Parse `s` as a value of type `data_type`
    pub fn parse(s: &str, data_type: DataType) -> Result<Value> {
        let s = s.trim();
        let err = || MatrixError::ParseValue {
            value: s.to_string(),
            data_type: data_type.to_string(),
        };
        let value = match data_type {
            DataType::Int32 => Value::I32(s.parse().map_err(|_| err())?),
            DataType::Int64 => Value::I64(s.parse().map_err(|_| err())?),
            DataType::Uint8 => Value::U8(s.parse().map_err(|_| err())?),
            DataType::Uint32 => Value::U32(s.parse().map_err(|_| err())?),
            DataType::Uint64 => Value::U64(s.parse().map_err(|_| err())?),
            DataType::Float32 => Value::F32(s.parse().map_err(|_| err())?),
            DataType::Float64 => Value::F64(s.parse().map_err(|_| err())?),
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{}", v),
            Value::I64(v) => write!(f, "{}", v),
            Value::U8(v) => write!(f, "{}", v),
            Value::U32(v) => write!(f, "{}", v),
            Value::U64(v) => write!(f, "{}", v),
            Value::F32(v) => write!(f, "{}", v),
            Value::F64(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_value {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_value!(i32 => I32, i64 => I64, u8 => U8, u32 => U32, u64 => U64, f32 => F32, f64 => F64);

/// Counter property: how the perf engine cooks a raw counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Property {
    Raw,
    Delta,
    Rate,
    Average,
    Percent,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::Raw => "raw",
            Property::Delta => "delta",
            Property::Rate => "rate",
            Property::Average => "average",
            Property::Percent => "percent",
        }
    }

    /// `average` and `percent` are divided by a base counter
    pub fn is_ratio(&self) -> bool {
        matches!(self, Property::Average | Property::Percent)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Property {
    type Err = MatrixError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "raw" => Ok(Property::Raw),
            "delta" => Ok(Property::Delta),
            "rate" => Ok(Property::Rate),
            "average" => Ok(Property::Average),
            "percent" => Ok(Property::Percent),
            other => Err(MatrixError::InvalidProperty(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parse() {
        assert_eq!("uint8".parse::<DataType>().unwrap(), DataType::Uint8);
        assert_eq!("int".parse::<DataType>().unwrap(), DataType::Int64);
        assert!("string".parse::<DataType>().is_err());
        assert!(DataType::Float32.is_float());
        assert!(!DataType::Uint64.is_float());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::I64(-5).to_u64(), 0);
        assert_eq!(Value::U64(u64::MAX).to_i64(), i64::MAX);
        assert_eq!(Value::F64(2.9).to_i64(), 2);
        assert!((Value::U8(7).to_f64() - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_value_parse() {
        assert_eq!(Value::parse("42", DataType::Uint8).unwrap(), Value::U8(42));
        assert_eq!(Value::parse(" -3 ", DataType::Int32).unwrap(), Value::I32(-3));
        assert!(Value::parse("300", DataType::Uint8).is_err());
        assert!(Value::parse("1.5", DataType::Int64).is_err());
    }

    #[test]
    fn test_property_parse() {
        assert_eq!("Percent".parse::<Property>().unwrap(), Property::Percent);
        assert!(Property::Average.is_ratio());
        assert!(!Property::Rate.is_ratio());
        assert!("mapping".parse::<Property>().is_err());
    }
}
