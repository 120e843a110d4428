//! Primitive value types of attributes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common_error::{LensError, LensResult};

use super::value::{Value, parse_date};

/// The primitive type of an attribute's domain values.
///
/// Each variant maps to the column type of the value dictionary that holds
/// the attribute's hyperatoms in the analytical store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    /// Variable-length string.
    String,
    /// 32-bit float.
    Float32,
    /// 8-bit unsigned integer.
    UInt8,
    /// 16-bit unsigned integer.
    UInt16,
    /// 32-bit unsigned integer.
    UInt32,
    /// Calendar date.
    Date,
    /// Boolean, stored as a 0/1 byte.
    Bool,
}

impl ValueType {
    /// Column type name in the analytical store; also the dictionary table suffix.
    pub const fn storage_type(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Float32 => "Float32",
            Self::UInt8 | Self::Bool => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::Date => "Date",
        }
    }

    /// Whether values of this type are numbers.
    pub const fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Float32 | Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::Bool
        )
    }

    /// Whether SQL literals of this type are quoted.
    pub const fn is_quoted(&self) -> bool {
        matches!(self, Self::String | Self::Date)
    }

    /// Parse user text into a value of this type.
    pub fn parse_value(&self, text: &str) -> LensResult<Value> {
        let text = text.trim();
        let invalid = || LensError::invalid_parameter(format!("`{text}` is not a valid {self}"));
        match self {
            Self::String => Ok(Value::String(text.to_string())),
            Self::Float32 => text.parse::<f64>().map(Value::Float64).map_err(|_| invalid()),
            Self::UInt8 | Self::UInt16 | Self::UInt32 => {
                let v = text.parse::<u32>().map_err(|_| invalid())?;
                let max = match self {
                    Self::UInt8 => u32::from(u8::MAX),
                    Self::UInt16 => u32::from(u16::MAX),
                    _ => u32::MAX,
                };
                if v > max {
                    return Err(invalid());
                }
                Ok(Value::Int64(i64::from(v)))
            }
            Self::Date => parse_date(text).map(Value::Date).ok_or_else(invalid),
            Self::Bool => match text {
                "1" | "true" | "TRUE" => Ok(Value::Bool(true)),
                "0" | "false" | "FALSE" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
        }
    }

    /// Check that a value can be stored in a column of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Float32, Value::Float64(_) | Value::Int64(_)) => true,
            (Self::UInt8 | Self::UInt16 | Self::UInt32, Value::Int64(i)) => *i >= 0,
            (Self::Date, Value::Date(_)) => true,
            (Self::Date, Value::String(s)) => parse_date(s).is_some(),
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Bool, Value::Int64(i)) => *i == 0 || *i == 1,
            _ => false,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "Bool",
            other => other.storage_type(),
        };
        write!(f, "{name}")
    }
}

impl FromStr for ValueType {
    type Err = LensError;

    fn from_str(s: &str) -> LensResult<Self> {
        match s {
            "String" | "str" => Ok(Self::String),
            "Float32" | "float32" => Ok(Self::Float32),
            "UInt8" | "uint8" => Ok(Self::UInt8),
            "UInt16" | "uint16" => Ok(Self::UInt16),
            "UInt32" | "uint32" => Ok(Self::UInt32),
            "Date" | "date" => Ok(Self::Date),
            "Bool" | "bool" => Ok(Self::Bool),
            other => Err(LensError::invalid_parameter(format!(
                "unknown value type `{other}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_types() {
        assert_eq!(ValueType::String.storage_type(), "String");
        assert_eq!(ValueType::Bool.storage_type(), "UInt8");
        assert_eq!(ValueType::Bool.to_string(), "Bool");
        assert_eq!(ValueType::Float32.to_string(), "Float32");
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(ValueType::UInt16.parse_value("200").unwrap(), Value::Int64(200));
        assert!(ValueType::UInt8.parse_value("300").is_err());
        assert_eq!(ValueType::Float32.parse_value("16.5").unwrap(), Value::Float64(16.5));
        assert_eq!(ValueType::Bool.parse_value("1").unwrap(), Value::Bool(true));
        assert!(ValueType::Date.parse_value("1996-13-01").is_err());
        assert_eq!(
            ValueType::String.parse_value(" Brazil ").unwrap(),
            Value::from("Brazil")
        );
    }

    #[test]
    fn test_accepts() {
        assert!(ValueType::UInt32.accepts(&Value::Int64(5)));
        assert!(!ValueType::UInt32.accepts(&Value::Int64(-5)));
        assert!(ValueType::Date.accepts(&Value::from("2001-02-03")));
        assert!(!ValueType::String.accepts(&Value::Int64(1)));
    }

    #[test]
    fn test_from_str() {
        assert_eq!("UInt16".parse::<ValueType>().unwrap(), ValueType::UInt16);
        assert!("Decimal".parse::<ValueType>().is_err());
    }
}
