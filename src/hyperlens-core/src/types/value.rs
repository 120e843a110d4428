//! Runtime value representation.

use std::cmp::Ordering;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Days between 0001-01-01 (CE day 1) and 1970-01-01.
const UNIX_EPOCH_FROM_CE: i32 = 719_163;

/// Parse an ISO `YYYY-MM-DD` date into days since the Unix epoch.
pub fn parse_date(text: &str) -> Option<i32> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").ok()?;
    Some(date.num_days_from_ce() - UNIX_EPOCH_FROM_CE)
}

/// Format days since the Unix epoch as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    days.checked_add(UNIX_EPOCH_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map_or_else(|| format!("date({days})"), |d| d.format("%Y-%m-%d").to_string())
}

/// A domain value held by a hyperatom, or a cell of a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer (also carries the unsigned id columns).
    Int64(i64),
    /// 64-bit floating point.
    Float64(f64),
    /// UTF-8 string.
    String(String),
    /// Date (days since Unix epoch).
    Date(i32),
    /// Array of values (row-id lists, composite keys).
    Array(Vec<Value>),
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as boolean. Integers 0/1 count as booleans.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int64(0) => Some(false),
            Self::Int64(1) => Some(true),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_int64(&self) -> Option<i64> {
        match self {
            Self::Int64(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Try to get as u32 (value ids, row ids).
    pub fn as_u32(&self) -> Option<u32> {
        self.as_int64().and_then(|i| u32::try_from(i).ok())
    }

    /// Try to get as u64 (counts).
    pub fn as_u64(&self) -> Option<u64> {
        self.as_int64().and_then(|i| u64::try_from(i).ok())
    }

    /// Try to get as f64.
    pub fn as_float64(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            Self::Int64(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as a date (days since epoch). ISO strings are accepted.
    pub fn as_date(&self) -> Option<i32> {
        match self {
            Self::Date(d) => Some(*d),
            Self::String(s) => parse_date(s),
            _ => None,
        }
    }

    /// Try to get as array reference.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// Get the type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Bool(_) => "Bool",
            Self::Int64(_) => "Int64",
            Self::Float64(_) => "Float64",
            Self::String(_) => "String",
            Self::Date(_) => "Date",
            Self::Array(_) => "Array",
        }
    }

    /// Compare two values the way the analytical store does.
    ///
    /// Numbers compare across integer/float, dates compare with ISO date
    /// strings, booleans compare with 0/1. Nulls and mismatched kinds are
    /// incomparable.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Int64(a), Self::Int64(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::String(s)) => parse_date(s).map(|b| a.cmp(&b)),
            (Self::String(s), Self::Date(b)) => parse_date(s).map(|a| a.cmp(b)),
            (Self::Bool(_), Self::Int64(_)) | (Self::Int64(_), Self::Bool(_)) => {
                Some(self.as_int64()?.cmp(&other.as_int64()?))
            }
            (Self::Array(a), Self::Array(b)) => {
                for (x, y) in a.iter().zip(b) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => {
                let a = self.as_float64()?;
                let b = other.as_float64()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Whether the two values compare equal.
    pub fn matches(&self, other: &Self) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Total order used for sorting result rows; nulls sort first.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self
                .compare(other)
                .unwrap_or_else(|| self.type_name().cmp(other.type_name())),
        }
    }

    /// Canonical text used to look a value up in a value dictionary.
    pub fn dictionary_key(&self) -> String {
        match self {
            Self::String(s) => format!("s:{s}"),
            Self::Float64(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("n:{}", *f as i64),
            Self::Float64(f) => format!("n:{f}"),
            Self::Int64(i) => format!("n:{i}"),
            Self::Bool(b) => format!("n:{}", i64::from(*b)),
            Self::Date(d) => format!("d:{d}"),
            Self::Null => "null".to_string(),
            Self::Array(values) => {
                let inner: Vec<String> = values.iter().map(Value::dictionary_key).collect();
                format!("a:[{}]", inner.join(","))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int64(i) => write!(f, "{i}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{}", format_date(*d)),
            Self::Array(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int64(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<u16> for Value {
    fn from(i: u16) -> Self {
        Self::Int64(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float64(f)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Self::Float64(f64::from(f))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Array(values)
    }
}
