//! Field values a record can hold.
//!
//! [`Value`] is a closed set of kinds. Anything outside the set cannot be
//! stored on a [`Record`], so the encoder never meets an unknown type.

use crate::{Record, Relation};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Neg};

/// A numeric field value.
///
/// Keeps the width it was created with so that arithmetic can widen the
/// way the backend expects: byte < short < int < long < float < double.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Number {
    fn rank(self) -> u8 {
        match self {
            Number::Byte(_) => 0,
            Number::Short(_) => 1,
            Number::Int(_) => 2,
            Number::Long(_) => 3,
            Number::Float(_) => 4,
            Number::Double(_) => 5,
        }
    }

    /// Value as an `i64`, truncating floating point kinds.
    pub fn as_i64(self) -> i64 {
        match self {
            Number::Byte(n) => n.into(),
            Number::Short(n) => n.into(),
            Number::Int(n) => n.into(),
            Number::Long(n) => n,
            Number::Float(n) => n as i64,
            Number::Double(n) => n as i64,
        }
    }

    /// Value as an `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Byte(n) => n.into(),
            Number::Short(n) => n.into(),
            Number::Int(n) => n.into(),
            Number::Long(n) => n as f64,
            Number::Float(n) => n.into(),
            Number::Double(n) => n,
        }
    }

    /// True for `Float` and `Double`.
    pub fn is_floating(self) -> bool {
        matches!(self, Number::Float(_) | Number::Double(_))
    }

    /// Convert to a JSON number. Fails for NaN and infinities.
    pub fn to_json(self) -> Option<serde_json::Number> {
        if self.is_floating() {
            serde_json::Number::from_f64(self.as_f64())
        } else {
            Some(serde_json::Number::from(self.as_i64()))
        }
    }

    /// Narrowest sensible kind for a JSON number: `Int` when it fits,
    /// then `Long`, otherwise `Double`.
    pub fn from_json(number: &serde_json::Number) -> Self {
        if let Some(n) = number.as_i64() {
            match i32::try_from(n) {
                Ok(small) => Number::Int(small),
                Err(_) => Number::Long(n),
            }
        } else {
            Number::Double(number.as_f64().unwrap_or(f64::NAN))
        }
    }
}

impl Add for Number {
    type Output = Number;

    /// Integer kinds wrap on overflow.
    fn add(self, other: Number) -> Number {
        match self.rank().max(other.rank()) {
            5 => Number::Double(self.as_f64() + other.as_f64()),
            4 => Number::Float(self.as_f64() as f32 + other.as_f64() as f32),
            3 => Number::Long(self.as_i64().wrapping_add(other.as_i64())),
            2 => Number::Int((self.as_i64() as i32).wrapping_add(other.as_i64() as i32)),
            1 => Number::Short((self.as_i64() as i16).wrapping_add(other.as_i64() as i16)),
            _ => Number::Byte((self.as_i64() as i8).wrapping_add(other.as_i64() as i8)),
        }
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Byte(n) => Number::Byte(n.wrapping_neg()),
            Number::Short(n) => Number::Short(n.wrapping_neg()),
            Number::Int(n) => Number::Int(n.wrapping_neg()),
            Number::Long(n) => Number::Long(n.wrapping_neg()),
            Number::Float(n) => Number::Float(-n),
            Number::Double(n) => Number::Double(-n),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Byte(n) => write!(f, "{n}"),
            Number::Short(n) => write!(f, "{n}"),
            Number::Int(n) => write!(f, "{n}"),
            Number::Long(n) => write!(f, "{n}"),
            Number::Float(n) => write!(f, "{n}"),
            Number::Double(n) => write!(f, "{n}"),
        }
    }
}

macro_rules! number_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Number {
                fn from(n: $ty) -> Self {
                    Number::$variant(n)
                }
            }

            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Value::Number(Number::$variant(n))
                }
            }
        )*
    };
}

number_from!(i8 => Byte, i16 => Short, i32 => Int, i64 => Long, f32 => Float, f64 => Double);

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Reference to a file hosted by the backend.
///
/// Only a file that has been uploaded (and so carries a URL) may be stored
/// on a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub name: String,
    pub url: Option<String>,
}

impl FileRef {
    /// A file already hosted at `url`.
    pub fn uploaded(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: Some(url.into()),
        }
    }

    /// A file that has not been uploaded yet.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.url.is_some()
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Only produced by decoding; cannot be `put` on a record.
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Date(DateTime<Utc>),
    Bytes(Vec<u8>),
    GeoPoint(GeoPoint),
    File(FileRef),
    Object(Box<Record>),
    Relation(Relation),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a byte-sequence value.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Value::Bytes(data.into())
    }

    /// Build an array from anything convertible to values.
    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    /// Short name of the kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Bytes(_) => "bytes",
            Value::GeoPoint(_) => "geo point",
            Value::File(_) => "file",
            Value::Object(_) => "object",
            Value::Relation(_) => "relation",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Value::Object(record) => Some(record),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

impl From<GeoPoint> for Value {
    fn from(point: GeoPoint) -> Self {
        Value::GeoPoint(point)
    }
}

impl From<FileRef> for Value {
    fn from(file: FileRef) -> Self {
        Value::File(file)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(Box::new(record))
    }
}

impl From<&Record> for Value {
    fn from(record: &Record) -> Self {
        Value::Object(Box::new(record.clone()))
    }
}

impl From<Relation> for Value {
    fn from(relation: Relation) -> Self {
        Value::Relation(relation)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}
