//! The dynamic value union rows and expressions operate on (spec.md §9).
//!
//! The source engine this was modeled on leans on a dynamically typed host language;
//! here that is made explicit as a tagged union with documented coercion rules instead of
//! runtime reflection.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Stage, StreamSqlError};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(m) => write!(f, "{m:?}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    /// `bool -> int` is 0/1 (§4.2).
    pub fn as_i64(&self) -> crate::error::Result<i64> {
        match self {
            Value::Int(i) => Ok(*i),
            Value::Float(f) => Ok(*f as i64),
            Value::Bool(b) => Ok(if *b { 1 } else { 0 }),
            Value::Str(s) => s
                .parse::<i64>()
                .map_err(|_| StreamSqlError::type_mismatch(format!("cannot coerce '{s}' to int"))),
            Value::Null => Ok(0),
            other => Err(StreamSqlError::type_mismatch(format!("cannot coerce {other} to int"))),
        }
    }

    /// `string -> float` is a strict parse or an error (§4.2); no silent zero.
    pub fn as_f64(&self) -> crate::error::Result<f64> {
        match self {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Str(s) => s
                .parse::<f64>()
                .map_err(|_| StreamSqlError::type_mismatch(format!("cannot coerce '{s}' to float"))),
            Value::Null => Ok(0.0),
            other => Err(StreamSqlError::type_mismatch(format!("cannot coerce {other} to float"))),
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Null => false,
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    pub fn is_stringy(&self) -> bool {
        matches!(self, Value::Str(_))
    }

    /// Numeric widening hierarchy: `int -> int64 -> float64` (§4.2).
    pub fn numeric_widen(a: &Value, b: &Value) -> crate::error::Result<(f64, f64, bool)> {
        let both_int = matches!(a, Value::Int(_) | Value::Bool(_) | Value::Null)
            && matches!(b, Value::Int(_) | Value::Bool(_) | Value::Null);
        Ok((a.as_f64()?, b.as_f64()?, both_int))
    }

    pub fn partial_cmp_coerced(&self, other: &Value) -> crate::error::Result<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Null, Value::Null) => Ok(Ordering::Equal),
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
                    .ok_or_else(|| StreamSqlError::type_mismatch("NaN comparison"))
            }
        }
    }

    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            _ => match (self.as_f64(), other.as_f64()) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Add two values following §4.2: if either side is numeric, add numerically
    /// (widened to float if either operand is a float); otherwise concatenate as strings.
    pub fn add(&self, other: &Value, stage: Stage) -> crate::error::Result<Value> {
        if self.is_stringy() || other.is_stringy() {
            return Ok(Value::Str(format!("{self}{other}")));
        }
        let (a_is_float, b_is_float) = (matches!(self, Value::Float(_)), matches!(other, Value::Float(_)));
        if a_is_float || b_is_float {
            Ok(Value::Float(self.as_f64().map_err(|_| {
                StreamSqlError::Arithmetic { stage, message: "non-numeric operand".into() }
            })? + other.as_f64().map_err(|_| {
                StreamSqlError::Arithmetic { stage, message: "non-numeric operand".into() }
            })?))
        } else {
            Ok(Value::Int(self.as_i64().map_err(|_| {
                StreamSqlError::Arithmetic { stage, message: "non-numeric operand".into() }
            })? + other.as_i64().map_err(|_| {
                StreamSqlError::Arithmetic { stage, message: "non-numeric operand".into() }
            })?))
        }
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.as_str().map(|s| s.contains(needle)).unwrap_or(false)
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.as_str().map(|s| s.starts_with(prefix)).unwrap_or(false)
    }

    pub fn ends_with(&self, suffix: &str) -> bool {
        self.as_str().map(|s| s.ends_with(suffix)).unwrap_or(false)
    }
}
