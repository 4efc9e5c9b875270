//! Argument normalization
//!
//! Classification of bare values is part of the wire contract: a peer that
//! decodes our packets must reconstruct the same kinds.
//!
//! - text → string
//! - number with a fractional part → float
//! - number without one → integer
//! - bool → integer 0/1
//!
//! Tagged `{"type": .., "value": ..}` objects keep their declared kind.

use rosc::OscType;
use serde_json::{json, Map, Value};
use std::fmt;

/// Normalized wire argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i32),
    Float(f32),
    Str(String),
}

/// Argument kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Float,
    Str,
}

impl ArgKind {
    /// Parse a tag name ("i", "int", "integer", "f", "float", "s", "string", ...)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "i" | "int" | "integer" => Some(ArgKind::Int),
            "f" | "float" | "d" | "double" => Some(ArgKind::Float),
            "s" | "str" | "string" => Some(ArgKind::Str),
            _ => None,
        }
    }

    /// OSC type tag character
    pub fn tag(self) -> &'static str {
        match self {
            ArgKind::Int => "i",
            ArgKind::Float => "f",
            ArgKind::Str => "s",
        }
    }
}

/// Argument that cannot be put on the wire
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgError {
    #[error("unsupported argument {0}")]
    Unsupported(Value),
    #[error("unknown argument type tag '{0}'")]
    UnknownTag(String),
    #[error("value {value} does not fit a {kind:?} argument")]
    Mismatch { kind: ArgKind, value: Value },
    #[error("integer {0} out of 32-bit range")]
    OutOfRange(Value),
}

impl Arg {
    /// Kind of this argument
    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Int(_) => ArgKind::Int,
            Arg::Float(_) => ArgKind::Float,
            Arg::Str(_) => ArgKind::Str,
        }
    }

    /// Numeric view (strings are not numbers)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Int(i) => Some(f64::from(*i)),
            Arg::Float(f) => Some(f64::from(*f)),
            Arg::Str(_) => None,
        }
    }

    /// Explicitly tagged JSON form that survives re-normalization unchanged
    pub fn to_tagged(&self) -> Value {
        match self {
            Arg::Int(i) => json!({"type": "i", "value": i}),
            Arg::Float(f) => json!({"type": "f", "value": f}),
            Arg::Str(s) => json!({"type": "s", "value": s}),
        }
    }

    /// Convert a decoded OSC argument; kinds we don't relay yield `None`
    pub fn from_osc(arg: &OscType) -> Option<Self> {
        match arg {
            OscType::Int(i) => Some(Arg::Int(*i)),
            OscType::Float(f) => Some(Arg::Float(*f)),
            OscType::Double(d) => Some(Arg::Float(*d as f32)),
            OscType::Long(l) => i32::try_from(*l).ok().map(Arg::Int),
            OscType::String(s) => Some(Arg::Str(s.clone())),
            OscType::Bool(b) => Some(Arg::Int(i32::from(*b))),
            _ => None,
        }
    }
}

impl From<Arg> for OscType {
    fn from(arg: Arg) -> Self {
        match arg {
            Arg::Int(i) => OscType::Int(i),
            Arg::Float(f) => OscType::Float(f),
            Arg::Str(s) => OscType::String(s),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(v) => write!(f, "{}", v),
            Arg::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// Normalize one argument
pub fn normalize_arg(value: &Value) -> Result<Arg, ArgError> {
    match value {
        Value::String(s) => Ok(Arg::Str(s.clone())),
        Value::Number(_) => classify_number(value),
        Value::Bool(b) => Ok(Arg::Int(i32::from(*b))),
        Value::Object(map) => normalize_tagged(map, value),
        Value::Null | Value::Array(_) => Err(ArgError::Unsupported(value.clone())),
    }
}

/// Normalize a whole argument list, failing on the first bad argument
pub fn normalize_args(values: &[Value]) -> Result<Vec<Arg>, ArgError> {
    values.iter().map(normalize_arg).collect()
}

/// Read a bare or tagged numeric argument at full precision.
///
/// Used where the hub consumes a value itself rather than putting it on a
/// wire, so `0.8` stays `0.8` instead of passing through `f32`.
pub fn numeric_value(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::Object(map) => {
            let tag = map.get("type").or_else(|| map.get("kind"))?.as_str()?;
            match ArgKind::from_tag(tag)? {
                ArgKind::Int | ArgKind::Float => match map.get("value")? {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    Value::Bool(b) => Some(f64::from(u8::from(*b))),
                    _ => None,
                },
                ArgKind::Str => None,
            }
        },
        Value::String(_) | Value::Null | Value::Array(_) => None,
    };
    number.filter(|f| f.is_finite())
}

fn classify_number(value: &Value) -> Result<Arg, ArgError> {
    if let Some(i) = value.as_i64() {
        return i32::try_from(i)
            .map(Arg::Int)
            .map_err(|_| ArgError::OutOfRange(value.clone()));
    }
    if value.is_u64() {
        return Err(ArgError::OutOfRange(value.clone()));
    }

    let f = value
        .as_f64()
        .ok_or_else(|| ArgError::Unsupported(value.clone()))?;
    if f.fract() != 0.0 {
        Ok(Arg::Float(f as f32))
    } else if f >= f64::from(i32::MIN) && f <= f64::from(i32::MAX) {
        Ok(Arg::Int(f as i32))
    } else {
        Err(ArgError::OutOfRange(value.clone()))
    }
}

fn normalize_tagged(map: &Map<String, Value>, original: &Value) -> Result<Arg, ArgError> {
    let tag = map
        .get("type")
        .or_else(|| map.get("kind"))
        .and_then(Value::as_str)
        .ok_or_else(|| ArgError::Unsupported(original.clone()))?;
    let kind = ArgKind::from_tag(tag).ok_or_else(|| ArgError::UnknownTag(tag.to_string()))?;
    let inner = map
        .get("value")
        .ok_or_else(|| ArgError::Unsupported(original.clone()))?;

    let mismatch = || ArgError::Mismatch {
        kind,
        value: inner.clone(),
    };

    match kind {
        ArgKind::Str => match inner {
            Value::String(s) => Ok(Arg::Str(s.clone())),
            Value::Number(n) => Ok(Arg::Str(n.to_string())),
            Value::Bool(b) => Ok(Arg::Str(b.to_string())),
            _ => Err(mismatch()),
        },
        ArgKind::Float => {
            let f = match inner {
                Value::Number(n) => n.as_f64().ok_or_else(mismatch)?,
                Value::String(s) => s.trim().parse::<f64>().map_err(|_| mismatch())?,
                _ => return Err(mismatch()),
            };
            Ok(Arg::Float(f as f32))
        },
        ArgKind::Int => {
            let i = match inner {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => i,
                    None => {
                        let f = n.as_f64().ok_or_else(mismatch)?;
                        if f.fract() != 0.0 {
                            return Err(mismatch());
                        }
                        f as i64
                    },
                },
                Value::String(s) => s.trim().parse::<i64>().map_err(|_| mismatch())?,
                Value::Bool(b) => i64::from(*b),
                _ => return Err(mismatch()),
            };
            i32::try_from(i)
                .map(Arg::Int)
                .map_err(|_| ArgError::OutOfRange(inner.clone()))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_classification() {
        assert_eq!(normalize_arg(&json!(42)).unwrap(), Arg::Int(42));
        assert_eq!(normalize_arg(&json!(0.5)).unwrap(), Arg::Float(0.5));
        assert_eq!(normalize_arg(&json!("hello")).unwrap(), Arg::Str("hello".into()));
        assert_eq!(normalize_arg(&json!(-3)).unwrap(), Arg::Int(-3));
        assert_eq!(normalize_arg(&json!(true)).unwrap(), Arg::Int(1));
    }

    #[test]
    fn test_whole_float_classifies_as_integer() {
        // 2.0 has no fractional part, so a peer decoder sees an integer
        assert_eq!(normalize_arg(&json!(2.0)).unwrap(), Arg::Int(2));
    }

    #[test]
    fn test_tagged_values_pass_through() {
        assert_eq!(
            normalize_arg(&json!({"type": "f", "value": 1})).unwrap(),
            Arg::Float(1.0)
        );
        assert_eq!(
            normalize_arg(&json!({"kind": "integer", "value": 7})).unwrap(),
            Arg::Int(7)
        );
        assert_eq!(
            normalize_arg(&json!({"type": "s", "value": 12})).unwrap(),
            Arg::Str("12".into())
        );
    }

    #[test]
    fn test_tagged_round_trip_keeps_kind() {
        for arg in [Arg::Int(5), Arg::Float(1.0), Arg::Str("go".into())] {
            assert_eq!(normalize_arg(&arg.to_tagged()).unwrap(), arg);
        }
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            normalize_arg(&Value::Null),
            Err(ArgError::Unsupported(_))
        ));
        assert!(matches!(
            normalize_arg(&json!({"type": "blob", "value": 1})),
            Err(ArgError::UnknownTag(_))
        ));
        assert!(matches!(
            normalize_arg(&json!({"type": "i", "value": 1.5})),
            Err(ArgError::Mismatch { .. })
        ));
        assert!(matches!(
            normalize_arg(&json!(5_000_000_000_i64)),
            Err(ArgError::OutOfRange(_))
        ));
        assert!(normalize_args(&[json!(1), json!([1, 2])]).is_err());
    }

    #[test]
    fn test_numeric_value_keeps_full_precision() {
        assert_eq!(numeric_value(&json!(0.8)), Some(0.8));
        assert_eq!(numeric_value(&json!(3000)), Some(3000.0));
        assert_eq!(numeric_value(&json!({"type": "f", "value": 0.8})), Some(0.8));
        assert_eq!(numeric_value(&json!({"kind": "i", "value": "12"})), Some(12.0));
        assert_eq!(numeric_value(&json!(true)), Some(1.0));
        assert_eq!(numeric_value(&json!("0.8")), None);
        assert_eq!(numeric_value(&json!({"type": "s", "value": "0.8"})), None);
        assert_eq!(numeric_value(&json!({"type": "f", "value": "nan"})), None);
        assert_eq!(numeric_value(&json!(null)), None);
    }

    #[test]
    fn test_from_osc() {
        assert_eq!(Arg::from_osc(&OscType::Float(0.25)), Some(Arg::Float(0.25)));
        assert_eq!(Arg::from_osc(&OscType::Bool(true)), Some(Arg::Int(1)));
        assert_eq!(Arg::from_osc(&OscType::Nil), None);
    }
}
