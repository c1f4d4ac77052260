//! Runtime values inside the sandbox.
//!
//! Values follow the loose typing users expect from workflow expressions
//! (truthiness, `+` concatenation, `==` coercion) but can only be built from
//! JSON data, literals, and the fixed builtin set.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};

use super::parser::ArrowFn;

/// Local variable frame for arrow-function parameters.
#[derive(Debug, Default)]
pub struct Env {
    vars: BTreeMap<String, Val>,
    parent: Option<Rc<Env>>,
}

impl Env {
    pub fn root() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn child(parent: &Rc<Env>, vars: BTreeMap<String, Val>) -> Rc<Self> {
        Rc::new(Self {
            vars,
            parent: Some(parent.clone()),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Val> {
        match self.vars.get(name) {
            Some(v) => Some(v),
            None => self.parent.as_deref().and_then(|p| p.lookup(name)),
        }
    }
}

/// An arrow function together with the frame it closed over.
#[derive(Debug)]
pub struct Closure {
    pub func: Rc<ArrowFn>,
    pub env: Rc<Env>,
}

/// Something callable.
#[derive(Debug, Clone)]
pub enum Func {
    /// Global or namespaced builtin, e.g. `parseInt`, `Math.max`
    Native(&'static str),
    /// Method looked up on a receiver, e.g. `"a".toUpperCase`
    Bound {
        receiver: Box<Val>,
        method: &'static str,
    },
    /// User-written arrow function
    Arrow(Rc<Closure>),
}

/// A sandbox value.
#[derive(Debug, Clone)]
pub enum Val {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Val>>),
    Object(Rc<BTreeMap<String, Val>>),
    /// JS-style `Date`, always UTC
    Date(DateTime<Utc>),
    /// Result of the `DateTime` helper; coerces to its ISO string
    DateTime(DateTime<FixedOffset>),
    /// Builtin namespace such as `Math` or `JSON`
    Namespace(&'static str),
    Func(Func),
}

impl Val {
    pub fn str(s: impl AsRef<str>) -> Self {
        Val::Str(Rc::from(s.as_ref()))
    }

    pub fn array(items: Vec<Val>) -> Self {
        Val::Array(Rc::new(items))
    }

    pub fn object(map: BTreeMap<String, Val>) -> Self {
        Val::Object(Rc::new(map))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Val::Undefined | Val::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Val::Func(_) | Val::Namespace(_))
    }

    pub fn truthy(&self) -> bool {
        match self {
            Val::Undefined | Val::Null => false,
            Val::Bool(b) => *b,
            Val::Num(n) => *n != 0.0 && !n.is_nan(),
            Val::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Val::Undefined => "undefined",
            Val::Bool(_) => "boolean",
            Val::Num(_) => "number",
            Val::Str(_) => "string",
            Val::Func(_) => "function",
            // Callable namespaces (String, Number, ...) report as functions
            Val::Namespace(name) if is_callable_namespace(name) => "function",
            _ => "object",
        }
    }

    /// Numeric conversion with the usual loose rules.
    pub fn to_number(&self) -> f64 {
        match self {
            Val::Undefined => f64::NAN,
            Val::Null => 0.0,
            Val::Bool(b) => f64::from(u8::from(*b)),
            Val::Num(n) => *n,
            Val::Str(s) => parse_number_literal(s),
            Val::Array(items) => match items.len() {
                0 => 0.0,
                1 => items[0].to_number(),
                _ => f64::NAN,
            },
            Val::Date(dt) => dt.timestamp_millis() as f64,
            Val::DateTime(dt) => dt.timestamp_millis() as f64,
            _ => f64::NAN,
        }
    }

    /// String conversion as used by `+`, templates, and `String(x)`.
    pub fn to_display_string(&self) -> String {
        match self {
            Val::Undefined => "undefined".to_string(),
            Val::Null => "null".to_string(),
            Val::Bool(b) => b.to_string(),
            Val::Num(n) => format_number(*n),
            Val::Str(s) => s.to_string(),
            Val::Array(items) => items
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Val::Object(_) => "[object Object]".to_string(),
            Val::Date(dt) => date_to_iso(dt),
            Val::DateTime(dt) => datetime_to_iso(dt),
            Val::Namespace(name) => format!("[object {}]", name),
            Val::Func(_) => "function () { [native code] }".to_string(),
        }
    }

    /// JSON view of the value, as `JSON.stringify` would see it.
    ///
    /// Returns `None` for values JSON cannot carry (undefined, functions).
    pub fn to_json(&self) -> Option<Value> {
        Some(match self {
            Val::Undefined | Val::Func(_) | Val::Namespace(_) => return None,
            Val::Null => Value::Null,
            Val::Bool(b) => Value::Bool(*b),
            Val::Num(n) => number_to_json(*n),
            Val::Str(s) => Value::String(s.to_string()),
            Val::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json().unwrap_or(Value::Null))
                    .collect(),
            ),
            Val::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map.iter() {
                    if let Some(json) = v.to_json() {
                        out.insert(k.clone(), json);
                    }
                }
                Value::Object(out)
            }
            Val::Date(dt) => Value::String(date_to_iso(dt)),
            Val::DateTime(dt) => Value::String(datetime_to_iso(dt)),
        })
    }

    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Val::Null,
            Value::Bool(b) => Val::Bool(*b),
            Value::Number(n) => Val::Num(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Val::str(s),
            Value::Array(items) => Val::array(items.iter().map(Val::from_json).collect()),
            Value::Object(map) => Val::object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Val::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// `===`
    pub fn strict_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Undefined, Val::Undefined) | (Val::Null, Val::Null) => true,
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Num(a), Val::Num(b)) => a == b,
            (Val::Str(a), Val::Str(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => Rc::ptr_eq(a, b),
            (Val::Object(a), Val::Object(b)) => Rc::ptr_eq(a, b),
            (Val::Date(a), Val::Date(b)) => a == b,
            (Val::DateTime(a), Val::DateTime(b)) => a == b,
            (Val::Namespace(a), Val::Namespace(b)) => a == b,
            _ => false,
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Val) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Val::Num(_), Val::Str(_))
            | (Val::Str(_), Val::Num(_))
            | (Val::Bool(_), _)
            | (_, Val::Bool(_)) => self.to_number() == other.to_number(),
            (Val::Array(_) | Val::Object(_), Val::Str(_) | Val::Num(_)) => {
                Val::str(self.to_display_string()).loose_eq(other)
            }
            (Val::Str(_) | Val::Num(_), Val::Array(_) | Val::Object(_)) => {
                self.loose_eq(&Val::str(other.to_display_string()))
            }
            _ => self.strict_eq(other),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

fn is_callable_namespace(name: &str) -> bool {
    matches!(name, "String" | "Number" | "Boolean" | "Array" | "Date" | "Object")
}

/// Parse a string the way `Number("...")` does.
pub fn parse_number_literal(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if let Some(hex) = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    // Rust accepts "inf"/"nan" spellings that JS does not
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// Render a number the way JS prints it for common magnitudes.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Integral values become JSON integers so typed results compare naturally.
pub fn number_to_json(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0 {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// `Date.prototype.toISOString` layout.
pub fn date_to_iso(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `DateTime.toISO()` layout: millisecond precision, `Z` for UTC.
pub fn datetime_to_iso(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!Val::Undefined.truthy());
        assert!(!Val::Num(0.0).truthy());
        assert!(!Val::Num(f64::NAN).truthy());
        assert!(!Val::str("").truthy());
        assert!(Val::str("0").truthy());
        assert!(Val::array(vec![]).truthy());
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn test_number_to_json_prefers_integers() {
        assert_eq!(number_to_json(2.0), json!(2));
        assert_eq!(number_to_json(-7.0), json!(-7));
        assert_eq!(number_to_json(1.5), json!(1.5));
        assert_eq!(number_to_json(f64::NAN), Value::Null);
    }

    #[test]
    fn test_json_round_trip_drops_undefined() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Val::Num(1.0));
        map.insert("b".to_string(), Val::Undefined);
        let obj = Val::object(map);
        assert_eq!(obj.to_json(), Some(json!({"a": 1})));

        let arr = Val::array(vec![Val::Undefined, Val::Bool(true)]);
        assert_eq!(arr.to_json(), Some(json!([null, true])));
    }

    #[test]
    fn test_loose_equality() {
        assert!(Val::Num(1.0).loose_eq(&Val::str("1")));
        assert!(Val::Null.loose_eq(&Val::Undefined));
        assert!(!Val::Null.loose_eq(&Val::Num(0.0)));
        assert!(Val::Bool(true).loose_eq(&Val::Num(1.0)));
        assert!(!Val::Num(1.0).strict_eq(&Val::str("1")));
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Val::str(" 42 ").to_number(), 42.0);
        assert_eq!(Val::str("").to_number(), 0.0);
        assert!(Val::str("abc").to_number().is_nan());
        assert!(Val::str("inf").to_number().is_nan());
        assert_eq!(Val::str("1e3").to_number(), 1000.0);
        assert_eq!(Val::str("0x1F").to_number(), 31.0);
    }

    #[test]
    fn test_display_string_of_array() {
        let arr = Val::array(vec![Val::Num(1.0), Val::Null, Val::str("x")]);
        assert_eq!(arr.to_display_string(), "1,,x");
    }
}
