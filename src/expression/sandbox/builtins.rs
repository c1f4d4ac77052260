//! Builtin globals, namespaces and primitive methods.
//!
//! Everything an expression can call is named in one of the tables below.
//! Names not listed do not exist inside the sandbox.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts;
use std::rc::Rc;

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

use super::datetime;
use super::helpers;
use super::interp::{type_error, Interpreter};
use super::value::{format_number, Func, Val};
use super::SandboxError;

/// Global objects; the callable ones double as conversion functions.
const NAMESPACES: &[&str] = &[
    "Math", "JSON", "Object", "Array", "String", "Number", "Boolean", "Date", "DateTime",
    "console",
];

/// Callable builtins: bare global names and `Namespace.member` names.
const NATIVE_FUNCTIONS: &[&str] = &[
    "parseInt",
    "parseFloat",
    "isNaN",
    "isFinite",
    "encodeURIComponent",
    "decodeURIComponent",
    "encodeURI",
    "decodeURI",
    "isExecuted",
    "hasData",
    "getNodeData",
    "firstExecuted",
    "Math.abs",
    "Math.ceil",
    "Math.floor",
    "Math.round",
    "Math.trunc",
    "Math.sign",
    "Math.sqrt",
    "Math.cbrt",
    "Math.exp",
    "Math.log",
    "Math.log2",
    "Math.log10",
    "Math.sin",
    "Math.cos",
    "Math.tan",
    "Math.asin",
    "Math.acos",
    "Math.atan",
    "Math.atan2",
    "Math.pow",
    "Math.hypot",
    "Math.max",
    "Math.min",
    "JSON.stringify",
    "JSON.parse",
    "Object.keys",
    "Object.values",
    "Object.entries",
    "Object.assign",
    "Object.fromEntries",
    "Array.isArray",
    "Array.from",
    "Array.of",
    "Number.isInteger",
    "Number.isFinite",
    "Number.isNaN",
    "Number.parseFloat",
    "Number.parseInt",
    "String.fromCharCode",
    "Date.now",
    "Date.parse",
    "DateTime.now",
    "DateTime.utc",
    "DateTime.fromISO",
    "DateTime.fromMillis",
    "DateTime.fromJSDate",
    "console.log",
    "console.info",
    "console.warn",
    "console.error",
    "console.debug",
];

pub(super) const STRING_METHODS: &[&str] = &[
    "toUpperCase",
    "toLowerCase",
    "trim",
    "trimStart",
    "trimEnd",
    "includes",
    "startsWith",
    "endsWith",
    "indexOf",
    "lastIndexOf",
    "slice",
    "substring",
    "split",
    "replace",
    "replaceAll",
    "padStart",
    "padEnd",
    "repeat",
    "charAt",
    "charCodeAt",
    "at",
    "concat",
    "localeCompare",
    "toString",
    "valueOf",
];

pub(super) const ARRAY_METHODS: &[&str] = &[
    "map",
    "filter",
    "find",
    "findIndex",
    "some",
    "every",
    "forEach",
    "reduce",
    "flatMap",
    "join",
    "includes",
    "indexOf",
    "lastIndexOf",
    "slice",
    "concat",
    "reverse",
    "flat",
    "at",
    "sort",
    "toString",
];

pub(super) const NUMBER_METHODS: &[&str] = &["toFixed", "toString", "toLocaleString", "valueOf"];

pub(super) const BOOLEAN_METHODS: &[&str] = &["toString", "valueOf"];

/// Characters `encodeURIComponent` leaves alone besides ASCII alphanumerics.
const URI_UNRESERVED: &str = "-_.!~*'()";
/// Characters `encodeURI` additionally leaves alone.
const URI_RESERVED: &str = ";,/?:@&=+$#";

/// Resolve a global identifier to a builtin.
pub(super) fn global(name: &str) -> Option<Val> {
    if let Some(ns) = NAMESPACES.iter().copied().find(|ns| *ns == name) {
        return Some(Val::Namespace(ns));
    }
    NATIVE_FUNCTIONS
        .iter()
        .copied()
        .find(|f| *f == name)
        .map(|f| Val::Func(Func::Native(f)))
}

/// `Math.PI`, `JSON.stringify`, ... Unknown members are undefined.
pub(super) fn namespace_member(ns: &str, name: &str) -> Val {
    let constant = match (ns, name) {
        ("Math", "PI") => Some(consts::PI),
        ("Math", "E") => Some(consts::E),
        ("Math", "LN2") => Some(consts::LN_2),
        ("Math", "LN10") => Some(consts::LN_10),
        ("Math", "LOG2E") => Some(consts::LOG2_E),
        ("Math", "LOG10E") => Some(consts::LOG10_E),
        ("Math", "SQRT2") => Some(consts::SQRT_2),
        ("Math", "SQRT1_2") => Some(consts::FRAC_1_SQRT_2),
        ("Number", "MAX_SAFE_INTEGER") => Some(9_007_199_254_740_991.0),
        ("Number", "MIN_SAFE_INTEGER") => Some(-9_007_199_254_740_991.0),
        ("Number", "EPSILON") => Some(f64::EPSILON),
        ("Number", "MAX_VALUE") => Some(f64::MAX),
        ("Number", "MIN_VALUE") => Some(5e-324),
        ("Number", "POSITIVE_INFINITY") => Some(f64::INFINITY),
        ("Number", "NEGATIVE_INFINITY") => Some(f64::NEG_INFINITY),
        ("Number", "NaN") => Some(f64::NAN),
        _ => None,
    };
    if let Some(value) = constant {
        return Val::Num(value);
    }
    NATIVE_FUNCTIONS
        .iter()
        .copied()
        .find(|f| f.split_once('.') == Some((ns, name)))
        .map(|f| Val::Func(Func::Native(f)))
        .unwrap_or(Val::Undefined)
}

fn arg(args: &[Val], index: usize) -> Val {
    args.get(index).cloned().unwrap_or(Val::Undefined)
}

fn callable(args: &[Val], index: usize, what: &str) -> Result<Val, SandboxError> {
    let f = arg(args, index);
    if f.type_of() == "function" {
        Ok(f)
    } else {
        Err(type_error(format!(
            "{} is not a function ({})",
            f.to_display_string(),
            what
        )))
    }
}

/// `ToIntegerOrInfinity`: NaN becomes 0, fractions truncate.
fn to_integer(value: &Val) -> f64 {
    let n = value.to_number();
    if n.is_nan() {
        0.0
    } else {
        n.trunc()
    }
}

/// Resolve a possibly negative index against `len`, clamped to `0..=len`.
fn relative_index(value: &Val, len: usize, default: usize) -> usize {
    if matches!(value, Val::Undefined) {
        return default;
    }
    let n = to_integer(value);
    let len_f = len as f64;
    if n < 0.0 {
        (len_f + n).max(0.0) as usize
    } else {
        n.min(len_f) as usize
    }
}

impl Interpreter<'_> {
    pub(super) fn call_native(
        &mut self,
        name: &'static str,
        args: Vec<Val>,
    ) -> Result<Val, SandboxError> {
        if let Some(op) = name.strip_prefix("Math.") {
            return math(op, &args);
        }
        if name == "Date" || name.starts_with("Date.") || name.starts_with("DateTime.") {
            return datetime::call_static(self.now, name, &args);
        }
        if helpers::is_node_helper(name) {
            let nodes = self.root("$node");
            return helpers::call(name, &nodes, &args);
        }

        Ok(match name {
            "JSON.stringify" => return self.json_stringify(&args),
            "JSON.parse" => {
                let text = arg(&args, 0).to_display_string();
                let parsed: Value = serde_json::from_str(&text)
                    .map_err(|e| SandboxError::Runtime(format!("SyntaxError: {}", e)))?;
                Val::from_json(&parsed)
            }
            "Object.keys" => {
                let keys = entries_of(&arg(&args, 0))
                    .into_iter()
                    .map(|(k, _)| Val::str(k))
                    .collect();
                Val::array(keys)
            }
            "Object.values" => Val::array(
                entries_of(&arg(&args, 0))
                    .into_iter()
                    .map(|(_, v)| v)
                    .collect(),
            ),
            "Object.entries" => Val::array(
                entries_of(&arg(&args, 0))
                    .into_iter()
                    .map(|(k, v)| Val::array(vec![Val::str(k), v]))
                    .collect(),
            ),
            "Object.assign" => {
                let mut merged = BTreeMap::new();
                for source in &args {
                    merged.extend(entries_of(source));
                }
                self.reserve_len(merged.len())?;
                Val::object(merged)
            }
            "Object.fromEntries" => {
                let mut map = BTreeMap::new();
                if let Val::Array(pairs) = arg(&args, 0) {
                    for pair in pairs.iter() {
                        if let Val::Array(kv) = pair {
                            map.insert(arg(kv, 0).to_display_string(), arg(kv, 1));
                        }
                    }
                }
                Val::object(map)
            }
            "Object" => match arg(&args, 0) {
                value @ (Val::Object(_) | Val::Array(_)) => value,
                _ => Val::object(BTreeMap::new()),
            },
            "Array.isArray" => Val::Bool(matches!(arg(&args, 0), Val::Array(_))),
            "Array.from" => return self.array_from(&args),
            "Array.of" => return self.array(args),
            "Array" => {
                if let [Val::Num(n)] = args.as_slice() {
                    let n = *n;
                    if n < 0.0 || n.fract() != 0.0 {
                        return Err(SandboxError::Runtime("RangeError: Invalid array length".into()));
                    }
                    self.reserve_len(n as usize)?;
                    return Ok(Val::array(vec![Val::Undefined; n as usize]));
                }
                return self.array(args);
            }
            "Number" => Val::Num(args.first().map(Val::to_number).unwrap_or(0.0)),
            "Number.isInteger" => {
                Val::Bool(matches!(arg(&args, 0), Val::Num(n) if n.is_finite() && n.fract() == 0.0))
            }
            "Number.isFinite" => Val::Bool(matches!(arg(&args, 0), Val::Num(n) if n.is_finite())),
            "Number.isNaN" => Val::Bool(matches!(arg(&args, 0), Val::Num(n) if n.is_nan())),
            "parseFloat" | "Number.parseFloat" => {
                Val::Num(parse_float(&arg(&args, 0).to_display_string()))
            }
            "parseInt" | "Number.parseInt" => {
                let radix = args.get(1).filter(|r| !r.is_nullish()).map(Val::to_number);
                Val::Num(parse_int(&arg(&args, 0).to_display_string(), radix))
            }
            "isNaN" => Val::Bool(arg(&args, 0).to_number().is_nan()),
            "isFinite" => Val::Bool(arg(&args, 0).to_number().is_finite()),
            "String" => match args.first() {
                Some(value) => Val::str(value.to_display_string()),
                None => Val::str(""),
            },
            "String.fromCharCode" => {
                let text: String = args
                    .iter()
                    .filter_map(|code| char::from_u32(to_integer(code) as u32))
                    .collect();
                return self.string(text);
            }
            "Boolean" => Val::Bool(arg(&args, 0).truthy()),
            "encodeURIComponent" => {
                return self.string(encode_uri(&arg(&args, 0).to_display_string(), URI_UNRESERVED))
            }
            "encodeURI" => {
                let keep = format!("{}{}", URI_UNRESERVED, URI_RESERVED);
                return self.string(encode_uri(&arg(&args, 0).to_display_string(), &keep));
            }
            "decodeURIComponent" => Val::str(decode_uri(&arg(&args, 0).to_display_string(), "")?),
            "decodeURI" => Val::str(decode_uri(&arg(&args, 0).to_display_string(), URI_RESERVED)?),
            // Output has nowhere to go
            _ if name.starts_with("console.") => Val::Undefined,
            _ => return Err(type_error(format!("{} is not a function", name))),
        })
    }

    fn json_stringify(&mut self, args: &[Val]) -> Result<Val, SandboxError> {
        let Some(json) = arg(args, 0).to_json() else {
            return Ok(Val::Undefined);
        };
        let indent = match args.get(2) {
            Some(Val::Num(n)) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
            Some(Val::Str(s)) => s.chars().take(10).collect(),
            _ => String::new(),
        };

        let text = if indent.is_empty() {
            serde_json::to_string(&json)?
        } else {
            let mut buf = Vec::new();
            let mut serializer =
                Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
            json.serialize(&mut serializer)?;
            String::from_utf8_lossy(&buf).into_owned()
        };
        self.string(text)
    }

    fn array_from(&mut self, args: &[Val]) -> Result<Val, SandboxError> {
        let items = match arg(args, 0) {
            Val::Array(items) => items.as_ref().clone(),
            Val::Str(s) => s.chars().map(|c| Val::str(c.to_string())).collect(),
            Val::Object(map) => {
                let len = map.get("length").map(to_integer).unwrap_or(0.0).max(0.0);
                self.check_len(len as usize)?;
                vec![Val::Undefined; len as usize]
            }
            _ => Vec::new(),
        };
        self.reserve_len(items.len())?;

        if args.len() < 2 {
            return Ok(Val::array(items));
        }
        let mapper = callable(args, 1, "Array.from")?;
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            out.push(self.call_value(&mapper, vec![item, Val::Num(i as f64)])?);
        }
        Ok(Val::array(out))
    }

    pub(super) fn string_method(
        &mut self,
        s: &Rc<str>,
        method: &str,
        args: &[Val],
    ) -> Result<Val, SandboxError> {
        let text: &str = s;
        let needle = || arg(args, 0).to_display_string();
        Ok(match method {
            "toUpperCase" => Val::str(text.to_uppercase()),
            "toLowerCase" => Val::str(text.to_lowercase()),
            "trim" => Val::str(text.trim()),
            "trimStart" => Val::str(text.trim_start()),
            "trimEnd" => Val::str(text.trim_end()),
            "includes" => Val::Bool(text.contains(needle().as_str())),
            "startsWith" => Val::Bool(text.starts_with(needle().as_str())),
            "endsWith" => Val::Bool(text.ends_with(needle().as_str())),
            "indexOf" => {
                let from = relative_index(&arg(args, 1), text.chars().count(), 0);
                Val::Num(char_index_of(text, &needle(), from).map_or(-1.0, |i| i as f64))
            }
            "lastIndexOf" => Val::Num(
                text.rfind(needle().as_str())
                    .map_or(-1.0, |b| text[..b].chars().count() as f64),
            ),
            "slice" => {
                let chars: Vec<char> = text.chars().collect();
                let start = relative_index(&arg(args, 0), chars.len(), 0);
                let end = relative_index(&arg(args, 1), chars.len(), chars.len());
                Val::str(chars.get(start..end.max(start)).unwrap_or(&[]).iter().collect::<String>())
            }
            "substring" => {
                let chars: Vec<char> = text.chars().collect();
                let clamp = |v: &Val, default: usize| match v {
                    Val::Undefined => default,
                    other => to_integer(other).clamp(0.0, chars.len() as f64) as usize,
                };
                let a = clamp(&arg(args, 0), 0);
                let b = clamp(&arg(args, 1), chars.len());
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                Val::str(chars[start..end].iter().collect::<String>())
            }
            "split" => {
                let limit = match arg(args, 1) {
                    Val::Undefined => usize::MAX,
                    other => to_integer(&other).max(0.0) as usize,
                };
                let parts: Vec<Val> = match arg(args, 0) {
                    Val::Undefined => vec![Val::str(text)],
                    sep => {
                        let sep = sep.to_display_string();
                        if sep.is_empty() {
                            text.chars().map(|c| Val::str(c.to_string())).collect()
                        } else {
                            text.split(sep.as_str()).map(Val::str).collect()
                        }
                    }
                };
                let parts: Vec<Val> = parts.into_iter().take(limit).collect();
                return self.array(parts);
            }
            "replace" | "replaceAll" => {
                let pattern = needle();
                let replacer = arg(args, 1);
                let mut out = String::new();
                let mut rest = text;
                let mut replaced = false;
                while let Some(pos) = rest.find(pattern.as_str()) {
                    if replaced && method == "replace" {
                        break;
                    }
                    out.push_str(&rest[..pos]);
                    let replacement = if replacer.type_of() == "function" {
                        self.call_value(&replacer, vec![Val::str(&pattern)])?
                            .to_display_string()
                    } else {
                        replacer.to_display_string()
                    };
                    out.push_str(&replacement);
                    self.check_string(&out)?;
                    rest = &rest[pos + pattern.len()..];
                    replaced = true;
                    if pattern.is_empty() {
                        // Empty pattern matches between every character
                        match rest.chars().next() {
                            Some(c) if method == "replaceAll" => {
                                out.push(c);
                                rest = &rest[c.len_utf8()..];
                            }
                            _ => break,
                        }
                    }
                }
                out.push_str(rest);
                return self.string(out);
            }
            "padStart" | "padEnd" => {
                let target = to_integer(&arg(args, 0)).max(0.0) as usize;
                let fill = match arg(args, 1) {
                    Val::Undefined => " ".to_string(),
                    other => other.to_display_string(),
                };
                let len = text.chars().count();
                if target <= len || fill.is_empty() {
                    return Ok(Val::Str(s.clone()));
                }
                self.reserve_string(target)?;
                let pad: String = fill.chars().cycle().take(target - len).collect();
                if method == "padStart" {
                    Val::str(format!("{}{}", pad, text))
                } else {
                    Val::str(format!("{}{}", text, pad))
                }
            }
            "repeat" => {
                let count = to_integer(&arg(args, 0));
                if count < 0.0 || count.is_infinite() {
                    return Err(SandboxError::Runtime("RangeError: Invalid count value".into()));
                }
                self.reserve_string(text.len().saturating_mul(count as usize))?;
                Val::str(text.repeat(count as usize))
            }
            "charAt" => {
                let index = to_integer(&arg(args, 0));
                Val::str(
                    (index >= 0.0)
                        .then(|| text.chars().nth(index as usize))
                        .flatten()
                        .map(String::from)
                        .unwrap_or_default(),
                )
            }
            "charCodeAt" => {
                let index = to_integer(&arg(args, 0));
                Val::Num(
                    (index >= 0.0)
                        .then(|| text.chars().nth(index as usize))
                        .flatten()
                        .map_or(f64::NAN, |c| f64::from(u32::from(c))),
                )
            }
            "at" => {
                let chars: Vec<char> = text.chars().collect();
                let index = to_integer(&arg(args, 0));
                let index = if index < 0.0 { chars.len() as f64 + index } else { index };
                if index < 0.0 {
                    Val::Undefined
                } else {
                    chars
                        .get(index as usize)
                        .map(|c| Val::str(c.to_string()))
                        .unwrap_or(Val::Undefined)
                }
            }
            "concat" => {
                let mut out = text.to_string();
                for value in args {
                    out.push_str(&value.to_display_string());
                }
                return self.string(out);
            }
            "localeCompare" => Val::Num(match text.cmp(needle().as_str()) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            }),
            _ => Val::Str(s.clone()),
        })
    }

    pub(super) fn array_method(
        &mut self,
        items: &Rc<Vec<Val>>,
        method: &str,
        args: &[Val],
    ) -> Result<Val, SandboxError> {
        let receiver = Val::Array(items.clone());
        let index = |i: usize| Val::Num(i as f64);

        Ok(match method {
            "map" | "flatMap" => {
                let f = callable(args, 0, method)?;
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    let mapped = self.call_value(&f, vec![item.clone(), index(i), receiver.clone()])?;
                    match mapped {
                        Val::Array(inner) if method == "flatMap" => out.extend(inner.iter().cloned()),
                        other => out.push(other),
                    }
                }
                return self.array(out);
            }
            "filter" => {
                let f = callable(args, 0, method)?;
                let mut out = Vec::new();
                for (i, item) in items.iter().enumerate() {
                    if self
                        .call_value(&f, vec![item.clone(), index(i), receiver.clone()])?
                        .truthy()
                    {
                        out.push(item.clone());
                    }
                }
                Val::array(out)
            }
            "find" | "findIndex" | "some" | "every" => {
                let f = callable(args, 0, method)?;
                let mut hit = None;
                for (i, item) in items.iter().enumerate() {
                    let matched = self
                        .call_value(&f, vec![item.clone(), index(i), receiver.clone()])?
                        .truthy();
                    if matched != (method == "every") {
                        hit = Some(i);
                        break;
                    }
                }
                match (method, hit) {
                    ("find", Some(i)) => items[i].clone(),
                    ("find", None) => Val::Undefined,
                    ("findIndex", Some(i)) => index(i),
                    ("findIndex", None) => Val::Num(-1.0),
                    ("some", hit) => Val::Bool(hit.is_some()),
                    (_, hit) => Val::Bool(hit.is_none()),
                }
            }
            "forEach" => {
                let f = callable(args, 0, method)?;
                for (i, item) in items.iter().enumerate() {
                    self.call_value(&f, vec![item.clone(), index(i), receiver.clone()])?;
                }
                Val::Undefined
            }
            "reduce" => {
                let f = callable(args, 0, method)?;
                let mut iter = items.iter().enumerate();
                let mut acc = match args.get(1) {
                    Some(initial) => initial.clone(),
                    None => match iter.next() {
                        Some((_, first)) => first.clone(),
                        None => {
                            return Err(type_error(
                                "Reduce of empty array with no initial value".to_string(),
                            ))
                        }
                    },
                };
                for (i, item) in iter {
                    acc = self.call_value(&f, vec![acc, item.clone(), index(i), receiver.clone()])?;
                }
                acc
            }
            "join" | "toString" => {
                let sep = match arg(args, 0) {
                    Val::Undefined => ",".to_string(),
                    _ if method == "toString" => ",".to_string(),
                    other => other.to_display_string(),
                };
                let mut out = String::new();
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(&sep);
                    }
                    if !item.is_nullish() {
                        out.push_str(&item.to_display_string());
                    }
                    self.check_string(&out)?;
                }
                return self.string(out);
            }
            "includes" => {
                let target = arg(args, 0);
                Val::Bool(items.iter().any(|item| same_value_zero(item, &target)))
            }
            "indexOf" => {
                let target = arg(args, 0);
                Val::Num(
                    items
                        .iter()
                        .position(|item| item.strict_eq(&target))
                        .map_or(-1.0, |i| i as f64),
                )
            }
            "lastIndexOf" => {
                let target = arg(args, 0);
                Val::Num(
                    items
                        .iter()
                        .rposition(|item| item.strict_eq(&target))
                        .map_or(-1.0, |i| i as f64),
                )
            }
            "slice" => {
                let start = relative_index(&arg(args, 0), items.len(), 0);
                let end = relative_index(&arg(args, 1), items.len(), items.len());
                Val::array(items.get(start..end.max(start)).unwrap_or(&[]).to_vec())
            }
            "concat" => {
                let mut out = items.as_ref().clone();
                for value in args {
                    match value {
                        Val::Array(more) => out.extend(more.iter().cloned()),
                        other => out.push(other.clone()),
                    }
                    self.check_len(out.len())?;
                }
                return self.array(out);
            }
            "reverse" => Val::array(items.iter().rev().cloned().collect()),
            "flat" => {
                let depth = match arg(args, 0) {
                    Val::Undefined => 1,
                    other => to_integer(&other).clamp(0.0, 64.0) as usize,
                };
                let mut out = Vec::new();
                flatten_into(items, depth, &mut out);
                return self.array(out);
            }
            "at" => {
                let i = to_integer(&arg(args, 0));
                let i = if i < 0.0 { items.len() as f64 + i } else { i };
                if i < 0.0 {
                    Val::Undefined
                } else {
                    items.get(i as usize).cloned().unwrap_or(Val::Undefined)
                }
            }
            "sort" => {
                let comparator = match arg(args, 0) {
                    Val::Undefined => None,
                    _ => Some(callable(args, 0, method)?),
                };
                Val::array(self.merge_sort(items.as_ref().clone(), comparator.as_ref())?)
            }
            _ => Val::Undefined,
        })
    }

    /// Stable sort with a user comparator that may fail or be inconsistent.
    fn merge_sort(&mut self, mut items: Vec<Val>, comparator: Option<&Val>) -> Result<Vec<Val>, SandboxError> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items, comparator)?;
        let right = self.merge_sort(right, comparator)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        while let (Some(a), Some(b)) = (left.peek(), right.peek()) {
            let take_right = match comparator {
                Some(f) => self.call_value(f, vec![a.clone(), b.clone()])?.to_number() > 0.0,
                None => default_order(a, b) == Ordering::Greater,
            };
            let next = if take_right { right.next() } else { left.next() };
            merged.extend(next);
        }
        merged.extend(left);
        merged.extend(right);
        Ok(merged)
    }

    pub(super) fn number_method(&mut self, n: f64, method: &str, args: &[Val]) -> Result<Val, SandboxError> {
        Ok(match method {
            "toFixed" => {
                let digits = to_integer(&arg(args, 0));
                if !(0.0..=100.0).contains(&digits) {
                    return Err(SandboxError::Runtime(
                        "RangeError: toFixed() digits argument must be between 0 and 100".into(),
                    ));
                }
                if !n.is_finite() || n.abs() >= 1e21 {
                    Val::str(format_number(n))
                } else {
                    // Normalize -0 so it prints as "0.00"
                    let n = if n == 0.0 { 0.0 } else { n };
                    Val::str(format!("{:.*}", digits as usize, n))
                }
            }
            "toString" => match arg(args, 0) {
                Val::Undefined => Val::str(format_number(n)),
                radix => {
                    let radix = to_integer(&radix);
                    if !(2.0..=36.0).contains(&radix) {
                        return Err(SandboxError::Runtime(
                            "RangeError: toString() radix must be between 2 and 36".into(),
                        ));
                    }
                    Val::str(to_radix(n, radix as u32))
                }
            },
            "toLocaleString" => Val::str(to_locale_string(n)),
            _ => Val::Num(n),
        })
    }
}

fn entries_of(value: &Val) -> Vec<(String, Val)> {
    match value {
        Val::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Val::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Val::Str(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Val::str(c.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn flatten_into(items: &[Val], depth: usize, out: &mut Vec<Val>) {
    for item in items {
        match item {
            Val::Array(inner) if depth > 0 => flatten_into(inner, depth - 1, out),
            other => out.push(other.clone()),
        }
    }
}

fn same_value_zero(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::Num(x), Val::Num(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_eq(b),
    }
}

/// Default `sort()` order: string comparison, undefined last.
fn default_order(a: &Val, b: &Val) -> Ordering {
    match (a, b) {
        (Val::Undefined, Val::Undefined) => Ordering::Equal,
        (Val::Undefined, _) => Ordering::Greater,
        (_, Val::Undefined) => Ordering::Less,
        _ => a.to_display_string().cmp(&b.to_display_string()),
    }
}

fn char_index_of(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let start = haystack
        .char_indices()
        .nth(from)
        .map(|(b, _)| b)
        .unwrap_or(haystack.len());
    haystack[start..]
        .find(needle)
        .map(|pos| from + haystack[start..start + pos].chars().count())
}

fn math(op: &str, args: &[Val]) -> Result<Val, SandboxError> {
    let x = arg(args, 0).to_number();
    let y = arg(args, 1).to_number();
    let result = match op {
        "abs" => x.abs(),
        "ceil" => x.ceil(),
        "floor" => x.floor(),
        // Halves round toward +Infinity
        "round" => {
            let floor = x.floor();
            if x - floor >= 0.5 {
                floor + 1.0
            } else {
                floor
            }
        }
        "trunc" => x.trunc(),
        "sign" => {
            if x == 0.0 || x.is_nan() {
                x
            } else {
                x.signum()
            }
        }
        "sqrt" => x.sqrt(),
        "cbrt" => x.cbrt(),
        "exp" => x.exp(),
        "log" => x.ln(),
        "log2" => x.log2(),
        "log10" => x.log10(),
        "sin" => x.sin(),
        "cos" => x.cos(),
        "tan" => x.tan(),
        "asin" => x.asin(),
        "acos" => x.acos(),
        "atan" => x.atan(),
        "atan2" => x.atan2(y),
        "pow" => x.powf(y),
        "hypot" => args
            .iter()
            .map(|v| v.to_number().powi(2))
            .sum::<f64>()
            .sqrt(),
        "max" | "min" => {
            let mut acc = if op == "max" {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
            for value in args {
                let n = value.to_number();
                if n.is_nan() {
                    return Ok(Val::Num(f64::NAN));
                }
                acc = if op == "max" { acc.max(n) } else { acc.min(n) };
            }
            acc
        }
        _ => return Err(type_error(format!("Math.{} is not a function", op))),
    };
    Ok(Val::Num(result))
}

/// `parseInt`: leading digits in the radix, ignoring trailing junk.
fn parse_int(input: &str, radix: Option<f64>) -> f64 {
    let s = input.trim_start();
    let (negative, mut s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (mut radix, allow_hex_prefix) = match radix.map(f64::trunc) {
        None => (10, true),
        Some(r) if r == 0.0 || r.is_nan() => (10, true),
        Some(r) if (2.0..=36.0).contains(&r) => (r as u32, r == 16.0),
        Some(_) => return f64::NAN,
    };
    if allow_hex_prefix {
        if let Some(rest) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            s = rest;
            radix = 16;
        }
    }

    let mut digits = 0;
    let mut value = 0.0;
    for d in s.chars().map_while(|c| c.to_digit(radix)) {
        value = value * f64::from(radix) + f64::from(d);
        digits += 1;
    }
    if digits == 0 {
        return f64::NAN;
    }
    if negative {
        -value
    } else {
        value
    }
}

/// `parseFloat`: longest numeric prefix.
fn parse_float(input: &str) -> f64 {
    let s = input.trim_start();
    for (prefix, value) in [
        ("Infinity", f64::INFINITY),
        ("+Infinity", f64::INFINITY),
        ("-Infinity", f64::NEG_INFINITY),
    ] {
        if s.starts_with(prefix) {
            return value;
        }
    }

    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut has_digits = end > int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start || has_digits {
            has_digits |= frac_end > frac_start;
            end = frac_end;
        }
    }
    if !has_digits {
        return f64::NAN;
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s[..end].trim_end_matches('.').parse().unwrap_or(f64::NAN)
}

fn to_radix(n: f64, radix: u32) -> String {
    if radix == 10 || !n.is_finite() || n.fract() != 0.0 || n.abs() > 9_007_199_254_740_991.0 {
        return format_number(n);
    }
    let mut value = n.abs() as u64;
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        let digit = (value % u64::from(radix)) as u32;
        digits.push(char::from_digit(digit, radix).unwrap_or('?'));
        value /= u64::from(radix);
    }
    if n < 0.0 {
        digits.push('-');
    }
    digits.iter().rev().collect()
}

/// en-US grouping with at most three fraction digits.
fn to_locale_string(n: f64) -> String {
    if !n.is_finite() {
        return format_number(n);
    }
    let rounded = format!("{:.3}", n.abs());
    let (int_part, frac_part) = rounded.split_once('.').unwrap_or((&rounded, ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if n < 0.0 && (int_part != "0" || !frac_part.is_empty()) {
        "-"
    } else {
        ""
    };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}

fn encode_uri(input: &str, keep: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if c.is_ascii_alphanumeric() || keep.contains(c) {
            out.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                out.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    out
}

/// Decode `%XX` escapes. Escapes of characters in `reserved` stay encoded.
fn decode_uri(input: &str, reserved: &str) -> Result<String, SandboxError> {
    let malformed = || SandboxError::Runtime("URIError: URI malformed".to_string());
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let hex = bytes.get(i + 1..i + 3).ok_or_else(malformed)?;
        if !hex.iter().all(u8::is_ascii_hexdigit) {
            return Err(malformed());
        }
        let byte = (hex_value(hex[0]) << 4) | hex_value(hex[1]);
        if byte.is_ascii() && reserved.contains(char::from(byte)) {
            out.extend_from_slice(&bytes[i..i + 3]);
        } else {
            out.push(byte);
        }
        i += 3;
    }
    String::from_utf8(out).map_err(|_| malformed())
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        _ => digit - b'A' + 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EvaluatorConfig;
    use crate::expression::sandbox::parser::parse_expression;
    use serde_json::{json, Map};
    use std::time::{Duration, Instant};

    fn run(src: &str) -> Value {
        let limits = EvaluatorConfig::default();
        let ast = parse_expression(src, limits.max_depth).unwrap();
        let roots = Map::new();
        let mut interp = Interpreter::new(&roots, &limits, Instant::now() + Duration::from_secs(5));
        interp.run(&ast).unwrap().to_json().unwrap_or(Value::Null)
    }

    fn run_err(src: &str) -> SandboxError {
        let limits = EvaluatorConfig::default();
        let ast = parse_expression(src, limits.max_depth).unwrap();
        let roots = Map::new();
        let mut interp = Interpreter::new(&roots, &limits, Instant::now() + Duration::from_secs(5));
        interp.run(&ast).unwrap_err()
    }

    #[test]
    fn test_math() {
        assert_eq!(run("Math.max(1, 5, 3)"), json!(5));
        assert_eq!(run("Math.min()"), Value::Null);
        assert_eq!(run("Math.round(2.5)"), json!(3));
        assert_eq!(run("Math.round(-2.5)"), json!(-2));
        assert_eq!(run("Math.floor(Math.PI * 100) / 100"), json!(3.14));
        assert_eq!(run("typeof Math.random"), json!("undefined"));
    }

    #[test]
    fn test_json_namespace() {
        assert_eq!(run("JSON.stringify({b: 1, a: [true, null]})"), json!("{\"a\":[true,null],\"b\":1}"));
        assert_eq!(run("JSON.stringify({a: 1}, null, 2)"), json!("{\n  \"a\": 1\n}"));
        assert_eq!(run("JSON.parse('{\"x\": [1, 2]}').x[1]"), json!(2));
    }

    #[test]
    fn test_object_and_array_statics() {
        assert_eq!(run("Object.keys({b: 1, a: 2})"), json!(["a", "b"]));
        assert_eq!(run("Object.entries({a: 1})"), json!([["a", 1]]));
        assert_eq!(run("Object.assign({a: 1}, {b: 2}, {a: 3})"), json!({"a": 3, "b": 2}));
        assert_eq!(run("Object.fromEntries([['k', 'v']])"), json!({"k": "v"}));
        assert_eq!(run("Array.isArray([1])"), json!(true));
        assert_eq!(run("Array.from('abc')"), json!(["a", "b", "c"]));
        assert_eq!(run("Array.from({length: 3}, (_, i) => i * i)"), json!([0, 1, 4]));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(run("Number('42') + 1"), json!(43));
        assert_eq!(run("String(12) + 3"), json!("123"));
        assert_eq!(run("Boolean('')"), json!(false));
        assert_eq!(run("parseInt('42px')"), json!(42));
        assert_eq!(run("parseInt('ff', 16)"), json!(255));
        assert_eq!(run("parseInt('0x1A')"), json!(26));
        assert_eq!(run("parseFloat('3.5kg')"), json!(3.5));
        assert_eq!(run("isNaN(parseInt('abc'))"), json!(true));
        assert_eq!(run("Number.isInteger(5)"), json!(true));
    }

    #[test]
    fn test_uri_functions() {
        assert_eq!(run("encodeURIComponent('a b&c/é')"), json!("a%20b%26c%2F%C3%A9"));
        assert_eq!(run("encodeURI('https://x.io/a b?q=1')"), json!("https://x.io/a%20b?q=1"));
        assert_eq!(run("decodeURIComponent('a%20b%26c')"), json!("a b&c"));
        assert_eq!(run("decodeURI('a%20b%26c')"), json!("a b%26c"));
        assert_eq!(run("decodeURIComponent('%c3%a9%2f')"), json!("é/"));
    }

    #[test]
    fn test_malformed_escapes_raise_uri_error() {
        for src in [
            "decodeURIComponent('%+f')",
            "decodeURIComponent('%-1')",
            "decodeURIComponent('%zz')",
            "decodeURIComponent('abc%4')",
            "decodeURI('%C3')",
        ] {
            assert!(run_err(src).to_string().contains("URIError"), "{}", src);
        }
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(run("'Hello'.toUpperCase()"), json!("HELLO"));
        assert_eq!(run("'  x '.trim()"), json!("x"));
        assert_eq!(run("'a,b,c'.split(',')"), json!(["a", "b", "c"]));
        assert_eq!(run("'abcdef'.slice(-3)"), json!("def"));
        assert_eq!(run("'abcdef'.substring(4, 1)"), json!("bcd"));
        assert_eq!(run("'aXbXc'.replace('X', '-')"), json!("a-bXc"));
        assert_eq!(run("'aXbXc'.replaceAll('X', '-')"), json!("a-b-c"));
        assert_eq!(run("'7'.padStart(3, '0')"), json!("007"));
        assert_eq!(run("'héllo'.indexOf('l')"), json!(2));
        assert_eq!(run("'abc'.at(-1)"), json!("c"));
        assert_eq!(run("'abc'.includes('bc')"), json!(true));
    }

    #[test]
    fn test_array_methods() {
        assert_eq!(run("[1, 2, 3, 4].filter(n => n % 2 === 0)"), json!([2, 4]));
        assert_eq!(run("[1, 2, 3].reduce((a, b) => a + b, 0)"), json!(6));
        assert_eq!(run("[1, 2, 3].reduce((a, b) => a * b)"), json!(6));
        assert_eq!(run("[{id: 1}, {id: 2}].find(x => x.id === 2).id"), json!(2));
        assert_eq!(run("[1, 2].findIndex(x => x > 5)"), json!(-1));
        assert_eq!(run("[1, 2].some(x => x > 1)"), json!(true));
        assert_eq!(run("[1, 2].every(x => x > 1)"), json!(false));
        assert_eq!(run("[1, [2, [3]]].flat()"), json!([1, 2, [3]]));
        assert_eq!(run("[3, 1, 10].sort()"), json!([1, 10, 3]));
        assert_eq!(run("[3, 1, 10].sort((a, b) => a - b)"), json!([1, 3, 10]));
        assert_eq!(run("[1, null, 'x'].join('-')"), json!("1--x"));
        assert_eq!(run("[1, 2, 3].slice(1)"), json!([2, 3]));
        assert_eq!(run("[NaN].includes(NaN)"), json!(true));
        assert_eq!(run("[1, 2].concat([3], 4)"), json!([1, 2, 3, 4]));
    }

    #[test]
    fn test_number_methods() {
        assert_eq!(run("(3.14159).toFixed(2)"), json!("3.14"));
        assert_eq!(run("(255).toString(16)"), json!("ff"));
        assert_eq!(run("(1234567.891).toLocaleString()"), json!("1,234,567.891"));
        assert_eq!(run("(-0).toFixed(1)"), json!("0.0"));
    }

    #[test]
    fn test_console_is_inert() {
        assert_eq!(run("console.log('hi') === undefined"), json!(true));
    }
}
