//! Tree-walking interpreter.
//!
//! Every evaluation step ticks a counter; the wall-clock deadline is checked
//! every [`DEADLINE_CHECK_INTERVAL`] ticks. Nesting depth, closure call depth,
//! collection length and string length are capped by [`EvaluatorConfig`].
//! Everything built during one evaluation is also charged against
//! `max_total_elements`.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::builtins::{self, ARRAY_METHODS, BOOLEAN_METHODS, NUMBER_METHODS, STRING_METHODS};
use super::datetime::{self, DATETIME_METHODS, DATE_METHODS};
use super::parser::{BinaryOp, Expr, Literal, LogicalOp, Property, TemplatePiece, UnaryOp};
use super::value::{format_number, Closure, Env, Func, Val};
use super::SandboxError;
use crate::config::EvaluatorConfig;

const DEADLINE_CHECK_INTERVAL: u64 = 64;

/// Evaluation state for one expression.
pub struct Interpreter<'a> {
    roots: HashMap<String, Val>,
    limits: &'a EvaluatorConfig,
    deadline: Instant,
    ticks: u64,
    depth: usize,
    calls: usize,
    /// Elements and string bytes built so far
    allocated: usize,
    /// Fixed for the whole evaluation so `$now` is stable
    pub(super) now: DateTime<Utc>,
}

impl<'a> Interpreter<'a> {
    pub fn new(roots: &Map<String, Value>, limits: &'a EvaluatorConfig, deadline: Instant) -> Self {
        let mut converted: HashMap<String, Val> = roots
            .iter()
            .map(|(k, v)| (k.clone(), Val::from_json(v)))
            .collect();
        if let Some(json) = converted.get("$json").cloned() {
            converted.insert("json".to_string(), json);
        }
        Self {
            roots: converted,
            limits,
            deadline,
            ticks: 0,
            depth: 0,
            calls: 0,
            allocated: 0,
            now: Utc::now(),
        }
    }

    pub fn run(&mut self, expr: &Expr) -> Result<Val, SandboxError> {
        self.eval(expr, &Env::root())
    }

    fn tick(&mut self) -> Result<(), SandboxError> {
        self.ticks += 1;
        if self.ticks % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= self.deadline {
            return Err(SandboxError::Timeout(self.limits.timeout_ms));
        }
        Ok(())
    }

    pub(super) fn check_len(&mut self, len: usize) -> Result<(), SandboxError> {
        self.tick()?;
        if len > self.limits.max_collection_len {
            return Err(SandboxError::LimitExceeded(format!(
                "collection of {} elements exceeds {}",
                len, self.limits.max_collection_len
            )));
        }
        Ok(())
    }

    /// Charge `units` against the evaluation-wide allocation budget.
    pub(super) fn charge(&mut self, units: usize) -> Result<(), SandboxError> {
        self.allocated = self.allocated.saturating_add(units);
        if self.allocated > self.limits.max_total_elements {
            return Err(SandboxError::LimitExceeded(format!(
                "evaluation allocated more than {} elements",
                self.limits.max_total_elements
            )));
        }
        Ok(())
    }

    /// Per-collection cap plus the evaluation-wide budget, before allocating.
    pub(super) fn reserve_len(&mut self, len: usize) -> Result<(), SandboxError> {
        self.check_len(len)?;
        self.charge(len)
    }

    /// Per-string cap plus the evaluation-wide budget, before allocating.
    pub(super) fn reserve_string(&mut self, bytes: usize) -> Result<(), SandboxError> {
        self.check_string_size(bytes)?;
        self.charge(bytes)
    }

    pub(super) fn check_string(&self, s: &str) -> Result<(), SandboxError> {
        self.check_string_size(s.len())
    }

    /// Check a string size before building it.
    pub(super) fn check_string_size(&self, bytes: usize) -> Result<(), SandboxError> {
        if bytes > self.limits.max_string_len {
            return Err(SandboxError::LimitExceeded(format!(
                "string of {} bytes exceeds {}",
                bytes, self.limits.max_string_len
            )));
        }
        Ok(())
    }

    /// A context root such as `$node`, or undefined.
    pub(super) fn root(&self, name: &str) -> Val {
        self.roots.get(name).cloned().unwrap_or(Val::Undefined)
    }

    /// Build a string value after checking its size.
    pub(super) fn string(&mut self, s: String) -> Result<Val, SandboxError> {
        self.reserve_string(s.len())?;
        Ok(Val::str(s))
    }

    /// Build an array value after checking its length.
    pub(super) fn array(&mut self, items: Vec<Val>) -> Result<Val, SandboxError> {
        self.reserve_len(items.len())?;
        Ok(Val::array(items))
    }

    fn eval(&mut self, expr: &Expr, env: &Rc<Env>) -> Result<Val, SandboxError> {
        self.tick()?;
        self.depth += 1;
        let result = if self.depth > self.limits.max_depth * 4 {
            Err(SandboxError::LimitExceeded(format!(
                "evaluation nested deeper than {}",
                self.limits.max_depth * 4
            )))
        } else {
            self.eval_inner(expr, env)
        };
        self.depth -= 1;
        result
    }

    fn eval_inner(&mut self, expr: &Expr, env: &Rc<Env>) -> Result<Val, SandboxError> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Number(n) => Val::Num(*n),
                Literal::Str(s) => Val::str(s),
                Literal::Bool(b) => Val::Bool(*b),
                Literal::Null => Val::Null,
                Literal::Undefined => Val::Undefined,
            }),
            Expr::Template(pieces) => {
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        TemplatePiece::Text(text) => out.push_str(text),
                        TemplatePiece::Expr(inner) => {
                            out.push_str(&self.eval(inner, env)?.to_display_string())
                        }
                    }
                    self.check_string(&out)?;
                }
                self.string(out)
            }
            Expr::Ident(name) => self.lookup(name, env),
            Expr::Array(items) => {
                self.reserve_len(items.len())?;
                let values = items
                    .iter()
                    .map(|item| self.eval(item, env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Val::array(values))
            }
            Expr::Object(entries) => {
                self.reserve_len(entries.len())?;
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.eval(value, env)?;
                    map.insert(key.clone(), value);
                }
                Ok(Val::object(map))
            }
            Expr::Member { .. } | Expr::Call { .. } => {
                Ok(self.eval_chain(expr, env)?.unwrap_or(Val::Undefined))
            }
            Expr::New { callee, args } => {
                let callee = self.eval(callee, env)?;
                let args = self.eval_args(args, env)?;
                match callee {
                    Val::Namespace("Date") => datetime::construct_date(self.now, &args),
                    other => Err(type_error(format!(
                        "{} is not a constructor",
                        other.to_display_string()
                    ))),
                }
            }
            Expr::Unary { op, operand } => {
                if *op == UnaryOp::TypeOf {
                    // typeof tolerates undeclared names
                    if let Expr::Ident(name) = operand.as_ref() {
                        return Ok(match self.lookup(name, env) {
                            Ok(value) => Val::str(value.type_of()),
                            Err(_) => Val::str("undefined"),
                        });
                    }
                }
                let value = self.eval(operand, env)?;
                Ok(match op {
                    UnaryOp::Not => Val::Bool(!value.truthy()),
                    UnaryOp::Neg => Val::Num(-value.to_number()),
                    UnaryOp::Plus => Val::Num(value.to_number()),
                    UnaryOp::TypeOf => Val::str(value.type_of()),
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, env)?;
                let right = self.eval(right, env)?;
                self.binary(*op, left, right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, env)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.truthy(),
                    LogicalOp::Or => left.truthy(),
                    LogicalOp::Nullish => !left.is_nullish(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval(right, env)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, env)?.truthy() {
                    self.eval(consequent, env)
                } else {
                    self.eval(alternate, env)
                }
            }
            Expr::Arrow(func) => Ok(Val::Func(Func::Arrow(Rc::new(Closure {
                func: func.clone(),
                env: env.clone(),
            })))),
        }
    }

    /// Evaluate a member/call chain. `None` means an optional link hit a
    /// nullish value and the rest of the chain was skipped.
    fn eval_chain(&mut self, expr: &Expr, env: &Rc<Env>) -> Result<Option<Val>, SandboxError> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(base) = self.eval_link(object, env)? else {
                    return Ok(None);
                };
                if *optional && base.is_nullish() {
                    return Ok(None);
                }
                let key = match property {
                    Property::Named(name) => Val::str(name),
                    Property::Computed(index) => self.eval(index, env)?,
                };
                self.get_member(&base, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let Some(func) = self.eval_link(callee, env)? else {
                    return Ok(None);
                };
                if *optional && func.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_args(args, env)?;
                self.call_value(&func, args).map(Some)
            }
            other => self.eval(other, env).map(Some),
        }
    }

    fn eval_link(&mut self, expr: &Expr, env: &Rc<Env>) -> Result<Option<Val>, SandboxError> {
        match expr {
            Expr::Member { .. } | Expr::Call { .. } => {
                self.tick()?;
                self.depth += 1;
                let result = if self.depth > self.limits.max_depth * 4 {
                    Err(SandboxError::LimitExceeded("member chain too long".to_string()))
                } else {
                    self.eval_chain(expr, env)
                };
                self.depth -= 1;
                result
            }
            _ => self.eval(expr, env).map(Some),
        }
    }

    fn eval_args(&mut self, args: &[Expr], env: &Rc<Env>) -> Result<Vec<Val>, SandboxError> {
        args.iter().map(|arg| self.eval(arg, env)).collect()
    }

    fn lookup(&self, name: &str, env: &Env) -> Result<Val, SandboxError> {
        if let Some(value) = env.lookup(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.roots.get(name) {
            return Ok(value.clone());
        }
        match name {
            "$now" => return Ok(Val::DateTime(self.now.fixed_offset())),
            "$today" => return Ok(Val::DateTime(datetime::start_of_day(self.now.fixed_offset()))),
            "NaN" => return Ok(Val::Num(f64::NAN)),
            "Infinity" => return Ok(Val::Num(f64::INFINITY)),
            _ => {}
        }
        builtins::global(name)
            .ok_or_else(|| SandboxError::Runtime(format!("ReferenceError: {} is not defined", name)))
    }

    pub(super) fn get_member(&self, object: &Val, key: &Val) -> Result<Val, SandboxError> {
        let name = match key {
            Val::Num(n) => format_number(*n),
            other => other.to_display_string(),
        };
        Ok(match object {
            Val::Undefined | Val::Null => {
                return Err(type_error(format!(
                    "Cannot read properties of {} (reading '{}')",
                    object.to_display_string(),
                    name
                )))
            }
            Val::Object(map) => map.get(name.as_str()).cloned().unwrap_or(Val::Undefined),
            Val::Array(items) => {
                if let Some(index) = array_index(&name) {
                    items.get(index).cloned().unwrap_or(Val::Undefined)
                } else if name == "length" {
                    Val::Num(items.len() as f64)
                } else {
                    bind(object, ARRAY_METHODS, &name)
                }
            }
            Val::Str(s) => {
                if let Some(index) = array_index(&name) {
                    s.chars()
                        .nth(index)
                        .map(|c| Val::str(c.to_string()))
                        .unwrap_or(Val::Undefined)
                } else if name == "length" {
                    Val::Num(s.chars().count() as f64)
                } else {
                    bind(object, STRING_METHODS, &name)
                }
            }
            Val::Num(_) => bind(object, NUMBER_METHODS, &name),
            Val::Bool(_) => bind(object, BOOLEAN_METHODS, &name),
            Val::Date(_) => bind(object, DATE_METHODS, &name),
            Val::DateTime(dt) => match datetime::datetime_property(dt, &name) {
                Some(value) => value,
                None => bind(object, DATETIME_METHODS, &name),
            },
            Val::Namespace(ns) => builtins::namespace_member(ns, &name),
            Val::Func(_) => Val::Undefined,
        })
    }

    /// Call any callable value.
    pub(super) fn call_value(&mut self, callee: &Val, args: Vec<Val>) -> Result<Val, SandboxError> {
        self.tick()?;
        match callee {
            Val::Func(Func::Native(name)) => self.call_native(*name, args),
            Val::Func(Func::Bound { receiver, method }) => self.call_method(receiver, *method, args),
            Val::Func(Func::Arrow(closure)) => self.call_closure(closure, args),
            Val::Namespace(ns) if callee.type_of() == "function" => self.call_native(*ns, args),
            other => Err(type_error(format!(
                "{} is not a function",
                other.to_display_string()
            ))),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Val>) -> Result<Val, SandboxError> {
        if self.calls >= self.limits.max_depth {
            return Err(SandboxError::LimitExceeded(format!(
                "function calls nested deeper than {}",
                self.limits.max_depth
            )));
        }
        let mut args = args.into_iter();
        let vars = closure
            .func
            .params
            .iter()
            .map(|param| (param.clone(), args.next().unwrap_or(Val::Undefined)))
            .collect();
        let env = Env::child(&closure.env, vars);

        self.calls += 1;
        let result = self.eval(&closure.func.body, &env);
        self.calls -= 1;
        result
    }

    fn call_method(
        &mut self,
        receiver: &Val,
        method: &'static str,
        args: Vec<Val>,
    ) -> Result<Val, SandboxError> {
        match receiver {
            Val::Str(s) => self.string_method(s, method, &args),
            Val::Array(items) => self.array_method(items, method, &args),
            Val::Num(n) => self.number_method(*n, method, &args),
            Val::Bool(b) => Ok(match method {
                "valueOf" => Val::Bool(*b),
                _ => Val::str(b.to_string()),
            }),
            Val::Date(dt) => datetime::date_method(dt, method),
            Val::DateTime(dt) => datetime::datetime_method(dt, method, &args),
            other => Err(type_error(format!(
                "{}.{} is not a function",
                other.type_of(),
                method
            ))),
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Val, right: Val) -> Result<Val, SandboxError> {
        Ok(match op {
            BinaryOp::Add => {
                let (left, right) = (to_primitive(left), to_primitive(right));
                if matches!(left, Val::Str(_)) || matches!(right, Val::Str(_)) {
                    let joined = format!("{}{}", left.to_display_string(), right.to_display_string());
                    return self.string(joined);
                }
                Val::Num(left.to_number() + right.to_number())
            }
            BinaryOp::Sub => Val::Num(left.to_number() - right.to_number()),
            BinaryOp::Mul => Val::Num(left.to_number() * right.to_number()),
            BinaryOp::Div => Val::Num(left.to_number() / right.to_number()),
            BinaryOp::Rem => Val::Num(left.to_number() % right.to_number()),
            BinaryOp::Pow => Val::Num(left.to_number().powf(right.to_number())),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                Val::Bool(compare(op, to_primitive(left), to_primitive(right)))
            }
            BinaryOp::Eq => Val::Bool(left.loose_eq(&right)),
            BinaryOp::NotEq => Val::Bool(!left.loose_eq(&right)),
            BinaryOp::StrictEq => Val::Bool(left.strict_eq(&right)),
            BinaryOp::StrictNotEq => Val::Bool(!left.strict_eq(&right)),
        })
    }
}

pub(super) fn type_error(message: String) -> SandboxError {
    SandboxError::Runtime(format!("TypeError: {}", message))
}

/// Canonical array index, so `"01"` and `"1.0"` are plain keys.
fn array_index(name: &str) -> Option<usize> {
    name.parse::<usize>()
        .ok()
        .filter(|index| index.to_string() == name)
}

fn bind(receiver: &Val, methods: &'static [&'static str], name: &str) -> Val {
    methods
        .iter()
        .copied()
        .find(|method| *method == name)
        .map(|method| {
            Val::Func(Func::Bound {
                receiver: Box::new(receiver.clone()),
                method,
            })
        })
        .unwrap_or(Val::Undefined)
}

fn to_primitive(value: Val) -> Val {
    match value {
        Val::DateTime(dt) => Val::Num(dt.timestamp_millis() as f64),
        Val::Array(_) | Val::Object(_) | Val::Date(_) | Val::Namespace(_) | Val::Func(_) => {
            Val::str(value.to_display_string())
        }
        other => other,
    }
}

fn compare(op: BinaryOp, left: Val, right: Val) -> bool {
    use std::cmp::Ordering;

    let ordering = match (&left, &right) {
        (Val::Str(a), Val::Str(b)) => Some(a.cmp(b)),
        _ => left.to_number().partial_cmp(&right.to_number()),
    };
    match (op, ordering) {
        (_, None) => false,
        (BinaryOp::Lt, Some(o)) => o == Ordering::Less,
        (BinaryOp::Le, Some(o)) => o != Ordering::Greater,
        (BinaryOp::Gt, Some(o)) => o == Ordering::Greater,
        (BinaryOp::Ge, Some(o)) => o != Ordering::Less,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::sandbox::parser::parse_expression;
    use serde_json::json;
    use std::time::Duration;

    fn run_with(src: &str, roots: Value) -> Result<Val, SandboxError> {
        let limits = EvaluatorConfig::default();
        let roots = roots.as_object().cloned().unwrap_or_default();
        let ast = parse_expression(src, limits.max_depth)?;
        let mut interp = Interpreter::new(&roots, &limits, Instant::now() + Duration::from_secs(5));
        interp.run(&ast)
    }

    fn run(src: &str) -> Value {
        run_with(src, json!({"$json": {"a": {"b": [10, 20]}, "name": "Ada"}}))
            .unwrap()
            .to_json()
            .unwrap_or(Value::Null)
    }

    #[test]
    fn test_member_access_and_json_alias() {
        assert_eq!(run("$json.a.b[1]"), json!(20));
        assert_eq!(run("json.name"), json!("Ada"));
        assert_eq!(run("$json.a.b.length"), json!(2));
        assert_eq!(run("$json['name'].length"), json!(3));
    }

    #[test]
    fn test_optional_chaining_short_circuits() {
        assert_eq!(run("$json.missing?.deep.deeper ?? 'none'"), json!("none"));
        assert_eq!(run("$json.missing?.()"), Value::Null);
        assert!(run_with("$json.missing.deep", json!({"$json": {}})).is_err());
    }

    #[test]
    fn test_operators() {
        assert_eq!(run("'a' + 1 + 2"), json!("a12"));
        assert_eq!(run("1 + 2 + 'a'"), json!("3a"));
        assert_eq!(run("7 % 3 + 2 ** 3"), json!(9));
        assert_eq!(run("'10' == 10"), json!(true));
        assert_eq!(run("'10' === 10"), json!(false));
        assert_eq!(run("'b' > 'a'"), json!(true));
        assert_eq!(run("null || 'fallback'"), json!("fallback"));
        assert_eq!(run("0 ?? 'unused'"), json!(0));
        assert_eq!(run("!'' && typeof 1"), json!("number"));
        assert_eq!(run("typeof notDefined"), json!("undefined"));
    }

    #[test]
    fn test_arrow_closures_capture_scope() {
        assert_eq!(run("((x) => (y) => x + y)(2)(3)"), json!(5));
        assert_eq!(run("[1, 2, 3].map(n => n * $json.a.b[0])"), json!([10, 20, 30]));
    }

    #[test]
    fn test_reference_error_for_unknown_globals() {
        let err = run_with("fetch('x')", json!({})).unwrap_err();
        assert!(err.to_string().contains("ReferenceError: fetch is not defined"));
    }

    #[test]
    fn test_collection_limit() {
        let limits = EvaluatorConfig {
            max_collection_len: 10,
            ..EvaluatorConfig::default()
        };
        let ast = parse_expression("Array.from({length: 100}, (_, i) => i)", 64).unwrap();
        let mut interp = Interpreter::new(&Map::new(), &limits, Instant::now() + Duration::from_secs(5));
        assert!(matches!(interp.run(&ast), Err(SandboxError::LimitExceeded(_))));
    }

    #[test]
    fn test_string_limit() {
        let limits = EvaluatorConfig {
            max_string_len: 64,
            ..EvaluatorConfig::default()
        };
        let ast = parse_expression("'ab'.repeat(100)", 64).unwrap();
        let mut interp = Interpreter::new(&Map::new(), &limits, Instant::now() + Duration::from_secs(5));
        assert!(matches!(interp.run(&ast), Err(SandboxError::LimitExceeded(_))));
    }

    #[test]
    fn test_allocation_budget_spans_whole_evaluation() {
        let limits = EvaluatorConfig {
            max_total_elements: 10_000,
            ..EvaluatorConfig::default()
        };
        // Each inner array is under the per-collection cap; together they are not
        let ast = parse_expression("Array.from({length: 100}, () => Array(1000)).length", 64).unwrap();
        let mut interp = Interpreter::new(&Map::new(), &limits, Instant::now() + Duration::from_secs(5));
        let err = interp.run(&ast).unwrap_err();
        assert!(matches!(err, SandboxError::LimitExceeded(ref msg) if msg.contains("10000")));

        let ast = parse_expression("Array.from({length: 5}, () => Array(1000)).length", 64).unwrap();
        let mut interp = Interpreter::new(&Map::new(), &limits, Instant::now() + Duration::from_secs(5));
        assert_eq!(interp.run(&ast).unwrap().to_json(), Some(json!(5)));
    }

    #[test]
    fn test_repeated_strings_share_the_budget() {
        let limits = EvaluatorConfig {
            max_total_elements: 1_000,
            ..EvaluatorConfig::default()
        };
        let ast = parse_expression("[1, 2, 3, 4, 5].map(() => 'x'.repeat(300)).length", 64).unwrap();
        let mut interp = Interpreter::new(&Map::new(), &limits, Instant::now() + Duration::from_secs(5));
        assert!(matches!(interp.run(&ast), Err(SandboxError::LimitExceeded(_))));
    }

    #[test]
    fn test_expired_deadline_times_out() {
        let limits = EvaluatorConfig::default();
        let ast = parse_expression("Array.from({length: 1000}, (_, i) => i * 2).length", 64).unwrap();
        let mut interp = Interpreter::new(&Map::new(), &limits, Instant::now());
        assert!(matches!(interp.run(&ast), Err(SandboxError::Timeout(_))));
    }
}
