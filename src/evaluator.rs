use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use regex::RegexBuilder;
use rust_decimal::{Decimal, prelude::FromPrimitive, prelude::ToPrimitive};

use crate::{
    ast::{BinOp, Expr, FuncDef},
    value::{Map, Value},
};

/// Upper bound on nested definition calls.
///
/// Type-reference chains in real schemas nest up to seven wrappers; the
/// guard keeps a malformed document (or a deliberately cyclic definition)
/// from recursing without bound.
pub const MAX_CALL_DEPTH: usize = 64;

/// Errors that can occur while running a compiled filter.
#[derive(Debug, Clone)]
pub enum EvalError {
    /// Type mismatch or invalid operation for the given type
    TypeError(String),

    /// Reference to a variable that is neither bound by the caller nor
    /// by an `as` binding
    UndefinedVariable(String),

    /// Call to a name that is neither a builtin nor a definition
    UndefinedFunction(String),

    /// Pattern argument to `test` that is not a valid regular expression
    InvalidRegex(String),

    /// Definition recursion exceeded [`MAX_CALL_DEPTH`]
    DepthLimit,

    /// Execution was cancelled through the run options
    Cancelled,
}

impl std::fmt::Display for EvalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvalError::TypeError(msg) => write!(f, "type error: {}", msg),
            EvalError::UndefinedVariable(name) => {
                write!(f, "undefined variable: ${} is not bound", name)
            }
            EvalError::UndefinedFunction(name) => {
                write!(f, "undefined function: {} is not defined", name)
            }
            EvalError::InvalidRegex(msg) => write!(f, "invalid regex: {}", msg),
            EvalError::DepthLimit => {
                write!(f, "definition recursion exceeded {} calls", MAX_CALL_DEPTH)
            }
            EvalError::Cancelled => write!(f, "evaluation cancelled"),
        }
    }
}

impl std::error::Error for EvalError {}

/// The filter evaluator.
///
/// Walks a parsed expression against one input value and produces the
/// full output sequence. Expressions never mutate the input; every output
/// is an independently owned [`Value`].
pub struct Evaluator<'a> {
    /// Named definitions from the filter's `def` prelude
    funcs: HashMap<&'a str, &'a Expr>,

    /// Caller-supplied variable bindings, keyed by name
    vars: &'a BTreeMap<String, Value>,

    /// `as`-bound locals, innermost last
    locals: Vec<(String, Value)>,

    /// Current definition call depth
    depth: usize,

    /// Cooperative cancellation flag, checked on every evaluation step
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Evaluator<'a> {
    pub fn new(defs: &'a [FuncDef], vars: &'a BTreeMap<String, Value>) -> Self {
        let mut funcs = HashMap::new();
        for def in defs {
            // Later definitions shadow earlier ones of the same name
            funcs.insert(def.name.as_str(), &def.body);
        }
        Evaluator {
            funcs,
            vars,
            locals: Vec::new(),
            depth: 0,
            cancel: None,
        }
    }

    /// Attach a cancellation flag; when it becomes true the current
    /// evaluation aborts with [`EvalError::Cancelled`].
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Evaluates an expression against an input value, producing the
    /// output sequence in production order.
    pub fn eval(&mut self, expr: &'a Expr, input: &Value) -> Result<Vec<Value>, EvalError> {
        if let Some(flag) = self.cancel
            && flag.load(Ordering::Relaxed)
        {
            return Err(EvalError::Cancelled);
        }

        match expr {
            Expr::Identity => Ok(vec![input.clone()]),
            Expr::Integer(n) => Ok(vec![Value::Integer(*n)]),
            Expr::Float(n) => Ok(vec![Value::Float(*n)]),
            Expr::String(s) => Ok(vec![Value::String(s.clone())]),
            Expr::Boolean(b) => Ok(vec![Value::Boolean(*b)]),
            Expr::Null => Ok(vec![Value::Null]),

            Expr::Variable(name) => {
                // Innermost `as` binding wins over caller-supplied values
                for (local, value) in self.locals.iter().rev() {
                    if local == name {
                        return Ok(vec![value.clone()]);
                    }
                }
                self.vars
                    .get(name)
                    .map(|v| vec![v.clone()])
                    .ok_or_else(|| EvalError::UndefinedVariable(name.clone()))
            }

            Expr::Field { target, name } => {
                let mut out = Vec::new();
                for value in self.eval(target, input)? {
                    out.push(field_value(&value, name)?);
                }
                Ok(out)
            }

            Expr::Index { target, index } => {
                let targets = self.eval(target, input)?;
                let indices = self.eval(index, input)?;
                let mut out = Vec::new();
                for t in &targets {
                    for i in &indices {
                        out.push(index_value(t, i)?);
                    }
                }
                Ok(out)
            }

            Expr::Slice { target, start, end } => {
                let starts = self.eval_slice_bound(start.as_deref(), input)?;
                let ends = self.eval_slice_bound(end.as_deref(), input)?;
                let mut out = Vec::new();
                for value in self.eval(target, input)? {
                    for s in &starts {
                        for e in &ends {
                            out.push(slice_value(&value, *s, *e)?);
                        }
                    }
                }
                Ok(out)
            }

            Expr::Iterate(target) => {
                let mut out = Vec::new();
                for value in self.eval(target, input)? {
                    match value {
                        Value::Array(items) => out.extend(items),
                        Value::Object(map) => out.extend(map.into_values()),
                        other => {
                            return Err(EvalError::TypeError(format!(
                                "cannot iterate over {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                Ok(out)
            }

            Expr::Try(inner) => match self.eval(inner, input) {
                Ok(values) => Ok(values),
                Err(EvalError::Cancelled) => Err(EvalError::Cancelled),
                Err(_) => Ok(vec![]),
            },

            Expr::Pipe(left, right) => {
                let mut out = Vec::new();
                for value in self.eval(left, input)? {
                    out.extend(self.eval(right, &value)?);
                }
                Ok(out)
            }

            Expr::Comma(left, right) => {
                let mut out = self.eval(left, input)?;
                out.extend(self.eval(right, input)?);
                Ok(out)
            }

            Expr::BinaryOp { op, left, right } => match op {
                BinOp::And => {
                    let mut out = Vec::new();
                    for l in self.eval(left, input)? {
                        if !l.is_truthy() {
                            out.push(Value::Boolean(false));
                        } else {
                            for r in self.eval(right, input)? {
                                out.push(Value::Boolean(r.is_truthy()));
                            }
                        }
                    }
                    Ok(out)
                }
                BinOp::Or => {
                    let mut out = Vec::new();
                    for l in self.eval(left, input)? {
                        if l.is_truthy() {
                            out.push(Value::Boolean(true));
                        } else {
                            for r in self.eval(right, input)? {
                                out.push(Value::Boolean(r.is_truthy()));
                            }
                        }
                    }
                    Ok(out)
                }
                BinOp::Alternative => match self.eval(left, input) {
                    Err(EvalError::Cancelled) => Err(EvalError::Cancelled),
                    Err(_) => self.eval(right, input),
                    Ok(values) => {
                        let truthy: Vec<Value> =
                            values.into_iter().filter(Value::is_truthy).collect();
                        if truthy.is_empty() {
                            self.eval(right, input)
                        } else {
                            Ok(truthy)
                        }
                    }
                },
                _ => {
                    let lefts = self.eval(left, input)?;
                    let rights = self.eval(right, input)?;
                    let mut out = Vec::new();
                    for l in &lefts {
                        for r in &rights {
                            out.push(apply_binop(*op, l, r)?);
                        }
                    }
                    Ok(out)
                }
            },

            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut out = Vec::new();
                for c in self.eval(cond, input)? {
                    if c.is_truthy() {
                        out.extend(self.eval(then_branch, input)?);
                    } else {
                        match else_branch {
                            Some(e) => out.extend(self.eval(e, input)?),
                            // An omitted else passes the input through
                            None => out.push(input.clone()),
                        }
                    }
                }
                Ok(out)
            }

            Expr::Object(entries) => {
                // Cartesian product over the entry value streams
                let mut partials: Vec<Map> = vec![Map::new()];
                for (key, value_expr) in entries {
                    let values = match value_expr {
                        Some(expr) => self.eval(expr, input)?,
                        None => vec![field_value(input, key)?],
                    };
                    let mut next = Vec::with_capacity(partials.len() * values.len());
                    for partial in &partials {
                        for value in &values {
                            let mut map = partial.clone();
                            map.insert(key.clone(), value.clone());
                            next.push(map);
                        }
                    }
                    partials = next;
                }
                Ok(partials.into_iter().map(Value::Object).collect())
            }

            Expr::Array(inner) => match inner {
                None => Ok(vec![Value::Array(vec![])]),
                Some(expr) => Ok(vec![Value::Array(self.eval(expr, input)?)]),
            },

            Expr::Call { name, args } => self.eval_call(name, args, input),

            Expr::Bind { source, var, body } => {
                let mut out = Vec::new();
                for value in self.eval(source, input)? {
                    self.locals.push((var.clone(), value));
                    let result = self.eval(body, input);
                    self.locals.pop();
                    out.extend(result?);
                }
                Ok(out)
            }
        }
    }

    fn eval_slice_bound(
        &mut self,
        bound: Option<&'a Expr>,
        input: &Value,
    ) -> Result<Vec<Option<i64>>, EvalError> {
        match bound {
            None => Ok(vec![None]),
            Some(expr) => {
                let mut out = Vec::new();
                for value in self.eval(expr, input)? {
                    match value {
                        Value::Integer(n) => out.push(Some(n)),
                        Value::Null => out.push(None),
                        other => {
                            return Err(EvalError::TypeError(format!(
                                "slice bound must be a number, got {}",
                                other.type_name()
                            )));
                        }
                    }
                }
                Ok(out)
            }
        }
    }

    /// Dispatch calls: user definitions shadow builtins.
    fn eval_call(
        &mut self,
        name: &str,
        args: &'a [Expr],
        input: &Value,
    ) -> Result<Vec<Value>, EvalError> {
        if args.is_empty()
            && let Some(body) = self.funcs.get(name).copied()
        {
            if self.depth >= MAX_CALL_DEPTH {
                return Err(EvalError::DepthLimit);
            }
            self.depth += 1;
            let result = self.eval(body, input);
            self.depth -= 1;
            return result;
        }

        match (name, args.len()) {
            ("select", 1) => self.builtin_select(&args[0], input),
            ("test", 1 | 2) => self.builtin_test(args, input),
            ("length", 0) => builtin_length(input).map(|v| vec![v]),
            ("join", 1) => self.builtin_join(&args[0], input),
            ("type", 0) => Ok(vec![Value::String(input.type_name().to_string())]),
            ("not", 0) => Ok(vec![Value::Boolean(!input.is_truthy())]),
            ("empty", 0) => Ok(vec![]),
            _ => Err(EvalError::UndefinedFunction(name.to_string())),
        }
    }

    /// select(f) - emits the input once per truthy output of f
    fn builtin_select(&mut self, cond: &'a Expr, input: &Value) -> Result<Vec<Value>, EvalError> {
        let mut out = Vec::new();
        for c in self.eval(cond, input)? {
            if c.is_truthy() {
                out.push(input.clone());
            }
        }
        Ok(out)
    }

    /// test(re), test(re; flags) - regex match against a string input;
    /// the only supported flag is "i" (case-insensitive)
    fn builtin_test(&mut self, args: &'a [Expr], input: &Value) -> Result<Vec<Value>, EvalError> {
        let subject = match input {
            Value::String(s) => s.clone(),
            other => {
                return Err(EvalError::TypeError(format!(
                    "test requires a string input, got {}",
                    other.type_name()
                )));
            }
        };

        let mut flag_sets = vec![String::new()];
        if let Some(flags_expr) = args.get(1) {
            flag_sets.clear();
            for value in self.eval(flags_expr, input)? {
                match value {
                    Value::String(f) => flag_sets.push(f),
                    other => {
                        return Err(EvalError::TypeError(format!(
                            "test flags must be a string, got {}",
                            other.type_name()
                        )));
                    }
                }
            }
        }

        let mut out = Vec::new();
        for pattern in self.eval(&args[0], input)? {
            let pattern = match pattern {
                Value::String(p) => p,
                other => {
                    return Err(EvalError::TypeError(format!(
                        "test pattern must be a string, got {}",
                        other.type_name()
                    )));
                }
            };
            for flags in &flag_sets {
                let re = RegexBuilder::new(&pattern)
                    .case_insensitive(flags.contains('i'))
                    .build()
                    .map_err(|e| EvalError::InvalidRegex(e.to_string()))?;
                out.push(Value::Boolean(re.is_match(&subject)));
            }
        }
        Ok(out)
    }

    /// join(sep) - concatenates array elements into one string; nulls
    /// render empty, scalars render through their JSON form
    fn builtin_join(&mut self, sep: &'a Expr, input: &Value) -> Result<Vec<Value>, EvalError> {
        let items = match input {
            Value::Array(items) => items,
            other => {
                return Err(EvalError::TypeError(format!(
                    "join requires an array input, got {}",
                    other.type_name()
                )));
            }
        };

        let mut pieces = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(s) => pieces.push(s.clone()),
                Value::Null => pieces.push(String::new()),
                Value::Integer(n) => pieces.push(n.to_string()),
                Value::Float(n) => pieces.push(n.to_string()),
                Value::Boolean(b) => pieces.push(b.to_string()),
                other => {
                    return Err(EvalError::TypeError(format!(
                        "cannot join {} elements",
                        other.type_name()
                    )));
                }
            }
        }

        let mut out = Vec::new();
        for value in self.eval(sep, input)? {
            match value {
                Value::String(s) => out.push(Value::String(pieces.join(&s))),
                other => {
                    return Err(EvalError::TypeError(format!(
                        "join separator must be a string, got {}",
                        other.type_name()
                    )));
                }
            }
        }
        Ok(out)
    }
}

/// Field projection: objects yield the member (or null when missing),
/// null projects to null, anything else is a fault.
fn field_value(value: &Value, name: &str) -> Result<Value, EvalError> {
    match value {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(EvalError::TypeError(format!(
            "cannot access field '{}' on {}",
            name,
            other.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, EvalError> {
    match (target, index) {
        (Value::Array(arr), Value::Integer(n)) => {
            let idx = if *n < 0 {
                let abs = n.unsigned_abs() as usize;
                if abs > arr.len() {
                    return Ok(Value::Null);
                }
                arr.len() - abs
            } else {
                *n as usize
            };
            Ok(arr.get(idx).cloned().unwrap_or(Value::Null))
        }
        (Value::Object(map), Value::String(k)) => {
            Ok(map.get(k).cloned().unwrap_or(Value::Null))
        }
        (Value::Null, Value::Integer(_) | Value::String(_)) => Ok(Value::Null),
        (t, i) => Err(EvalError::TypeError(format!(
            "cannot index {} with {}",
            t.type_name(),
            i.type_name()
        ))),
    }
}

fn slice_value(target: &Value, start: Option<i64>, end: Option<i64>) -> Result<Value, EvalError> {
    match target {
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = slice_bounds(chars.len(), start, end);
            Ok(Value::String(chars[from..to].iter().collect()))
        }
        Value::Array(arr) => {
            let (from, to) = slice_bounds(arr.len(), start, end);
            Ok(Value::Array(arr[from..to].to_vec()))
        }
        Value::Null => Ok(Value::Null),
        other => Err(EvalError::TypeError(format!(
            "cannot slice {}",
            other.type_name()
        ))),
    }
}

/// Clamp slice bounds to `0..=len`; negatives count from the end.
fn slice_bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let clamp = |i: i64| -> usize {
        if i < 0 {
            len.saturating_sub(i.unsigned_abs() as usize)
        } else {
            (i as usize).min(len)
        }
    };
    let from = start.map(clamp).unwrap_or(0);
    let to = end.map(clamp).unwrap_or(len);
    (from, to.max(from))
}

/// length - element count for collections, character count for strings,
/// zero for null, absolute value for numbers
fn builtin_length(input: &Value) -> Result<Value, EvalError> {
    match input {
        Value::Null => Ok(Value::Integer(0)),
        Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
        Value::Array(arr) => Ok(Value::Integer(arr.len() as i64)),
        Value::Object(map) => Ok(Value::Integer(map.len() as i64)),
        Value::Integer(n) => Ok(Value::Integer(n.abs())),
        Value::Float(n) => Ok(Value::Float(n.abs())),
        Value::Boolean(_) => Err(EvalError::TypeError(
            "boolean has no length".to_string(),
        )),
    }
}

/// Numbers compare numerically across the integer/float split.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
            (*x as f64) == *y
        }
        _ => a == b,
    }
}

/// Mixed integer/float arithmetic through Decimal so whole results stay
/// integers; falls back to plain float math when a value does not fit.
fn mixed_num(
    a: Option<Decimal>,
    b: Option<Decimal>,
    fallback: f64,
    f: impl Fn(Decimal, Decimal) -> Decimal,
) -> Value {
    if let Some(a) = a
        && let Some(b) = b
    {
        let r = f(a, b);
        if r.is_integer()
            && let Some(n) = r.to_i64()
        {
            return Value::Integer(n);
        }
        if let Some(n) = r.to_f64() {
            return Value::Float(n);
        }
    }
    Value::Float(fallback)
}

fn apply_binop(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Add => match (left, right) {
            (Value::Null, v) | (v, Value::Null) => Ok(v.clone()),
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a + b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Integer(a), Value::Float(b)) => Ok(mixed_num(
                Decimal::from_i64(*a),
                Decimal::from_f64(*b),
                *a as f64 + b,
                |x, y| x + y,
            )),
            (Value::Float(a), Value::Integer(b)) => Ok(mixed_num(
                Decimal::from_f64(*a),
                Decimal::from_i64(*b),
                a + *b as f64,
                |x, y| x + y,
            )),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            (Value::Array(a), Value::Array(b)) => {
                let mut joined = a.clone();
                joined.extend(b.clone());
                Ok(Value::Array(joined))
            }
            (a, b) => Err(EvalError::TypeError(format!(
                "cannot add {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
        BinOp::Subtract => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a - b)),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a - b)),
            (Value::Integer(a), Value::Float(b)) => Ok(mixed_num(
                Decimal::from_i64(*a),
                Decimal::from_f64(*b),
                *a as f64 - b,
                |x, y| x - y,
            )),
            (Value::Float(a), Value::Integer(b)) => Ok(mixed_num(
                Decimal::from_f64(*a),
                Decimal::from_i64(*b),
                a - *b as f64,
                |x, y| x - y,
            )),
            (a, b) => Err(EvalError::TypeError(format!(
                "cannot subtract {} from {}",
                b.type_name(),
                a.type_name()
            ))),
        },
        BinOp::Equal => Ok(Value::Boolean(values_equal(left, right))),
        BinOp::NotEqual => Ok(Value::Boolean(!values_equal(left, right))),
        BinOp::LessThan => compare(left, right, |o| o == std::cmp::Ordering::Less),
        BinOp::GreaterThan => compare(left, right, |o| o == std::cmp::Ordering::Greater),
        BinOp::LessEqual => compare(left, right, |o| o != std::cmp::Ordering::Greater),
        BinOp::GreaterEqual => compare(left, right, |o| o != std::cmp::Ordering::Less),
        BinOp::And | BinOp::Or | BinOp::Alternative => {
            unreachable!("logical operators handled in eval")
        }
    }
}

fn compare(
    left: &Value,
    right: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ordering = match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (a, b) => {
            return Err(EvalError::TypeError(format!(
                "cannot compare {} with {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(Value::Boolean(ordering.is_some_and(accept)))
}
