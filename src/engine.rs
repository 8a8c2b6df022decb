//! Compilation and execution of filter expressions.
//!
//! A [`Program`] is a filter compiled against a declared set of variable
//! names. Compiling validates the syntax and resolves every `$name`
//! reference up front, so a program that compiled cannot fail on an
//! unknown variable at run time. Running a program against a document
//! produces the full output sequence, which [`Outcome::collapse`] reduces
//! to absent / single / many - the shape every caller works with.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::{
    ast::{Expr, Filter},
    evaluator::{EvalError, Evaluator},
    lexer::Lexer,
    parser::{ParseError, Parser},
    value::Value,
};

/// Caller-supplied variable bindings.
///
/// A `BTreeMap` keeps the binding order sorted by name, so the same set
/// of bindings always behaves identically regardless of insertion order.
pub type Variables = BTreeMap<String, Value>;

/// Errors raised while compiling a filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Malformed expression text
    Parse(ParseError),

    /// `$name` reference that is neither declared by the caller nor
    /// introduced by an `as` binding
    UnknownVariable { name: String, declared: Vec<String> },
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompileError::Parse(e) => write!(f, "parse error: {}", e),
            CompileError::UnknownVariable { name, declared } => {
                if declared.is_empty() {
                    write!(f, "unknown variable ${} (no variables declared)", name)
                } else {
                    write!(
                        f,
                        "unknown variable ${} (declared: {})",
                        name,
                        declared.join(", ")
                    )
                }
            }
        }
    }
}

impl std::error::Error for CompileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompileError::Parse(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

/// Execution options for a compiled program.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Cooperative cancellation: set the flag to true from any thread and
    /// the running evaluation aborts with [`EvalError::Cancelled`] at its
    /// next step, leaving the document untouched.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// A compiled filter expression plus its declared variable names.
///
/// Programs are immutable once compiled and safe to share across
/// threads; one program may run against any number of documents
/// concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    filter: Filter,
    variables: Vec<String>,
}

impl Program {
    /// Compiles an expression against a declared variable set.
    ///
    /// The declared names are sorted and deduplicated, so the binding
    /// set is deterministic however the caller assembled it. Fails with
    /// [`CompileError`] on malformed text or on a `$name` reference
    /// outside the declared set.
    pub fn compile(text: &str, variables: &[&str]) -> Result<Program, CompileError> {
        let mut declared: Vec<String> = variables.iter().map(|s| s.to_string()).collect();
        declared.sort();
        declared.dedup();

        let lexer = Lexer::new(text);
        let mut parser = Parser::new(lexer)?;
        let filter = parser.parse_filter()?;

        let mut bound = Vec::new();
        for def in &filter.defs {
            check_variables(&def.body, &declared, &mut bound)?;
        }
        check_variables(&filter.body, &declared, &mut bound)?;

        Ok(Program {
            filter,
            variables: declared,
        })
    }

    /// Declared variable names, sorted.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Runs the program against a document root, producing the full
    /// output sequence in production order.
    ///
    /// A runtime fault discards any partially produced output and fails
    /// the whole call. The document is never mutated.
    pub fn run(&self, input: &Value, vars: &Variables) -> Result<Vec<Value>, EvalError> {
        self.run_with(input, vars, &RunOptions::default())
    }

    /// Like [`run`](Program::run), with execution options.
    pub fn run_with(
        &self,
        input: &Value,
        vars: &Variables,
        options: &RunOptions,
    ) -> Result<Vec<Value>, EvalError> {
        let mut evaluator = Evaluator::new(&self.filter.defs, vars);
        if let Some(flag) = &options.cancel {
            evaluator = evaluator.with_cancel(flag);
        }
        evaluator.eval(&self.filter.body, input)
    }
}

/// Walks the AST rejecting variable references outside the declared set,
/// tracking `as` bindings in scope.
fn check_variables(
    expr: &Expr,
    declared: &[String],
    bound: &mut Vec<String>,
) -> Result<(), CompileError> {
    match expr {
        Expr::Variable(name) => {
            if bound.iter().any(|b| b == name) || declared.iter().any(|d| d == name) {
                Ok(())
            } else {
                Err(CompileError::UnknownVariable {
                    name: name.clone(),
                    declared: declared.to_vec(),
                })
            }
        }
        Expr::Bind { source, var, body } => {
            check_variables(source, declared, bound)?;
            bound.push(var.clone());
            let result = check_variables(body, declared, bound);
            bound.pop();
            result
        }
        Expr::Field { target, .. } | Expr::Iterate(target) | Expr::Try(target) => {
            check_variables(target, declared, bound)
        }
        Expr::Index { target, index } => {
            check_variables(target, declared, bound)?;
            check_variables(index, declared, bound)
        }
        Expr::Slice { target, start, end } => {
            check_variables(target, declared, bound)?;
            if let Some(start) = start {
                check_variables(start, declared, bound)?;
            }
            if let Some(end) = end {
                check_variables(end, declared, bound)?;
            }
            Ok(())
        }
        Expr::Pipe(left, right) | Expr::Comma(left, right) => {
            check_variables(left, declared, bound)?;
            check_variables(right, declared, bound)
        }
        Expr::BinaryOp { left, right, .. } => {
            check_variables(left, declared, bound)?;
            check_variables(right, declared, bound)
        }
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            check_variables(cond, declared, bound)?;
            check_variables(then_branch, declared, bound)?;
            if let Some(e) = else_branch {
                check_variables(e, declared, bound)?;
            }
            Ok(())
        }
        Expr::Object(entries) => {
            for (_, value) in entries {
                if let Some(value) = value {
                    check_variables(value, declared, bound)?;
                }
            }
            Ok(())
        }
        Expr::Array(inner) => match inner {
            Some(inner) => check_variables(inner, declared, bound),
            None => Ok(()),
        },
        Expr::Call { args, .. } => {
            for arg in args {
                check_variables(arg, declared, bound)?;
            }
            Ok(())
        }
        Expr::Identity
        | Expr::Integer(_)
        | Expr::Float(_)
        | Expr::String(_)
        | Expr::Boolean(_)
        | Expr::Null => Ok(()),
    }
}

/// The collapsed shape of a program's output sequence.
///
/// A sequence that produced a single literal `null` collapses to
/// `Single(Value::Null)`, not `Absent`: absence means the program
/// structurally produced nothing, which is what the named schema
/// queries rely on to signal "not found".
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The sequence had zero elements
    Absent,

    /// Exactly one element, unwrapped
    Single(Value),

    /// Two or more elements, in production order
    Many(Vec<Value>),
}

impl Outcome {
    /// Reduces a produced sequence to its collapsed shape.
    pub fn collapse(mut values: Vec<Value>) -> Outcome {
        match values.len() {
            0 => Outcome::Absent,
            1 => Outcome::Single(values.remove(0)),
            _ => Outcome::Many(values),
        }
    }

    /// The collapsed result as a single renderable value, if present:
    /// `Many` renders as an array, `Absent` as `None`.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Outcome::Absent => None,
            Outcome::Single(value) => Some(value),
            Outcome::Many(values) => Some(Value::Array(values)),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Outcome::Absent)
    }
}
