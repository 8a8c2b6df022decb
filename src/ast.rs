//! # Filter language - Abstract Syntax Tree
//!
//! This module defines the Abstract Syntax Tree (AST) for the filter
//! language introspec runs against loaded schema documents: a small,
//! jq-style expression language for selecting and reshaping JSON trees.
//!
//! ## Architecture Overview
//!
//! The AST module is organized into focused submodules:
//!
//! - **[tokens]** - Lexical tokens produced by the lexer
//! - **[expressions]** - Expression nodes (values, access, construction)
//! - **[operators]** - Binary operators (comparison, arithmetic, logical)
//!
//! ## Core Concepts
//!
//! ### Streams
//!
//! Every expression maps one input value to a *sequence* of output values.
//! Most expressions produce exactly one output, but iteration (`.types[]`)
//! fans out, `select` may produce zero, and `,` concatenates streams.
//! Pipelines thread each output of the left side through the right side:
//!
//! ```text
//! .data.__schema.types[] | select(.kind == "OBJECT") | .name
//! ```
//!
//! ### Definitions
//!
//! A filter may open with named definitions, which can recurse:
//!
//! ```text
//! def formatType:
//!   if type == "object" and .kind == "NON_NULL" then
//!     (.ofType | formatType) + "!"
//!   elif type == "object" and .kind == "LIST" then
//!     "[" + (.ofType | formatType) + "]"
//!   elif type == "object" then
//!     .name // .kind
//!   else
//!     .
//!   end;
//! ```
//!
//! ### Variables
//!
//! `$name` references a value bound by the caller at run time, or by an
//! `expr as $name | ...` binding inside the filter.
pub mod tokens;
pub mod expressions;
pub mod operators;

pub use tokens::Token;
pub use expressions::{Expr, Filter, FuncDef};
pub use operators::BinOp;
