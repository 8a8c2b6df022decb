//! The domain query surface over a loaded introspection document.
//!
//! [`Schema`] owns one immutable document and answers the named queries
//! from [`queries`](crate::queries), plus arbitrary ad-hoc filter
//! expressions. A schema is safe to share across threads: the document
//! is never mutated and compiled programs are cached behind a mutex.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::{
    engine::{CompileError, Outcome, Program, RunOptions, Variables},
    evaluator::EvalError,
    loader::{self, LoadError},
    queries,
    value::Value,
};

/// The embedded introspection schema, gzip-compressed, in the standard
/// layout `{"data": {"__schema": {...}}}`.
const EMBEDDED_SCHEMA: &[u8] = include_bytes!("../data/schema.json.gz");

/// Errors raised by the schema query surface.
#[derive(Debug)]
pub enum SchemaError {
    /// The document could not be loaded
    Load(LoadError),

    /// A filter expression failed to compile
    Compile(CompileError),

    /// A filter expression failed at run time
    Eval(EvalError),

    /// A named query produced no results for the given lookup key
    NotFound { what: &'static str, key: String },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::Load(e) => write!(f, "{}", e),
            SchemaError::Compile(e) => write!(f, "{}", e),
            SchemaError::Eval(e) => write!(f, "{}", e),
            SchemaError::NotFound { what, key } => {
                write!(f, "no results: {} '{}' not found", what, key)
            }
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Load(e) => Some(e),
            SchemaError::Compile(e) => Some(e),
            SchemaError::Eval(e) => Some(e),
            SchemaError::NotFound { .. } => None,
        }
    }
}

impl From<LoadError> for SchemaError {
    fn from(e: LoadError) -> Self {
        SchemaError::Load(e)
    }
}

impl From<CompileError> for SchemaError {
    fn from(e: CompileError) -> Self {
        SchemaError::Compile(e)
    }
}

impl From<EvalError> for SchemaError {
    fn from(e: EvalError) -> Self {
        SchemaError::Eval(e)
    }
}

/// A loaded introspection document plus its compiled-program cache.
///
/// Multiple schemas can coexist in one process; each owns its document.
pub struct Schema {
    document: Value,
    programs: Mutex<HashMap<&'static str, Arc<Program>>>,
}

impl Schema {
    /// Loads the embedded default schema.
    pub fn embedded() -> Result<Schema, SchemaError> {
        debug!(size = EMBEDDED_SCHEMA.len(), "loading embedded schema");
        let bytes = loader::decompress(EMBEDDED_SCHEMA)?;
        Self::from_bytes(&bytes)
    }

    /// Loads a schema from a file in introspection JSON format.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
        Ok(Schema::with_document(loader::from_file(path)?))
    }

    /// Loads a schema from raw JSON bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Schema, SchemaError> {
        Ok(Schema::with_document(loader::from_slice(bytes)?))
    }

    fn with_document(document: Value) -> Schema {
        Schema {
            document,
            programs: Mutex::new(HashMap::new()),
        }
    }

    /// The loaded document root.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Queries information about a GraphQL type by exact name.
    pub fn lookup_type(&self, type_name: &str) -> Result<Value, SchemaError> {
        self.run_named("type", queries::TYPE_QUERY, ("type", type_name))
    }

    /// Queries a mutation's input requirements by field name.
    pub fn lookup_mutation(&self, mutation_name: &str) -> Result<Value, SchemaError> {
        self.run_named("mutation", queries::MUTATION_QUERY, ("mutation", mutation_name))
    }

    /// Searches for types whose name matches a pattern.
    pub fn search(&self, pattern: &str) -> Result<Value, SchemaError> {
        self.run_named("search", queries::SEARCH_QUERY, ("pattern", pattern))
    }

    /// Searches for fields across all types, grouped by owning type.
    pub fn search_fields(&self, pattern: &str) -> Result<Value, SchemaError> {
        self.run_named("fields", queries::FIELD_SEARCH_QUERY, ("pattern", pattern))
    }

    /// Lists the types implementing an interface.
    pub fn implementers(&self, interface_name: &str) -> Result<Value, SchemaError> {
        self.run_named(
            "interface",
            queries::INTERFACE_IMPLEMENTERS_QUERY,
            ("interface", interface_name),
        )
    }

    /// Lists all mutation names.
    pub fn list_mutations(&self) -> Result<Value, SchemaError> {
        self.run_listing("list-mutations", queries::LIST_MUTATIONS_QUERY)
    }

    /// Lists all type names.
    pub fn list_types(&self) -> Result<Value, SchemaError> {
        self.run_listing("list-types", queries::LIST_TYPES_QUERY)
    }

    /// Lists all object type names.
    pub fn list_object_types(&self) -> Result<Value, SchemaError> {
        self.run_listing("list-objects", queries::LIST_OBJECT_TYPES_QUERY)
    }

    /// Lists all input-object type names.
    pub fn list_input_types(&self) -> Result<Value, SchemaError> {
        self.run_listing("list-inputs", queries::LIST_INPUT_TYPES_QUERY)
    }

    /// Runs an ad-hoc filter expression against the document.
    ///
    /// This is the only surface that accepts arbitrary untrusted
    /// expression text; malformed input is rejected as a compile error,
    /// never a crash. The expression is compiled per call against the
    /// names in `vars`.
    pub fn query(&self, text: &str, vars: &Variables) -> Result<Outcome, SchemaError> {
        self.query_with(text, vars, &RunOptions::default())
    }

    /// Like [`query`](Schema::query), with execution options
    /// (cancellation).
    pub fn query_with(
        &self,
        text: &str,
        vars: &Variables,
        options: &RunOptions,
    ) -> Result<Outcome, SchemaError> {
        let names: Vec<&str> = vars.keys().map(String::as_str).collect();
        let program = Program::compile(text, &names)?;
        debug!(variables = names.len(), "running ad-hoc query");
        let values = program.run_with(&self.document, vars, options)?;
        Ok(Outcome::collapse(values))
    }

    /// Runs a cached named query with one bound string variable,
    /// mapping an absent result to [`SchemaError::NotFound`].
    fn run_named(
        &self,
        name: &'static str,
        text: &'static str,
        binding: (&'static str, &str),
    ) -> Result<Value, SchemaError> {
        let (var, key) = binding;
        let program = self.cached(name, text, &[var])?;

        let mut vars = Variables::new();
        vars.insert(var.to_string(), Value::String(key.to_string()));

        debug!(query = name, key, "running named query");
        let values = program.run(&self.document, &vars)?;

        match Outcome::collapse(values).into_value() {
            Some(value) => Ok(value),
            None => Err(SchemaError::NotFound {
                what: name,
                key: key.to_string(),
            }),
        }
    }

    /// Runs a cached listing projection; listings always collect into a
    /// single array, so the collapsed result is the array itself.
    fn run_listing(&self, name: &'static str, text: &'static str) -> Result<Value, SchemaError> {
        let program = self.cached(name, text, &[])?;
        debug!(query = name, "running listing query");
        let values = program.run(&self.document, &Variables::new())?;
        Ok(Outcome::collapse(values).into_value().unwrap_or(Value::Null))
    }

    fn cached(
        &self,
        name: &'static str,
        text: &'static str,
        variables: &[&str],
    ) -> Result<Arc<Program>, SchemaError> {
        let mut cache = self
            .programs
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(program) = cache.get(name) {
            return Ok(program.clone());
        }

        let program = Arc::new(Program::compile(text, variables)?);
        cache.insert(name, program.clone());
        Ok(program)
    }
}
