use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use introspec::{Outcome, Schema, SchemaError, Value, Variables, to_json, to_json_pretty};
use std::io::{self, Read};
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "introspec")]
#[command(about = "Query GraphQL introspection schemas offline")]
#[command(version)]
struct Cli {
    /// Path to a custom schema file in introspection JSON format
    /// ("-" reads from stdin; defaults to the embedded schema)
    #[arg(short, long, global = true)]
    schema: Option<String>,

    /// Compact output instead of pretty-printed JSON
    #[arg(long, global = true)]
    compact: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show fields and descriptions for a type
    Type {
        /// Type name (exact match)
        name: String,
    },

    /// Show mutation input requirements
    Mutation {
        /// Mutation field name
        name: String,
    },

    /// Search the schema for matching type names
    Search {
        /// Regular expression, matched case-insensitively
        pattern: String,
    },

    /// Search for fields across all types
    Fields {
        /// Regular expression, matched case-insensitively
        pattern: String,
    },

    /// Show the types implementing an interface
    Implements {
        /// Interface name
        name: String,
    },

    /// List schema names by category
    List {
        #[arg(value_enum)]
        category: ListCategory,
    },

    /// Run a custom filter expression on the schema
    Query {
        /// The filter expression to run
        expression: String,

        /// Bind a string variable, e.g. --arg type=Repository
        #[arg(long = "arg", value_name = "NAME=VALUE")]
        args: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListCategory {
    /// All type names
    Types,
    /// All mutation names
    Mutations,
    /// Object type names
    Objects,
    /// Input-object type names
    Inputs,
}

/// Errors surfaced to the terminal.
#[derive(Debug)]
enum CliError {
    /// Schema loading or querying error
    Schema(SchemaError),
    /// IO error
    Io(io::Error),
    /// Stdin requested but nothing piped in
    NoInput,
    /// --arg value that is not NAME=VALUE
    BadArg(String),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Schema(e) => write!(f, "{}", e),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::NoInput => {
                write!(f, "No schema provided. Pipe introspection JSON to stdin.")
            }
            CliError::BadArg(arg) => {
                write!(f, "Invalid --arg '{}': expected NAME=VALUE", arg)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Schema(e) => Some(e),
            CliError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SchemaError> for CliError {
    fn from(e: SchemaError) -> Self {
        CliError::Schema(e)
    }
}

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.debug);

    if let Err(e) = run(&cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let schema = load_schema(cli.schema.as_deref())?;

    let result = match &cli.command {
        Commands::Type { name } => schema.lookup_type(name)?,
        Commands::Mutation { name } => schema.lookup_mutation(name)?,
        Commands::Search { pattern } => schema.search(pattern)?,
        Commands::Fields { pattern } => schema.search_fields(pattern)?,
        Commands::Implements { name } => schema.implementers(name)?,
        Commands::List { category } => match category {
            ListCategory::Types => schema.list_types()?,
            ListCategory::Mutations => schema.list_mutations()?,
            ListCategory::Objects => schema.list_object_types()?,
            ListCategory::Inputs => schema.list_input_types()?,
        },
        Commands::Query { expression, args } => {
            let vars = parse_bindings(args)?;
            match schema.query(expression, &vars)? {
                Outcome::Absent => Value::Null,
                outcome => outcome.into_value().unwrap_or(Value::Null),
            }
        }
    };

    let json = if cli.compact {
        to_json(&result)
    } else {
        to_json_pretty(&result)
    };
    println!("{}", json);

    Ok(())
}

fn load_schema(path: Option<&str>) -> Result<Schema, CliError> {
    match path {
        None => Ok(Schema::embedded()?),
        Some("-") => {
            if atty::is(atty::Stream::Stdin) {
                return Err(CliError::NoInput);
            }
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .map_err(CliError::Io)?;
            Ok(Schema::from_bytes(&buffer)?)
        }
        Some(path) => Ok(Schema::from_file(path)?),
    }
}

fn parse_bindings(args: &[String]) -> Result<Variables, CliError> {
    let mut vars = Variables::new();
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) if !name.is_empty() => {
                vars.insert(name.to_string(), Value::String(value.to_string()));
            }
            _ => return Err(CliError::BadArg(arg.clone())),
        }
    }
    Ok(vars)
}
