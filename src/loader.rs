//! Document loading: raw bytes to an in-memory [`Value`] tree.
//!
//! All origins (the embedded resource, user-supplied files, arbitrary
//! byte buffers) funnel through [`from_slice`], so behavior is identical
//! regardless of where the bytes came from. Parsing preserves object key
//! order and the integer/float distinction.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::value::{Map, Value};

/// Errors raised while loading a document.
///
/// A failed load never corrupts any other loaded document; the loader is
/// a pure transformation of its input bytes.
#[derive(Debug)]
pub enum LoadError {
    /// The bytes are not a valid JSON document
    Parse(serde_json::Error),

    /// The file could not be read
    Io(std::io::Error),

    /// The embedded resource could not be gzip-inflated
    Decompress(std::io::Error),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Parse(e) => write!(f, "failed to parse schema: {}", e),
            LoadError::Io(e) => write!(f, "failed to read schema file: {}", e),
            LoadError::Decompress(e) => write!(f, "failed to decompress schema: {}", e),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Parse(e) => Some(e),
            LoadError::Io(e) | LoadError::Decompress(e) => Some(e),
        }
    }
}

/// Parses one JSON document into a [`Value`] tree.
///
/// Object keys keep their document order. Numbers that are integers
/// representable in `i64` load as [`Value::Integer`]; everything else
/// (fractions, exponent forms, unsigned values above `i64::MAX`) loads
/// as [`Value::Float`].
pub fn from_slice(bytes: &[u8]) -> Result<Value, LoadError> {
    let parsed: serde_json::Value = serde_json::from_slice(bytes).map_err(LoadError::Parse)?;
    debug!(size = bytes.len(), "parsed schema document");
    Ok(convert(parsed))
}

/// Reads and parses a document from a file path.
pub fn from_file(path: impl AsRef<Path>) -> Result<Value, LoadError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(LoadError::Io)?;
    debug!(path = %path.display(), size = bytes.len(), "read schema file");
    from_slice(&bytes)
}

/// Gzip-inflates a compressed byte source (the embedded schema's on-disk
/// form).
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, LoadError> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(LoadError::Decompress)?;
    debug!(compressed = bytes.len(), size = out.len(), "decompressed schema");
    Ok(out)
}

fn convert(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(b),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Value::Integer(i),
            (None, Some(f)) => Value::Float(f),
            // serde_json numbers are always representable as f64
            (None, None) => Value::Null,
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Array(items.into_iter().map(convert).collect())
        }
        serde_json::Value::Object(map) => {
            // preserve_order keeps serde_json's map in document order
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key, convert(value));
            }
            Value::Object(out)
        }
    }
}
