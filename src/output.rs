//! JSON output serialization for query results.
//!
//! This module renders [`Value`] trees back to JSON text with support for
//! both compact and pretty-printed formats. Object keys are emitted in
//! document order (the order the loader preserved), so output is
//! deterministic and matches the source schema's layout.
//!
//! # Features
//!
//! - **Compact output** via [`to_json()`] - minimal whitespace
//! - **Pretty output** via [`to_json_pretty()`] - 2-space indentation
//! - **String escaping** - special characters, control codes
//! - **Type preservation** - integers never render in floating form

use std::fmt::Write;

use crate::value::{Map, Value};

pub struct JsonPrinter {
    pretty: bool,
}

impl JsonPrinter {
    pub fn new(pretty: bool) -> Self {
        JsonPrinter { pretty }
    }

    pub fn print(&self, value: &Value) -> String {
        let mut out = String::new();
        self.write_value(&mut out, value, 0);
        out
    }

    fn write_value(&self, out: &mut String, value: &Value, indent: usize) {
        match value {
            Value::Null => out.push_str("null"),
            Value::Boolean(b) => {
                let _ = write!(out, "{}", b);
            }
            Value::Integer(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::Float(n) => {
                let _ = write!(out, "{}", n);
            }
            Value::String(s) => self.write_string(out, s),
            Value::Array(arr) => self.write_array(out, arr, indent),
            Value::Object(obj) => self.write_object(out, obj, indent),
        }
    }

    fn write_array(&self, out: &mut String, arr: &[Value], indent: usize) {
        if arr.is_empty() {
            out.push_str("[]");
            return;
        }

        out.push('[');
        for (i, item) in arr.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.newline_indent(out, indent + 1);
            self.write_value(out, item, indent + 1);
        }
        self.newline_indent(out, indent);
        out.push(']');
    }

    fn write_object(&self, out: &mut String, obj: &Map, indent: usize) {
        if obj.is_empty() {
            out.push_str("{}");
            return;
        }

        out.push('{');
        for (i, (key, value)) in obj.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            self.newline_indent(out, indent + 1);
            self.write_string(out, key);
            out.push(':');
            if self.pretty {
                out.push(' ');
            }
            self.write_value(out, value, indent + 1);
        }
        self.newline_indent(out, indent);
        out.push('}');
    }

    fn newline_indent(&self, out: &mut String, level: usize) {
        if self.pretty {
            out.push('\n');
            for _ in 0..level {
                out.push_str("  ");
            }
        }
    }

    fn write_string(&self, out: &mut String, s: &str) {
        out.push('"');
        for c in s.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {
                    // Unicode escape for control chars
                    let _ = write!(out, "\\u{:04x}", c as u32);
                }
                c => out.push(c),
            }
        }
        out.push('"');
    }
}

// Convenience functions

/// Converts a Value to compact JSON string representation.
///
/// # Examples
///
/// ```
/// use introspec::Value;
/// use introspec::output::to_json;
/// use introspec::value::Map;
///
/// let mut obj = Map::new();
/// obj.insert("name".to_string(), Value::String("Repository".to_string()));
/// obj.insert("kind".to_string(), Value::String("OBJECT".to_string()));
///
/// assert_eq!(
///     to_json(&Value::Object(obj)),
///     r#"{"name":"Repository","kind":"OBJECT"}"#
/// );
/// ```
pub fn to_json(value: &Value) -> String {
    JsonPrinter::new(false).print(value)
}

/// Converts a Value to pretty-printed JSON with 2-space indentation.
///
/// Object keys appear in document order, one property per line.
pub fn to_json_pretty(value: &Value) -> String {
    JsonPrinter::new(true).print(value)
}
