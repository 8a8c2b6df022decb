use introspec::{
    CompileError, EvalError, Outcome, Program, RunOptions, Value, Variables, loader, to_json,
};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn json(text: &str) -> Value {
    loader::from_slice(text.as_bytes()).expect("test document must parse")
}

fn run_expr(text: &str, doc: &Value) -> Result<Vec<Value>, String> {
    let program = Program::compile(text, &[]).map_err(|e| e.to_string())?;
    program.run(doc, &Variables::new()).map_err(|e| e.to_string())
}

fn run_with_vars(text: &str, doc: &Value, vars: &Variables) -> Result<Vec<Value>, String> {
    let names: Vec<&str> = vars.keys().map(String::as_str).collect();
    let program = Program::compile(text, &names).map_err(|e| e.to_string())?;
    program.run(doc, vars).map_err(|e| e.to_string())
}

// ============================================================================
// Access
// ============================================================================

#[test]
fn test_identity() {
    let doc = json(r#"{"a": 1}"#);
    assert_eq!(run_expr(".", &doc).unwrap(), vec![doc.clone()]);
}

#[test]
fn test_field_access() {
    let doc = json(r#"{"name": "Repository", "kind": "OBJECT"}"#);
    let result = run_expr(".name", &doc).unwrap();
    assert_eq!(result, vec![Value::String("Repository".into())]);
}

#[test]
fn test_nested_field_access() {
    let doc = json(r#"{"data": {"__schema": {"types": []}}}"#);
    let result = run_expr(".data.__schema.types", &doc).unwrap();
    assert_eq!(result, vec![Value::Array(vec![])]);
}

#[test]
fn test_field_on_null_projects_null() {
    let doc = json(r#"{"a": 1}"#);
    let result = run_expr(".missing.deeper.chain", &doc).unwrap();
    assert_eq!(result, vec![Value::Null]);
}

#[test]
fn test_field_on_scalar_is_error() {
    let doc = json(r#"{"name": "abc"}"#);
    let err = run_expr(".name.kind", &doc).unwrap_err();
    assert!(err.contains("cannot access field"), "got: {}", err);
}

#[test]
fn test_array_index() {
    let doc = json(r#"{"items": ["first", "second", "third"]}"#);
    assert_eq!(
        run_expr(".items[1]", &doc).unwrap(),
        vec![Value::String("second".into())]
    );
    assert_eq!(
        run_expr(".items[-1]", &doc).unwrap(),
        vec![Value::String("third".into())]
    );
    assert_eq!(run_expr(".items[9]", &doc).unwrap(), vec![Value::Null]);
}

#[test]
fn test_string_slice() {
    let doc = json(r#"{"s": "hello world"}"#);
    assert_eq!(
        run_expr(".s[0:5]", &doc).unwrap(),
        vec![Value::String("hello".into())]
    );
    // Bounds clamp to the string length
    assert_eq!(
        run_expr(".s[0:100]", &doc).unwrap(),
        vec![Value::String("hello world".into())]
    );
    assert_eq!(
        run_expr(".s[-5:]", &doc).unwrap(),
        vec![Value::String("world".into())]
    );
}

#[test]
fn test_array_slice() {
    let doc = json(r#"{"items": [1, 2, 3, 4]}"#);
    assert_eq!(
        run_expr(".items[1:3]", &doc).unwrap(),
        vec![json("[2, 3]")]
    );
}

#[test]
fn test_iterate_array() {
    let doc = json(r#"{"items": [1, 2, 3]}"#);
    let result = run_expr(".items[]", &doc).unwrap();
    assert_eq!(
        result,
        vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
    );
}

#[test]
fn test_iterate_object_values() {
    let doc = json(r#"{"obj": {"a": 1, "b": 2}}"#);
    let result = run_expr(".obj[]", &doc).unwrap();
    assert_eq!(result, vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn test_iterate_null_is_error() {
    let doc = json(r#"{"a": 1}"#);
    let err = run_expr(".fields[]", &doc).unwrap_err();
    assert!(err.contains("cannot iterate"), "got: {}", err);
}

#[test]
fn test_optional_iterate_suppresses_error() {
    let doc = json(r#"{"a": 1}"#);
    assert_eq!(run_expr(".fields[]?", &doc).unwrap(), vec![]);
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn test_pipe_fans_out() {
    let doc = json(r#"{"types": [{"name": "A"}, {"name": "B"}]}"#);
    let result = run_expr(".types[] | .name", &doc).unwrap();
    assert_eq!(
        result,
        vec![Value::String("A".into()), Value::String("B".into())]
    );
}

#[test]
fn test_comma_concatenates_streams() {
    let doc = json(r#"{"a": 1, "b": 2}"#);
    let result = run_expr(".a, .b", &doc).unwrap();
    assert_eq!(result, vec![Value::Integer(1), Value::Integer(2)]);
}

#[test]
fn test_alternative_on_null() {
    let doc = json(r#"{"name": null, "kind": "NON_NULL"}"#);
    let result = run_expr(".name // .kind", &doc).unwrap();
    assert_eq!(result, vec![Value::String("NON_NULL".into())]);
}

#[test]
fn test_alternative_keeps_truthy_left() {
    let doc = json(r#"{"name": "ID", "kind": "SCALAR"}"#);
    let result = run_expr(".name // .kind", &doc).unwrap();
    assert_eq!(result, vec![Value::String("ID".into())]);
}

#[test]
fn test_alternative_catches_errors() {
    let doc = json(r#"{"name": "abc"}"#);
    // .name.boom faults on a string; the alternative falls through
    let result = run_expr("(.name.boom) // \"fallback\"", &doc).unwrap();
    assert_eq!(result, vec![Value::String("fallback".into())]);
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn test_integer_arithmetic() {
    let doc = json("{}");
    assert_eq!(run_expr("1 + 2", &doc).unwrap(), vec![Value::Integer(3)]);
    assert_eq!(run_expr("5 - 3", &doc).unwrap(), vec![Value::Integer(2)]);
}

#[test]
fn test_mixed_arithmetic_preserves_whole_integers() {
    let doc = json("{}");
    // A whole result of mixed int/float arithmetic stays an integer
    assert_eq!(run_expr("10 + 1.0", &doc).unwrap(), vec![Value::Integer(11)]);
    assert_eq!(run_expr("1 + 2.5", &doc).unwrap(), vec![Value::Float(3.5)]);
}

#[test]
fn test_string_concatenation() {
    let doc = json(r#"{"first": "ID", "bang": "!"}"#);
    let result = run_expr(".first + .bang", &doc).unwrap();
    assert_eq!(result, vec![Value::String("ID!".into())]);
}

#[test]
fn test_null_is_additive_identity() {
    let doc = json(r#"{"d": null}"#);
    let result = run_expr(".d + \"suffix\"", &doc).unwrap();
    assert_eq!(result, vec![Value::String("suffix".into())]);
}

#[test]
fn test_array_concatenation() {
    let doc = json("{}");
    assert_eq!(run_expr("[1] + [2]", &doc).unwrap(), vec![json("[1, 2]")]);
}

#[test]
fn test_numbers_compare_across_int_float() {
    let doc = json("{}");
    assert_eq!(
        run_expr("1 == 1.0", &doc).unwrap(),
        vec![Value::Boolean(true)]
    );
}

#[test]
fn test_comparison() {
    let doc = json(r#"{"count": 101}"#);
    assert_eq!(
        run_expr(".count > 100", &doc).unwrap(),
        vec![Value::Boolean(true)]
    );
}

#[test]
fn test_and_short_circuits() {
    // On a string input, `.kind` would fault, but the false left side
    // short-circuits before it is evaluated
    let doc = json(r#""just a string""#);
    let result = run_expr("type == \"object\" and .kind == \"NON_NULL\"", &doc).unwrap();
    assert_eq!(result, vec![Value::Boolean(false)]);
}

#[test]
fn test_truthiness_only_null_and_false_are_falsy() {
    let doc = json(r#"[0, "", false, null]"#);
    let result = run_expr(".[] | select(.)", &doc).unwrap();
    assert_eq!(result, vec![Value::Integer(0), Value::String("".into())]);
}

// ============================================================================
// Conditionals
// ============================================================================

#[test]
fn test_if_elif_else() {
    let doc = json(r#"{"kind": "LIST"}"#);
    let expr = r#"if .kind == "NON_NULL" then "bang" elif .kind == "LIST" then "brackets" else "plain" end"#;
    assert_eq!(
        run_expr(expr, &doc).unwrap(),
        vec![Value::String("brackets".into())]
    );
}

#[test]
fn test_if_without_else_passes_input_through() {
    let doc = json(r#"{"flag": false}"#);
    let result = run_expr("if .flag then \"yes\" end", &doc).unwrap();
    assert_eq!(result, vec![doc.clone()]);
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_object_shorthand_and_computed_keys() {
    let doc = json(r#"{"name": "Issue", "kind": "OBJECT", "extra": true}"#);
    let result = run_expr("{name, label: (.kind + \"!\")}", &doc).unwrap();
    assert_eq!(result, vec![json(r#"{"name": "Issue", "label": "OBJECT!"}"#)]);
}

#[test]
fn test_object_construction_preserves_entry_order() {
    let doc = json(r#"{"b": 2, "a": 1}"#);
    let result = run_expr("{z: .a, y: .b}", &doc).unwrap();
    assert_eq!(to_json(&result[0]), r#"{"z":1,"y":2}"#);
}

#[test]
fn test_object_fans_out_per_value() {
    let doc = json(r#"{"nums": [1, 2]}"#);
    let result = run_expr("{v: .nums[]}", &doc).unwrap();
    assert_eq!(result, vec![json(r#"{"v": 1}"#), json(r#"{"v": 2}"#)]);
}

#[test]
fn test_array_collects_stream() {
    let doc = json(r#"{"types": [{"name": "A"}, {"name": "B"}]}"#);
    let result = run_expr("[.types[] | .name]", &doc).unwrap();
    assert_eq!(result, vec![json(r#"["A", "B"]"#)]);
}

#[test]
fn test_empty_array_literal() {
    let doc = json("{}");
    assert_eq!(run_expr("[]", &doc).unwrap(), vec![Value::Array(vec![])]);
}

// ============================================================================
// Builtins
// ============================================================================

#[test]
fn test_select_keeps_and_drops() {
    let doc = json(r#"[{"kind": "OBJECT"}, {"kind": "SCALAR"}, {"kind": "OBJECT"}]"#);
    let result = run_expr(".[] | select(.kind == \"OBJECT\")", &doc).unwrap();
    assert_eq!(result.len(), 2);
}

#[test]
fn test_regex_test_case_insensitive() {
    let doc = json(r#""ReviewThread""#);
    assert_eq!(
        run_expr("test(\"^review\"; \"i\")", &doc).unwrap(),
        vec![Value::Boolean(true)]
    );
    assert_eq!(
        run_expr("test(\"^review\")", &doc).unwrap(),
        vec![Value::Boolean(false)]
    );
}

#[test]
fn test_invalid_regex_is_runtime_error() {
    let doc = json(r#""abc""#);
    let err = run_expr("test(\"(\")", &doc).unwrap_err();
    assert!(err.contains("invalid regex"), "got: {}", err);
}

#[test]
fn test_length() {
    let doc = json(r#"{"s": "hello", "a": [1, 2, 3], "n": null}"#);
    assert_eq!(run_expr(".s | length", &doc).unwrap(), vec![Value::Integer(5)]);
    assert_eq!(run_expr(".a | length", &doc).unwrap(), vec![Value::Integer(3)]);
    assert_eq!(run_expr(".n | length", &doc).unwrap(), vec![Value::Integer(0)]);
}

#[test]
fn test_join() {
    let doc = json(r#"{"names": ["a", "b", "c"]}"#);
    assert_eq!(
        run_expr(".names | join(\"\\n\")", &doc).unwrap(),
        vec![Value::String("a\nb\nc".into())]
    );
}

#[test]
fn test_type_builtin() {
    let doc = json(r#"{"kind": "NON_NULL"}"#);
    assert_eq!(
        run_expr("type", &doc).unwrap(),
        vec![Value::String("object".into())]
    );
    assert_eq!(
        run_expr(".kind | type", &doc).unwrap(),
        vec![Value::String("string".into())]
    );
}

// ============================================================================
// Definitions and bindings
// ============================================================================

#[test]
fn test_recursive_definition() {
    let doc = json(
        r#"{"kind": "NON_NULL", "name": null,
            "ofType": {"kind": "LIST", "name": null,
              "ofType": {"kind": "NON_NULL", "name": null,
                "ofType": {"kind": "SCALAR", "name": "String", "ofType": null}}}}"#,
    );
    let expr = r#"
def formatType:
  if type == "object" and .kind == "NON_NULL" then
    (.ofType | formatType) + "!"
  elif type == "object" and .kind == "LIST" then
    "[" + (.ofType | formatType) + "]"
  elif type == "object" then
    .name // .kind
  else
    .
  end;
formatType"#;
    assert_eq!(
        run_expr(expr, &doc).unwrap(),
        vec![Value::String("[String!]!".into())]
    );
}

#[test]
fn test_unbounded_recursion_hits_depth_guard() {
    let doc = json("{}");
    let err = run_expr("def boom: boom; boom", &doc).unwrap_err();
    assert!(err.contains("recursion"), "got: {}", err);
}

#[test]
fn test_as_binding() {
    let doc = json(r#"{"a": {"name": "X"}, "b": 2}"#);
    let result = run_expr(".a as $found | {orig: $found.name, b: .b}", &doc).unwrap();
    assert_eq!(result, vec![json(r#"{"orig": "X", "b": 2}"#)]);
}

#[test]
fn test_binding_iterates_per_source_value() {
    let doc = json(r#"{"items": [1, 2]}"#);
    let result = run_expr(".items[] as $i | $i + 10", &doc).unwrap();
    assert_eq!(result, vec![Value::Integer(11), Value::Integer(12)]);
}

// ============================================================================
// Variables and compilation
// ============================================================================

#[test]
fn test_caller_bound_variable() {
    let doc = json(r#"{"types": [{"name": "Issue"}, {"name": "Repository"}]}"#);
    let mut vars = Variables::new();
    vars.insert("type".to_string(), Value::String("Issue".into()));
    let result = run_with_vars(".types[] | select(.name == $type)", &doc, &vars).unwrap();
    assert_eq!(result, vec![json(r#"{"name": "Issue"}"#)]);
}

#[test]
fn test_unknown_variable_is_compile_error() {
    let err = Program::compile(".name == $nope", &["type"]).unwrap_err();
    assert!(matches!(err, CompileError::UnknownVariable { .. }));
}

#[test]
fn test_syntax_error_is_compile_error() {
    assert!(matches!(
        Program::compile(".items[", &[]),
        Err(CompileError::Parse(_))
    ));
    assert!(matches!(
        Program::compile("select(", &[]),
        Err(CompileError::Parse(_))
    ));
    assert!(matches!(
        Program::compile("\"unterminated", &[]),
        Err(CompileError::Parse(_))
    ));
}

#[test]
fn test_variable_binding_order_is_deterministic() {
    let doc = json(r#"{"types": [{"name": "A", "kind": "OBJECT"}]}"#);
    let expr = ".types[] | select(.name == $name and .kind == $kind)";

    let mut forward = Variables::new();
    forward.insert("name".to_string(), Value::String("A".into()));
    forward.insert("kind".to_string(), Value::String("OBJECT".into()));

    let mut reverse = Variables::new();
    reverse.insert("kind".to_string(), Value::String("OBJECT".into()));
    reverse.insert("name".to_string(), Value::String("A".into()));

    let a = run_with_vars(expr, &doc, &forward).unwrap();
    let b = run_with_vars(expr, &doc, &reverse).unwrap();
    assert_eq!(a, b);
}

// ============================================================================
// Collapsing
// ============================================================================

#[test]
fn test_collapse_zero_is_absent() {
    let doc = json(r#"{"types": []}"#);
    let values = run_expr(".types[]", &doc).unwrap();
    assert_eq!(Outcome::collapse(values), Outcome::Absent);
}

#[test]
fn test_collapse_one_is_unwrapped_single() {
    let doc = json(r#"{"types": [{"name": "A"}]}"#);
    let values = run_expr(".types[]", &doc).unwrap();
    assert_eq!(
        Outcome::collapse(values),
        Outcome::Single(json(r#"{"name": "A"}"#))
    );
}

#[test]
fn test_collapse_many_preserves_production_order() {
    let doc = json(r#"{"types": [{"name": "B"}, {"name": "A"}]}"#);
    let values = run_expr(".types[] | .name", &doc).unwrap();
    assert_eq!(
        Outcome::collapse(values),
        Outcome::Many(vec![Value::String("B".into()), Value::String("A".into())])
    );
}

#[test]
fn test_produced_null_collapses_to_single_null() {
    // A literal null output is a present value, not absence
    let doc = json("{}");
    let values = run_expr("null", &doc).unwrap();
    assert_eq!(Outcome::collapse(values), Outcome::Single(Value::Null));
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancellation_aborts_run() {
    let doc = json(r#"{"items": [1, 2, 3]}"#);
    let program = Program::compile(".items[]", &[]).unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let options = RunOptions {
        cancel: Some(flag.clone()),
    };

    let err = program
        .run_with(&doc, &Variables::new(), &options)
        .unwrap_err();
    assert!(matches!(err, EvalError::Cancelled));

    // The same program runs fine once the flag is cleared
    flag.store(false, std::sync::atomic::Ordering::Relaxed);
    let result = program.run_with(&doc, &Variables::new(), &options).unwrap();
    assert_eq!(result.len(), 3);
}
