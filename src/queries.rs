//! Predefined filter programs for common schema operations.
//!
//! Each named query is an immutable (expression text, variable list)
//! pair; the [`Schema`](crate::schema::Schema) methods bind the variables
//! and run these against the loaded document. Expressions assume the
//! standard introspection layout, `{"data": {"__schema": {...}}}`.

/// Formats a GraphQL type with all its fields.
///
/// `formatType` renders a type-reference chain as its canonical string:
/// `NON_NULL` appends `!`, `LIST` wraps in brackets, a terminal named
/// type renders as its name (falling back to its kind when anonymous),
/// and a scalar that is not an object at all passes through unchanged.
/// Variables: `$type` (the type name, exact match).
pub const TYPE_QUERY: &str = r#"
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

.data.__schema.types[] |
select(.name == $type) |
{
  type: {
    name,
    kind,
    description,
    fields: (
      if .fields then
        [.fields[] | {
          name,
          description,
          type: (.type | formatType),
          arguments: (
            if (.args | length) > 0 then
              [.args[] | {
                name,
                description,
                type: (.type | formatType)
              }]
            else
              null
            end
          )
        }]
      else
        null
      end
    ),
    inputFields: (
      if .inputFields then
        [.inputFields[] | {
          name,
          description,
          type: (.type | formatType),
          required: (.type.kind == "NON_NULL")
        }]
      else
        null
      end
    ),
    enumValues: (
      if .enumValues then
        [.enumValues[] | {
          name,
          description
        }]
      else
        null
      end
    )
  }
}"#;

/// Searches for types matching a pattern (case-insensitive); long
/// descriptions are truncated to 100 characters plus an ellipsis.
/// Variables: `$pattern`.
pub const SEARCH_QUERY: &str = r#"
[.data.__schema.types[] |
  select(.name | test($pattern; "i")) |
  {
    name,
    kind,
    description: (
      if .description != null and (.description | length) > 100 then
        .description[0:100] + "..."
      else
        .description
      end
    )
  }] | {
    count: length,
    pattern: $pattern,
    results: .
  }"#;

/// Formats a mutation with expanded input details.
///
/// When the mutation's first argument resolves to a named input-object
/// type, the descriptor's description is synthesized from the argument's
/// own description plus one bullet line per input field; otherwise one
/// descriptor per declared argument is returned.
/// Variables: `$mutation` (the field name under the `Mutation` type).
pub const MUTATION_QUERY: &str = r#"
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

# Find the mutation
(.data.__schema.types[] | select(.name == "Mutation").fields[] | select(.name == $mutation)) as $mut |

# Resolve the first argument's wrapped input object, if one exists
[.data.__schema.types[] | select(.kind == "INPUT_OBJECT" and .name == $mut.args[0].type.ofType.name)] as $inputTypes |

if ($inputTypes | length) > 0 then
  $inputTypes[0] as $inputType |
  {
    mutation: {
      name: $mut.name,
      description: $mut.description,
      inputs: [{
        name: $mut.args[0].name,
        type: ($mut.args[0].type | formatType),
        description: (
          $mut.args[0].description + "\n\nInput object '" + $inputType.name + "' has the following fields:\n" +
          ([$inputType.inputFields[] |
            "- " + .name + ": " + (.type | formatType) +
            if .type.kind == "NON_NULL" then " (required)" else "" end +
            if .description then "\n  " + .description else "" end
          ] | join("\n"))
        ),
        required: ($mut.args[0].type.kind == "NON_NULL")
      }]
    }
  }
else
  {
    mutation: {
      name: $mut.name,
      description: $mut.description,
      inputs: [$mut.args[] | {
        name,
        type: (.type | formatType),
        description,
        required: (.type.kind == "NON_NULL")
      }]
    }
  }
end"#;

/// Searches for fields across all types, grouped under their owning
/// type; types with no matching fields are omitted.
/// Variables: `$pattern`.
pub const FIELD_SEARCH_QUERY: &str = r#"
[.data.__schema.types[] |
{
  type: .name,
  kind: .kind,
  fields: [.fields[]? | select(.name | test($pattern; "i")) | {
    name,
    type: (
      if .type.kind == "NON_NULL" then
        .type.ofType.name + "!"
      elif .type.kind == "LIST" then
        "[" + (.type.ofType.name // .type.ofType.kind) + "]"
      else
        .type.name
      end
    ),
    description
  }]
} |
select(.fields | length > 0)]"#;

/// Finds the types implementing an interface; an interface without a
/// `possibleTypes` list reports an empty implementer list.
/// Variables: `$interface`.
pub const INTERFACE_IMPLEMENTERS_QUERY: &str = r#"
.data.__schema.types[] |
select(.name == $interface) |
if .possibleTypes then
  {
    interface: .name,
    implementers: [.possibleTypes[] | .name]
  }
else
  {
    interface: .name,
    implementers: []
  }
end"#;

// Simple listing projections

/// Lists all available mutation names.
pub const LIST_MUTATIONS_QUERY: &str =
    r#"[.data.__schema.types[] | select(.name == "Mutation") | .fields[] | .name]"#;

/// Lists all type names.
pub const LIST_TYPES_QUERY: &str = r#"[.data.__schema.types[] | .name]"#;

/// Lists only object type names.
pub const LIST_OBJECT_TYPES_QUERY: &str =
    r#"[.data.__schema.types[] | select(.kind == "OBJECT") | .name]"#;

/// Lists only input-object type names.
pub const LIST_INPUT_TYPES_QUERY: &str =
    r#"[.data.__schema.types[] | select(.kind == "INPUT_OBJECT") | .name]"#;
