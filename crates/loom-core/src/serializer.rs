// crates/loom-core/src/serializer.rs
// ============================================================================
// Module: Loom Safe Serializer
// Description: Total, bounded serialization of trace payloads to JSON text.
// Purpose: Guarantee trace recording never fails on an unserializable value.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! The external tracer hands Loom arbitrary in-process values (arguments,
//! keyword arguments, return values). [`TraceValue`] is the typed rendition
//! of that universe, and [`safe_serialize`] is a total function from it to a
//! UTF-8 JSON string of bounded size: it never panics, never errors, and
//! never exceeds its budget. Collections are truncated with explicit
//! markers, recursion is depth-capped, and an over-budget result collapses
//! to a single truncation object.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum serialized size in characters.
pub const MAX_SERIALIZED_SIZE: usize = 10_000;
/// Maximum recursion depth before values collapse to a marker.
const MAX_DEPTH: usize = 10;
/// Maximum elements kept from a list or set.
const MAX_LIST_ITEMS: usize = 100;
/// Maximum entries kept from a map.
const MAX_MAP_ENTRIES: usize = 50;
/// Maximum attributes kept from an object.
const MAX_OBJECT_ATTRS: usize = 20;
/// Maximum byte-sequence length rendered as text.
const MAX_BYTES_AS_TEXT: usize = 100;

// ============================================================================
// SECTION: Trace Values
// ============================================================================

/// An arbitrary in-process value handed over by the tracer.
///
/// # Invariants
/// - The tree may be arbitrarily deep and wide; the serializer bounds both.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceValue {
    /// Absent value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Raw byte sequence.
    Bytes(Vec<u8>),
    /// Ordered sequence (list or tuple).
    List(Vec<TraceValue>),
    /// Keyed mapping.
    Map(Vec<(String, TraceValue)>),
    /// Unordered collection; serialized as a list.
    Set(Vec<TraceValue>),
    /// A callable, identified by name only.
    Callable {
        /// Function name, or "unknown".
        name: String,
    },
    /// An object with an attribute bag.
    Object {
        /// Class name of the object.
        class: String,
        /// Attribute name/value pairs.
        attrs: Vec<(String, TraceValue)>,
    },
}

impl From<&str> for TraceValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for TraceValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for TraceValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Serializes a trace value to bounded JSON text with the default budget.
#[must_use]
pub fn safe_serialize(value: &TraceValue) -> String {
    safe_serialize_with_budget(value, MAX_SERIALIZED_SIZE)
}

/// Serializes a trace value to JSON text of at most `budget` characters.
///
/// Total: every input produces a valid JSON string. Over-budget results are
/// replaced by `{"<truncated>": "Object too large (N chars)"}`; an encoding
/// failure at the top level (non-finite floats aside, effectively
/// unreachable) renders `{"<error>": "..."}`.
#[must_use]
pub fn safe_serialize_with_budget(value: &TraceValue, budget: usize) -> String {
    let bounded = bound_value(value, 0);
    let rendered = match serde_json::to_string(&bounded) {
        Ok(text) => text,
        Err(err) => return json!({"<error>": err.to_string()}).to_string(),
    };
    if rendered.chars().count() > budget {
        let note = format!("Object too large ({} chars)", rendered.chars().count());
        return json!({"<truncated>": note}).to_string();
    }
    rendered
}

/// Converts a trace value to a JSON value within the structural bounds.
fn bound_value(value: &TraceValue, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return Value::String("<max depth exceeded>".to_string());
    }
    match value {
        TraceValue::Null => Value::Null,
        TraceValue::Bool(flag) => Value::Bool(*flag),
        TraceValue::Int(number) => json!(number),
        TraceValue::Float(number) => {
            // JSON has no NaN/Infinity; render them as strings.
            serde_json::Number::from_f64(*number)
                .map_or_else(|| Value::String(number.to_string()), Value::Number)
        }
        TraceValue::Str(text) => Value::String(text.clone()),
        TraceValue::Bytes(bytes) => bound_bytes(bytes),
        TraceValue::List(items) => bound_list(items, depth),
        TraceValue::Set(items) => {
            let capped: Vec<Value> = items
                .iter()
                .take(MAX_LIST_ITEMS)
                .map(|item| bound_value(item, depth + 1))
                .collect();
            Value::Array(capped)
        }
        TraceValue::Map(entries) => bound_map(entries, depth),
        TraceValue::Callable { name } => Value::String(format!("<function {name}>")),
        TraceValue::Object { class, attrs } => bound_object(class, attrs, depth),
    }
}

/// Renders a byte sequence: short valid UTF-8 becomes text, the rest a marker.
fn bound_bytes(bytes: &[u8]) -> Value {
    if bytes.len() <= MAX_BYTES_AS_TEXT {
        if let Ok(text) = std::str::from_utf8(bytes) {
            return Value::String(text.to_string());
        }
    }
    Value::String(format!("<bytes len={}>", bytes.len()))
}

/// Renders a list, keeping the first elements and an overflow marker.
fn bound_list(items: &[TraceValue], depth: usize) -> Value {
    let mut rendered: Vec<Value> = items
        .iter()
        .take(MAX_LIST_ITEMS)
        .map(|item| bound_value(item, depth + 1))
        .collect();
    if items.len() > MAX_LIST_ITEMS {
        rendered.push(Value::String(format!(
            "<...{} more>",
            items.len() - MAX_LIST_ITEMS
        )));
    }
    Value::Array(rendered)
}

/// Renders a map, keeping the first entries and a remaining-count note.
fn bound_map(entries: &[(String, TraceValue)], depth: usize) -> Value {
    let mut object = serde_json::Map::new();
    for (key, item) in entries.iter().take(MAX_MAP_ENTRIES) {
        object.insert(key.clone(), bound_value(item, depth + 1));
    }
    if entries.len() > MAX_MAP_ENTRIES {
        object.insert(
            "<truncated>".to_string(),
            Value::String(format!("{} more keys", entries.len() - MAX_MAP_ENTRIES)),
        );
    }
    Value::Object(object)
}

/// Renders an object as a class-tagged attribute bag.
fn bound_object(class: &str, attrs: &[(String, TraceValue)], depth: usize) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("__class__".to_string(), Value::String(class.to_string()));
    for (key, item) in attrs.iter().take(MAX_OBJECT_ATTRS) {
        object.insert(key.clone(), bound_value(item, depth + 1));
    }
    Value::Object(object)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::MAX_SERIALIZED_SIZE;
    use super::TraceValue;
    use super::safe_serialize;
    use super::safe_serialize_with_budget;

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap_or(Value::Null)
    }

    #[test]
    fn scalars_pass_through() {
        assert_eq!(safe_serialize(&TraceValue::Int(7)), "7");
        assert_eq!(safe_serialize(&TraceValue::Bool(true)), "true");
        assert_eq!(safe_serialize(&TraceValue::Null), "null");
        assert_eq!(safe_serialize(&TraceValue::from("hi")), "\"hi\"");
    }

    #[test]
    fn non_finite_floats_render_as_strings() {
        let rendered = safe_serialize(&TraceValue::Float(f64::NAN));
        assert!(rendered.contains("NaN"));
    }

    #[test]
    fn short_utf8_bytes_become_text() {
        let rendered = safe_serialize(&TraceValue::Bytes(b"hello".to_vec()));
        assert_eq!(rendered, "\"hello\"");
    }

    #[test]
    fn long_bytes_become_marker() {
        let rendered = safe_serialize(&TraceValue::Bytes(vec![0u8; 500]));
        assert_eq!(rendered, "\"<bytes len=500>\"");
    }

    #[test]
    fn long_lists_keep_first_hundred_with_marker() {
        let items: Vec<TraceValue> = (0 .. 150).map(TraceValue::Int).collect();
        let rendered = parse(&safe_serialize(&TraceValue::List(items)));
        let array = rendered.as_array().map(Vec::as_slice).unwrap_or(&[]);
        assert_eq!(array.len(), 101);
        assert_eq!(array[100], Value::String("<...50 more>".to_string()));
    }

    #[test]
    fn large_maps_keep_fifty_entries_with_note() {
        let entries: Vec<(String, TraceValue)> =
            (0 .. 60).map(|i| (format!("k{i:02}"), TraceValue::Int(i))).collect();
        let rendered = parse(&safe_serialize(&TraceValue::Map(entries)));
        let object = match rendered {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        assert_eq!(object.len(), 51);
        assert_eq!(
            object.get("<truncated>"),
            Some(&Value::String("10 more keys".to_string()))
        );
    }

    #[test]
    fn callables_render_by_name() {
        let value = TraceValue::Callable { name: "handler".to_string() };
        assert_eq!(safe_serialize(&value), "\"<function handler>\"");
    }

    #[test]
    fn objects_carry_class_tag() {
        let value = TraceValue::Object {
            class: "Widget".to_string(),
            attrs: vec![("size".to_string(), TraceValue::Int(3))],
        };
        let rendered = parse(&safe_serialize(&value));
        assert_eq!(rendered["__class__"], Value::String("Widget".to_string()));
        assert_eq!(rendered["size"], Value::from(3));
    }

    #[test]
    fn deep_nesting_collapses_to_marker() {
        let mut value = TraceValue::Int(1);
        for _ in 0 .. 20 {
            value = TraceValue::List(vec![value]);
        }
        let rendered = safe_serialize(&value);
        assert!(rendered.contains("<max depth exceeded>"));
    }

    #[test]
    fn over_budget_results_collapse_to_truncation_object() {
        let value = TraceValue::Str("x".repeat(MAX_SERIALIZED_SIZE + 10));
        let rendered = parse(&safe_serialize(&value));
        let note = rendered["<truncated>"].as_str().unwrap_or("");
        assert!(note.starts_with("Object too large ("));
    }

    #[test]
    fn budget_override_is_respected() {
        let value = TraceValue::Str("abcdefgh".to_string());
        let rendered = safe_serialize_with_budget(&value, 4);
        assert!(rendered.contains("<truncated>"));
    }
}
