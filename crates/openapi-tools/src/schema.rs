//! JSON Schema helpers shared by extraction and synthesis.

use serde_json::{Map, Value, json};

/// Constraint keywords copied verbatim onto tool properties.
const COPIED_CONSTRAINTS: [&str; 4] = ["minimum", "maximum", "pattern", "enum"];

/// The declared `type` of a raw schema fragment.
///
/// `OpenAPI` 3.1 type arrays (`["string", "null"]`) yield their first non-null entry.
/// A schema without a type is treated as `string`.
#[must_use]
pub fn declared_type(schema: &Value) -> String {
    match schema.get("type") {
        Some(Value::String(t)) => t.clone(),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|t| *t != "null")
            .unwrap_or("string")
            .to_string(),
        _ => "string".to_string(),
    }
}

/// Collapse an `OpenAPI` primitive type into the tool-schema type vocabulary.
#[must_use]
pub fn tool_type(openapi_type: &str) -> &'static str {
    match openapi_type {
        "integer" | "number" => "number",
        "boolean" => "boolean",
        "array" => "array",
        "object" => "object",
        _ => "string",
    }
}

/// Build a tool-schema property from a parameter schema.
#[must_use]
pub fn tool_property(schema: &Value, description: Option<&str>) -> Value {
    let mut prop = Map::new();
    prop.insert(
        "type".to_string(),
        json!(tool_type(&declared_type(schema))),
    );
    if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
        prop.insert("description".to_string(), json!(description));
    }
    for key in COPIED_CONSTRAINTS {
        if let Some(v) = schema.get(key) {
            prop.insert(key.to_string(), v.clone());
        }
    }
    if let Some(items) = schema.get("items") {
        prop.insert("items".to_string(), items.clone());
    }
    Value::Object(prop)
}

/// An empty object schema that accepts no properties.
#[must_use]
pub fn empty_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": [],
        "additionalProperties": false,
    })
}
