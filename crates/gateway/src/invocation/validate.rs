use crate::error::GatewayError;
use serde_json::{Map, Value, json};

/// Check call arguments against a tool's input schema.
///
/// Unknown parameters come with "did you mean" suggestions; missing required parameters and
/// JSON Schema constraint violations are listed under `details.violations`.
pub(crate) fn validate_arguments(
    schema: &Value,
    args: &Map<String, Value>,
) -> Result<(), GatewayError> {
    let props = schema
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let required: Vec<String> = schema
        .get("required")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();

    let valid_params: Vec<String> = props.keys().cloned().collect();
    let valid_param_refs: Vec<&str> = valid_params.iter().map(String::as_str).collect();

    let mut violations: Vec<Value> = Vec::new();

    for k in args.keys() {
        if props.contains_key(k) {
            continue;
        }
        let suggestions = find_similar_strings(k, &valid_param_refs);
        violations.push(json!({
            "type": "invalid-parameter",
            "parameter": k,
            "suggestions": suggestions,
            "validParameters": valid_params,
        }));
    }

    for r in &required {
        if !args.contains_key(r) {
            violations.push(json!({
                "type": "missing-required-parameter",
                "parameter": r,
            }));
        }
    }

    let instance = Value::Object(args.clone());
    if let Ok(compiled) = jsonschema::validator_for(schema) {
        for e in compiled.iter_errors(&instance) {
            let instance_path = e.instance_path().to_string();
            // Already reported above in a friendlier shape.
            let duplicate = match e.kind() {
                jsonschema::error::ValidationErrorKind::Required { .. } => true,
                jsonschema::error::ValidationErrorKind::AdditionalProperties { .. } => {
                    instance_path.is_empty()
                }
                _ => false,
            };
            if duplicate {
                continue;
            }
            violations.push(json!({
                "type": "constraint-violation",
                "message": e.to_string(),
                "instancePath": instance_path,
            }));
        }
    }

    if violations.is_empty() {
        return Ok(());
    }

    let message = if let Some(v) = violations
        .iter()
        .find(|v| v.get("type").and_then(Value::as_str) == Some("invalid-parameter"))
    {
        let p = v.get("parameter").and_then(Value::as_str).unwrap_or("?");
        let suggestion = v
            .get("suggestions")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(Value::as_str);
        match suggestion {
            Some(s) => format!("unknown parameter '{p}' (did you mean '{s}'?)"),
            None => format!("unknown parameter '{p}'"),
        }
    } else if let Some(v) = violations
        .iter()
        .find(|v| v.get("type").and_then(Value::as_str) == Some("missing-required-parameter"))
    {
        let p = v.get("parameter").and_then(Value::as_str).unwrap_or("?");
        format!("missing required parameter '{p}'")
    } else {
        format!("argument validation failed with {} error(s)", violations.len())
    };

    Err(GatewayError::Validation {
        message,
        details: json!({
            "type": "validation-errors",
            "violations": violations,
        }),
    })
}

fn find_similar_strings(unknown: &str, known: &[&str]) -> Vec<String> {
    let mut candidates: Vec<(f64, String)> = Vec::new();
    for k in known {
        let score = strsim::jaro(unknown, k);
        if score > 0.7 {
            candidates.push((score, (*k).to_string()));
        }
    }
    candidates.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "petId": {"type": "number", "minimum": 1},
                "status": {"type": "string", "enum": ["available", "sold"]}
            },
            "required": ["petId"],
            "additionalProperties": false
        })
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(validate_arguments(&schema(), &args(json!({"petId": 3, "status": "sold"}))).is_ok());
    }

    #[test]
    fn unknown_parameter_gets_a_suggestion() {
        let err = validate_arguments(&schema(), &args(json!({"petID": 3}))).unwrap_err();
        let GatewayError::Validation { message, details } = err else {
            panic!("expected validation error");
        };
        assert!(message.contains("did you mean 'petId'"), "{message}");
        let violations = details["violations"].as_array().unwrap();
        assert!(violations.iter().any(|v| v["type"] == "missing-required-parameter"));
        assert!(!violations.iter().any(|v| v["type"] == "constraint-violation"));
    }

    #[test]
    fn reports_constraint_violations() {
        let err = validate_arguments(&schema(), &args(json!({"petId": 0, "status": "lost"}))).unwrap_err();
        let details = err.details();
        let constraints: Vec<_> = details["violations"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|v| v["type"] == "constraint-violation")
            .collect();
        assert_eq!(constraints.len(), 2);
    }

    #[test]
    fn missing_required_parameter_message() {
        let err = validate_arguments(&schema(), &Map::new()).unwrap_err();
        assert!(err.to_string().contains("missing required parameter 'petId'"));
    }
}
