//! Validated tool descriptors.

use crate::error::{OpenApiToolsError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use unrelated_http_tools::HttpMethod;

/// Metadata keys mirrored from [`ExecutionContext`].
pub const META_HTTP_METHOD: &str = "httpMethod";
pub const META_ENDPOINT_PATH: &str = "endpointPath";
pub const META_API_CONFIG_ID: &str = "apiConfigId";
pub const META_OPERATION_ID: &str = "operationId";

/// Everything the invocation engine needs to turn a call into a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContext {
    pub http_method: HttpMethod,
    /// Path template relative to the configuration's base URL.
    pub endpoint_path: String,
    /// Owning API configuration.
    pub api_config_id: String,
    pub operation_id: String,
}

impl ExecutionContext {
    fn validate(&self) -> std::result::Result<(), String> {
        if self.api_config_id.trim().is_empty() {
            return Err("execution context has no owning API configuration".to_string());
        }
        if !self.endpoint_path.starts_with('/') {
            return Err(format!(
                "endpoint path '{}' must start with '/'",
                self.endpoint_path
            ));
        }
        if self.operation_id.trim().is_empty() {
            return Err("execution context has no operation id".to_string());
        }
        Ok(())
    }
}

/// Inputs to [`ToolDescriptor::new`].
#[derive(Debug, Clone)]
pub struct ToolDescriptorParts {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub execution: ExecutionContext,
    pub metadata: Map<String, Value>,
    pub tags: BTreeSet<String>,
    pub version: String,
    pub deprecated: bool,
}

/// A tool that can be listed and invoked.
///
/// Only constructible through [`ToolDescriptor::new`] (or deserialization, which runs the same
/// checks), so every instance has a name, a description, an object input schema and an
/// owning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ToolDescriptorRepr", into = "ToolDescriptorRepr")]
pub struct ToolDescriptor {
    name: String,
    description: String,
    input_schema: Value,
    execution: ExecutionContext,
    metadata: Map<String, Value>,
    tags: BTreeSet<String>,
    version: String,
    deprecated: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ToolDescriptor {
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::InvalidDescriptor`] for an empty name or description, an
    /// input schema that is not an object schema, or an incomplete execution context.
    pub fn new(parts: ToolDescriptorParts) -> Result<Self> {
        let now = Utc::now();
        Self::build(parts, now, now)
    }

    fn build(
        parts: ToolDescriptorParts,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self> {
        let ToolDescriptorParts {
            name,
            description,
            input_schema,
            execution,
            mut metadata,
            tags,
            version,
            deprecated,
        } = parts;

        if name.trim().is_empty() {
            return Err(invalid("tool name is empty"));
        }
        if description.trim().is_empty() {
            return Err(invalid(format!("tool '{name}' has an empty description")));
        }
        let input_schema = normalize_input_schema(&name, input_schema)?;
        execution
            .validate()
            .map_err(|e| invalid(format!("tool '{name}': {e}")))?;

        metadata.insert(META_HTTP_METHOD.to_string(), json!(execution.http_method));
        metadata.insert(
            META_ENDPOINT_PATH.to_string(),
            json!(execution.endpoint_path),
        );
        metadata.insert(
            META_API_CONFIG_ID.to_string(),
            json!(execution.api_config_id),
        );
        metadata.insert(META_OPERATION_ID.to_string(), json!(execution.operation_id));

        Ok(Self {
            name,
            description,
            input_schema,
            execution,
            metadata,
            tags,
            version,
            deprecated,
            created_at,
            updated_at,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }

    #[must_use]
    pub fn execution(&self) -> &ExecutionContext {
        &self.execution
    }

    #[must_use]
    pub fn config_id(&self) -> &str {
        &self.execution.api_config_id
    }

    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn deprecated(&self) -> bool {
        self.deprecated
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Same tool with `updated_at` bumped and `created_at` carried over from `previous`.
    #[must_use]
    pub fn superseding(mut self, previous: &ToolDescriptor) -> Self {
        self.created_at = previous.created_at;
        self.updated_at = Utc::now().max(previous.updated_at);
        self
    }
}

fn normalize_input_schema(name: &str, schema: Value) -> Result<Value> {
    let Value::Object(mut schema) = schema else {
        return Err(invalid(format!("tool '{name}': input schema must be an object")));
    };
    match schema.get("type") {
        Some(Value::String(t)) if t == "object" => {}
        _ => {
            return Err(invalid(format!(
                "tool '{name}': input schema must have type 'object'"
            )));
        }
    }

    let properties = schema
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(properties) = properties.as_object() else {
        return Err(invalid(format!(
            "tool '{name}': input schema 'properties' must be an object"
        )));
    };
    let property_names: BTreeSet<String> = properties.keys().cloned().collect();

    if let Some(required) = schema.get("required") {
        let Some(required) = required.as_array() else {
            return Err(invalid(format!(
                "tool '{name}': input schema 'required' must be an array"
            )));
        };
        for entry in required {
            match entry.as_str() {
                Some(r) if property_names.contains(r) => {}
                Some(r) => {
                    return Err(invalid(format!(
                        "tool '{name}': required property '{r}' is not declared"
                    )));
                }
                None => {
                    return Err(invalid(format!(
                        "tool '{name}': input schema 'required' must contain strings"
                    )));
                }
            }
        }
    }

    Ok(Value::Object(schema))
}

fn invalid(message: impl Into<String>) -> OpenApiToolsError {
    OpenApiToolsError::InvalidDescriptor(message.into())
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolDescriptorRepr {
    name: String,
    description: String,
    input_schema: Value,
    execution: ExecutionContext,
    #[serde(default)]
    metadata: Map<String, Value>,
    #[serde(default)]
    tags: BTreeSet<String>,
    version: String,
    #[serde(default)]
    deprecated: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ToolDescriptorRepr> for ToolDescriptor {
    type Error = OpenApiToolsError;

    fn try_from(r: ToolDescriptorRepr) -> Result<Self> {
        Self::build(
            ToolDescriptorParts {
                name: r.name,
                description: r.description,
                input_schema: r.input_schema,
                execution: r.execution,
                metadata: r.metadata,
                tags: r.tags,
                version: r.version,
                deprecated: r.deprecated,
            },
            r.created_at,
            r.updated_at,
        )
    }
}

impl From<ToolDescriptor> for ToolDescriptorRepr {
    fn from(t: ToolDescriptor) -> Self {
        Self {
            name: t.name,
            description: t.description,
            input_schema: t.input_schema,
            execution: t.execution,
            metadata: t.metadata,
            tags: t.tags,
            version: t.version,
            deprecated: t.deprecated,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}
