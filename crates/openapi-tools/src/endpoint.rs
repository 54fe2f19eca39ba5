//! Canonical description of one `OpenAPI` operation.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use unrelated_http_tools::HttpMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParamLocation::Path => "path",
            ParamLocation::Query => "query",
            ParamLocation::Header => "header",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDescriptor {
    pub name: String,
    pub location: ParamLocation,
    /// Declared schema type; `string` when the schema has none.
    pub param_type: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,
    /// Raw schema fragment with `$ref`s inlined.
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBodyDescriptor {
    pub media_type: String,
    pub required: bool,
    pub schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDescriptor {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// One path x method pair. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub method: HttpMethod,
    /// Path template with `{param}` placeholders.
    pub path: String,
    pub operation_id: String,
    /// `true` when the spec had no `operationId` and one was derived from method + path.
    pub operation_id_synthesized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub path_params: Vec<ParameterDescriptor>,
    pub query_params: Vec<ParameterDescriptor>,
    pub header_params: Vec<ParameterDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBodyDescriptor>,
    /// Status code (`200`, `4XX`, `default`) to response.
    pub responses: BTreeMap<String, ResponseDescriptor>,
    pub tags: Vec<String>,
    /// Security scheme names (operation-level, else document-level).
    pub security: Vec<String>,
    pub deprecated: bool,
}

impl EndpointDescriptor {
    /// All parameters in path, query, header order.
    pub fn parameters(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.path_params
            .iter()
            .chain(&self.query_params)
            .chain(&self.header_params)
    }

    /// `GET /pets/{id}`.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}
