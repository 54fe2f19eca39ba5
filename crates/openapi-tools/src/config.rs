use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use unrelated_http_tools::HttpMethod;

/// Hash verification policy.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HashPolicy {
    /// Log warning if hash doesn't match.
    #[default]
    Warn,
    /// Fail loading if hash doesn't match.
    Fail,
    /// Ignore hash verification.
    Ignore,
}

/// How tool names are derived from an endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NamingConvention {
    /// The raw `operationId` (synthesized from method + path when absent).
    #[default]
    OperationId,
    /// `{method}_{path}` with non-alphanumeric runs collapsed to `_`.
    MethodPath,
    /// Derived from the summary; falls back to `methodPath` without one.
    Descriptive,
    /// `{namePrefix}_{operationId}`.
    PrefixedOperationId,
}

/// Options controlling how endpoints become tools.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationOptions {
    pub naming: NamingConvention,

    /// Required for [`NamingConvention::PrefixedOperationId`].
    pub name_prefix: Option<String>,

    /// Expose header parameters as `header_{name}` properties.
    pub include_header_params: bool,

    /// Append "API: {title} v{version}" to descriptions.
    pub include_api_context: bool,

    /// Append "Endpoint: {METHOD} {path}" to descriptions.
    pub include_endpoint: bool,

    /// Append a bulleted parameter list to descriptions.
    pub include_parameter_list: bool,

    pub include_deprecation_notice: bool,

    pub skip_deprecated: bool,

    /// Method allow-list (empty = all).
    pub methods: Vec<HttpMethod>,

    /// Tag allow-list (empty = all).
    pub tags: Vec<String>,

    /// Path regexes (empty = all). An endpoint is kept when any pattern matches.
    pub path_patterns: Vec<String>,

    /// Merged into every descriptor's metadata.
    pub custom_metadata: Map<String, Value>,

    /// Added to every descriptor's tag set.
    pub custom_tags: Vec<String>,

    /// Tool version; defaults to the API version.
    pub tool_version: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            naming: NamingConvention::default(),
            name_prefix: None,
            include_header_params: false,
            include_api_context: false,
            include_endpoint: false,
            include_parameter_list: false,
            include_deprecation_notice: true,
            skip_deprecated: false,
            methods: Vec::new(),
            tags: Vec::new(),
            path_patterns: Vec::new(),
            custom_metadata: Map::new(),
            custom_tags: Vec::new(),
            tool_version: None,
        }
    }
}
