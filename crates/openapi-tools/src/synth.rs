//! Endpoint descriptor to tool descriptor.

use crate::config::{GenerationOptions, NamingConvention};
use crate::descriptor::{ExecutionContext, ToolDescriptor, ToolDescriptorParts};
use crate::endpoint::EndpointDescriptor;
use crate::error::{OpenApiToolsError, Result};
use crate::naming::{MAX_TOOL_NAME_LEN, descriptive_name, generate_canonical_name};
use crate::schema::tool_property;
use chrono::{SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// The request body is exposed under this argument name.
pub const REQUEST_BODY_ARG: &str = "requestBody";

/// Header parameters are exposed as `header_{name}` when enabled.
pub const HEADER_ARG_PREFIX: &str = "header_";

const DEFAULT_TOOL_VERSION: &str = "1.0.0";

/// API-level facts shared by every tool generated from one spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSpecContext {
    /// Owning API configuration id.
    pub config_id: String,
    pub title: String,
    pub version: String,
    pub servers: Vec<String>,
}

/// Turns endpoints into tools for one set of [`GenerationOptions`].
#[derive(Debug, Clone)]
pub struct ToolSynthesizer {
    options: GenerationOptions,
    path_patterns: Vec<Regex>,
}

impl ToolSynthesizer {
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::Config`] for an invalid path pattern, or when the
    /// prefixed naming convention has no prefix.
    pub fn new(options: GenerationOptions) -> Result<Self> {
        if options.naming == NamingConvention::PrefixedOperationId
            && options
                .name_prefix
                .as_deref()
                .is_none_or(|p| p.trim().is_empty())
        {
            return Err(OpenApiToolsError::Config(
                "naming 'prefixedOperationId' requires 'namePrefix'".to_string(),
            ));
        }

        let path_patterns = options
            .path_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    OpenApiToolsError::Config(format!("Invalid path pattern '{p}': {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            options,
            path_patterns,
        })
    }

    #[must_use]
    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Whether an endpoint passes every configured filter.
    #[must_use]
    pub fn should_include(&self, endpoint: &EndpointDescriptor) -> bool {
        let opts = &self.options;
        if endpoint.deprecated && opts.skip_deprecated {
            return false;
        }
        if !opts.methods.is_empty() && !opts.methods.contains(&endpoint.method) {
            return false;
        }
        if !opts.tags.is_empty() && !endpoint.tags.iter().any(|t| opts.tags.contains(t)) {
            return false;
        }
        if !self.path_patterns.is_empty()
            && !self.path_patterns.iter().any(|re| re.is_match(&endpoint.path))
        {
            return false;
        }
        true
    }

    /// Tool name for `endpoint` under the configured convention.
    #[must_use]
    pub fn tool_name(&self, endpoint: &EndpointDescriptor) -> String {
        let method_path = || generate_canonical_name(endpoint.method.as_str(), &endpoint.path);
        match self.options.naming {
            NamingConvention::OperationId => endpoint.operation_id.clone(),
            NamingConvention::MethodPath => method_path(),
            NamingConvention::Descriptive => endpoint
                .summary
                .as_deref()
                .and_then(descriptive_name)
                .unwrap_or_else(method_path),
            NamingConvention::PrefixedOperationId => {
                let prefix = self.options.name_prefix.as_deref().unwrap_or_default();
                let name = format!("{prefix}_{}", endpoint.operation_id);
                name.chars().take(MAX_TOOL_NAME_LEN).collect()
            }
        }
    }

    /// Build the tool descriptor for one endpoint.
    ///
    /// Everything except the timestamps is a pure function of the inputs.
    ///
    /// # Errors
    ///
    /// Returns [`OpenApiToolsError::InvalidDescriptor`] if the result fails descriptor
    /// validation (e.g. an empty operation id under the `operationId` convention).
    pub fn synthesize(
        &self,
        endpoint: &EndpointDescriptor,
        api: &ApiSpecContext,
    ) -> Result<ToolDescriptor> {
        self.synthesize_named(endpoint, api, self.tool_name(endpoint))
    }

    /// [`ToolSynthesizer::synthesize`] with an explicit tool name (e.g. de-duplicated).
    ///
    /// # Errors
    ///
    /// Same as [`ToolSynthesizer::synthesize`].
    pub fn synthesize_named(
        &self,
        endpoint: &EndpointDescriptor,
        api: &ApiSpecContext,
        name: String,
    ) -> Result<ToolDescriptor> {
        let description = self.description(endpoint, api);
        let input_schema = self.input_schema(endpoint);
        let metadata = self.metadata(endpoint, api);

        let mut tags: BTreeSet<String> = endpoint.tags.iter().cloned().collect();
        tags.extend(self.options.custom_tags.iter().cloned());

        let version = self
            .options
            .tool_version
            .clone()
            .or_else(|| (!api.version.trim().is_empty()).then(|| api.version.clone()))
            .unwrap_or_else(|| DEFAULT_TOOL_VERSION.to_string());

        ToolDescriptor::new(ToolDescriptorParts {
            name,
            description,
            input_schema,
            execution: ExecutionContext {
                http_method: endpoint.method,
                endpoint_path: endpoint.path.clone(),
                api_config_id: api.config_id.clone(),
                operation_id: endpoint.operation_id.clone(),
            },
            metadata,
            tags,
            version,
            deprecated: endpoint.deprecated,
        })
    }

    fn description(&self, endpoint: &EndpointDescriptor, api: &ApiSpecContext) -> String {
        let opts = &self.options;
        let mut out = endpoint
            .summary
            .clone()
            .or_else(|| endpoint.description.clone())
            .unwrap_or_else(|| format!("Executes {} request to {}", endpoint.method, endpoint.path));

        if opts.include_api_context && !api.title.is_empty() {
            let _ = write!(out, "\n\nAPI: {}", api.title);
            if !api.version.is_empty() {
                let _ = write!(out, " v{}", api.version);
            }
        }

        if opts.include_endpoint {
            let _ = write!(out, "\n\nEndpoint: {} {}", endpoint.method, endpoint.path);
        }

        if opts.include_parameter_list {
            let params: Vec<_> = endpoint
                .path_params
                .iter()
                .chain(&endpoint.query_params)
                .chain(
                    endpoint
                        .header_params
                        .iter()
                        .filter(|_| opts.include_header_params),
                )
                .collect();
            if !params.is_empty() {
                out.push_str("\n\nParameters:");
                for p in params {
                    let required = if p.required { "required" } else { "optional" };
                    let _ = write!(out, "\n- {} ({}, {required})", p.name, p.location);
                    if let Some(d) = p.description.as_deref().filter(|d| !d.trim().is_empty()) {
                        let _ = write!(out, ": {d}");
                    }
                }
            }
        }

        if endpoint.deprecated && opts.include_deprecation_notice {
            out.push_str("\n\nDEPRECATED: this endpoint is deprecated and may be removed.");
        }

        out
    }

    fn input_schema(&self, endpoint: &EndpointDescriptor) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for p in endpoint.path_params.iter().chain(&endpoint.query_params) {
            properties.insert(
                p.name.clone(),
                tool_property(&p.schema, p.description.as_deref()),
            );
            if p.required {
                required.push(json!(p.name));
            }
        }

        if self.options.include_header_params {
            for p in &endpoint.header_params {
                let key = format!("{HEADER_ARG_PREFIX}{}", p.name);
                properties.insert(key.clone(), tool_property(&p.schema, p.description.as_deref()));
                if p.required {
                    required.push(json!(key));
                }
            }
        }

        if let Some(body) = &endpoint.request_body {
            properties.insert(REQUEST_BODY_ARG.to_string(), body.schema.clone());
            required.push(json!(REQUEST_BODY_ARG));
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }

    fn metadata(&self, endpoint: &EndpointDescriptor, api: &ApiSpecContext) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("apiTitle".to_string(), json!(api.title));
        meta.insert("apiVersion".to_string(), json!(api.version));
        meta.insert("servers".to_string(), json!(api.servers));
        meta.insert("tags".to_string(), json!(endpoint.tags));
        meta.insert("security".to_string(), json!(endpoint.security));
        meta.insert(
            "responseCodes".to_string(),
            json!(endpoint.responses.keys().collect::<Vec<_>>()),
        );
        meta.insert(
            "generatedAt".to_string(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        if endpoint.operation_id_synthesized {
            meta.insert("operationIdSynthesized".to_string(), json!(true));
        }
        for (k, v) in &self.options.custom_metadata {
            meta.insert(k.clone(), v.clone());
        }
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{ParamLocation, ParameterDescriptor, RequestBodyDescriptor};
    use std::collections::BTreeMap;
    use unrelated_http_tools::HttpMethod;

    fn param(name: &str, location: ParamLocation, required: bool, schema: Value) -> ParameterDescriptor {
        ParameterDescriptor {
            name: name.to_string(),
            location,
            param_type: crate::schema::declared_type(&schema),
            required,
            description: Some(format!("The {name}")),
            example: None,
            schema,
        }
    }

    fn get_pet() -> EndpointDescriptor {
        EndpointDescriptor {
            method: HttpMethod::Get,
            path: "/pets/{id}".to_string(),
            operation_id: "getPet".to_string(),
            operation_id_synthesized: false,
            summary: Some("Find pet by ID".to_string()),
            description: Some("Returns a single pet".to_string()),
            path_params: vec![param("id", ParamLocation::Path, true, json!({"type": "string"}))],
            query_params: vec![param(
                "limit",
                ParamLocation::Query,
                false,
                json!({"type": "integer", "minimum": 1, "maximum": 100}),
            )],
            header_params: vec![param(
                "X-Trace",
                ParamLocation::Header,
                true,
                json!({"type": "string"}),
            )],
            request_body: None,
            responses: BTreeMap::new(),
            tags: vec!["pets".to_string()],
            security: vec!["apiKey".to_string()],
            deprecated: false,
        }
    }

    fn api() -> ApiSpecContext {
        ApiSpecContext {
            config_id: "petstore".to_string(),
            title: "Petstore".to_string(),
            version: "1.2.0".to_string(),
            servers: vec!["https://petstore.example.com".to_string()],
        }
    }

    fn synth(options: GenerationOptions) -> ToolSynthesizer {
        ToolSynthesizer::new(options).unwrap()
    }

    #[test]
    fn schema_has_one_property_per_path_and_query_param() {
        let tool = synth(GenerationOptions::default())
            .synthesize(&get_pet(), &api())
            .unwrap();
        let schema = tool.input_schema();
        let props = schema["properties"].as_object().unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(schema["required"], json!(["id"]));
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(props["limit"]["type"], json!("number"));
        assert_eq!(props["limit"]["maximum"], json!(100));
    }

    #[test]
    fn body_adds_a_required_property() {
        let mut endpoint = get_pet();
        endpoint.method = HttpMethod::Put;
        endpoint.request_body = Some(RequestBodyDescriptor {
            media_type: "application/json".to_string(),
            required: false,
            schema: json!({"type": "object", "properties": {"name": {"type": "string"}}}),
        });
        let tool = synth(GenerationOptions::default())
            .synthesize(&endpoint, &api())
            .unwrap();
        let schema = tool.input_schema();
        assert_eq!(schema["properties"].as_object().unwrap().len(), 3);
        assert_eq!(schema["required"], json!(["id", "requestBody"]));
        assert_eq!(
            schema["properties"]["requestBody"]["properties"]["name"]["type"],
            json!("string")
        );
    }

    #[test]
    fn header_params_only_when_enabled() {
        let tool = synth(GenerationOptions {
            include_header_params: true,
            ..GenerationOptions::default()
        })
        .synthesize(&get_pet(), &api())
        .unwrap();
        let schema = tool.input_schema();
        assert!(schema["properties"]["header_X-Trace"].is_object());
        assert_eq!(schema["required"], json!(["id", "header_X-Trace"]));
    }

    #[test]
    fn endpoint_without_parameters_gets_an_empty_object_schema() {
        let mut endpoint = get_pet();
        endpoint.path = "/health".to_string();
        endpoint.path_params.clear();
        endpoint.query_params.clear();
        endpoint.header_params.clear();
        let tool = synth(GenerationOptions::default())
            .synthesize(&endpoint, &api())
            .unwrap();
        assert_eq!(*tool.input_schema(), crate::schema::empty_object_schema());
    }

    #[test]
    fn naming_conventions() {
        let endpoint = get_pet();
        let name = |naming, prefix: Option<&str>| {
            synth(GenerationOptions {
                naming,
                name_prefix: prefix.map(str::to_string),
                ..GenerationOptions::default()
            })
            .tool_name(&endpoint)
        };
        assert_eq!(name(NamingConvention::OperationId, None), "getPet");
        assert_eq!(name(NamingConvention::MethodPath, None), "get_pets_id");
        assert_eq!(name(NamingConvention::Descriptive, None), "find_pet_by_id");
        assert_eq!(
            name(NamingConvention::PrefixedOperationId, Some("store")),
            "store_getPet"
        );

        let mut no_summary = endpoint.clone();
        no_summary.summary = None;
        let descriptive = synth(GenerationOptions {
            naming: NamingConvention::Descriptive,
            ..GenerationOptions::default()
        });
        assert_eq!(descriptive.tool_name(&no_summary), "get_pets_id");
    }

    #[test]
    fn prefixed_convention_requires_a_prefix() {
        let err = ToolSynthesizer::new(GenerationOptions {
            naming: NamingConvention::PrefixedOperationId,
            ..GenerationOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::Config(_)));
    }

    #[test]
    fn description_assembly() {
        let mut endpoint = get_pet();
        endpoint.deprecated = true;
        let tool = synth(GenerationOptions {
            include_api_context: true,
            include_endpoint: true,
            include_parameter_list: true,
            ..GenerationOptions::default()
        })
        .synthesize(&endpoint, &api())
        .unwrap();
        assert_eq!(
            tool.description(),
            "Find pet by ID\n\nAPI: Petstore v1.2.0\n\nEndpoint: GET /pets/{id}\n\n\
             Parameters:\n- id (path, required): The id\n- limit (query, optional): The limit\n\n\
             DEPRECATED: this endpoint is deprecated and may be removed."
        );

        endpoint.summary = None;
        endpoint.description = None;
        endpoint.deprecated = false;
        let tool = synth(GenerationOptions::default())
            .synthesize(&endpoint, &api())
            .unwrap();
        assert_eq!(tool.description(), "Executes GET request to /pets/{id}");
    }

    #[test]
    fn metadata_links_back_to_the_endpoint() {
        let mut custom = Map::new();
        custom.insert("team".to_string(), json!("platform"));
        let tool = synth(GenerationOptions {
            custom_metadata: custom,
            custom_tags: vec!["generated".to_string()],
            ..GenerationOptions::default()
        })
        .synthesize(&get_pet(), &api())
        .unwrap();

        let meta = tool.metadata();
        assert_eq!(meta["httpMethod"], json!("GET"));
        assert_eq!(meta["endpointPath"], json!("/pets/{id}"));
        assert_eq!(meta["apiConfigId"], json!("petstore"));
        assert_eq!(meta["operationId"], json!("getPet"));
        assert_eq!(meta["apiTitle"], json!("Petstore"));
        assert_eq!(meta["security"], json!(["apiKey"]));
        assert_eq!(meta["team"], json!("platform"));
        assert!(meta["generatedAt"].is_string());
        assert!(tool.tags().contains("pets"));
        assert!(tool.tags().contains("generated"));
        assert_eq!(tool.version(), "1.2.0");
        assert_eq!(tool.execution().http_method, HttpMethod::Get);
    }

    #[test]
    fn synthesis_is_deterministic() {
        let s = synth(GenerationOptions {
            naming: NamingConvention::Descriptive,
            include_parameter_list: true,
            ..GenerationOptions::default()
        });
        let a = s.synthesize(&get_pet(), &api()).unwrap();
        let b = s.synthesize(&get_pet(), &api()).unwrap();
        assert_eq!(a.name(), b.name());
        assert_eq!(a.description(), b.description());
        assert_eq!(a.input_schema(), b.input_schema());
        assert_eq!(a.execution(), b.execution());
    }

    #[test]
    fn filters_are_anded() {
        let endpoint = get_pet();
        let include = |options: GenerationOptions| synth(options).should_include(&endpoint);

        assert!(include(GenerationOptions::default()));
        assert!(include(GenerationOptions {
            methods: vec![HttpMethod::Get],
            tags: vec!["pets".to_string()],
            path_patterns: vec!["^/pets".to_string()],
            ..GenerationOptions::default()
        }));
        assert!(!include(GenerationOptions {
            methods: vec![HttpMethod::Post],
            ..GenerationOptions::default()
        }));
        assert!(!include(GenerationOptions {
            tags: vec!["store".to_string()],
            ..GenerationOptions::default()
        }));
        assert!(!include(GenerationOptions {
            methods: vec![HttpMethod::Get],
            path_patterns: vec!["^/store".to_string(), "^/users".to_string()],
            ..GenerationOptions::default()
        }));

        let mut deprecated = endpoint.clone();
        deprecated.deprecated = true;
        assert!(
            !synth(GenerationOptions {
                skip_deprecated: true,
                ..GenerationOptions::default()
            })
            .should_include(&deprecated)
        );
    }

    #[test]
    fn invalid_path_pattern_is_a_config_error() {
        let err = ToolSynthesizer::new(GenerationOptions {
            path_patterns: vec!["(".to_string()],
            ..GenerationOptions::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("Invalid path pattern"));
    }
}
