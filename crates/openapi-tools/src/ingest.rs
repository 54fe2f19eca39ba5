//! Specification ingestion: source text to a parsed document, endpoint descriptors and a
//! validation report.

use crate::config::HashPolicy;
use crate::endpoint::{
    EndpointDescriptor, ParamLocation, ParameterDescriptor, RequestBodyDescriptor,
    ResponseDescriptor,
};
use crate::error::{OpenApiToolsError, Result};
use crate::naming::generate_canonical_name;
use crate::resolver::{DocId, OpenApiResolver};
use crate::schema::declared_type;
use crate::source::{SpecSource, SpecSourceProvider, parse_document, spec_hash};
use openapiv3::{
    MediaType, OpenAPI, Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr,
    SecurityRequirement, StatusCode,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use unrelated_http_tools::HttpMethod;

/// A syntactically valid `OpenAPI` 3 document with at least one path.
#[derive(Debug, Clone)]
pub struct ParsedSpec {
    pub source: SpecSource,
    pub document: OpenAPI,
    /// `sha256:<hex>` of the source text.
    pub hash: String,
}

impl ParsedSpec {
    #[must_use]
    pub fn title(&self) -> &str {
        &self.document.info.title
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.document.info.version
    }

    #[must_use]
    pub fn servers(&self) -> Vec<String> {
        self.document.servers.iter().map(|s| s.url.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted location, e.g. `info.title` or `paths./pets.get`.
    pub location: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpecValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl SpecValidationReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            location: location.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            location: location.into(),
            message: message.into(),
        });
    }
}

#[derive(Clone)]
pub struct SpecIngester {
    provider: Arc<dyn SpecSourceProvider>,
}

impl SpecIngester {
    #[must_use]
    pub fn new(provider: Arc<dyn SpecSourceProvider>) -> Self {
        Self { provider }
    }

    /// Load and parse a specification.
    ///
    /// # Errors
    ///
    /// Fails when the source cannot be loaded, is not a valid `OpenAPI` 3 document, or has no
    /// paths. Never returns a partial document.
    pub async fn parse(&self, source: &SpecSource) -> Result<ParsedSpec> {
        self.parse_pinned(source, None, HashPolicy::Ignore).await
    }

    /// Like [`SpecIngester::parse`], verifying the source text against an expected
    /// `sha256:<hex>` hash.
    ///
    /// # Errors
    ///
    /// Same as [`SpecIngester::parse`], plus a hash mismatch under [`HashPolicy::Fail`].
    pub async fn parse_pinned(
        &self,
        source: &SpecSource,
        expected_hash: Option<&str>,
        policy: HashPolicy,
    ) -> Result<ParsedSpec> {
        let location = source.location();
        let text = self.provider.load(source).await?;
        let hash = spec_hash(&text);

        if let Some(expected) = expected_hash
            && expected != hash
        {
            match policy {
                HashPolicy::Fail => {
                    return Err(OpenApiToolsError::SpecHashMismatch {
                        location,
                        expected: expected.to_string(),
                        actual: hash,
                    });
                }
                HashPolicy::Warn => {
                    tracing::warn!(
                        spec = %location,
                        expected = %expected,
                        actual = %hash,
                        "Spec hash mismatch"
                    );
                }
                HashPolicy::Ignore => {}
            }
        }

        let document = parse_text(&location, &text)?;
        tracing::debug!(
            spec = %location,
            paths = document.paths.paths.len(),
            "Parsed OpenAPI spec"
        );

        Ok(ParsedSpec {
            source: source.clone(),
            document,
            hash,
        })
    }

    /// One descriptor per path x method.
    ///
    /// Operations whose references cannot be resolved are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error only if the resolver cannot be initialized.
    pub async fn extract_endpoints(&self, spec: &ParsedSpec) -> Result<Vec<EndpointDescriptor>> {
        let resolver = OpenApiResolver::new(
            DocId::for_source(&spec.source),
            &spec.document,
            self.provider.as_ref(),
        )?;
        let location = spec.source.location();
        let mut endpoints = Vec::new();

        for (path, item) in &spec.document.paths.paths {
            let (path_doc, path_item) =
                match resolver.resolve_path_item(resolver.root_doc(), item).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!(spec = %location, path = %path, error = %e, "Skipping path");
                        continue;
                    }
                };

            for method in HttpMethod::ALL {
                let Some(op) = operation_for(&path_item, method) else {
                    continue;
                };
                let input = OperationInput {
                    doc: &path_doc,
                    path,
                    method,
                    path_item_params: &path_item.parameters,
                    operation: op,
                    spec_security: spec.document.security.as_deref(),
                };
                match extract_endpoint(&resolver, input).await {
                    Ok(endpoint) => endpoints.push(endpoint),
                    Err(e) => {
                        tracing::warn!(
                            spec = %location,
                            operation = %format!("{method} {path}"),
                            error = %e,
                            "Skipping operation"
                        );
                    }
                }
            }
        }

        Ok(endpoints)
    }

    /// Structural checks that do not prevent tool generation.
    #[must_use]
    pub fn validate(&self, spec: &ParsedSpec) -> SpecValidationReport {
        let mut report = SpecValidationReport::default();
        let doc = &spec.document;

        if doc.info.title.trim().is_empty() {
            report.error("info.title", "missing API title");
        }
        if doc.info.version.trim().is_empty() {
            report.warn("info.version", "missing API version");
        }
        if doc.servers.is_empty() {
            report.warn("servers", "no servers declared; a base URL must be configured");
        }

        for (path, item) in &doc.paths.paths {
            let ReferenceOr::Item(item) = item else {
                continue;
            };
            let mut operations = 0usize;
            for method in HttpMethod::ALL {
                let Some(op) = operation_for(item, method) else {
                    continue;
                };
                operations += 1;
                let op_location = format!("paths.{path}.{}", method.as_str().to_lowercase());
                if op.operation_id.as_deref().is_none_or(|id| id.trim().is_empty()) {
                    report.warn(op_location.clone(), "operation has no operationId");
                }
                let has_summary = op.summary.as_deref().is_some_and(|s| !s.trim().is_empty());
                let has_description = op
                    .description
                    .as_deref()
                    .is_some_and(|s| !s.trim().is_empty());
                if !has_summary && !has_description {
                    report.warn(op_location, "operation has neither summary nor description");
                }
            }
            if operations == 0 {
                report.warn(format!("paths.{path}"), "path declares no operations");
            }
        }

        report
    }
}

/// Parse document text into an `OpenAPI` model.
///
/// A missing `info`, `info.title` or `info.version` is tolerated here and reported by
/// validation instead.
///
/// # Errors
///
/// Returns [`OpenApiToolsError::SpecParse`] for anything that is not an `OpenAPI` 3 document and
/// [`OpenApiToolsError::NoPaths`] when it declares no paths.
pub fn parse_text(location: &str, text: &str) -> Result<OpenAPI> {
    let parse_error = |diagnostics: Vec<String>| OpenApiToolsError::SpecParse {
        location: location.to_string(),
        diagnostics,
    };

    let mut value = parse_document(text).map_err(|e| parse_error(vec![e.to_string()]))?;
    let Some(root) = value.as_object_mut() else {
        return Err(parse_error(vec!["document root is not a mapping".to_string()]));
    };

    let version = match root.get("openapi") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };
    match version {
        Some(v) if v.starts_with("3.") => {
            root.insert("openapi".to_string(), Value::String(v));
        }
        Some(v) => {
            return Err(parse_error(vec![format!(
                "unsupported 'openapi' version '{v}' (expected 3.x)"
            )]));
        }
        None => {
            return Err(parse_error(vec![
                "missing 'openapi' version field (expected 3.x)".to_string(),
            ]));
        }
    }

    let info = root.entry("info").or_insert_with(|| json!({}));
    if let Some(info) = info.as_object_mut() {
        info.entry("title").or_insert_with(|| json!(""));
        info.entry("version").or_insert_with(|| json!(""));
    }
    root.entry("paths").or_insert_with(|| json!({}));

    let document: OpenAPI =
        serde_json::from_value(value).map_err(|e| parse_error(vec![e.to_string()]))?;

    if document.paths.paths.is_empty() {
        return Err(OpenApiToolsError::NoPaths {
            location: location.to_string(),
        });
    }

    Ok(document)
}

fn operation_for(item: &PathItem, method: HttpMethod) -> Option<&Operation> {
    match method {
        HttpMethod::Get => item.get.as_ref(),
        HttpMethod::Put => item.put.as_ref(),
        HttpMethod::Post => item.post.as_ref(),
        HttpMethod::Delete => item.delete.as_ref(),
        HttpMethod::Options => item.options.as_ref(),
        HttpMethod::Head => item.head.as_ref(),
        HttpMethod::Patch => item.patch.as_ref(),
        HttpMethod::Trace => item.trace.as_ref(),
    }
}

struct OperationInput<'a> {
    doc: &'a DocId,
    path: &'a str,
    method: HttpMethod,
    path_item_params: &'a [ReferenceOr<Parameter>],
    operation: &'a Operation,
    spec_security: Option<&'a [SecurityRequirement]>,
}

async fn extract_endpoint(
    resolver: &OpenApiResolver<'_>,
    input: OperationInput<'_>,
) -> Result<EndpointDescriptor> {
    let op = input.operation;

    let mut path_params = Vec::new();
    let mut query_params = Vec::new();
    let mut header_params = Vec::new();
    let merged =
        merge_parameters(resolver, input.doc, input.path_item_params, &op.parameters).await?;
    for (param_doc, param) in merged {
        let (location, data) = match &param {
            Parameter::Path { parameter_data, .. } => (ParamLocation::Path, parameter_data),
            Parameter::Query { parameter_data, .. } => (ParamLocation::Query, parameter_data),
            Parameter::Header { parameter_data, .. } => (ParamLocation::Header, parameter_data),
            Parameter::Cookie { .. } => continue,
        };

        let schema = match &data.format {
            ParameterSchemaOrContent::Schema(s) => resolver.schema_json(&param_doc, s).await,
            ParameterSchemaOrContent::Content(content) => {
                match content.first().and_then(|(_, media)| media.schema.as_ref()) {
                    Some(s) => resolver.schema_json(&param_doc, s).await,
                    None => json!({"type": "string"}),
                }
            }
        };

        let descriptor = ParameterDescriptor {
            name: data.name.clone(),
            location,
            param_type: declared_type(&schema),
            // Path parameters are always required in OpenAPI.
            required: data.required || location == ParamLocation::Path,
            description: data.description.clone(),
            example: data.example.clone(),
            schema,
        };
        match location {
            ParamLocation::Path => path_params.push(descriptor),
            ParamLocation::Query => query_params.push(descriptor),
            ParamLocation::Header => header_params.push(descriptor),
        }
    }

    let request_body = match &op.request_body {
        Some(body) => {
            let (body_doc, body) = resolver.resolve_request_body(input.doc, body).await?;
            match preferred_media(&body.content) {
                Some((media_type, media)) => {
                    let schema = match &media.schema {
                        Some(s) => resolver.schema_json(&body_doc, s).await,
                        None => json!({}),
                    };
                    Some(RequestBodyDescriptor {
                        media_type: media_type.to_string(),
                        required: body.required,
                        schema,
                    })
                }
                None => None,
            }
        }
        None => None,
    };

    let mut responses = BTreeMap::new();
    let declared = op
        .responses
        .responses
        .iter()
        .map(|(code, r)| (status_key(code), r))
        .chain(op.responses.default.iter().map(|r| ("default".to_string(), r)));
    for (code, response) in declared {
        let (response_doc, response) = match resolver.resolve_response(input.doc, response).await {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(status = %code, error = %e, "Skipping unresolvable response");
                continue;
            }
        };
        let (media_type, schema) = match preferred_media(&response.content) {
            Some((media_type, media)) => {
                let schema = match &media.schema {
                    Some(s) => Some(resolver.schema_json(&response_doc, s).await),
                    None => None,
                };
                (Some(media_type.to_string()), schema)
            }
            None => (None, None),
        };
        responses.insert(
            code,
            ResponseDescriptor {
                description: response.description.clone(),
                media_type,
                schema,
            },
        );
    }

    let security = security_names(op.security.as_deref().or(input.spec_security));

    let (operation_id, operation_id_synthesized) = match op
        .operation_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        Some(id) => (id.to_string(), false),
        None => (generate_canonical_name(input.method.as_str(), input.path), true),
    };

    Ok(EndpointDescriptor {
        method: input.method,
        path: input.path.to_string(),
        operation_id,
        operation_id_synthesized,
        summary: non_empty(op.summary.as_deref()),
        description: non_empty(op.description.as_deref()),
        path_params,
        query_params,
        header_params,
        request_body,
        responses,
        tags: op.tags.clone(),
        security,
        deprecated: op.deprecated,
    })
}

async fn merge_parameters(
    resolver: &OpenApiResolver<'_>,
    current_doc: &DocId,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<(DocId, Parameter)>> {
    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    struct Key {
        loc: &'static str,
        name: String,
    }

    fn key_for(p: &Parameter) -> Key {
        match p {
            Parameter::Path { parameter_data, .. } => Key {
                loc: "path",
                name: parameter_data.name.clone(),
            },
            Parameter::Query { parameter_data, .. } => Key {
                loc: "query",
                name: parameter_data.name.clone(),
            },
            Parameter::Header { parameter_data, .. } => Key {
                loc: "header",
                name: parameter_data.name.clone(),
            },
            Parameter::Cookie { parameter_data, .. } => Key {
                loc: "cookie",
                name: parameter_data.name.clone(),
            },
        }
    }

    let mut merged: Vec<(DocId, Parameter)> = Vec::new();
    let mut index: HashMap<Key, usize> = HashMap::new();

    for p in path_item_params {
        let (doc, rp) = resolver.resolve_parameter(current_doc, p).await?;
        let k = key_for(&rp);
        index.insert(k, merged.len());
        merged.push((doc, rp));
    }

    for p in operation_params {
        let (doc, rp) = resolver.resolve_parameter(current_doc, p).await?;
        let k = key_for(&rp);
        if let Some(i) = index.get(&k).copied() {
            merged[i] = (doc, rp);
        } else {
            index.insert(k, merged.len());
            merged.push((doc, rp));
        }
    }

    Ok(merged)
}

/// `application/json`, then any JSON flavour, then the first declared media type.
fn preferred_media(
    content: &openapiv3::Content,
) -> Option<(&str, &MediaType)> {
    if let Some(media) = content.get("application/json") {
        return Some(("application/json", media));
    }
    if let Some((k, media)) = content
        .iter()
        .find(|(k, _)| k.starts_with("application/json") || k.ends_with("+json"))
    {
        return Some((k.as_str(), media));
    }
    content.first().map(|(k, media)| (k.as_str(), media))
}

fn status_key(code: &StatusCode) -> String {
    match code {
        StatusCode::Code(c) => c.to_string(),
        StatusCode::Range(r) => format!("{r}XX"),
    }
}

fn security_names(requirements: Option<&[SecurityRequirement]>) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for requirement in requirements.unwrap_or_default() {
        for name in requirement.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
    }
    names
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::DefaultSourceProvider;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;
    use unrelated_http_tools::OutboundPolicy;
    use unrelated_http_tools::{HttpTransport, ReqwestTransport};

    fn ingester() -> SpecIngester {
        let transport: Arc<dyn HttpTransport> =
            Arc::new(ReqwestTransport::new(OutboundPolicy::unrestricted()).unwrap());
        SpecIngester::new(Arc::new(DefaultSourceProvider::new(
            transport,
            Duration::from_secs(5),
        )))
    }

    async fn parse_inline(yaml: &str) -> Result<ParsedSpec> {
        ingester().parse(&SpecSource::Inline(yaml.to_string())).await
    }

    const PETSTORE: &str = r#"
openapi: "3.0.3"
info:
  title: Petstore
  version: "1.2.0"
servers:
  - url: https://petstore.example.com/v1
security:
  - apiKeyAuth: []
components:
  schemas:
    Pet:
      type: object
      required: [name]
      properties:
        name: { type: string }
        tag: { type: string }
  parameters:
    Limit:
      name: limit
      in: query
      schema: { type: integer, minimum: 1, maximum: 100 }
paths:
  /pets:
    get:
      operationId: listPets
      summary: List all pets
      tags: [pets]
      parameters:
        - $ref: '#/components/parameters/Limit'
        - name: X-Request-Id
          in: header
          schema: { type: string }
        - name: session
          in: cookie
          schema: { type: string }
      responses:
        "200":
          description: ok
          content:
            application/json:
              schema:
                type: array
                items: { $ref: '#/components/schemas/Pet' }
        default:
          description: error
    post:
      summary: Create a pet
      security:
        - oauth: [write]
      requestBody:
        required: true
        content:
          application/xml:
            schema: { type: string }
          application/json:
            schema: { $ref: '#/components/schemas/Pet' }
      responses:
        "201": { description: created }
  /pets/{id}:
    parameters:
      - name: id
        in: path
        schema: {}
    get:
      operationId: getPet
      deprecated: true
      responses:
        "2XX": { description: ok }
    delete:
      operationId: deletePet
      description: Removes a pet
      responses:
        "204": { description: gone }
"#;

    #[tokio::test]
    async fn extracts_one_endpoint_per_path_and_method() {
        let ingester = ingester();
        let spec = ingester
            .parse(&SpecSource::Inline(PETSTORE.to_string()))
            .await
            .unwrap();
        assert_eq!(spec.title(), "Petstore");
        assert_eq!(spec.servers(), vec!["https://petstore.example.com/v1"]);

        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();
        let names: Vec<String> = endpoints.iter().map(EndpointDescriptor::display_name).collect();
        assert_eq!(
            names,
            vec!["GET /pets", "POST /pets", "GET /pets/{id}", "DELETE /pets/{id}"]
        );
    }

    #[tokio::test]
    async fn partitions_parameters_and_ignores_cookies() {
        let ingester = ingester();
        let spec = parse_inline(PETSTORE).await.unwrap();
        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();
        let list = &endpoints[0];

        assert!(list.path_params.is_empty());
        assert_eq!(list.query_params.len(), 1);
        assert_eq!(list.header_params.len(), 1);
        assert_eq!(list.parameters().count(), 2);

        let limit = &list.query_params[0];
        assert_eq!(limit.name, "limit");
        assert_eq!(limit.param_type, "integer");
        assert!(!limit.required);
        assert_eq!(limit.schema["maximum"], json!(100));
    }

    #[tokio::test]
    async fn untyped_path_parameter_defaults_to_required_string() {
        let ingester = ingester();
        let spec = parse_inline(PETSTORE).await.unwrap();
        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();
        let get_pet = endpoints.iter().find(|e| e.operation_id == "getPet").unwrap();

        assert_eq!(get_pet.path_params.len(), 1);
        assert_eq!(get_pet.path_params[0].param_type, "string");
        assert!(get_pet.path_params[0].required);
        assert!(get_pet.deprecated);
        assert!(get_pet.responses.contains_key("2XX"));
    }

    #[tokio::test]
    async fn body_prefers_json_and_inlines_refs() {
        let ingester = ingester();
        let spec = parse_inline(PETSTORE).await.unwrap();
        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();
        let create = endpoints
            .iter()
            .find(|e| e.method == HttpMethod::Post)
            .unwrap();

        let body = create.request_body.as_ref().unwrap();
        assert_eq!(body.media_type, "application/json");
        assert!(body.required);
        assert_eq!(body.schema["type"], json!("object"));
        assert_eq!(body.schema["required"], json!(["name"]));

        let list = &endpoints[0];
        let ok = &list.responses["200"];
        assert_eq!(ok.schema.as_ref().unwrap()["items"]["type"], json!("object"));
        assert!(list.responses.contains_key("default"));
    }

    #[tokio::test]
    async fn synthesizes_missing_operation_ids_and_resolves_security() {
        let ingester = ingester();
        let spec = parse_inline(PETSTORE).await.unwrap();
        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();

        let create = &endpoints[1];
        assert_eq!(create.operation_id, "post_pets");
        assert!(create.operation_id_synthesized);
        assert_eq!(create.security, vec!["oauth"]);

        let list = &endpoints[0];
        assert!(!list.operation_id_synthesized);
        assert_eq!(list.security, vec!["apiKeyAuth"]);
    }

    #[tokio::test]
    async fn merges_path_item_parameters_with_operation_overrides() {
        let spec = parse_inline(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /users:
    parameters:
      - name: q
        in: query
        required: false
        schema: { type: string }
    get:
      operationId: listUsers
      parameters:
        - name: q
          in: query
          required: true
          schema: { type: string }
      responses:
        "200": { description: ok }
"#,
        )
        .await
        .unwrap();
        let endpoints = ingester().extract_endpoints(&spec).await.unwrap();
        assert_eq!(endpoints[0].query_params.len(), 1);
        assert!(endpoints[0].query_params[0].required);
    }

    #[tokio::test]
    async fn rejects_unparseable_and_non_openapi_sources() {
        let err = parse_inline("openapi: [unterminated").await.unwrap_err();
        assert!(matches!(err, OpenApiToolsError::SpecParse { .. }), "{err}");

        let err = parse_inline("swagger: '2.0'\npaths: {}\n").await.unwrap_err();
        match err {
            OpenApiToolsError::SpecParse { diagnostics, .. } => {
                assert!(diagnostics[0].contains("openapi"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = parse_inline("openapi: 3.0.0\ninfo: {title: t, version: '1'}\npaths: {}\n")
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::NoPaths { .. }));
    }

    #[tokio::test]
    async fn missing_info_is_a_validation_finding_not_a_parse_failure() {
        let spec = parse_inline(
            r#"
openapi: "3.0.0"
paths:
  /ping:
    get:
      responses:
        "200": { description: ok }
  /empty: {}
"#,
        )
        .await
        .unwrap();

        let report = ingester().validate(&spec);
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].location, "info.title");

        let warnings: Vec<&str> = report.warnings.iter().map(|w| w.location.as_str()).collect();
        assert!(warnings.contains(&"info.version"));
        assert!(warnings.contains(&"servers"));
        assert!(warnings.contains(&"paths./empty"));
        assert_eq!(
            warnings.iter().filter(|l| **l == "paths./ping.get").count(),
            2,
            "missing operationId and missing summary/description"
        );
    }

    #[tokio::test]
    async fn complete_spec_validates_cleanly_apart_from_operation_warnings() {
        let ingester = ingester();
        let spec = parse_inline(PETSTORE).await.unwrap();
        let report = ingester.validate(&spec);
        assert!(report.is_valid());
        // POST /pets has no operationId, GET /pets/{id} has neither summary nor description.
        assert_eq!(report.warnings.len(), 2);
    }

    #[tokio::test]
    async fn hash_pinning_policies() {
        let ingester = ingester();
        let source = SpecSource::Inline(PETSTORE.to_string());
        let wrong = "sha256:0000";

        let err = ingester
            .parse_pinned(&source, Some(wrong), HashPolicy::Fail)
            .await
            .unwrap_err();
        assert!(matches!(err, OpenApiToolsError::SpecHashMismatch { .. }));

        let parsed = ingester
            .parse_pinned(&source, Some(wrong), HashPolicy::Warn)
            .await
            .unwrap();
        let pinned = ingester
            .parse_pinned(&source, Some(&parsed.hash), HashPolicy::Fail)
            .await
            .unwrap();
        assert_eq!(pinned.hash, parsed.hash);
    }

    #[tokio::test]
    async fn resolves_external_file_refs_relative_to_the_spec() {
        let dir = tempdir().unwrap();
        let common_path = dir.path().join("common.yaml");
        let root_path = dir.path().join("root.yaml");

        fs::write(
            &common_path,
            r"
components:
  parameters:
    QParam:
      name: q
      in: query
      required: true
      schema:
        $ref: '#/components/schemas/Query'
  schemas:
    Query:
      type: string
      pattern: '^[a-z]+$'
",
        )
        .unwrap();

        fs::write(
            &root_path,
            r#"
openapi: "3.0.0"
info:
  title: t
  version: "1"
paths:
  /users:
    get:
      operationId: listUsers
      parameters:
        - $ref: "./common.yaml#/components/parameters/QParam"
      responses:
        "200":
          description: ok
"#,
        )
        .unwrap();

        let ingester = ingester();
        let spec = ingester
            .parse(&SpecSource::File(root_path.clone()))
            .await
            .unwrap();
        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();
        let q = &endpoints[0].query_params[0];
        assert_eq!(q.name, "q");
        assert!(q.required);
        assert_eq!(q.schema["pattern"], json!("^[a-z]+$"));
    }

    #[tokio::test]
    async fn resolves_url_refs_relative_to_the_spec_url() {
        use axum::Router;
        use axum::routing::get;
        use unrelated_test_support::TestServer;

        let app = Router::new()
            .route(
                "/specs/api.yaml",
                get(|| async {
                    r#"
openapi: "3.0.0"
info: { title: Remote, version: "2" }
paths:
  /items:
    post:
      operationId: createItem
      requestBody:
        content:
          application/json:
            schema: { $ref: 'schemas/item.json' }
      responses: { "201": { description: created } }
"#
                }),
            )
            .route(
                "/specs/schemas/item.json",
                get(|| async { r#"{"type": "object", "properties": {"sku": {"type": "string"}}}"# }),
            );
        let server = TestServer::spawn(app).await.unwrap();

        let ingester = ingester();
        let source = SpecSource::from_location(&server.url("/specs/api.yaml")).unwrap();
        let spec = ingester.parse(&source).await.unwrap();
        assert_eq!(spec.title(), "Remote");

        let endpoints = ingester.extract_endpoints(&spec).await.unwrap();
        let body = endpoints[0].request_body.as_ref().unwrap();
        assert_eq!(body.schema["properties"]["sku"]["type"], json!("string"));
    }

    #[tokio::test]
    async fn unresolvable_operation_is_skipped() {
        let spec = parse_inline(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
paths:
  /a:
    get:
      operationId: ok
      responses: { "200": { description: ok } }
  /b:
    get:
      operationId: broken
      parameters:
        - $ref: '#/components/parameters/Missing'
      responses: { "200": { description: ok } }
"#,
        )
        .await
        .unwrap();
        let endpoints = ingester().extract_endpoints(&spec).await.unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].operation_id, "ok");
    }

    #[tokio::test]
    async fn recursive_schemas_terminate() {
        let spec = parse_inline(
            r#"
openapi: "3.0.0"
info: { title: t, version: "1" }
components:
  schemas:
    Node:
      type: object
      properties:
        child: { $ref: '#/components/schemas/Node' }
paths:
  /nodes:
    post:
      operationId: createNode
      requestBody:
        content:
          application/json:
            schema: { $ref: '#/components/schemas/Node' }
      responses: { "200": { description: ok } }
"#,
        )
        .await
        .unwrap();
        let endpoints = ingester().extract_endpoints(&spec).await.unwrap();
        let schema = &endpoints[0].request_body.as_ref().unwrap().schema;
        assert_eq!(schema["type"], json!("object"));
        assert_eq!(schema["properties"]["child"], json!({}));
    }
}
