//! Spec -> tools for one configured API.

use crate::registry::{ImportReport, ToolRegistry};
use crate::settings::ApiSettings;
use crate::store::ConfigurationStore;
use anyhow::Context as _;
use std::collections::HashSet;
use std::sync::Arc;
use unrelated_openapi_tools::naming::reserve_unique_tool_name;
use unrelated_openapi_tools::{
    ApiSpecContext, ParsedSpec, SpecIngester, SpecSource, ToolSynthesizer,
};
use url::Url;

#[derive(Clone)]
pub struct Catalog {
    ingester: Arc<SpecIngester>,
    registry: ToolRegistry,
    configs: Arc<dyn ConfigurationStore>,
}

impl Catalog {
    #[must_use]
    pub fn new(
        ingester: Arc<SpecIngester>,
        registry: ToolRegistry,
        configs: Arc<dyn ConfigurationStore>,
    ) -> Self {
        Self {
            ingester,
            registry,
            configs,
        }
    }

    /// Load an API's spec, store its configuration and register its tools.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec cannot be loaded or parsed, the generation options are
    /// invalid, or the configuration or tools cannot be stored.
    pub async fn import_api(&self, api: &ApiSettings) -> anyhow::Result<ImportReport> {
        let config_id = api.config.id.as_str();
        let source = SpecSource::from_location(&api.spec)
            .with_context(|| format!("api '{config_id}': spec location"))?;
        let spec = self
            .ingester
            .parse_pinned(&source, api.spec_hash.as_deref(), api.spec_hash_policy)
            .await
            .with_context(|| format!("api '{config_id}': load spec '{}'", source.location()))?;
        tracing::info!(
            config_id = %config_id,
            spec = %source.location(),
            title = %spec.title(),
            version = %spec.version(),
            "Loaded OpenAPI spec"
        );

        let report = self.ingester.validate(&spec);
        for issue in report.errors.iter().chain(&report.warnings) {
            tracing::warn!(
                config_id = %config_id,
                location = %issue.location,
                "Spec validation: {}",
                issue.message
            );
        }

        let mut config = api.config.clone();
        if config.base_url.is_none() {
            config.base_url = infer_base_url(&spec);
            match &config.base_url {
                Some(url) => {
                    tracing::info!(config_id = %config_id, base_url = %url, "Inferred base URL from spec servers");
                }
                None => {
                    tracing::warn!(config_id = %config_id, "No base URL configured and none declared by the spec");
                }
            }
        }
        self.configs
            .put(config)
            .await
            .with_context(|| format!("api '{config_id}': store configuration"))?;

        let synthesizer = ToolSynthesizer::new(api.generation.clone())
            .with_context(|| format!("api '{config_id}': generation options"))?;
        let endpoints = self
            .ingester
            .extract_endpoints(&spec)
            .await
            .with_context(|| format!("api '{config_id}': extract endpoints"))?;
        let context = ApiSpecContext {
            config_id: config_id.to_string(),
            title: spec.title().to_string(),
            version: spec.version().to_string(),
            servers: spec.servers(),
        };

        let mut names = HashSet::new();
        let mut tools = Vec::new();
        let mut filtered = 0usize;
        for endpoint in &endpoints {
            if !synthesizer.should_include(endpoint) {
                filtered += 1;
                continue;
            }
            let name = reserve_unique_tool_name(&mut names, &synthesizer.tool_name(endpoint));
            match synthesizer.synthesize_named(endpoint, &context, name) {
                Ok(tool) => tools.push(tool),
                Err(e) => {
                    tracing::warn!(
                        config_id = %config_id,
                        method = %endpoint.method,
                        path = %endpoint.path,
                        error = %e,
                        "Skipping endpoint"
                    );
                }
            }
        }
        tracing::info!(
            config_id = %config_id,
            endpoints = endpoints.len(),
            filtered,
            tools = tools.len(),
            "Discovered tools"
        );

        self.registry
            .import_tools(tools, api.conflict_strategy)
            .await
            .with_context(|| format!("api '{config_id}': register tools"))
    }
}

/// First declared server, with variables set to their defaults and relative URLs resolved
/// against the spec URL.
fn infer_base_url(spec: &ParsedSpec) -> Option<String> {
    let server = spec.document.servers.first()?;
    let mut raw = server.url.clone();
    if let Some(vars) = &server.variables {
        for (name, var) in vars {
            raw = raw.replace(&format!("{{{name}}}"), &var.default);
        }
    }
    if let Ok(url) = Url::parse(&raw) {
        return Some(url.to_string());
    }
    let base = spec.source.url()?;
    base.join(&raw).ok().map(|u| u.to_string())
}
