//! Specification sources and the provider that loads them.

use crate::error::{OpenApiToolsError, Result};
use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest as _, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use unrelated_http_tools::safety::redact_url;
use unrelated_http_tools::{HttpMethod, HttpTransport, OutboundRequest};
use url::Url;

/// Where a specification document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecSource {
    Url(Url),
    File(PathBuf),
    Inline(String),
}

impl SpecSource {
    /// Interpret a configured location: `http(s)://` URLs, `file://` URLs, otherwise a path.
    ///
    /// # Errors
    ///
    /// Returns an error if the location looks like a URL but does not parse as one.
    pub fn from_location(location: &str) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::Config(format!("Invalid OpenAPI spec URL '{location}': {e}"))
            })?;
            return Ok(SpecSource::Url(url));
        }
        if location.starts_with("file://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::Config(format!(
                    "Invalid OpenAPI spec file URL '{location}': {e}"
                ))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::Config(format!(
                    "Invalid file URL (cannot convert to path): {location}"
                ))
            })?;
            return Ok(SpecSource::File(path));
        }
        Ok(SpecSource::File(PathBuf::from(location)))
    }

    /// Human-readable location for logs and errors.
    #[must_use]
    pub fn location(&self) -> String {
        match self {
            SpecSource::Url(u) => redact_url(u),
            SpecSource::File(p) => p.display().to_string(),
            SpecSource::Inline(_) => "inline".to_string(),
        }
    }

    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        match self {
            SpecSource::Url(u) => Some(u),
            SpecSource::File(_) | SpecSource::Inline(_) => None,
        }
    }
}

/// Loads raw specification text.
#[async_trait]
pub trait SpecSourceProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns a fetch/read error describing why the source could not be loaded.
    async fn load(&self, source: &SpecSource) -> Result<String>;
}

/// Default provider: URLs over an [`HttpTransport`], files via `tokio::fs`.
#[derive(Clone)]
pub struct DefaultSourceProvider {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
}

impl DefaultSourceProvider {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait]
impl SpecSourceProvider for DefaultSourceProvider {
    async fn load(&self, source: &SpecSource) -> Result<String> {
        match source {
            SpecSource::Inline(text) => Ok(text.clone()),
            SpecSource::File(path) => {
                tracing::info!(path = %path.display(), "Loading OpenAPI spec from file");
                tokio::fs::read_to_string(path).await.map_err(|e| {
                    OpenApiToolsError::SpecReadFile {
                        path: path.display().to_string(),
                        source: e,
                    }
                })
            }
            SpecSource::Url(url) => {
                tracing::info!(url = %redact_url(url), "Fetching OpenAPI spec");
                let mut request = OutboundRequest::new(HttpMethod::Get, url.clone());
                request.headers.push((
                    "Accept".to_string(),
                    "application/json, application/yaml;q=0.9, */*;q=0.8".to_string(),
                ));
                request.timeout = Some(self.timeout);

                let response = self.transport.send(request).await.map_err(|e| {
                    OpenApiToolsError::SpecFetch {
                        url: redact_url(url),
                        message: e.to_string(),
                    }
                })?;
                if !response.is_success() {
                    return Err(OpenApiToolsError::SpecFetch {
                        url: redact_url(url),
                        message: format!("HTTP {}", response.status),
                    });
                }
                String::from_utf8(response.body).map_err(|e| OpenApiToolsError::SpecFetch {
                    url: redact_url(url),
                    message: format!("body is not valid UTF-8: {e}"),
                })
            }
        }
    }
}

/// `sha256:<hex>` digest of a document, in the format used for hash pinning.
#[must_use]
pub fn spec_hash(content: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(content.as_bytes())))
}

/// Parse JSON or YAML text into a JSON value.
///
/// JSON is a subset of YAML, so one YAML pass handles both. Non-string mapping keys (e.g. bare
/// `200:` response codes) are stringified.
pub(crate) fn parse_document(text: &str) -> std::result::Result<Value, serde_yaml::Error> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)?;
    Ok(yaml_to_json(yaml))
}

fn yaml_to_json(value: serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(seq.into_iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                let key = match k {
                    serde_yaml::Value::String(s) => s,
                    serde_yaml::Value::Number(n) => n.to_string(),
                    serde_yaml::Value::Bool(b) => b.to_string(),
                    other => serde_yaml::to_string(&other)
                        .unwrap_or_default()
                        .trim()
                        .to_string(),
                };
                out.insert(key, yaml_to_json(v));
            }
            Value::Object(out)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
