//! Gateway settings file (YAML, camelCase keys).

use crate::model::{ApiConfiguration, DEFAULT_CALL_TIMEOUT, DEFAULT_OVERRIDE_TTL_SECS};
use crate::registry::ConflictStrategy;
use crate::resilience::ResilienceSettings;
use crate::resolver::DEFAULT_OVERRIDE_FETCH_TIMEOUT;
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use unrelated_http_tools::OutboundPolicy;
use unrelated_openapi_tools::{GenerationOptions, HashPolicy};

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    pub bind: String,
    pub defaults: EngineSettings,
    pub resilience: ResilienceSettings,
    pub outbound: OutboundSettings,
    pub apis: Vec<ApiSettings>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            defaults: EngineSettings::default(),
            resilience: ResilienceSettings::default(),
            outbound: OutboundSettings::default(),
            apis: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    /// Per-call timeout for APIs that do not set one.
    pub timeout_secs: u64,
    pub override_fetch_timeout_secs: u64,
    /// Override cache TTL for APIs that do not set one.
    pub override_ttl_secs: u64,
    pub spec_fetch_timeout_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            override_fetch_timeout_secs: DEFAULT_OVERRIDE_FETCH_TIMEOUT.as_secs(),
            override_ttl_secs: DEFAULT_OVERRIDE_TTL_SECS,
            spec_fetch_timeout_secs: 30,
        }
    }
}

impl EngineSettings {
    #[must_use]
    pub fn override_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.override_fetch_timeout_secs.max(1))
    }

    #[must_use]
    pub fn spec_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.spec_fetch_timeout_secs.max(1))
    }
}

/// Outbound HTTP policy for upstream calls, spec fetches and override fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OutboundSettings {
    pub allow_private_networks: bool,
    /// `api.example.com` or `*.example.com`; empty means every host.
    pub allowed_hosts: Vec<String>,
    pub max_response_bytes: Option<usize>,
    pub max_redirects: usize,
}

impl Default for OutboundSettings {
    fn default() -> Self {
        let policy = OutboundPolicy::default();
        Self {
            allow_private_networks: policy.allow_private_networks,
            allowed_hosts: Vec::new(),
            max_response_bytes: policy.max_response_bytes,
            max_redirects: policy.max_redirects,
        }
    }
}

impl OutboundSettings {
    #[must_use]
    pub fn to_policy(&self) -> OutboundPolicy {
        OutboundPolicy {
            allow_private_networks: self.allow_private_networks,
            max_response_bytes: self.max_response_bytes,
            max_redirects: self.max_redirects,
            ..OutboundPolicy::default()
        }
        .with_allowed_hosts(&self.allowed_hosts)
    }
}

/// One upstream API: its configuration plus where its spec lives and how to turn it into tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSettings {
    #[serde(flatten)]
    pub config: ApiConfiguration,
    /// URL or file path; relative paths are resolved against the settings file.
    pub spec: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_hash: Option<String>,
    #[serde(default)]
    pub spec_hash_policy: HashPolicy,
    #[serde(default)]
    pub generation: GenerationOptions,
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
}

impl GatewaySettings {
    /// Read, normalize and check a settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails [`GatewaySettings::check`].
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read settings file '{}'", path.display()))?;
        let mut settings: GatewaySettings = serde_yaml::from_str(&text)
            .with_context(|| format!("parse settings file '{}'", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        settings.normalize(&base_dir);
        settings.check()?;
        Ok(settings)
    }

    /// Fill per-API gaps from `defaults` and anchor relative spec paths at `base_dir`.
    pub fn normalize(&mut self, base_dir: &Path) {
        for api in &mut self.apis {
            if api.config.timeout_seconds.is_none() {
                api.config.timeout_seconds = Some(self.defaults.timeout_secs);
            }
            if let Some(source) = &mut api.config.override_source
                && source.ttl_seconds.is_none()
            {
                source.ttl_seconds = Some(self.defaults.override_ttl_secs);
            }
            if is_relative_path(&api.spec) {
                api.spec = base_dir.join(&api.spec).display().to_string();
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error for duplicate or empty API ids, or an empty spec location.
    pub fn check(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for api in &self.apis {
            anyhow::ensure!(!api.config.id.trim().is_empty(), "api id must not be empty");
            anyhow::ensure!(
                seen.insert(api.config.id.as_str()),
                "duplicate api id '{}'",
                api.config.id
            );
            anyhow::ensure!(
                !api.spec.trim().is_empty(),
                "api '{}' has an empty spec location",
                api.config.id
            );
        }
        Ok(())
    }
}

fn is_relative_path(location: &str) -> bool {
    if location.starts_with("http://")
        || location.starts_with("https://")
        || location.starts_with("file://")
    {
        return false;
    }
    PathBuf::from(location).is_relative()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AuthStrategy;
    use std::io::Write as _;

    const SETTINGS: &str = r"
bind: 0.0.0.0:9000
defaults:
  timeoutSecs: 12
  overrideTtlSecs: 60
resilience:
  maxAttempts: 5
apis:
  - id: petstore
    spec: specs/petstore.yaml
    auth:
      type: bearer
      tokenFromArg: token
      required: true
    override:
      url: https://config.example.com/petstore.json
    generation:
      naming: methodPath
      skipDeprecated: true
    conflictStrategy: skip
  - id: remote
    spec: https://example.com/openapi.json
    baseUrl: https://api.example.com
    timeoutSeconds: 3
";

    #[test]
    fn load_normalizes_and_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(SETTINGS.as_bytes())
            .unwrap();

        let settings = GatewaySettings::load(&path).unwrap();
        assert_eq!(settings.bind, "0.0.0.0:9000");
        assert_eq!(settings.resilience.max_attempts, 5);
        assert_eq!(settings.resilience.window_size, 10);
        assert_eq!(settings.defaults.override_fetch_timeout_secs, 5);

        let pet = &settings.apis[0];
        assert_eq!(
            pet.spec,
            dir.path().join("specs/petstore.yaml").display().to_string()
        );
        assert_eq!(pet.config.timeout_seconds, Some(12));
        assert_eq!(
            pet.config.override_source.as_ref().unwrap().ttl_seconds,
            Some(60)
        );
        assert!(matches!(pet.config.auth, AuthStrategy::Bearer { required: true, .. }));
        assert_eq!(pet.conflict_strategy, ConflictStrategy::Skip);
        assert!(pet.generation.skip_deprecated);

        let remote = &settings.apis[1];
        assert_eq!(remote.spec, "https://example.com/openapi.json");
        assert_eq!(remote.config.timeout_seconds, Some(3));
        assert_eq!(remote.config.base_url.as_deref(), Some("https://api.example.com"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let settings: GatewaySettings = serde_yaml::from_str(
            "apis:\n  - id: a\n    spec: a.yaml\n  - id: a\n    spec: b.yaml\n",
        )
        .unwrap();
        let err = settings.check().unwrap_err();
        assert!(err.to_string().contains("duplicate api id 'a'"));
    }

    #[test]
    fn outbound_settings_map_to_policy() {
        let strict = OutboundSettings::default().to_policy();
        assert_eq!(strict, OutboundPolicy::default());

        let settings: OutboundSettings = serde_yaml::from_str(
            "allowPrivateNetworks: true\nallowedHosts: ['*.Example.com']\nmaxRedirects: 2\n",
        )
        .unwrap();
        let policy = settings.to_policy();
        assert!(policy.allow_private_networks);
        assert_eq!(policy.max_redirects, 2);
        assert_eq!(policy.max_response_bytes, OutboundPolicy::default().max_response_bytes);
        assert!(policy.allowed_hosts[0].matches("api.example.com"));
        assert!(!policy.allowed_hosts[0].matches("example.com"));
    }
}
