//! Effective configuration: persisted settings merged with an optional remote override.
//!
//! Override documents are cached per configuration id. The cache holds the (shared) fetch itself,
//! so concurrent resolutions for one id wait on a single request. Failed fetches are cached as
//! `None` for the same TTL, so a broken override URL costs one request per TTL window.

use crate::model::{ApiConfiguration, AuthStrategy, EffectiveConfiguration};
use futures::FutureExt as _;
use futures::future::{BoxFuture, Shared};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use unrelated_http_tools::safety::redact_url;
use unrelated_http_tools::{HttpMethod, HttpTransport, OutboundRequest};
use url::Url;

/// Bound on a single override fetch. Independent of the per-call timeout.
pub const DEFAULT_OVERRIDE_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

type OverrideFetch = Shared<BoxFuture<'static, Option<Arc<Value>>>>;

#[derive(Clone)]
struct CacheEntry {
    url: String,
    expires_at: Instant,
    fetch: OverrideFetch,
}

#[derive(Clone)]
pub struct EffectiveConfigResolver {
    transport: Arc<dyn HttpTransport>,
    fetch_timeout: Duration,
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl EffectiveConfigResolver {
    #[must_use]
    pub fn new(transport: Arc<dyn HttpTransport>, fetch_timeout: Duration) -> Self {
        Self {
            transport,
            fetch_timeout,
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resolve the configuration a call should use. Never fails.
    pub async fn resolve(&self, config: &ApiConfiguration) -> EffectiveConfiguration {
        let Some(source) = &config.override_source else {
            return EffectiveConfiguration::from_persisted(config);
        };

        let fetch = self.cached_or_start_fetch(&config.id, &source.url, source.ttl());
        let document = fetch.await;
        merge(config, document.as_deref())
    }

    /// Drop the cached override for `config_id`.
    pub fn invalidate(&self, config_id: &str) {
        if self.inner.write().remove(config_id).is_some() {
            tracing::debug!(config_id = %config_id, "Invalidated configuration override");
        }
    }

    fn cached_or_start_fetch(&self, config_id: &str, url: &str, ttl: Duration) -> OverrideFetch {
        let now = Instant::now();
        let mut map = self.inner.write();
        if let Some(entry) = map.get(config_id)
            && entry.expires_at > now
            && entry.url == url
        {
            return entry.fetch.clone();
        }

        let fetch = fetch_override(
            Arc::clone(&self.transport),
            config_id.to_string(),
            url.to_string(),
            self.fetch_timeout,
        )
        .boxed()
        .shared();
        map.insert(
            config_id.to_string(),
            CacheEntry {
                url: url.to_string(),
                expires_at: now + ttl,
                fetch: fetch.clone(),
            },
        );
        fetch
    }
}

async fn fetch_override(
    transport: Arc<dyn HttpTransport>,
    config_id: String,
    url: String,
    timeout: Duration,
) -> Option<Arc<Value>> {
    let parsed = match Url::parse(&url) {
        Ok(u) => u,
        Err(e) => {
            tracing::warn!(config_id = %config_id, error = %e, "Invalid configuration override URL");
            return None;
        }
    };
    let shown = redact_url(&parsed);

    let mut request = OutboundRequest::new(HttpMethod::Get, parsed);
    request.headers.push((
        "Accept".to_string(),
        "application/json, application/yaml;q=0.9".to_string(),
    ));
    request.timeout = Some(timeout);

    let response = match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(Ok(r)) => r,
        Ok(Err(e)) => {
            tracing::warn!(config_id = %config_id, url = %shown, error = %e, "Configuration override fetch failed; using persisted configuration");
            return None;
        }
        Err(_) => {
            tracing::warn!(config_id = %config_id, url = %shown, timeout_ms = timeout.as_millis(), "Configuration override fetch timed out; using persisted configuration");
            return None;
        }
    };

    if !response.is_success() {
        tracing::warn!(config_id = %config_id, url = %shown, status = response.status, "Configuration override fetch returned an error status; using persisted configuration");
        return None;
    }

    match serde_yaml::from_slice::<Value>(&response.body) {
        Ok(v @ Value::Object(_)) => {
            tracing::debug!(config_id = %config_id, url = %shown, "Fetched configuration override");
            Some(Arc::new(v))
        }
        Ok(_) => {
            tracing::warn!(config_id = %config_id, url = %shown, "Configuration override is not a mapping; ignoring");
            None
        }
        Err(e) => {
            tracing::warn!(config_id = %config_id, url = %shown, error = %e, "Configuration override is not valid JSON/YAML; ignoring");
            None
        }
    }
}

/// Field-wise merge: well-typed override fields win, everything else is persisted.
#[must_use]
pub fn merge(config: &ApiConfiguration, document: Option<&Value>) -> EffectiveConfiguration {
    let mut effective = EffectiveConfiguration::from_persisted(config);
    let Some(doc) = document else {
        return effective;
    };

    if let Some(base_url) = doc
        .get("baseUrl")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
    {
        effective.base_url = Some(base_url.to_string());
        effective.overridden = true;
    }

    if let Some(timeout) = doc
        .get("timeoutSeconds")
        .and_then(Value::as_u64)
        .filter(|t| *t > 0)
    {
        effective.timeout_seconds = timeout;
        effective.overridden = true;
    }

    if let Some(auth) = doc
        .get("auth")
        .and_then(|v| serde_json::from_value::<AuthStrategy>(v.clone()).ok())
    {
        effective.auth = auth;
        effective.overridden = true;
    }

    effective
}
