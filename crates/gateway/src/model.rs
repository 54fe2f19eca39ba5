//! Configuration, call and result types.

use crate::error::{ErrorCode, GatewayError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Per-call HTTP timeout when neither the configuration nor an override sets one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Override documents are cached this long unless the configuration says otherwise.
pub const DEFAULT_OVERRIDE_TTL_SECS: u64 = 300;

/// How outbound requests authenticate.
///
/// Each credential can come from a named call argument (preferred) or a static value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum AuthStrategy {
    #[default]
    None,
    Bearer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_from_arg: Option<String>,
        #[serde(default)]
        required: bool,
    },
    #[serde(alias = "api-key", alias = "apikey")]
    ApiKey {
        #[serde(default = "default_api_key_header")]
        header_name: String,
        /// Prepended to the key, separated by a space (e.g. `Token`).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value_from_arg: Option<String>,
        #[serde(default)]
        required: bool,
    },
    Basic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        username_from_arg: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password_from_arg: Option<String>,
        #[serde(default)]
        required: bool,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

/// Remote document whose `baseUrl` / `timeoutSeconds` / `auth` override the persisted values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSource {
    pub url: String,
    /// Falls back to the gateway default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

impl OverrideSource {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds.unwrap_or(DEFAULT_OVERRIDE_TTL_SECS))
    }
}

/// Persisted connection settings for one upstream API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfiguration {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Inferred from the spec's `servers` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub auth: AuthStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "override")]
    pub override_source: Option<OverrideSource>,
}

impl ApiConfiguration {
    #[must_use]
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            base_url: Some(base_url.into()),
            timeout_seconds: None,
            headers: BTreeMap::new(),
            auth: AuthStrategy::None,
            override_source: None,
        }
    }
}

/// The configuration a call actually runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveConfiguration {
    pub config_id: String,
    pub base_url: Option<String>,
    pub timeout_seconds: u64,
    pub auth: AuthStrategy,
    pub headers: BTreeMap<String, String>,
    /// Whether an override document contributed.
    pub overridden: bool,
}

impl EffectiveConfiguration {
    /// Persisted values only.
    #[must_use]
    pub fn from_persisted(config: &ApiConfiguration) -> Self {
        Self {
            config_id: config.id.clone(),
            base_url: config.base_url.clone(),
            timeout_seconds: config
                .timeout_seconds
                .filter(|t| *t > 0)
                .unwrap_or(DEFAULT_CALL_TIMEOUT.as_secs()),
            auth: config.auth.clone(),
            headers: config.headers.clone(),
            overridden: false,
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// A request to invoke a named tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    #[serde(default = "new_call_id")]
    pub call_id: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub context: Map<String, Value>,
}

fn new_call_id() -> String {
    Uuid::new_v4().to_string()
}

impl ToolCall {
    /// A call with a fresh call id.
    #[must_use]
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            call_id: new_call_id(),
            created_at: Utc::now(),
            context: Map::new(),
        }
    }

    #[must_use]
    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// One piece of result content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ContentBlock {
    Text { text: String },
    Json { json: Value },
    /// Base64-encoded bytes.
    Binary { mime_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

impl From<&GatewayError> for ToolError {
    fn from(e: &GatewayError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            details: e.details(),
        }
    }
}

/// Success content or a structured error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToolOutcome {
    Success { content: Vec<ContentBlock> },
    Error { error: ToolError },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub call_id: String,
    #[serde(flatten)]
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl ToolResult {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error { .. })
    }

    #[must_use]
    pub fn error(&self) -> Option<&ToolError> {
        match &self.outcome {
            ToolOutcome::Error { error } => Some(error),
            ToolOutcome::Success { .. } => None,
        }
    }

    #[must_use]
    pub fn content(&self) -> &[ContentBlock] {
        match &self.outcome {
            ToolOutcome::Success { content } => content,
            ToolOutcome::Error { .. } => &[],
        }
    }
}

/// Where an in-flight call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionPhase {
    Validating,
    ResolvingTool,
    ResolvingConfig,
    BuildingRequest,
    Executing,
    Completed,
    Cancelled,
}

impl ExecutionPhase {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionPhase::Completed | ExecutionPhase::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Running,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveExecution {
    pub call_id: String,
    pub tool_name: String,
    pub started_at: DateTime<Utc>,
    pub phase: ExecutionPhase,
    pub status: ExecutionStatus,
}

/// Rolling per-tool counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub tool_name: String,
    pub invocations: u64,
    pub successes: u64,
    pub errors: u64,
    pub total_duration_ms: u64,
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub avg_duration_ms: f64,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
}

impl ExecutionStats {
    #[must_use]
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            invocations: 0,
            successes: 0,
            errors: 0,
            total_duration_ms: 0,
            min_duration_ms: None,
            max_duration_ms: None,
            avg_duration_ms: 0.0,
            last_used_at: None,
            last_success_at: None,
            last_error_at: None,
            last_error_message: None,
        }
    }

    /// Fold one invocation into the counters.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, duration_ms: u64, error: Option<&str>, at: DateTime<Utc>) {
        self.invocations += 1;
        self.total_duration_ms = self.total_duration_ms.saturating_add(duration_ms);
        self.min_duration_ms = Some(self.min_duration_ms.map_or(duration_ms, |m| m.min(duration_ms)));
        self.max_duration_ms = Some(self.max_duration_ms.map_or(duration_ms, |m| m.max(duration_ms)));
        self.avg_duration_ms = self.total_duration_ms as f64 / self.invocations as f64;
        self.last_used_at = Some(at);
        match error {
            None => {
                self.successes += 1;
                self.last_success_at = Some(at);
            }
            Some(message) => {
                self.errors += 1;
                self.last_error_at = Some(at);
                self.last_error_message = Some(message.to_string());
            }
        }
    }
}
