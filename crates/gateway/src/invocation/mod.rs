//! Invocation engine: tool call -> upstream HTTP request -> [`ToolResult`].

mod auth;
mod request;
mod stats;
mod tracker;
mod validate;

use crate::error::{GatewayError, Result};
use crate::model::{
    ActiveExecution, ContentBlock, ExecutionPhase, ExecutionStats, ToolCall, ToolError,
    ToolOutcome, ToolResult,
};
use crate::registry::ToolRegistry;
use crate::resilience::{ResiliencePolicy, execute_with_resilience};
use crate::resolver::EffectiveConfigResolver;
use crate::store::{ConfigurationStore, StatsStore};
use base64::Engine as _;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;
use unrelated_http_tools::{HttpTransport, OutboundRequest, OutboundResponse};

pub(crate) use auth::credential_args;
use request::build_request;
use stats::StatsRecorder;
use tracker::ExecutionTracker;

/// Outcome of [`InvocationEngine::validate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl CallValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn failed(e: &GatewayError) -> Self {
        Self {
            valid: false,
            error: Some(ToolError::from(e)),
        }
    }
}

/// Collaborators of an [`InvocationEngine`].
pub struct InvocationEngineParts {
    pub registry: ToolRegistry,
    pub configs: Arc<dyn ConfigurationStore>,
    pub resolver: EffectiveConfigResolver,
    pub transport: Arc<dyn HttpTransport>,
    pub resilience: Arc<dyn ResiliencePolicy>,
    pub stats: Arc<dyn StatsStore>,
}

pub struct InvocationEngine {
    registry: ToolRegistry,
    configs: Arc<dyn ConfigurationStore>,
    resolver: EffectiveConfigResolver,
    transport: Arc<dyn HttpTransport>,
    resilience: Arc<dyn ResiliencePolicy>,
    tracker: ExecutionTracker,
    stats: StatsRecorder,
}

#[derive(Default)]
struct CallTrace {
    metadata: Map<String, Value>,
    /// Set once the tool was found; stats are only kept for registered tools.
    tool_resolved: bool,
}

impl InvocationEngine {
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(parts: InvocationEngineParts) -> Self {
        Self {
            registry: parts.registry,
            configs: parts.configs,
            resolver: parts.resolver,
            transport: parts.transport,
            resilience: parts.resilience,
            tracker: ExecutionTracker::default(),
            stats: StatsRecorder::new(parts.stats),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn resolver(&self) -> &EffectiveConfigResolver {
        &self.resolver
    }

    /// Seed execution stats from the stats store.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Persistence`] if the store cannot be read.
    pub async fn load_stats(&self) -> Result<usize> {
        self.stats
            .load()
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))
    }

    /// Execute a tool call. Failures are reported in the result, never as `Err`.
    pub async fn invoke(&self, call: ToolCall) -> ToolResult {
        let started = Instant::now();
        let mut trace = CallTrace::default();
        let outcome = self.run(&call, &mut trace).await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let outcome = match outcome {
            Ok(content) => {
                tracing::info!(tool = %call.name, call_id = %call.call_id, duration_ms, "Tool call succeeded");
                ToolOutcome::Success { content }
            }
            Err(e) => {
                tracing::info!(
                    tool = %call.name,
                    call_id = %call.call_id,
                    duration_ms,
                    code = %e.code(),
                    error = %e,
                    "Tool call failed"
                );
                ToolOutcome::Error {
                    error: ToolError::from(&e),
                }
            }
        };

        if trace.tool_resolved {
            let error = match &outcome {
                ToolOutcome::Error { error } => Some(error.message.as_str()),
                ToolOutcome::Success { .. } => None,
            };
            self.stats.record(&call.name, duration_ms, error);
        }

        ToolResult {
            call_id: call.call_id,
            outcome,
            duration_ms,
            completed_at: Utc::now(),
            metadata: trace.metadata,
        }
    }

    async fn run(&self, call: &ToolCall, trace: &mut CallTrace) -> Result<Vec<ContentBlock>> {
        let call_id = call.call_id.as_str();
        if call_id.trim().is_empty() {
            return Err(GatewayError::validation("call id is empty"));
        }
        let _guard = self.tracker.begin(call_id, &call.name)?;
        check_call(call)?;

        self.tracker.advance(call_id, ExecutionPhase::ResolvingTool)?;
        let tool = self.registry.get_tool(&call.name).await?;
        trace.tool_resolved = true;
        trace
            .metadata
            .insert("httpMethod".to_string(), json!(tool.execution().http_method));

        self.tracker.advance(call_id, ExecutionPhase::ResolvingConfig)?;
        let config = self
            .configs
            .get(tool.config_id())
            .await
            .map_err(|e| GatewayError::Persistence(e.to_string()))?
            .ok_or_else(|| GatewayError::ConfigurationNotFound(tool.config_id().to_string()))?;
        let effective = self.resolver.resolve(&config).await;

        self.tracker.advance(call_id, ExecutionPhase::BuildingRequest)?;
        let request = build_request(&tool, &effective, &call.arguments)?;

        self.tracker.advance(call_id, ExecutionPhase::Executing)?;
        let attempted = execute_with_resilience(
            self.resilience.as_ref(),
            tool.name(),
            || self.tracker.checkpoint(call_id),
            |attempt| self.dispatch(call_id, attempt, request.clone()),
        )
        .await;

        trace.metadata.insert("attempts".to_string(), json!(attempted.attempts));
        trace.metadata.insert(
            "retryCount".to_string(),
            json!(attempted.attempts.saturating_sub(1)),
        );
        let status = match &attempted.result {
            Ok(response) => Some(response.status),
            Err(GatewayError::UpstreamHttp { status, .. }) => Some(*status),
            Err(_) => None,
        };
        if let Some(status) = status {
            trace
                .metadata
                .insert("upstreamStatus".to_string(), json!(status));
        }

        let response = attempted.result?;
        // The request already went out; a late cancel does not discard its response.
        let _ = self.tracker.advance(call_id, ExecutionPhase::Completed);
        Ok(response_content(&response))
    }

    async fn dispatch(
        &self,
        call_id: &str,
        attempt: u32,
        request: OutboundRequest,
    ) -> Result<OutboundResponse> {
        tracing::debug!(
            call_id = %call_id,
            attempt,
            method = %request.method.as_str(),
            url = %unrelated_http_tools::safety::redact_url(&request.url),
            "Dispatching upstream request"
        );
        let response = self.transport.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }
        Err(GatewayError::UpstreamHttp {
            status: response.status,
            body: response.text_lossy(),
        })
    }

    /// Check a call without executing it: structure, tool existence and arguments.
    pub async fn validate(&self, call: &ToolCall) -> CallValidation {
        if let Err(e) = check_call(call) {
            return CallValidation::failed(&e);
        }
        let tool = match self.registry.get_tool(&call.name).await {
            Ok(t) => t,
            Err(e) => return CallValidation::failed(&e),
        };

        let mut args = call.arguments.clone();
        args.retain(|k, _| !k.starts_with('_'));
        if let Ok(Some(config)) = self.configs.get(tool.config_id()).await {
            for name in credential_args(&config.auth) {
                args.remove(name);
            }
        }

        match validate::validate_arguments(tool.input_schema(), &args) {
            Ok(()) => CallValidation::ok(),
            Err(e) => CallValidation::failed(&e),
        }
    }

    pub async fn get_stats(&self, tool: &str) -> Option<ExecutionStats> {
        self.stats.get(tool).await
    }

    pub async fn get_all_stats(&self) -> Vec<ExecutionStats> {
        self.stats.all().await
    }

    #[must_use]
    pub fn get_active_executions(&self) -> Vec<ActiveExecution> {
        self.tracker.snapshot()
    }

    /// Best-effort cancellation; an already dispatched request is not aborted.
    pub fn cancel(&self, call_id: &str) -> bool {
        let cancelled = self.tracker.cancel(call_id);
        if cancelled {
            tracing::info!(call_id = %call_id, "Cancelled tool call");
        }
        cancelled
    }
}

fn check_call(call: &ToolCall) -> Result<()> {
    if call.name.trim().is_empty() {
        return Err(GatewayError::validation("tool name is empty"));
    }
    if call.call_id.trim().is_empty() {
        return Err(GatewayError::validation("call id is empty"));
    }
    Ok(())
}

fn response_content(response: &OutboundResponse) -> Vec<ContentBlock> {
    if response.body.is_empty() {
        return Vec::new();
    }

    let mime = response
        .content_type
        .as_deref()
        .and_then(|ct| ct.parse::<mime::Mime>().ok());
    let binary_type = mime.as_ref().is_some_and(|m| {
        m.type_() == mime::IMAGE
            || m.type_() == mime::AUDIO
            || m.type_() == mime::VIDEO
            || m.essence_str() == mime::APPLICATION_OCTET_STREAM.essence_str()
    });

    let text = match std::str::from_utf8(&response.body) {
        Ok(t) if !binary_type => t,
        _ => {
            let mime_type = mime.map_or_else(
                || mime::APPLICATION_OCTET_STREAM.to_string(),
                |m| m.essence_str().to_string(),
            );
            return vec![ContentBlock::Binary {
                mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(&response.body),
            }];
        }
    };

    match serde_json::from_str::<Value>(text) {
        Ok(json) => vec![ContentBlock::Json { json }],
        Err(_) => vec![ContentBlock::Text {
            text: text.to_string(),
        }],
    }
}
