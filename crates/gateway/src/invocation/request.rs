//! Tool arguments -> outbound HTTP request.

use super::auth::apply_auth;
use crate::error::{GatewayError, Result};
use crate::model::EffectiveConfiguration;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::sync::LazyLock;
use unrelated_http_tools::OutboundRequest;
use unrelated_openapi_tools::ToolDescriptor;
use unrelated_openapi_tools::synth::{HEADER_ARG_PREFIX, REQUEST_BODY_ARG};
use url::Url;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}/]+)\}").expect("valid placeholder regex"));

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

fn is_reserved(name: &str) -> bool {
    name == REQUEST_BODY_ARG || name.starts_with(HEADER_ARG_PREFIX) || name.starts_with('_')
}

/// Build the request for `tool` under `effective`.
///
/// # Errors
///
/// - [`GatewayError::Validation`] for a missing path parameter or an unusable base URL
/// - [`GatewayError::AuthConfiguration`] when a required credential is missing
pub(crate) fn build_request(
    tool: &ToolDescriptor,
    effective: &EffectiveConfiguration,
    args: &Map<String, Value>,
) -> Result<OutboundRequest> {
    let execution = tool.execution();
    let auth = apply_auth(&effective.auth, args)?;

    let base = effective.base_url.as_deref().ok_or_else(|| GatewayError::Validation {
        message: format!("configuration '{}' has no base URL", effective.config_id),
        details: json!({ "configId": effective.config_id }),
    })?;
    let mut url = Url::parse(base).map_err(|e| GatewayError::Validation {
        message: format!("invalid base URL for configuration '{}': {e}", effective.config_id),
        details: json!({ "configId": effective.config_id }),
    })?;

    let mut path_args: HashSet<&str> = HashSet::new();
    let mut segments = Vec::new();
    for raw in execution.endpoint_path.split('/').filter(|s| !s.is_empty()) {
        let mut segment = String::with_capacity(raw.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(raw) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = args
                .get(name.as_str())
                .and_then(scalar_string)
                .ok_or_else(|| GatewayError::Validation {
                    message: format!("missing required path parameter: {}", name.as_str()),
                    details: json!({ "parameter": name.as_str() }),
                })?;
            segment.push_str(&raw[last..whole.start()]);
            segment.push_str(&value);
            last = whole.end();
            path_args.insert(name.as_str());
        }
        segment.push_str(&raw[last..]);
        segments.push(segment);
    }

    {
        let mut path = url.path_segments_mut().map_err(|()| GatewayError::Validation {
            message: format!("base URL '{base}' cannot carry a path"),
            details: json!({ "configId": effective.config_id }),
        })?;
        path.pop_if_empty();
        path.extend(&segments);
    }

    let mut query: Vec<(&str, String)> = Vec::new();
    for (name, value) in args {
        if is_reserved(name)
            || path_args.contains(name.as_str())
            || auth.consumed.iter().any(|c| c == name)
        {
            continue;
        }
        match value {
            Value::Array(items) => {
                query.extend(items.iter().filter_map(scalar_string).map(|v| (name.as_str(), v)));
            }
            other => {
                if let Some(v) = scalar_string(other) {
                    query.push((name.as_str(), v));
                }
            }
        }
    }
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }

    let mut request = OutboundRequest::new(execution.http_method, url);
    for (name, value) in &effective.headers {
        request.headers.push((name.clone(), value.clone()));
    }
    for (name, value) in args {
        if let Some(header) = name.strip_prefix(HEADER_ARG_PREFIX)
            && !header.is_empty()
            && let Some(v) = scalar_string(value)
        {
            request.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(header));
            request.headers.push((header.to_string(), v));
        }
    }
    for (name, value) in auth.headers {
        request.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        request.headers.push((name, value));
    }

    if execution.http_method.carries_body()
        && let Some(body) = args.get(REQUEST_BODY_ARG).filter(|b| !b.is_null())
    {
        request.body = Some(body.clone());
    }
    request.timeout = Some(effective.timeout());
    Ok(request)
}
