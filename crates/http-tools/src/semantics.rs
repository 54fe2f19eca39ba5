//! HTTP semantics helpers.
//!
//! Generates MCP `ToolAnnotations` for HTTP-backed tools based on RFC 9110-style method
//! semantics.

use crate::method::HttpMethod;
use rmcp::model::ToolAnnotations;

/// Generate MCP tool annotations based on HTTP method semantics.
///
/// `openWorldHint` is always `true` for HTTP tools (they interact with an external system).
#[must_use]
pub fn annotations_for_method(method: HttpMethod) -> ToolAnnotations {
    let open_world_hint = Some(true);

    let (read_only, destructive, idempotent) = match method {
        HttpMethod::Get | HttpMethod::Head | HttpMethod::Options | HttpMethod::Trace => {
            (true, false, Some(true))
        }
        HttpMethod::Post => (false, false, Some(false)),
        HttpMethod::Put | HttpMethod::Delete => (false, true, Some(true)),
        // PATCH may or may not be idempotent; do not guess.
        HttpMethod::Patch => (false, true, None),
    };

    ToolAnnotations {
        title: None,
        read_only_hint: Some(read_only),
        destructive_hint: Some(destructive),
        idempotent_hint: idempotent,
        open_world_hint,
    }
}
