//! Conversion to MCP protocol types.

use crate::model::{ContentBlock, ToolOutcome, ToolResult};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{Value, json};
use std::sync::Arc;
use unrelated_http_tools::semantics::annotations_for_method;
use unrelated_openapi_tools::ToolDescriptor;

/// MCP tool listing entry for a descriptor.
#[must_use]
pub fn tool_to_mcp(descriptor: &ToolDescriptor) -> Tool {
    let schema_obj = descriptor
        .input_schema()
        .as_object()
        .cloned()
        .unwrap_or_else(JsonObject::new);
    let mut tool = Tool::new(
        descriptor.name().to_string(),
        descriptor.description().to_string(),
        Arc::new(schema_obj),
    );
    tool.annotations = Some(annotations_for_method(descriptor.execution().http_method));
    tool
}

fn block_to_content(block: &ContentBlock) -> Content {
    match block {
        ContentBlock::Text { text } => Content::text(text.clone()),
        ContentBlock::Json { json } => {
            Content::text(serde_json::to_string(json).unwrap_or_else(|_| json.to_string()))
        }
        ContentBlock::Binary { mime_type, data } if mime_type.starts_with("image/") => {
            Content::image(data.clone(), mime_type.clone())
        }
        ContentBlock::Binary { mime_type, data } => {
            Content::text(format!("data:{mime_type};base64,{data}"))
        }
    }
}

/// MCP call result for a [`ToolResult`].
///
/// A single JSON object body is also returned as `structured_content`.
#[must_use]
pub fn result_to_mcp(result: &ToolResult) -> CallToolResult {
    match &result.outcome {
        ToolOutcome::Success { content } => {
            let structured = match content.as_slice() {
                [ContentBlock::Json { json: v @ Value::Object(_) }] => Some(v.clone()),
                _ => None,
            };
            CallToolResult {
                content: content.iter().map(block_to_content).collect(),
                structured_content: structured,
                is_error: Some(false),
                meta: None,
            }
        }
        ToolOutcome::Error { error } => {
            let structured = json!({ "error": error });
            CallToolResult {
                content: vec![Content::text(format!("{}: {}", error.code, error.message))],
                structured_content: Some(structured),
                is_error: Some(true),
                meta: None,
            }
        }
    }
}
