//! OpenAPI->tool tooling: specification ingestion and tool synthesis.
//!
//! Used by `unrelated-tool-gateway`. Contains no storage and no invocation logic.

pub mod config;
pub mod descriptor;
pub mod endpoint;
pub mod error;
pub mod ingest;
pub mod naming;
pub mod resolver;
pub mod schema;
pub mod source;
pub mod synth;

pub use config::{GenerationOptions, HashPolicy, NamingConvention};
pub use descriptor::{ExecutionContext, ToolDescriptor, ToolDescriptorParts};
pub use endpoint::{EndpointDescriptor, ParamLocation, ParameterDescriptor};
pub use error::{OpenApiToolsError, Result};
pub use ingest::{ParsedSpec, SpecIngester, SpecValidationReport, ValidationIssue};
pub use source::{DefaultSourceProvider, SpecSource, SpecSourceProvider, spec_hash};
pub use synth::{ApiSpecContext, ToolSynthesizer};
