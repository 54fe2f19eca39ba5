//! Error types for `unrelated-openapi-tools`.

use thiserror::Error;

/// Main error type for `OpenAPI` ingestion and tool synthesis.
#[derive(Error, Debug)]
pub enum OpenApiToolsError {
    /// Invalid options (bad regex, missing prefix, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OpenAPI error: failed to fetch spec from '{url}': {message}")]
    SpecFetch { url: String, message: String },

    #[error("OpenAPI error: failed to read spec file '{path}': {source}")]
    SpecReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The source is not a syntactically valid `OpenAPI` 3 document.
    #[error("OpenAPI error: failed to parse OpenAPI spec from '{location}': {}", diagnostics.join("; "))]
    SpecParse {
        location: String,
        diagnostics: Vec<String>,
    },

    #[error("OpenAPI error: spec '{location}' declares no paths")]
    NoPaths { location: String },

    #[error("OpenAPI error: spec hash mismatch for '{location}'. Expected: {expected}, Got: {actual}")]
    SpecHashMismatch {
        location: String,
        expected: String,
        actual: String,
    },

    /// `$ref` resolution failures (missing targets, cycles, unreadable documents).
    #[error("OpenAPI error: {0}")]
    Reference(String),

    /// A tool descriptor failed construction-time validation.
    #[error("Invalid tool descriptor: {0}")]
    InvalidDescriptor(String),
}

impl OpenApiToolsError {
    /// Whether this error means the specification source could not be turned into a document.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            OpenApiToolsError::SpecFetch { .. }
                | OpenApiToolsError::SpecReadFile { .. }
                | OpenApiToolsError::SpecParse { .. }
                | OpenApiToolsError::NoPaths { .. }
                | OpenApiToolsError::SpecHashMismatch { .. }
        )
    }
}

/// Result type alias for `OpenAPI` tooling operations.
pub type Result<T> = std::result::Result<T, OpenApiToolsError>;
