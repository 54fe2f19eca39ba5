//! HTTP plumbing shared by the tool gateway crates.
//!
//! - [`method`]: the HTTP methods an `OpenAPI` document can declare
//! - [`transport`]: the outbound request contract plus a `reqwest` implementation
//! - [`safety`]: where outbound requests may go (address classes, host allow-list, redirects)
//! - [`semantics`]: method semantics as MCP tool annotations
//!
//! It contains **no** registry or invocation logic.

pub mod method;
pub mod safety;
pub mod semantics;
pub mod transport;

pub use method::HttpMethod;
pub use safety::OutboundPolicy;
pub use transport::{
    HttpTransport, OutboundRequest, OutboundResponse, ReqwestTransport, TransportError,
};
