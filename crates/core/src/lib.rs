// Core types for Toolhost: the tool-handler contract and its supporting pieces

pub mod credentials;
pub mod error;
pub mod extract;
pub mod registry;
pub mod render;
pub mod schema;
pub mod service;
pub mod tool;

pub use credentials::{CachedCredential, CredentialStore, InMemoryCredentialStore};
pub use error::{FieldViolation, ToolError, ToolFailure, UpstreamError};
pub use registry::ToolRegistry;
pub use render::{AlertLevel, RenderHint, RenderKind};
pub use schema::Schema;
pub use service::{ServiceManifest, ServiceMetadata, ToolService};
pub use tool::{
    CallerContext, Pricing, ToolBuilder, ToolContext, ToolDefinition, ToolDescriptor, ToolHandler,
    ToolReply, ToolResult,
};
