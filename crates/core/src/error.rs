//! Error types for tool definition, invocation and upstream calls.

use serde::{Deserialize, Serialize};

/// A single schema violation, addressed by JSON pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// JSON pointer to the offending value ("" for the document root).
    pub path: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced to whoever defines, registers or invokes tools.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool definition itself is invalid.
    #[error("Invalid tool definition: {0}")]
    Validation(String),

    /// Caller input failed the tool's input schema.
    #[error("Invalid input for {tool}: {}", join_violations(.violations))]
    InputValidation {
        tool: String,
        violations: Vec<FieldViolation>,
    },

    /// No tool with this id is registered.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Another tool already uses this id.
    #[error("Duplicate tool id: {0}")]
    DuplicateTool(String),

    /// A required setting (base URL, API key, client credentials) is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Failures talking to a third-party API.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// Network-level failure (connect, timeout, TLS).
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Upstream answered with a non-2xx status.
    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body could not be decoded into the expected shape.
    #[error("Malformed upstream response: {0}")]
    Decode(String),

    /// Response decoded but the expected primary result is absent.
    #[error("Upstream response is missing {0}")]
    MissingResult(String),

    /// Endpoint URL could not be built.
    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    /// Credentials were rejected or no token could be obtained.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Upstream answered 2xx but reported an error code in the body.
    #[error("Upstream reported {code}: {message}")]
    Api { code: String, message: String },
}

impl UpstreamError {
    /// Check if retrying the same request could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// HTTP status of the upstream response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Outcome of a handler that did not produce data.
///
/// Only `InvalidInput` escapes `ToolDefinition::invoke`, as an input-validation
/// error; the rest become a failure `ToolResult` with an alert render hint.
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    /// Input passed the schema but could not be deserialized into the handler's type.
    #[error("Invalid input: {}", join_violations(.0))]
    InvalidInput(Vec<FieldViolation>),

    /// Input is well-formed but semantically unacceptable; the message is shown to the user.
    #[error("{0}")]
    Rejected(String),

    /// Upstream answered but had nothing for this query; the message is shown to the user.
    #[error("{0}")]
    NoResult(String),

    /// Upstream call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// Handler data did not match the declared output schema.
    #[error("Output does not match schema: {0}")]
    Output(String),
}
