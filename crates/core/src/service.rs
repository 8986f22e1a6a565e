// Service: metadata, identity and the registry a host exposes

use crate::credentials::{CredentialStore, InMemoryCredentialStore};
use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::tool::{CallerContext, ToolContext, ToolDescriptor, ToolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Human-facing description of the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub title: String,
    pub description: String,
    pub version: String,
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

/// Metadata plus tool listing, as published to hosts.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceManifest {
    #[serde(flatten)]
    pub metadata: ServiceMetadata,
    pub tools: Vec<ToolDescriptor>,
}

/// A set of tools served under one identity.
pub struct ToolService {
    metadata: ServiceMetadata,
    api_key: Option<String>,
    registry: ToolRegistry,
    credentials: Arc<dyn CredentialStore>,
}

impl ToolService {
    pub fn new(metadata: ServiceMetadata, registry: ToolRegistry) -> Self {
        Self {
            metadata,
            api_key: None,
            registry,
            credentials: Arc::new(InMemoryCredentialStore::new()),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn metadata(&self) -> &ServiceMetadata {
        &self.metadata
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn credentials(&self) -> Arc<dyn CredentialStore> {
        self.credentials.clone()
    }

    pub fn manifest(&self) -> ServiceManifest {
        ServiceManifest {
            metadata: self.metadata.clone(),
            tools: self.registry.list(),
        }
    }

    /// Dispatch one invocation to the tool registered under `tool_id`.
    pub async fn invoke(
        &self,
        tool_id: &str,
        input: Value,
        caller: CallerContext,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .registry
            .get(tool_id)
            .ok_or_else(|| ToolError::NotFound(tool_id.to_string()))?;

        let ctx = ToolContext::new(caller, self.credentials.clone());
        tool.invoke(input, &ctx).await
    }
}
