// Tool registry: owns definitions and dispatches invocations by id

use crate::error::ToolError;
use crate::tool::{ToolDefinition, ToolDescriptor};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tool registry for managing available tools
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<ToolDefinition>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Ids must be unique.
    pub fn register(&mut self, tool: ToolDefinition) -> Result<(), ToolError> {
        if self.tools.contains_key(tool.id()) {
            return Err(ToolError::DuplicateTool(tool.id().to_string()));
        }

        tracing::debug!(tool = %tool.id(), "Registered tool");
        self.tools.insert(tool.id().to_string(), Arc::new(tool));
        Ok(())
    }

    /// Register several tools, stopping at the first error.
    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = ToolDefinition>,
    ) -> Result<(), ToolError> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    /// Get a tool by id
    pub fn get(&self, id: &str) -> Option<Arc<ToolDefinition>> {
        self.tools.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Descriptors of all tools, ordered by id
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(|t| t.descriptor()).collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.tools.keys().map(|id| id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
