// Compiled JSON Schemas for tool input and output, plus helpers for writing them

use crate::error::{FieldViolation, ToolError};
use jsonschema::JSONSchema;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::sync::Arc;

/// A JSON Schema document compiled once at definition time.
#[derive(Clone)]
pub struct Schema {
    raw: Value,
    compiled: Arc<JSONSchema>,
}

impl Schema {
    /// Compile a schema document. Fails if the document is not a valid schema.
    pub fn new(raw: Value) -> Result<Self, ToolError> {
        let compiled = JSONSchema::compile(&raw)
            .map_err(|e| ToolError::Validation(format!("invalid schema: {}", e)))?;

        Ok(Self {
            raw,
            compiled: Arc::new(compiled),
        })
    }

    /// The schema document as written.
    pub fn as_json(&self) -> &Value {
        &self.raw
    }

    /// Validate an instance, collecting every violation.
    pub fn validate(&self, instance: &Value) -> Result<(), Vec<FieldViolation>> {
        match self.compiled.validate(instance) {
            Ok(()) => Ok(()),
            Err(errors) => Err(errors
                .map(|e| FieldViolation::new(e.instance_path.to_string(), e.to_string()))
                .collect()),
        }
    }

    pub fn is_valid(&self, instance: &Value) -> bool {
        self.compiled.is_valid(instance)
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Schema").field(&self.raw).finish()
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

// Helper functions for creating tool schemas

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "description": description
    })
}

/// A string that must contain at least one non-whitespace character.
pub fn json_schema_text(description: &str) -> Value {
    serde_json::json!({
        "type": "string",
        "minLength": 1,
        "pattern": "\\S",
        "description": description
    })
}

pub fn json_schema_nullable_string(description: &str) -> Value {
    serde_json::json!({
        "type": ["string", "null"],
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> Value {
    serde_json::json!({
        "type": "number",
        "description": description
    })
}

pub fn json_schema_nullable_number(description: &str) -> Value {
    serde_json::json!({
        "type": ["number", "null"],
        "description": description
    })
}

pub fn json_schema_number_range(description: &str, minimum: f64, maximum: f64) -> Value {
    serde_json::json!({
        "type": "number",
        "minimum": minimum,
        "maximum": maximum,
        "description": description
    })
}

pub fn json_schema_integer_range(description: &str, minimum: i64, maximum: i64) -> Value {
    serde_json::json!({
        "type": "integer",
        "minimum": minimum,
        "maximum": maximum,
        "description": description
    })
}

pub fn json_schema_array(items: Value, description: &str) -> Value {
    serde_json::json!({
        "type": "array",
        "items": items,
        "description": description
    })
}
