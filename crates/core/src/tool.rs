// Tool definitions: typed handlers, the definition builder, and invocation

use crate::credentials::CredentialStore;
use crate::error::{FieldViolation, ToolError, ToolFailure};
use crate::render::{AlertLevel, RenderHint};
use crate::schema::Schema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Identity of whoever invoked a tool, supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallerContext {
    pub caller_id: String,
}

impl CallerContext {
    pub fn new(caller_id: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
        }
    }
}

/// Everything a handler receives besides its input.
#[derive(Clone)]
pub struct ToolContext {
    pub caller: CallerContext,
    pub credentials: Arc<dyn CredentialStore>,
    pub invocation_id: Uuid,
}

impl ToolContext {
    pub fn new(caller: CallerContext, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            caller,
            credentials,
            invocation_id: Uuid::new_v4(),
        }
    }

    pub fn caller_id(&self) -> &str {
        &self.caller.caller_id
    }
}

/// Flat per-call price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pricing {
    #[serde(rename = "pricePerUse")]
    pub amount: f64,
    pub currency: String,
}

impl Pricing {
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }

    pub fn free() -> Self {
        Self::new(0.0, "USD")
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::free()
    }
}

/// The envelope returned for every invocation.
///
/// `data` is `None` exactly when the call failed; `text` then explains why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub text: String,
    pub data: Option<Value>,
    #[serde(rename = "ui")]
    pub render_hint: Option<RenderHint>,
}

impl ToolResult {
    pub fn failure(level: AlertLevel, title: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            render_hint: Some(RenderHint::alert(level, title, message.clone())),
            text: message,
            data: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.data.is_none()
    }
}

/// Successful handler output before type erasure.
#[derive(Debug, Clone)]
pub struct ToolReply<O> {
    pub text: String,
    pub data: O,
    pub render_hint: Option<RenderHint>,
}

impl<O> ToolReply<O> {
    pub fn new(text: impl Into<String>, data: O) -> Self {
        Self {
            text: text.into(),
            data,
            render_hint: None,
        }
    }

    pub fn with_render(mut self, hint: RenderHint) -> Self {
        self.render_hint = Some(hint);
        self
    }
}

/// A single typed call against an external API.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    type Input: DeserializeOwned + Send + 'static;
    type Output: Serialize + Send + 'static;

    async fn call(
        &self,
        input: Self::Input,
        ctx: &ToolContext,
    ) -> Result<ToolReply<Self::Output>, ToolFailure>;
}

#[async_trait::async_trait]
trait DynHandler: Send + Sync {
    async fn call(&self, input: Value, ctx: &ToolContext) -> Result<ToolReply<Value>, ToolFailure>;
}

struct Erased<H>(H);

#[async_trait::async_trait]
impl<H: ToolHandler> DynHandler for Erased<H> {
    async fn call(&self, input: Value, ctx: &ToolContext) -> Result<ToolReply<Value>, ToolFailure> {
        let input: H::Input = serde_path_to_error::deserialize(input).map_err(|e| {
            let path = pointer(e.path());
            ToolFailure::InvalidInput(vec![FieldViolation::new(path, e.into_inner().to_string())])
        })?;

        let reply = self.0.call(input, ctx).await?;
        let data = serde_json::to_value(&reply.data).map_err(|e| ToolFailure::Output(e.to_string()))?;

        Ok(ToolReply {
            text: reply.text,
            data,
            render_hint: reply.render_hint,
        })
    }
}

/// Render a deserialization path as a JSON pointer, matching schema violation paths.
fn pointer(path: &serde_path_to_error::Path) -> String {
    use serde_path_to_error::Segment;

    path.iter()
        .filter_map(|segment| match segment {
            Segment::Seq { index } => Some(index.to_string()),
            Segment::Map { key } => Some(key.replace('~', "~0").replace('/', "~1")),
            Segment::Enum { variant } => Some(variant.clone()),
            Segment::Unknown => None,
        })
        .fold(String::new(), |mut acc, part| {
            acc.push('/');
            acc.push_str(&part);
            acc
        })
}

/// Serializable view of a tool for listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub pricing: Pricing,
}

/// An immutable, registered tool.
pub struct ToolDefinition {
    id: String,
    name: String,
    description: String,
    input_schema: Schema,
    output_schema: Schema,
    pricing: Pricing,
    failure_message: String,
    handler: Arc<dyn DynHandler>,
}

impl ToolDefinition {
    /// Start defining a tool with the given id.
    pub fn builder(id: impl Into<String>) -> ToolBuilder {
        ToolBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.as_json().clone(),
            output_schema: self.output_schema.as_json().clone(),
            pricing: self.pricing.clone(),
        }
    }

    /// Validate input, run the handler and shape the result.
    ///
    /// Only input-validation problems come back as `Err`; every handler failure
    /// is turned into a failure `ToolResult`.
    pub async fn invoke(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        if let Err(violations) = self.input_schema.validate(&input) {
            tracing::info!(
                tool = %self.id,
                caller = %ctx.caller_id(),
                violations = violations.len(),
                "Rejected tool input"
            );
            return Err(ToolError::InputValidation {
                tool: self.id.clone(),
                violations,
            });
        }

        tracing::info!(
            tool = %self.id,
            caller = %ctx.caller_id(),
            invocation = %ctx.invocation_id,
            input = %input,
            "Tool invoked"
        );

        match self.handler.call(input, ctx).await {
            Ok(reply) => match self.output_schema.validate(&reply.data) {
                Ok(()) => Ok(ToolResult {
                    text: reply.text,
                    data: Some(reply.data),
                    render_hint: reply.render_hint,
                }),
                Err(violations) => {
                    let detail = violations
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    Ok(self.recover(ToolFailure::Output(detail), ctx))
                }
            },
            Err(ToolFailure::InvalidInput(violations)) => Err(ToolError::InputValidation {
                tool: self.id.clone(),
                violations,
            }),
            Err(failure) => Ok(self.recover(failure, ctx)),
        }
    }

    fn recover(&self, failure: ToolFailure, ctx: &ToolContext) -> ToolResult {
        match failure {
            failure @ (ToolFailure::Rejected(_) | ToolFailure::InvalidInput(_)) => {
                let message = failure.to_string();
                tracing::info!(tool = %self.id, caller = %ctx.caller_id(), reason = %message, "Request rejected");
                ToolResult::failure(AlertLevel::Warning, "Invalid request", message)
            }
            ToolFailure::NoResult(message) => {
                tracing::info!(tool = %self.id, caller = %ctx.caller_id(), "No result");
                ToolResult::failure(AlertLevel::Info, "No results", message)
            }
            ToolFailure::Upstream(err) => {
                tracing::warn!(
                    tool = %self.id,
                    caller = %ctx.caller_id(),
                    invocation = %ctx.invocation_id,
                    error = %err,
                    "Upstream call failed"
                );
                ToolResult::failure(AlertLevel::Error, "Error", self.failure_message.clone())
            }
            ToolFailure::Output(detail) => {
                tracing::error!(
                    tool = %self.id,
                    invocation = %ctx.invocation_id,
                    detail = %detail,
                    "Handler output does not match output schema"
                );
                ToolResult::failure(AlertLevel::Error, "Error", self.failure_message.clone())
            }
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ToolDefinition`]; `build` enforces the definition rules.
pub struct ToolBuilder {
    id: String,
    name: Option<String>,
    description: String,
    input_schema: Option<Value>,
    output_schema: Option<Value>,
    pricing: Pricing,
    failure_message: Option<String>,
    handler: Option<Arc<dyn DynHandler>>,
}

impl ToolBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: String::new(),
            input_schema: None,
            output_schema: None,
            pricing: Pricing::free(),
            failure_message: None,
            handler: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input_schema(mut self, schema: Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn pricing(mut self, amount: f64, currency: impl Into<String>) -> Self {
        self.pricing = Pricing::new(amount, currency);
        self
    }

    /// Text shown to the user when the upstream call fails.
    pub fn failure_message(mut self, message: impl Into<String>) -> Self {
        self.failure_message = Some(message.into());
        self
    }

    pub fn handler<H: ToolHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(Erased(handler)));
        self
    }

    pub fn build(self) -> Result<ToolDefinition, ToolError> {
        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(ToolError::Validation("tool id must not be empty".to_string()));
        }

        let input_schema = self
            .input_schema
            .ok_or_else(|| ToolError::Validation(format!("{}: missing input schema", id)))
            .and_then(Schema::new)?;
        let output_schema = self
            .output_schema
            .ok_or_else(|| ToolError::Validation(format!("{}: missing output schema", id)))
            .and_then(Schema::new)?;

        let handler = self
            .handler
            .ok_or_else(|| ToolError::Validation(format!("{}: missing handler", id)))?;

        if !self.pricing.amount.is_finite() || self.pricing.amount < 0.0 {
            return Err(ToolError::Validation(format!(
                "{}: price must be a non-negative number",
                id
            )));
        }
        if self.pricing.currency.trim().is_empty() {
            return Err(ToolError::Validation(format!("{}: currency must not be empty", id)));
        }

        let name = self.name.unwrap_or_else(|| id.clone());
        let failure_message = self.failure_message.unwrap_or_else(|| {
            format!(
                "Sorry, {} is unavailable right now. Please try again later.",
                name
            )
        });

        Ok(ToolDefinition {
            id,
            name,
            description: self.description,
            input_schema,
            output_schema,
            pricing: self.pricing,
            failure_message,
            handler,
        })
    }
}
