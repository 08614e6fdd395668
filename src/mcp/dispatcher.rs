//! Tool registry and invocation
//!
//! Tools are registered once while the server is being built; afterwards the
//! dispatcher is shared read-only between all sessions.

use std::{collections::HashMap, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures::FutureExt;
use rust_mcp_sdk::schema::{CallToolResult, ContentBlock, TextContent, Tool};
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use crate::errors::{AppError, ToolError};
use crate::mcp::schema::{ArgumentSchema, ToolArguments};
use crate::session::{
    events::{EventChannel, EventId},
    SessionId,
};

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, AppError>;
}

pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: ArgumentSchema,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: ArgumentSchema,
        handler: impl ToolHandler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            handler: Arc::new(handler),
        }
    }

    /// Entry for a `tools/list` result.
    pub fn to_tool(&self) -> Result<Tool, serde_json::Error> {
        serde_json::from_value(json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.schema.to_json_schema(),
        }))
    }
}

/// Per-call view of the calling session given to handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    session_id: SessionId,
    tool: String,
    events: EventChannel,
}

impl ToolContext {
    pub fn new(session_id: SessionId, tool: impl Into<String>, events: EventChannel) -> Self {
        Self {
            session_id,
            tool: tool.into(),
            events,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Pushes a `notifications/message` to the session's event stream.
    pub fn notify(&self, level: &str, data: Value) -> Option<EventId> {
        self.events.publish_json(&json!({
            "jsonrpc": "2.0",
            "method": "notifications/message",
            "params": {
                "level": level,
                "logger": self.tool,
                "data": data,
            }
        }))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolOutput {
    pub text: Vec<String>,
    pub structured: Option<Map<String, Value>>,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: vec![text.into()],
            structured: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text.push(text.into());
        self
    }

    pub fn with_structured(mut self, structured: Map<String, Value>) -> Self {
        self.structured = Some(structured);
        self
    }
}

impl From<ToolOutput> for CallToolResult {
    fn from(output: ToolOutput) -> Self {
        let mut text = output.text;
        if text.is_empty() {
            text.push(String::new());
        }

        CallToolResult {
            content: text
                .into_iter()
                .map(|block| ContentBlock::from(TextContent::new(block, None, None)))
                .collect(),
            is_error: None,
            meta: None,
            structured_content: output.structured,
        }
    }
}

#[derive(Default)]
pub struct ToolDispatcher {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), ToolError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(ToolError::DuplicateToolName {
                name: descriptor.name,
            });
        }

        self.index.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|position| &self.tools[*position])
    }

    /// Descriptors in registration order.
    pub fn tools(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validates `raw_args` against the tool's schema and runs its handler.
    ///
    /// Handler failures, including panics, come back as tool errors and never
    /// escape to the caller.
    pub async fn invoke(
        &self,
        name: &str,
        raw_args: Option<Value>,
        ctx: ToolContext,
    ) -> Result<ToolOutput, ToolError> {
        let descriptor = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        let args = descriptor.schema.validate(raw_args)?;

        match AssertUnwindSafe(descriptor.handler.call(args, ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => {
                warn!(tool = %name, code = err.code(), error = ?err, "tool handler failed");
                let message = match err {
                    AppError::Internal { .. } => "internal tool failure".to_string(),
                    other => other.to_string(),
                };
                Err(ToolError::Execution {
                    tool: name.to_string(),
                    message,
                })
            }
            Err(_) => {
                error!(tool = %name, "tool handler panicked");
                Err(ToolError::Internal {
                    tool: name.to_string(),
                })
            }
        }
    }
}
