//! Tool (function) call handling: the registry of application handlers and
//! the per-call argument accumulation state machine.

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::protocol::models::{ToolKind, ToolSpec};
use crate::{Error, Result};

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type ToolHandler = Box<dyn Fn(Value) -> BoxFuture<Result<Value>> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub schema: RootSchema,
}

/// A fully-parsed tool invocation ready for dispatch.
#[derive(Clone, Debug)]
pub struct ToolCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug)]
pub struct ToolResult {
    pub call_id: String,
    pub output: Value,
}

/// Registry of application-supplied tool handlers, keyed by function name.
#[derive(Default)]
pub struct ToolRegistry {
    defs: Vec<ToolDefinition>,
    handlers: HashMap<String, ToolHandler>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.defs.len())
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.defs
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn tool<TArgs, TResp, F, Fut>(&mut self, name: &str, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register(name, None, handler);
    }

    pub fn tool_with_description<TArgs, TResp, F, Fut>(
        &mut self,
        name: &str,
        description: impl Into<String>,
        handler: F,
    ) where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        self.register(name, Some(description.into()), handler);
    }

    fn register<TArgs, TResp, F, Fut>(&mut self, name: &str, description: Option<String>, handler: F)
    where
        TArgs: DeserializeOwned + JsonSchema + Send + 'static,
        TResp: Serialize + Send + 'static,
        F: Fn(TArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TResp>> + Send + 'static,
    {
        let schema = schemars::schema_for!(TArgs);
        let name = name.to_string();
        self.defs.push(ToolDefinition {
            name: name.clone(),
            description,
            schema,
        });

        let user_handler = Arc::new(handler);
        let handler = move |value: Value| -> BoxFuture<Result<Value>> {
            let user_handler = Arc::clone(&user_handler);
            Box::pin(async move {
                let args: TArgs = serde_json::from_value(value)?;
                let resp = user_handler(args).await?;
                Ok(serde_json::to_value(resp)?)
            })
        };
        self.handlers.insert(name, Box::new(handler));
    }

    /// Protocol-level tool declarations for `session.update`.
    ///
    /// # Errors
    /// Returns an error if a registered schema fails to serialize.
    pub fn specs(&self) -> Result<Vec<ToolSpec>> {
        self.defs
            .iter()
            .map(|def| {
                Ok(ToolSpec {
                    kind: ToolKind::Function,
                    name: def.name.clone(),
                    description: def.description.clone(),
                    parameters: serde_json::to_value(&def.schema)?,
                })
            })
            .collect()
    }

    /// Dispatch a parsed call to its registered handler.
    ///
    /// # Errors
    /// Returns `UnknownTool` if no handler is registered under the call's
    /// name, or the handler's own error.
    pub async fn dispatch(&self, call: ToolCall) -> Result<ToolResult> {
        let handler = self
            .handlers
            .get(&call.name)
            .ok_or_else(|| Error::UnknownTool(call.name.clone()))?;
        let output = handler(call.arguments).await?;
        Ok(ToolResult {
            call_id: call.call_id,
            output,
        })
    }
}

/// Lifecycle of one function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Accumulating argument text.
    Open,
    /// Arguments finalized (parsed, or failed to parse).
    ArgumentsComplete,
    /// Handler invoked.
    Dispatched,
    /// Result submitted to the server.
    Resolved,
}

/// Outcome of finalizing a call's argument text. Malformed arguments are not
/// fatal: every call must still receive a result, so the parse error is
/// carried as a payload instead of propagating.
#[derive(Debug)]
pub struct CompletedArguments {
    pub name: Option<String>,
    pub arguments: Result<Value>,
}

/// One in-flight function call: call id, function name once known, and the
/// append-only argument text, parsed exactly once at completion.
#[derive(Debug)]
pub struct PendingToolCall {
    call_id: String,
    name: Option<String>,
    arguments: String,
    phase: CallPhase,
}

impl PendingToolCall {
    #[must_use]
    pub const fn new(call_id: String) -> Self {
        Self {
            call_id,
            name: None,
            arguments: String::new(),
            phase: CallPhase::Open,
        }
    }

    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    #[must_use]
    pub const fn phase(&self) -> CallPhase {
        self.phase
    }

    /// Append an argument fragment.
    ///
    /// # Errors
    /// Returns `StreamSealed` once the call has left `Open`.
    pub fn append_arguments(&mut self, fragment: &str) -> Result<()> {
        if self.phase != CallPhase::Open {
            return Err(Error::StreamSealed("tool call arguments"));
        }
        self.arguments.push_str(fragment);
        Ok(())
    }

    /// Finalize the argument text and parse it as JSON. The accumulated
    /// deltas are authoritative; `fallback` (the done event's `arguments`
    /// field) is used only when no deltas arrived.
    ///
    /// # Errors
    /// Returns `StreamSealed` if the call already completed.
    pub fn complete(
        &mut self,
        name: Option<String>,
        fallback: Option<String>,
    ) -> Result<CompletedArguments> {
        if self.phase != CallPhase::Open {
            return Err(Error::StreamSealed("tool call arguments"));
        }
        if name.is_some() {
            self.name = name;
        }
        self.phase = CallPhase::ArgumentsComplete;

        let text = if self.arguments.is_empty() {
            fallback.unwrap_or_default()
        } else {
            std::mem::take(&mut self.arguments)
        };

        let arguments =
            serde_json::from_str::<Value>(&text).map_err(|err| Error::MalformedArguments {
                call_id: self.call_id.clone(),
                message: err.to_string(),
            });
        Ok(CompletedArguments {
            name: self.name.clone(),
            arguments,
        })
    }

    pub fn mark_dispatched(&mut self) {
        self.phase = CallPhase::Dispatched;
    }

    pub fn mark_resolved(&mut self) {
        self.phase = CallPhase::Resolved;
    }
}
