//! Tool declarations and dispatch.
//!
//! A tool call arrives as `{name, args}`. Args are validated against the
//! declared parameter schema before the handler runs; unknown tool names
//! are rejected without executing anything.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::FunctionCall;

/// Schema describing one callable tool, in provider function-declaration
/// form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema for the arguments object
    pub parameters: serde_json::Value,
}

impl ToolDeclaration {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Required argument names from the parameter schema.
    fn required_params(&self) -> Vec<String> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Result of dispatching one tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { result: serde_json::Value },
    Error { error: String },
}

impl ToolOutcome {
    pub fn error(msg: impl Into<String>) -> Self {
        ToolOutcome::Error { error: msg.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Success { .. })
    }

    /// The payload sent back to the model as a function response.
    pub fn to_response_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

type ToolHandler = Box<dyn Fn(&serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync>;

/// Registry of tools exposed to the model for one conversation.
#[derive(Default)]
pub struct ToolRegistry {
    declarations: Vec<ToolDeclaration>,
    handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, declaration: ToolDeclaration, handler: F)
    where
        F: Fn(&serde_json::Value) -> Result<serde_json::Value, String> + Send + Sync + 'static,
    {
        self.handlers
            .insert(declaration.name.clone(), Box::new(handler));
        self.declarations.push(declaration);
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.declarations.clone()
    }

    /// Validate and execute one call.
    pub fn dispatch(&self, call: &FunctionCall) -> ToolOutcome {
        let Some(declaration) = self.declarations.iter().find(|d| d.name == call.name) else {
            return ToolOutcome::error(format!("Unknown tool: {}", call.name));
        };

        for required in declaration.required_params() {
            if call.args.get(&required).is_none() {
                return ToolOutcome::error(format!(
                    "Missing required parameter '{}' for tool '{}'",
                    required, call.name
                ));
            }
        }

        match self.handlers.get(&call.name) {
            Some(handler) => match handler(&call.args) {
                Ok(result) => ToolOutcome::Success { result },
                Err(error) => ToolOutcome::Error { error },
            },
            None => ToolOutcome::error(format!("No handler for tool: {}", call.name)),
        }
    }
}
