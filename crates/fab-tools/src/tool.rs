//! Core Tool trait and types
//!
//! Defines the single capability every callable tool implements.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::ToolError;

/// Security level for tool operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Safe read-only operations
    #[default]
    ReadOnly,
    /// Operations that change controller state
    Modify,
}

/// Core trait for all tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name (unique identifier)
    fn name(&self) -> &str;

    /// Get human-readable description
    fn description(&self) -> &str;

    /// Get JSON schema for input validation
    fn input_schema(&self) -> Value;

    /// Invoke the tool with given input
    async fn invoke(&self, input: Value) -> Result<Value, ToolError>;

    /// Get the security level for this tool
    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::ReadOnly
    }
}

/// Type alias for shared tools
pub type BoxedTool = Arc<dyn Tool>;

/// Pull a required string field out of a tool input
pub fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    input
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::invalid_input(format!("missing required string '{}'", field)))
}

/// Closure-backed tool, handy for tests and ad-hoc registration
#[derive(Clone)]
pub struct SimpleTool {
    name: String,
    description: String,
    schema: Value,
    handler: Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>,
}

impl SimpleTool {
    pub fn new<F>(name: &str, description: &str, schema: Value, handler: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler: Arc::new(handler),
        }
    }
}

#[async_trait]
impl Tool for SimpleTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        (self.handler)(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_simple_tool() {
        let tool = SimpleTool::new("echo", "Echo input back", json!({"type": "object"}), |v| Ok(v));

        assert_eq!(tool.name(), "echo");
        assert_eq!(tool.description(), "Echo input back");

        let result = tool.invoke(json!({"msg": "hello"})).await.unwrap();
        assert_eq!(result, json!({"msg": "hello"}));
    }

    #[test]
    fn test_required_str() {
        let input = json!({"path": "/api/class/fvTenant.json", "blank": "  "});
        assert_eq!(required_str(&input, "path").unwrap(), "/api/class/fvTenant.json");
        assert!(required_str(&input, "blank").is_err());
        assert!(required_str(&input, "missing").is_err());
    }
}
