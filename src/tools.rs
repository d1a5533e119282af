//! Tool execution capability for function-calling rounds.
//!
//! The orchestrator resolves tool invocations sequentially through a
//! [`ToolRegistry`]. A failing tool halts the round and the error
//! propagates to the caller.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::provider::{ToolCallRequest, ToolSpec};

/// One callable tool exposed to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Tools the orchestrator may resolve during a request.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any existing tool of the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        tracing::debug!("registered tool {}", tool.name());
        self.tools.push(tool);
    }

    /// Definitions to advertise in generation parameters.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Execute one requested invocation.
    pub async fn execute(&self, call: &ToolCallRequest) -> Result<Value, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == call.name)
            .ok_or_else(|| ToolError::Unknown(call.name.clone()))?;
        tracing::debug!("executing tool {}", call.name);
        tool.call(call.arguments.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Returns its arguments unchanged"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}})
        }

        async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(arguments)
        }
    }

    #[tokio::test]
    async fn test_execute_known_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));

        let result = registry
            .execute(&ToolCallRequest {
                name: "echo".to_string(),
                arguments: json!({"text": "hi"}),
            })
            .await
            .unwrap();
        assert_eq!(result["text"], "hi");
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute(&ToolCallRequest {
                name: "missing".to_string(),
                arguments: json!({}),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unknown(name) if name == "missing"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        registry.register(Box::new(Echo));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn test_specs_expose_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(Echo));
        let specs = registry.specs();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "echo");
        assert_eq!(specs[0].parameters["type"], "object");
    }
}
