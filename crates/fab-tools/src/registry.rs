//! Tool Registry
//!
//! Name-keyed registry of the capabilities exposed to the orchestration loop,
//! with per-tool call and failure counters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::tool::{BoxedTool, SecurityLevel};

/// Tool definition metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub security_level: SecurityLevel,
}

/// A registered tool with usage tracking
struct RegisteredTool {
    tool: BoxedTool,
    definition: ToolDefinition,
    calls: AtomicU64,
    failures: AtomicU64,
}

/// Per-tool counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolUsage {
    pub calls: u64,
    pub failures: u64,
}

/// Statistics about the registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_registered: usize,
    pub total_calls: u64,
    pub total_failures: u64,
    pub per_tool: HashMap<String, ToolUsage>,
}

/// Tool Registry
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<Arc<str>, Arc<RegisteredTool>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool instance; a tool with the same name is replaced
    pub async fn register_tool(&self, tool: BoxedTool) {
        let definition = ToolDefinition {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
            security_level: tool.security_level(),
        };
        let name: Arc<str> = Arc::from(tool.name());
        let registered = Arc::new(RegisteredTool {
            tool,
            definition,
            calls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });

        if self.tools.write().await.insert(name.clone(), registered).is_some() {
            warn!("Replaced existing tool: {}", name);
        } else {
            debug!("Registered tool: {}", name);
        }
    }

    pub async fn get(&self, name: &str) -> Option<BoxedTool> {
        self.tools.read().await.get(name).map(|r| r.tool.clone())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.tools.read().await.contains_key(name)
    }

    /// Definitions sorted by name
    pub async fn list_definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .read()
            .await
            .values()
            .map(|r| r.definition.clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Look up and invoke a tool, updating its counters
    pub async fn invoke(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let registered = self.tools.read().await.get(name).cloned().ok_or_else(|| {
            ToolError::UnknownTool {
                name: name.to_string(),
            }
        })?;

        registered.calls.fetch_add(1, Ordering::Relaxed);
        debug!("Invoking tool {}", name);
        let result = registered.tool.invoke(input).await;
        if let Err(e) = &result {
            registered.failures.fetch_add(1, Ordering::Relaxed);
            debug!("Tool {} failed: {} ({})", name, e, e.code());
        }
        result
    }

    pub async fn stats(&self) -> RegistryStats {
        let tools = self.tools.read().await;
        let mut stats = RegistryStats {
            total_registered: tools.len(),
            ..RegistryStats::default()
        };
        for (name, registered) in tools.iter() {
            let usage = ToolUsage {
                calls: registered.calls.load(Ordering::Relaxed),
                failures: registered.failures.load(Ordering::Relaxed),
            };
            stats.total_calls += usage.calls;
            stats.total_failures += usage.failures;
            stats.per_tool.insert(name.to_string(), usage);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::SimpleTool;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_and_invoke() {
        let registry = ToolRegistry::new();
        registry
            .register_tool(Arc::new(SimpleTool::new("echo", "Echo", json!({}), |v| Ok(v))))
            .await;
        registry
            .register_tool(Arc::new(SimpleTool::new("broken", "Always fails", json!({}), |_| {
                Err(ToolError::upstream("down"))
            })))
            .await;

        assert!(registry.contains("echo").await);
        assert_eq!(registry.invoke("echo", json!(1)).await.unwrap(), json!(1));
        assert!(registry.invoke("broken", json!(null)).await.is_err());

        let stats = registry.stats().await;
        assert_eq!(stats.total_registered, 2);
        assert_eq!(stats.total_calls, 2);
        assert_eq!(stats.total_failures, 1);
        assert_eq!(stats.per_tool["broken"], ToolUsage { calls: 1, failures: 1 });
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("nope", json!({})).await.unwrap_err();
        assert_eq!(err, ToolError::UnknownTool { name: "nope".into() });
    }

    #[tokio::test]
    async fn test_definitions_sorted() {
        let registry = ToolRegistry::new();
        for name in ["b_tool", "a_tool"] {
            registry
                .register_tool(Arc::new(SimpleTool::new(name, "t", json!({}), |v| Ok(v))))
                .await;
        }
        let names: Vec<_> = registry
            .list_definitions()
            .await
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a_tool", "b_tool"]);
    }
}
