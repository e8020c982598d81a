//! Sandboxed code execution tool

use async_trait::async_trait;
use fab_sandbox::CodeSandbox;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::tool::{required_str, Tool};

pub const RUN_CODE: &str = "run_code";

pub struct RunCodeTool {
    sandbox: Arc<CodeSandbox>,
}

impl RunCodeTool {
    pub fn new(sandbox: Arc<CodeSandbox>) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for RunCodeTool {
    fn name(&self) -> &str {
        RUN_CODE
    }

    fn description(&self) -> &str {
        "Run a short Python snippet over fetched data, bound as `data`. Only json, math, statistics, re, collections, itertools, functools, datetime, operator, string, decimal and fractions may be imported. Print the result."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "snippet": { "type": "string" },
                "bindings": { "description": "Value bound as `data`" }
            },
            "required": ["snippet"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let snippet = required_str(&input, "snippet")?;
        let bindings = input.get("bindings").cloned().unwrap_or(Value::Null);
        debug!("run_code: {} byte snippet", snippet.len());

        let output = self.sandbox.run(snippet, &bindings).await?;
        Ok(json!({ "output": output }))
    }
}
