//! Named endpoint lookup tool

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::catalog::EndpointCatalog;
use crate::error::ToolError;
use crate::tool::{required_str, Tool};

pub const LOOKUP_ENDPOINT: &str = "lookup_endpoint";

pub struct LookupEndpointTool {
    catalog: Arc<EndpointCatalog>,
}

impl LookupEndpointTool {
    pub fn new(catalog: Arc<EndpointCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Tool for LookupEndpointTool {
    fn name(&self) -> &str {
        LOOKUP_ENDPOINT
    }

    fn description(&self) -> &str {
        "Find the resource path for a named object collection (e.g. 'tenants', 'bridge domains'). Returns null when nothing is close enough."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" }
            },
            "required": ["name"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let name = required_str(&input, "name")?;
        Ok(match self.catalog.lookup(name) {
            Some(hit) => json!({ "name": hit.name, "path": hit.path, "score": hit.score }),
            None => Value::Null,
        })
    }
}
