//! Controller resource tools
//!
//! `fetch_resource` and `mutate_resource` expose the controller session to
//! the orchestration loop. Paths are grammar-checked before any network call;
//! transport failures come back already classified.

use async_trait::async_trait;
use fab_controller::{ControllerSession, ResourcePath};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use crate::error::ToolError;
use crate::tool::{required_str, SecurityLevel, Tool};

pub const FETCH_RESOURCE: &str = "fetch_resource";
pub const MUTATE_RESOURCE: &str = "mutate_resource";

fn parse_path(input: &Value) -> Result<ResourcePath, ToolError> {
    let raw = required_str(input, "path")?;
    Ok(ResourcePath::parse(raw)?)
}

/// Read a class or object from the controller
pub struct FetchResourceTool {
    session: Arc<ControllerSession>,
}

impl FetchResourceTool {
    pub fn new(session: Arc<ControllerSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for FetchResourceTool {
    fn name(&self) -> &str {
        FETCH_RESOURCE
    }

    fn description(&self) -> &str {
        "Read managed objects from the fabric controller. The path must look like /api/class/<class>.json or /api/mo/<dn>.json, optionally with a query string."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Resource path, e.g. /api/class/fvTenant.json"
                }
            },
            "required": ["path"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let path = parse_path(&input)?;
        Ok(self.session.get_resource(&path).await?)
    }
}

/// Create, update or delete configuration on the controller
pub struct MutateResourceTool {
    session: Arc<ControllerSession>,
}

impl MutateResourceTool {
    pub fn new(session: Arc<ControllerSession>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for MutateResourceTool {
    fn name(&self) -> &str {
        MUTATE_RESOURCE
    }

    fn description(&self) -> &str {
        "Post a JSON configuration object to the fabric controller. Changes controller state; only resent after an authentication refusal."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Resource path, e.g. /api/mo/uni.json"
                },
                "payload": {
                    "type": "object",
                    "description": "Managed-object document, e.g. {\"fvTenant\": {\"attributes\": {\"name\": \"LAB\"}}}"
                }
            },
            "required": ["path", "payload"]
        })
    }

    fn security_level(&self) -> SecurityLevel {
        SecurityLevel::Modify
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let path = parse_path(&input)?;
        let payload = input
            .get("payload")
            .filter(|p| p.is_object())
            .ok_or_else(|| ToolError::invalid_input("payload must be a JSON object"))?;

        info!("Posting configuration to {}", path);
        Ok(self.session.post_resource(&path, payload).await?)
    }
}
