//! Document retrieval + synthesis tool

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ToolError;
use crate::synthesizer::AnswerSynthesizer;
use crate::tool::{required_str, Tool};

pub const RETRIEVE_AND_SYNTHESIZE: &str = "retrieve_and_synthesize";

pub struct RetrieveAndSynthesizeTool {
    synthesizer: Arc<AnswerSynthesizer>,
}

impl RetrieveAndSynthesizeTool {
    pub fn new(synthesizer: Arc<AnswerSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Tool for RetrieveAndSynthesizeTool {
    fn name(&self) -> &str {
        RETRIEVE_AND_SYNTHESIZE
    }

    fn description(&self) -> &str {
        "Search the REST API configuration guide and answer from the retrieved passages only. Use it to find the resource path for a request."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Natural-language question"
                }
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, input: Value) -> Result<Value, ToolError> {
        let query = required_str(&input, "query")?;
        let synthesis = self.synthesizer.synthesize(query).await?;
        serde_json::to_value(synthesis).map_err(|e| ToolError::parse(e.to_string()))
    }
}
