//! Prompt bundle
//!
//! The text sent to the oracle is assembled from four static assets compiled
//! into the binary: the business data model, the output rules, the few-shot
//! examples and a template that stitches them around the user question.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::OracleError;

const SCHEMA: &str = include_str!("prompts/schema.md");
const RULES: &str = include_str!("prompts/rules.md");
const TEMPLATE: &str = include_str!("prompts/template.md");
const EXAMPLES: &str = include_str!("prompts/examples.json");

/// One few-shot pair: a question and the query that answers it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    pub question: String,
    pub query: Value,
}

impl Example {
    /// Collection targeted by the example query, if it names one
    pub fn collection(&self) -> Option<&str> {
        self.query.get("collection").and_then(Value::as_str)
    }
}

/// Static, versioned instructions for the oracle
#[derive(Debug, Clone, Copy)]
pub struct PromptBundle {
    schema: &'static str,
    rules: &'static str,
    template: &'static str,
    examples: &'static str,
}

impl PromptBundle {
    /// Bumped whenever any bundled asset changes
    pub const VERSION: &'static str = "2025.06.1";

    /// The bundle compiled into this crate
    pub fn builtin() -> Self {
        PromptBundle {
            schema: SCHEMA,
            rules: RULES,
            template: TEMPLATE,
            examples: EXAMPLES,
        }
    }

    pub fn schema(&self) -> &'static str {
        self.schema
    }

    pub fn rules(&self) -> &'static str {
        self.rules
    }

    /// Decode the few-shot examples
    pub fn examples(&self) -> Result<Vec<Example>, OracleError> {
        serde_json::from_str(self.examples)
            .map_err(|e| OracleError::NotConfigured(format!("prompt examples are invalid: {}", e)))
    }

    /// Render the full prompt for one question
    pub fn render(&self, question: &str) -> Result<String, OracleError> {
        let examples = self
            .examples()?
            .iter()
            .map(|example| format!("Question: {}\nJSON: {}\n", example.question, example.query))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(self
            .template
            .replace("<<schema>>", self.schema.trim_end())
            .replace("<<rules>>", self.rules.trim_end())
            .replace("<<examples>>", examples.trim_end())
            .replace("<<question>>", question.trim()))
    }
}

impl Default for PromptBundle {
    fn default() -> Self {
        Self::builtin()
    }
}
