//! Oracle boundary
//!
//! The oracle turns a rendered prompt into candidate query text. Everything
//! it returns goes through the [`QueryGateway`], so an [`Assistant`] is as
//! total as the gateway: every question yields records or an error line.

pub mod chat;
pub mod prompt;

use chrono::{DateTime, Utc};
use log::{info, warn};

use crate::core::errors::{ErrorCategory, OracleError};
use crate::ql::QueryGateway;

pub use chat::ChatOracle;
pub use prompt::{Example, PromptBundle};

/// Produces structured-query text for a prompt
pub trait Oracle {
    fn propose(&self, prompt: &str) -> Result<String, OracleError>;
}

impl<F> Oracle for F
where
    F: Fn(&str) -> Result<String, OracleError>,
{
    fn propose(&self, prompt: &str) -> Result<String, OracleError> {
        self(prompt)
    }
}

/// Question-to-records pipeline: prompt, oracle, gateway
pub struct Assistant<O: Oracle> {
    oracle: O,
    prompts: PromptBundle,
    gateway: QueryGateway,
}

impl<O: Oracle> Assistant<O> {
    pub fn new(oracle: O, gateway: QueryGateway) -> Self {
        Assistant {
            oracle,
            prompts: PromptBundle::builtin(),
            gateway,
        }
    }

    /// Use a different prompt bundle
    pub fn with_prompts(mut self, prompts: PromptBundle) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn gateway(&self) -> &QueryGateway {
        &self.gateway
    }

    /// Ask the oracle for the query text answering `question`
    pub fn propose(&self, question: &str) -> Result<String, OracleError> {
        let prompt = self.prompts.render(question)?;
        info!(
            "Asking oracle (prompt bundle {}): {}",
            PromptBundle::VERSION,
            question.trim()
        );
        self.oracle.propose(&prompt)
    }

    /// Answer a question as a JSON array of records or an error line
    pub fn ask(&self, question: &str) -> String {
        self.ask_at(question, Utc::now())
    }

    /// As [`Assistant::ask`], resolving date placeholders against `now`
    pub fn ask_at(&self, question: &str, now: DateTime<Utc>) -> String {
        match self.propose(question) {
            Ok(answer) => self.gateway.run_at(&answer, now),
            Err(e) => {
                warn!("Oracle failed: {}", e);
                format!("{}: {}", ErrorCategory::Execution, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::UnresolvedPolicy;
    use crate::storage::MemoryStore;
    use serde_json::Value;
    use std::cell::RefCell;
    use std::sync::Arc;

    const FIXTURE: &str = include_str!("../../demos/fixtures/shop.json");

    /// Question phrasings that match a period a summary collection covers
    const SUMMARY_PERIODS: [&str; 4] = ["last month", "monthly", "weekly", "daily"];

    fn clock() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-10T09:15:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn shop_gateway() -> QueryGateway {
        let store = MemoryStore::from_value(serde_json::from_str(FIXTURE).unwrap()).unwrap();
        QueryGateway::new(Arc::new(store)).with_policy(UnresolvedPolicy::Reject)
    }

    #[test]
    fn test_every_bundled_example_runs_against_the_fixture() {
        let gateway = shop_gateway();
        let examples = PromptBundle::builtin().examples().unwrap();

        for example in &examples {
            let records = gateway
                .execute_at(&example.query.to_string(), clock())
                .unwrap_or_else(|e| panic!("{:?} failed: {}", example.question, e));
            assert!(!records.is_empty(), "{:?} returned nothing", example.question);
        }
    }

    #[test]
    fn test_period_questions_route_to_summaries() {
        let examples = PromptBundle::builtin().examples().unwrap();
        let periodic: Vec<&Example> = examples
            .iter()
            .filter(|e| {
                let question = e.question.to_lowercase();
                SUMMARY_PERIODS.iter().any(|period| question.contains(period))
            })
            .collect();

        assert!(!periodic.is_empty());
        for example in periodic {
            let collection = example.collection().unwrap_or_default();
            assert!(
                collection.ends_with("Summary"),
                "{:?} targets {}",
                example.question,
                collection
            );
        }
    }

    #[test]
    fn test_last_month_profit_example_values() {
        let gateway = shop_gateway();
        let example = PromptBundle::builtin()
            .examples()
            .unwrap()
            .into_iter()
            .find(|e| e.question.contains("last month"))
            .unwrap();

        let out = gateway.run_at(&example.query.to_string(), clock());
        let records: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(records, serde_json::json!([{ "totalSales": 48, "totalProfit": 3150.75 }]));
    }

    #[test]
    fn test_ask_runs_the_oracle_answer() {
        let seen = RefCell::new(String::new());
        let oracle = |prompt: &str| -> Result<String, OracleError> {
            *seen.borrow_mut() = prompt.to_string();
            Ok("```json\n{\"collection\": \"CASHBALANCE\", \"operation\": \"find\", \"sort\": {\"created_at\": -1}, \"limit\": 1, \"projection\": {\"_id\": 0, \"amount\": 1}}\n```".to_string())
        };
        let assistant = Assistant::new(oracle, shop_gateway());

        let out = assistant.ask_at("What is the current cash balance?", clock());
        assert_eq!(out, r#"[{"amount":7370.0}]"#);
        assert!(seen.borrow().ends_with("Question: What is the current cash balance?\nJSON:\n"));
    }

    #[test]
    fn test_oracle_failure_is_reported() {
        let oracle = |_: &str| -> Result<String, OracleError> {
            Err(OracleError::Transport("connection refused".to_string()))
        };
        let assistant = Assistant::new(oracle, shop_gateway());

        assert_eq!(
            assistant.ask_at("anything", clock()),
            "Execution error: oracle request failed: connection refused"
        );
    }

    #[test]
    fn test_oracle_refusal_passes_through_gateway() {
        let oracle = |_: &str| -> Result<String, OracleError> {
            Ok(r#"{"error": "The query is not related to the available schema.", "available_schema": "Inventory, Sales"}"#.to_string())
        };
        let assistant = Assistant::new(oracle, shop_gateway());

        let out = assistant.ask_at("What's the weather?", clock());
        assert!(out.starts_with("Execution error:"), "{}", out);
        assert!(out.contains("not related to the available schema"));
    }

    #[test]
    fn test_write_answers_never_reach_the_store() {
        let oracle = |_: &str| -> Result<String, OracleError> {
            Ok(r#"{"collection": "Inventory", "operation": "deleteMany", "query": {}}"#.to_string())
        };
        let gateway = shop_gateway();
        let assistant = Assistant::new(oracle, gateway.clone());

        assert!(assistant.ask_at("delete everything", clock()).starts_with("Execution error:"));
        let remaining = gateway
            .execute_at(r#"{"collection": "Inventory", "operation": "find"}"#, clock())
            .unwrap();
        assert_eq!(remaining.len(), 5);
    }
}
