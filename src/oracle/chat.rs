//! Chat-completions oracle
//!
//! Sends the rendered prompt to an OpenAI-compatible `/chat/completions`
//! endpoint and returns the first choice's message content.

use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::core::config::OracleSettings;
use crate::core::errors::OracleError;
use crate::oracle::Oracle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Oracle backed by a remote chat model
pub struct ChatOracle {
    client: Client,
    settings: OracleSettings,
}

impl ChatOracle {
    /// Build a client for the configured endpoint; an API key is required
    pub fn new(settings: OracleSettings) -> Result<Self, OracleError> {
        if settings.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(OracleError::NotConfigured(format!(
                "set {} to use the chat oracle",
                crate::core::config::ORACLE_API_KEY_VAR
            )));
        }
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(ChatOracle { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint(&self) -> String {
        completions_url(&self.settings.url)
    }
}

impl Oracle for ChatOracle {
    fn propose(&self, prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: 0.0,
        };

        debug!("Sending {} prompt bytes to {}", prompt.len(), self.settings.model);
        let mut call = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.settings.api_key {
            call = call.bearer_auth(key);
        }
        let response: ChatResponse = call.send()?.error_for_status()?.json()?;
        first_content(response)
    }
}

fn completions_url(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

fn first_content(response: ChatResponse) -> Result<String, OracleError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| OracleError::Response("no message content in the first choice".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_not_configured() {
        let result = ChatOracle::new(OracleSettings::default());
        assert!(matches!(result, Err(OracleError::NotConfigured(_))));

        let empty = OracleSettings {
            api_key: Some(String::new()),
            ..OracleSettings::default()
        };
        assert!(ChatOracle::new(empty).is_err());
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(completions_url("http://localhost:8080"), "http://localhost:8080/chat/completions");
    }

    #[test]
    fn test_first_choice_content() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"collection\":\"Sales\"}"}},
                          {"message":{"role":"assistant","content":"ignored"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_content(response).unwrap(), r#"{"collection":"Sales"}"#);
    }

    #[test]
    fn test_empty_response_is_an_error() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_content(response), Err(OracleError::Response(_))));

        let response: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":null}}]}"#).unwrap();
        assert!(first_content(response).is_err());
    }

    #[test]
    fn test_request_body_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            temperature: 0.0,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{ "role": "user", "content": "hi" }],
                "temperature": 0.0
            })
        );
    }
}
