//! Placeholder resolution
//!
//! Oracle-generated queries carry symbolic dates such as `{{today_start}}`
//! or `{{2025-06-06_end}}`. The resolver walks a JSON structure and replaces
//! every recognised token with a concrete `YYYY-MM-DDTHH:MM:SS.mmmZ`
//! timestamp. Everything else is returned untouched.
//!
//! The current instant is sampled once per [`Resolver`], so every token in a
//! structure is computed against the same clock reading.

pub mod token;

use chrono::{DateTime, Utc};
use log::warn;
use serde_json::{Map, Value};

use crate::core::config::UnresolvedPolicy;
use crate::core::errors::PlaceholderError;

pub use token::{format_timestamp, DateToken, DayBound, NamedToken};

/// Resolve every token in `value` against `now`, leaving unknown tokens in place.
/// Fails only on a literal-date token naming a day that does not exist.
pub fn resolve(value: Value, now: DateTime<Utc>) -> Result<Value, PlaceholderError> {
    Resolver::new(now).walk(value, &|token| Ok(pass_through(token)))
}

/// Whether a string is bounded by the `{{` `}}` delimiters
pub fn is_bracketed(text: &str) -> bool {
    text.len() >= 4 && text.starts_with("{{") && text.ends_with("}}")
}

fn pass_through(token: String) -> Value {
    warn!("Unrecognized date placeholder: {}", token);
    Value::String(token)
}

/// A resolution pass bound to one clock sample
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    now: DateTime<Utc>,
    policy: UnresolvedPolicy,
}

impl Resolver {
    /// A resolver for the given instant, passing unknown tokens through
    pub fn new(now: DateTime<Utc>) -> Self {
        Resolver {
            now,
            policy: UnresolvedPolicy::PassThrough,
        }
    }

    /// A resolver sampling the wall clock once, now
    pub fn current() -> Self {
        Self::new(Utc::now())
    }

    /// Change what happens to unknown tokens
    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The instant every token is resolved against
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    /// Resolve a single bracketed string, if it is a known token
    pub fn resolve_token(&self, text: &str) -> Result<Option<String>, PlaceholderError> {
        Ok(DateToken::parse(text)?.map(|token| format_timestamp(token.instant(self.now))))
    }

    /// Resolve a whole structure according to the configured policy
    pub fn resolve(&self, value: Value) -> Result<Value, PlaceholderError> {
        self.walk(value, &|token| match self.policy {
            UnresolvedPolicy::PassThrough => Ok(pass_through(token)),
            UnresolvedPolicy::Reject => Err(PlaceholderError::Unresolved(token)),
        })
    }

    fn walk<F>(&self, value: Value, unresolved: &F) -> Result<Value, PlaceholderError>
    where
        F: Fn(String) -> Result<Value, PlaceholderError>,
    {
        match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(key, inner)| -> Result<(String, Value), PlaceholderError> {
                    Ok((key, self.walk(inner, unresolved)?))
                })
                .collect::<Result<Map<String, Value>, PlaceholderError>>()
                .map(Value::Object),
            Value::Array(items) => items
                .into_iter()
                .map(|item| self.walk(item, unresolved))
                .collect::<Result<Vec<Value>, PlaceholderError>>()
                .map(Value::Array),
            Value::String(text) if is_bracketed(&text) => match self.resolve_token(&text)? {
                Some(timestamp) => Ok(Value::String(timestamp)),
                None => unresolved(text),
            },
            other => Ok(other),
        }
    }
}
