use std::process::ExitCode;

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};

use ledgerql::ql::unwrap_fence;
use ledgerql::Resolver;

use crate::context::Context;
use crate::utils::error::CliError;
use crate::utils::input::read_text;

/// Print a document with every date placeholder resolved
pub fn execute(context: &Context, json: Option<String>, at: Option<&str>) -> Result<ExitCode> {
    let text = read_text(json, None)?;
    let document: serde_json::Value = serde_json::from_str(unwrap_fence(&text)).map_err(CliError::from)?;

    let now = match at {
        Some(instant) => DateTime::parse_from_rfc3339(instant)
            .with_context(|| format!("--at expects an RFC 3339 instant, got {:?}", instant))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    let resolver = Resolver::new(now).with_policy(context.settings().placeholder_policy);
    match resolver.resolve(document) {
        Ok(resolved) => {
            println!("{}", context.formatter().format_json(&resolved)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", context.formatter().format_error(&e.to_string()));
            Ok(ExitCode::FAILURE)
        }
    }
}
