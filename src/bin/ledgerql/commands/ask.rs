use std::process::ExitCode;

use anyhow::Result;
use log::warn;

use ledgerql::{Assistant, ChatOracle, ErrorCategory};

use crate::commands::print_outcome;
use crate::context::Context;

/// Ask the chat oracle for a query, then run it
pub fn execute(context: &Context, question: &str) -> Result<ExitCode> {
    let oracle = ChatOracle::new(context.settings().oracle.clone())?;
    let assistant = Assistant::new(oracle, context.gateway()?);

    let answer = match assistant.propose(question) {
        Ok(answer) => answer,
        Err(e) => {
            warn!("Oracle failed: {}", e);
            let message = format!("{}: {}", ErrorCategory::Execution, e);
            eprintln!("{}", context.formatter().format_error(&message));
            return Ok(ExitCode::FAILURE);
        }
    };

    if context.verbosity() > 0 {
        eprintln!("{}", context.formatter().format_info(answer.trim()));
    }

    let outcome = context.runtime().block_on(assistant.gateway().execute_async(answer));
    print_outcome(context, outcome)
}
