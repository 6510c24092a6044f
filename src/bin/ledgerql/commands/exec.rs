use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;

use crate::commands::print_outcome;
use crate::context::Context;
use crate::utils::input::read_text;

/// Run raw query text through the gateway
pub fn execute(context: &Context, query: Option<String>, file: Option<&Path>) -> Result<ExitCode> {
    let raw = read_text(query, file)?;
    let gateway = context.gateway()?;

    let outcome = context.runtime().block_on(gateway.execute_async(raw));
    print_outcome(context, outcome)
}
