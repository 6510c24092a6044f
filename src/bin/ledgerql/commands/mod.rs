pub mod ask;
pub mod exec;
pub mod load;
pub mod prompt;
pub mod resolve;

use std::process::ExitCode;

use anyhow::Result;
use ledgerql::{Document, GatewayError};

use crate::context::Context;

/// Print gateway output: records on stdout, the reported error on stderr
pub fn print_outcome(context: &Context, outcome: Result<Vec<Document>, GatewayError>) -> Result<ExitCode> {
    match outcome {
        Ok(records) => {
            println!("{}", context.formatter().format_records(&records)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", context.formatter().format_error(&e.report()));
            Ok(ExitCode::FAILURE)
        }
    }
}
