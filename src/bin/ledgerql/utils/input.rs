use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use crate::utils::error::CliError;

/// Take text from the argument, else the file, else stdin
pub fn read_text(argument: Option<String>, file: Option<&Path>) -> Result<String, CliError> {
    if let Some(text) = argument {
        return Ok(text);
    }
    if let Some(path) = file {
        return Ok(fs::read_to_string(path)?);
    }

    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err(CliError::Input("no input given (pass an argument, --file or pipe stdin)".to_string()));
    }
    let mut text = String::new();
    stdin.read_to_string(&mut text)?;
    Ok(text)
}
