use std::process::ExitCode;

use anyhow::Result;

use ledgerql::PromptBundle;

/// Print the rendered oracle prompt
pub fn execute(question: &str) -> Result<ExitCode> {
    let prompt = PromptBundle::builtin().render(question)?;
    println!("{}", prompt);
    Ok(ExitCode::SUCCESS)
}
