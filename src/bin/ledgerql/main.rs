mod app;
mod commands;
mod context;
mod formatters;
mod utils;

use std::process::ExitCode;

use anyhow::Result;
use log::info;

fn main() -> Result<ExitCode> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    let result = app::run();

    info!("ledgerql finished");

    result
}
