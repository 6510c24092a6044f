use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;

use crate::commands;
use crate::context::Context;
use crate::formatters::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ledgerql", version)]
#[command(about = "Read-only query gateway for business data", long_about = None)]
pub struct Cli {
    /// Verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Store URI (memory://, json://<file>, sled://<dir>); overrides LEDGERQL_STORE_URI
    #[arg(short, long, global = true)]
    store: Option<String>,

    /// Fail on unrecognized date placeholders instead of passing them through
    #[arg(long, global = true)]
    reject_unresolved: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run structured query text through the gateway
    Exec {
        /// Query text; read from --file or stdin when omitted
        query: Option<String>,

        /// Read the query text from a file
        #[arg(long, conflicts_with = "query")]
        file: Option<PathBuf>,
    },

    /// Print a JSON document with its date placeholders resolved
    Resolve {
        /// JSON text; read from stdin when omitted
        json: Option<String>,

        /// Resolve against this RFC 3339 instant instead of the current time
        #[arg(long)]
        at: Option<String>,
    },

    /// Print the prompt that would be sent to the oracle
    Prompt {
        question: String,
    },

    /// Ask a question through the chat oracle and run the proposed query
    Ask {
        question: String,
    },

    /// Import a JSON array of documents into a sled store
    Load {
        collection: String,
        file: PathBuf,
    },
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // RUST_LOG wins over the flag when set
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(level)).try_init();
}

/// Parse the command line and run the selected command
pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let context = Context::new(cli.verbose, cli.format, cli.store.as_deref(), cli.reject_unresolved)?;

    match cli.command {
        Commands::Exec { query, file } => commands::exec::execute(&context, query, file.as_deref()),
        Commands::Resolve { json, at } => commands::resolve::execute(&context, json, at.as_deref()),
        Commands::Prompt { question } => commands::prompt::execute(&question),
        Commands::Ask { question } => commands::ask::execute(&context, &question),
        Commands::Load { collection, file } => commands::load::execute(&context, &collection, &file),
    }
}
