use anyhow::{anyhow, Result};
use log::debug;
use tokio::runtime::Runtime;

use ledgerql::{QueryGateway, Settings, UnresolvedPolicy};

use crate::formatters::json::JsonFormatter;
use crate::formatters::table::TableFormatter;
use crate::formatters::text::TextFormatter;
use crate::formatters::{Formatter, OutputFormat};

/// Execution context shared by the commands
pub struct Context {
    settings: Settings,

    verbosity: u8,

    formatter: Box<dyn Formatter>,

    /// Runtime for the gateway's async entry point
    runtime: Runtime,
}

impl Context {
    /// Build the context from the environment plus command-line overrides
    pub fn new(verbosity: u8, format: OutputFormat, store: Option<&str>, reject_unresolved: bool) -> Result<Self> {
        let mut settings = Settings::from_env()?;
        if let Some(uri) = store {
            settings.store = uri.parse()?;
        }
        if reject_unresolved {
            settings.placeholder_policy = UnresolvedPolicy::Reject;
        }
        debug!("Settings: {:?}", settings);

        let formatter: Box<dyn Formatter> = match format {
            OutputFormat::Text => Box::new(TextFormatter::new()),
            OutputFormat::Json => Box::new(JsonFormatter::new()),
            OutputFormat::Table => Box::new(TableFormatter::new()),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| anyhow!("Failed to create Tokio runtime: {}", e))?;

        Ok(Context {
            settings,
            verbosity,
            formatter,
            runtime,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Open the configured store behind a gateway
    pub fn gateway(&self) -> Result<QueryGateway> {
        Ok(QueryGateway::from_settings(&self.settings)?)
    }

    pub fn formatter(&self) -> &dyn Formatter {
        self.formatter.as_ref()
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}
