//! Schema extraction and data-quality profiling tool.
//!
//! Connects to a relational database, extracts its table structure and
//! profiles completeness, freshness and key health of every table.
//!
//! # Security Guarantees
//! - Read-only database operations only
//! - No credentials stored or logged
//! - Encrypted transport unless `--insecure` is given

use clap::Parser;
use dbprofiler::{Cli, commands};
use dbprofiler_core::{Result, init_logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.global.verbose, cli.global.quiet)?;

    // Compile the document validators before touching the database
    dbprofiler_core::initialize_validators()?;

    commands::run(&cli.command).await
}
