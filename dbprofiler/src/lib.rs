//! Library half of the `dbprofiler` binary.
//!
//! Argument parsing, subcommand handlers and document output live here so
//! they can be tested without spawning the binary.

pub mod cli;
pub mod commands;
pub mod output;

pub use cli::Cli;
