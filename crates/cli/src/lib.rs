//! `pressline` command-line tool.
//!
//! The binary entrypoint lives in `main.rs`; argument parsing and the
//! subcommands are exposed here for testing.

pub mod args;
pub mod commands;
pub mod error;

pub use args::{Cli, Command};
pub use commands::{execute, Outcome};
pub use error::CliError;
