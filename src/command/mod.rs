//! Command execution for the CLI
//!
//! Turns a validated [`Invocation`](crate::cli::Invocation) into a resolved
//! request and drives it through the execution loop.

mod executor;

pub use executor::{CommandError, CommandExecutor};
