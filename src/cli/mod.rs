//! CLI module for the plangraph engine.
//!
//! This module provides the command-line interface for validating
//! configurations and for planning, showing and applying changes.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, ProvidersCommand, Selection};
pub use output::OutputFormatter;
