//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// plangraph - Dependency-graph planning engine for declarative infrastructure.
#[derive(Parser, Debug)]
#[command(name = "plangraph")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "PLANGRAPH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Path to the state file (overrides `PLANGRAPH_STATE_PATH`).
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the configuration without touching remote objects.
    Validate,

    /// Compute a plan and optionally save it.
    Plan {
        /// Write the plan to this file for a later `apply`.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Plan the destruction of every managed object.
        #[arg(long, conflicts_with = "refresh_only")]
        destroy: bool,

        /// Only reconcile state with remote objects.
        #[arg(long)]
        refresh_only: bool,

        /// Change selection shared with `apply`.
        #[command(flatten)]
        selection: Selection,
    },

    /// Display a saved plan.
    Show {
        /// Plan file written by `plan --out`.
        plan: PathBuf,

        /// Print the plan as JSON regardless of `--output`.
        #[arg(long)]
        json: bool,
    },

    /// Apply a saved plan, or plan and apply in one step.
    Apply {
        /// Plan file written by `plan --out`.
        plan: Option<PathBuf>,

        /// Skip confirmation prompt when planning inline.
        #[arg(short, long)]
        yes: bool,

        /// Change selection; must match the plan when a plan file is given.
        #[command(flatten)]
        selection: Selection,
    },

    /// Print the dependency graph in DOT format.
    Graph {
        /// Print the destroy-order graph instead.
        #[arg(long)]
        destroy: bool,
    },

    /// Inspect the registered providers.
    Providers {
        /// Providers subcommand.
        #[command(subcommand)]
        command: ProvidersCommand,
    },
}

/// Subcommands of `providers`.
#[derive(Subcommand, Debug)]
pub enum ProvidersCommand {
    /// Print the schemas of every registered provider.
    Schema {
        /// Print the schemas as JSON regardless of `--output`.
        #[arg(long)]
        json: bool,
    },
}

/// Arguments that narrow or force changes.
#[derive(Args, Debug, Default, Clone)]
pub struct Selection {
    /// Limit the run to these addresses and their dependencies.
    #[arg(long = "target", value_name = "ADDR")]
    pub targets: Vec<String>,

    /// Force replacement of these resource instances.
    #[arg(long = "replace", value_name = "ADDR")]
    pub replace: Vec<String>,

    /// Set an input variable (`name=value`).
    #[arg(long = "var", value_name = "NAME=VALUE")]
    pub vars: Vec<String>,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plan_arguments() {
        let cli = Cli::parse_from([
            "plangraph",
            "plan",
            "--out",
            "tfplan",
            "--target",
            "test_resource.a",
            "--var",
            "size=3",
            "--var",
            "name=x",
        ]);
        match cli.command {
            Commands::Plan {
                out,
                destroy,
                refresh_only,
                selection,
            } => {
                assert_eq!(out, Some(PathBuf::from("tfplan")));
                assert!(!destroy);
                assert!(!refresh_only);
                assert_eq!(selection.targets, vec!["test_resource.a"]);
                assert_eq!(selection.vars, vec!["size=3", "name=x"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_destroy_conflicts_with_refresh_only() {
        let result = Cli::try_parse_from(["plangraph", "plan", "--destroy", "--refresh-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_providers_schema_arguments() {
        let cli = Cli::parse_from(["plangraph", "providers", "schema", "--json"]);
        assert!(matches!(
            cli.command,
            Commands::Providers {
                command: ProvidersCommand::Schema { json: true }
            }
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["plangraph", "graph", "--output", "json", "-v"]);
        assert!(cli.verbose);
        assert_eq!(cli.output, OutputFormat::Json);
    }
}
