//! plangraph CLI entrypoint.
//!
//! This is the main entrypoint for the plangraph command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use plangraph::addrs::Address;
use plangraph::cli::{Cli, Commands, OutputFormat, OutputFormatter, ProvidersCommand, Selection};
use plangraph::config::{
    Config, ConfigParser, ConfigValidator, EngineSettings, find_config_file, input_variables,
};
use plangraph::diagnostics::{Diagnostic, Diagnostics};
use plangraph::error::{ConfigError, PlanGraphError, Result};
use plangraph::planner::{ApplyOptions, PlanOptions, Planner};
use plangraph::plans::{PlanMode, read_plan_file, write_plan_file};
use plangraph::provider::{ProviderRegistry, ResourceStore, TestProvider};
use plangraph::state::{LocalStateStore, State, StateStore};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Name the built-in provider is registered under.
const BUILTIN_PROVIDER: &str = "test";

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `-v` forces debug; otherwise `RUST_LOG` is honoured with `info` as the
/// fallback. Logs go to stderr so plan and graph output can be piped.
fn init_logging(verbose: bool, format: OutputFormat) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match format {
        OutputFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
        OutputFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate => {
            let workspace = Workspace::open(cli.config.as_ref(), cli.state)?;
            cmd_validate(&workspace, &formatter).await
        }
        Commands::Plan {
            out,
            destroy,
            refresh_only,
            selection,
        } => {
            let mode = if destroy {
                PlanMode::Destroy
            } else if refresh_only {
                PlanMode::RefreshOnly
            } else {
                PlanMode::Normal
            };
            let workspace = Workspace::open(cli.config.as_ref(), cli.state)?;
            cmd_plan(&workspace, mode, &selection, out.as_deref(), &formatter).await
        }
        Commands::Show { plan, json } => {
            let formatter = if json {
                OutputFormatter::new(OutputFormat::Json)
            } else {
                formatter
            };
            cmd_show(&plan, &formatter).await
        }
        Commands::Apply { plan, yes, selection } => {
            let workspace = Workspace::open(cli.config.as_ref(), cli.state)?;
            cmd_apply(&workspace, plan.as_deref(), yes, &selection, &formatter).await
        }
        Commands::Graph { destroy } => {
            let workspace = Workspace::open(cli.config.as_ref(), cli.state)?;
            cmd_graph(&workspace, destroy).await
        }
        Commands::Providers {
            command: ProvidersCommand::Schema { json },
        } => {
            let formatter = if json {
                OutputFormatter::new(OutputFormat::Json)
            } else {
                formatter
            };
            cmd_providers_schema(&formatter)
        }
    }
}

/// Validate configuration.
async fn cmd_validate(workspace: &Workspace, formatter: &OutputFormatter) -> Result<ExitCode> {
    info!("Validating configuration: {}", workspace.config_file.display());

    let parser = workspace.parser();
    let spec = parser.load_file(&workspace.config_file)?;

    let result = ConfigValidator::new().check(&spec);
    let mut diagnostics = Diagnostics::new();
    for error in &result.errors {
        diagnostics.push(Diagnostic::error("Invalid configuration", error.to_string()));
    }
    for warning in &result.warnings {
        diagnostics.push(Diagnostic::warning(warning.clone(), ""));
    }

    if result.is_valid() {
        let config = ConfigParser::lower(&spec)?;
        let (planner, _store) = workspace.planner().await?;
        diagnostics.extend(planner.validate(&config).await?);
    }

    println!("{}", formatter.format_diagnostics(&diagnostics));
    Ok(exit_code(!diagnostics.has_errors()))
}

/// Compute a plan, print it and optionally save it.
async fn cmd_plan(
    workspace: &Workspace,
    mode: PlanMode,
    selection: &Selection,
    out: Option<&Path>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = workspace.load_config()?;
    let state = workspace.load_state().await?;
    let (planner, _store) = workspace.planner().await?;

    let options = PlanOptions {
        mode,
        targets: parse_addresses(&selection.targets, "--target")?,
        force_replace: parse_addresses(&selection.replace, "--replace")?,
        variables: variables(&selection.vars)?,
    };
    let plan = planner.plan(&config, &state, &options).await?;
    println!("{}", formatter.format_plan(&plan));

    if let Some(path) = out {
        write_plan_file(path, &plan).await?;
        if formatter.format() == OutputFormat::Text {
            eprintln!("Saved the plan to: {}", path.display());
            eprintln!("To apply it, run: plangraph apply {}", path.display());
        }
    }

    Ok(exit_code(!plan.errored()))
}

/// Display a saved plan.
async fn cmd_show(path: &Path, formatter: &OutputFormatter) -> Result<ExitCode> {
    let plan = read_plan_file(path).await?;
    println!("{}", formatter.format_plan(&plan));
    Ok(ExitCode::SUCCESS)
}

/// Apply a saved plan, or plan and apply in one step.
async fn cmd_apply(
    workspace: &Workspace,
    plan_file: Option<&Path>,
    auto_approve: bool,
    selection: &Selection,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = workspace.load_config()?;
    let state = workspace.load_state().await?;
    let (planner, store) = workspace.planner().await?;

    let targets = parse_addresses(&selection.targets, "--target")?;
    let force_replace = parse_addresses(&selection.replace, "--replace")?;
    let variables = variables(&selection.vars)?;

    let (plan, options) = if let Some(path) = plan_file {
        let plan = read_plan_file(path).await?;
        let options = ApplyOptions {
            targets,
            force_replace,
            variables,
        };
        (plan, options)
    } else {
        let plan_options = PlanOptions {
            mode: PlanMode::Normal,
            targets,
            force_replace,
            variables,
        };
        let plan = planner.plan(&config, &state, &plan_options).await?;
        println!("{}", formatter.format_plan(&plan));

        if !plan.applyable() {
            return Ok(ExitCode::FAILURE);
        }
        if !plan.has_changes() {
            return Ok(ExitCode::SUCCESS);
        }
        if !auto_approve && !confirm("Do you want to perform these actions? Type 'yes' to continue: ")? {
            eprintln!("Apply cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
        (plan, ApplyOptions::default())
    };

    let outcome = planner.apply(plan, &config, state, &options).await?;

    // Whatever was applied is recorded, even when some changes failed.
    let state_store = workspace.state_store();
    state_store.save(&outcome.state).await?;
    workspace.save_objects(&store).await?;

    println!("{}", formatter.format_apply(&outcome));
    Ok(exit_code(outcome.applied))
}

/// Print the dependency graph in DOT format.
async fn cmd_graph(workspace: &Workspace, destroy: bool) -> Result<ExitCode> {
    let config = workspace.load_config()?;
    let state = workspace.load_state().await?;
    let (planner, _store) = workspace.planner().await?;

    let built = planner.graph(&config, &state, &[])?;
    for diagnostic in &built.diagnostics {
        warn!("{diagnostic}");
    }
    let dot = if destroy {
        built.graph.reversed().to_dot()
    } else {
        built.graph.to_dot()
    };
    println!("{dot}");
    Ok(ExitCode::SUCCESS)
}

/// Print the schemas of the registered providers.
fn cmd_providers_schema(formatter: &OutputFormatter) -> Result<ExitCode> {
    let mut registry = ProviderRegistry::new();
    registry.register(BUILTIN_PROVIDER, Arc::new(TestProvider::new()))?;
    println!("{}", formatter.format_provider_schemas(&registry));
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Paths and settings every command works with.
struct Workspace {
    config_file: PathBuf,
    base_dir: PathBuf,
    settings: EngineSettings,
}

impl Workspace {
    /// Locates the configuration, loads `.env` and resolves engine settings.
    fn open(config_path: Option<&PathBuf>, state_path: Option<PathBuf>) -> Result<Self> {
        let config_file = resolve_config_path(config_path)?;
        let base_dir = config_file
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        // .env must be loaded before settings read the environment.
        ConfigParser::new().with_base_path(&base_dir).load_dotenv()?;

        let mut settings = EngineSettings::from_env();
        if let Some(path) = state_path {
            settings.state_path = path;
        } else if settings.state_path.is_relative() {
            settings.state_path = base_dir.join(&settings.state_path);
        }
        debug!("Using state file: {}", settings.state_path.display());

        Ok(Self {
            config_file,
            base_dir,
            settings,
        })
    }

    fn parser(&self) -> ConfigParser {
        ConfigParser::new().with_base_path(&self.base_dir)
    }

    /// Loads, validates and lowers the configuration.
    fn load_config(&self) -> Result<Config> {
        let spec = self.parser().load_file(&self.config_file)?;
        let result = ConfigValidator::new().validate(&spec)?;
        for warning in &result.warnings {
            warn!("{warning}");
        }
        ConfigParser::lower(&spec)
    }

    fn state_store(&self) -> LocalStateStore {
        LocalStateStore::with_state_path(&self.settings.state_path)
    }

    async fn load_state(&self) -> Result<State> {
        Ok(self.state_store().load().await?.unwrap_or_else(State::new))
    }

    /// Where the built-in provider keeps its objects between runs.
    fn objects_path(&self) -> PathBuf {
        self.settings.state_path.with_extension("objects.json")
    }

    /// Creates a planner with the built-in provider, restoring its objects.
    async fn planner(&self) -> Result<(Planner, Arc<ResourceStore>)> {
        let path = self.objects_path();
        let store = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            let snapshot: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
                PlanGraphError::Config(ConfigError::ParseError {
                    message: format!("Invalid object store: {e}"),
                    location: Some(path.display().to_string()),
                })
            })?;
            Arc::new(ResourceStore::from_snapshot(&snapshot))
        } else {
            Arc::new(ResourceStore::new())
        };

        let mut registry = ProviderRegistry::new();
        registry.register(BUILTIN_PROVIDER, Arc::new(TestProvider::with_store(Arc::clone(&store))))?;

        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after running operations finish");
                on_interrupt.cancel();
            }
        });

        let planner = Planner::new(registry, self.settings.clone()).with_cancellation(cancel);
        Ok((planner, store))
    }

    async fn save_objects(&self, store: &ResourceStore) -> Result<()> {
        let path = self.objects_path();
        let content = serde_json::to_string_pretty(&store.snapshot())
            .map_err(|e| PlanGraphError::Internal(format!("Failed to serialize objects: {e}")))?;
        tokio::fs::write(&path, content).await?;
        debug!("Saved {} objects to {}", store.keys().len(), path.display());
        Ok(())
    }
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn parse_addresses(raw: &[String], flag: &str) -> Result<Vec<Address>> {
    raw.iter()
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| PlanGraphError::Config(ConfigError::validation(e, flag)))
        })
        .collect()
}

/// Input variables from `PLANGRAPH_VAR_*` and `--var`.
fn variables(args: &[String]) -> Result<std::collections::BTreeMap<String, plangraph::lang::Value>> {
    Ok(input_variables(std::env::vars(), args)?)
}

fn confirm(prompt: &str) -> Result<bool> {
    eprint!("\n{prompt}");
    std::io::stderr().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim() == "yes")
}

const fn exit_code(success: bool) -> ExitCode {
    if success { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
