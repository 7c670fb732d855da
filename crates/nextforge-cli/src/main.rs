// crates/nextforge-cli/src/main.rs
// ============================================================================
// Module: Nextforge CLI Entry Point
// Description: Command dispatcher for storage provisioning workflows.
// Purpose: Run the startup sequence and its offline diagnostics from a shell.
// Dependencies: clap, nextforge-config, nextforge-runtime, thiserror, tracing.
// ============================================================================

//! ## Overview
//! The `nextforge` binary provisions the configured backend end to end, and
//! exposes the offline steps on their own: configuration validation, artifact
//! resolution, and the backend catalog. Provisioning failures exit with the
//! code of their category so supervisors can tell a denied license from an
//! unreachable database without parsing output.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use nextforge_config::LoggingConfig;
use nextforge_config::NextforgeConfig;
use nextforge_core::HealthStatus;
use nextforge_runtime::BackendDescriptor;
use nextforge_runtime::BackendRegistry;
use nextforge_runtime::ProvisionCategory;
use nextforge_runtime::ProvisionError;
use nextforge_runtime::ProvisionPlan;
use nextforge_runtime::Provisioner;
use nextforge_runtime::registry;
use nextforge_runtime::resolve_backend_artifacts;
use thiserror::Error;
use tracing::info;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "nextforge", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full startup sequence and verify the store.
    Provision(ConfigArgs),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Artifact utilities.
    Artifacts {
        /// Selected artifacts subcommand.
        #[command(subcommand)]
        command: ArtifactsCommand,
    },
    /// Backend catalog utilities.
    Backends {
        /// Selected backends subcommand.
        #[command(subcommand)]
        command: BackendsCommand,
    },
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate configuration, backend options, and artifact pins.
    Validate(ConfigArgs),
}

/// Artifacts subcommands.
#[derive(Subcommand, Debug)]
enum ArtifactsCommand {
    /// Resolve and verify the configured backend's artifacts.
    Resolve(ConfigArgs),
}

/// Backends subcommands.
#[derive(Subcommand, Debug)]
enum BackendsCommand {
    /// List compiled-in backends with their requirements and options.
    List,
}

/// Arguments shared by commands that read configuration.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// Optional config file path (defaults to `NEXTFORGE_CONFIG` or nextforge.toml).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error carrying the process exit code.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
    /// Exit code reported to the shell.
    code: u8,
}

impl CliError {
    /// Constructs a generic failure.
    const fn new(message: String) -> Self {
        Self {
            message,
            code: 1,
        }
    }

    /// Constructs a failure in a provisioning category.
    fn categorized(category: ProvisionCategory, message: String) -> Self {
        Self {
            message: format!("{category}: {message}"),
            code: category.exit_code(),
        }
    }
}

impl From<ProvisionError> for CliError {
    fn from(err: ProvisionError) -> Self {
        Self::categorized(err.category(), err.to_string())
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Provision(args) => command_provision(&args),
        Commands::Config {
            command,
        } => match command {
            ConfigCommand::Validate(args) => command_config_validate(&args),
        },
        Commands::Artifacts {
            command,
        } => match command {
            ArtifactsCommand::Resolve(args) => command_artifacts_resolve(&args),
        },
        Commands::Backends {
            command,
        } => match command {
            BackendsCommand::List => command_backends_list(),
        },
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Provisions the configured backend, checks its health, then shuts it down.
fn command_provision(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    logging::init(&config.logging);
    let handle = Provisioner::new(config).provision()?;
    if let HealthStatus::Down {
        reason,
    } = handle.health_check()
    {
        return Err(CliError::categorized(
            ProvisionCategory::Connection,
            format!("store is down: {reason}"),
        ));
    }
    info!(
        backend = handle.backend_id(),
        family = %handle.family(),
        artifacts = handle.artifacts().len(),
        "storage ready"
    );
    write_stdout_line(&format!(
        "backend {} ready ({} artifacts verified)",
        handle.backend_id(),
        handle.artifacts().len()
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    handle.shutdown().map_err(|err| CliError::new(format!("store shutdown failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Validates configuration and the backend-specific parts of it.
fn command_config_validate(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    let plan = ProvisionPlan::prepare(&config)?;
    write_stdout_line(&format!(
        "config ok: backend {} ({}), {} artifacts pinned, {} collections",
        plan.backend().id(),
        plan.backend().family(),
        plan.coordinates().len(),
        config.collections.len()
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Resolves the backend's artifacts without contacting the license service.
fn command_artifacts_resolve(args: &ConfigArgs) -> CliResult<ExitCode> {
    let config = load_config(args)?;
    logging::init(&config.logging);
    let artifacts = resolve_backend_artifacts(&config)?;
    for artifact in artifacts.iter() {
        let line = format!(
            "{}\t{}\t{}",
            artifact.coordinate().id(),
            artifact.local_path().display(),
            artifact.verified_hash()
        );
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Prints the compiled-in backend catalog.
fn command_backends_list() -> CliResult<ExitCode> {
    logging::init(&LoggingConfig::default());
    let listing = render_backends(registry());
    let mut stdout = std::io::stdout();
    stdout
        .write_all(listing.as_bytes())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders every backend in registry order.
fn render_backends(registry: &BackendRegistry) -> String {
    let mut out = String::new();
    for descriptor in registry.descriptors() {
        render_backend(&mut out, descriptor);
    }
    out
}

/// Renders one backend: header, requirements, then options.
fn render_backend(out: &mut String, descriptor: &BackendDescriptor) {
    let _ = writeln!(
        out,
        "{} ({}): {}",
        descriptor.id(),
        descriptor.family(),
        descriptor.description()
    );
    for requirement in descriptor.requirement_names() {
        let _ = writeln!(out, "  requires {requirement}");
    }
    for option in descriptor.options() {
        let presence = match (option.required, option.default) {
            (true, _) => "required".to_string(),
            (false, Some(default)) => format!("default {default}"),
            (false, None) => "optional".to_string(),
        };
        let _ = writeln!(
            out,
            "  option {} <{}> [{presence}] {}",
            option.name, option.kind, option.description
        );
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads configuration, mapping failures to the config exit code.
fn load_config(args: &ConfigArgs) -> CliResult<NextforgeConfig> {
    NextforgeConfig::load(args.config.as_deref()).map_err(|err| CliError::from(ProvisionError::from(err)))
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let help = Cli::command().render_help().to_string();
    write_stdout_line(help.trim_end()).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output stream failure.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns its exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let _ = write_stderr_line(&err.to_string());
    ExitCode::from(err.code)
}
