// crates/ota-updates-cli/src/main.rs
// ============================================================================
// Module: OTA Updates CLI Entry Point
// Description: Command dispatcher for launch decisions, patches, and headers.
// Purpose: Give operators offline access to the updates client pipeline.
// Dependencies: clap, ota-bytecode-patch, ota-structured-fields,
//               ota-updates-config, ota-updates-core, ota-updates-store-sqlite,
//               serde_json, thiserror, tokio, tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! The `ota-updates` binary drives the updates client against a local
//! configuration: it computes launch decisions over the `SQLite` store,
//! lists stored updates, records failed launches, applies and creates
//! bytecode patches, and inspects structured header values.
//!
//! Logs go to stderr through `tracing-subscriber`, filtered by the
//! `OTA_UPDATES_LOG` environment variable (default `info`). Command output
//! goes to stdout as JSON or plain text.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;
mod render;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use ota_bytecode_patch::apply_patch;
use ota_bytecode_patch::apply_patch_to;
use ota_bytecode_patch::create_patch;
use ota_structured_fields::FieldType;
use ota_structured_fields::parse;
use ota_updates_config::OtaUpdatesConfig;
use ota_updates_core::DatabaseLauncher;
use ota_updates_core::FilterAwareSelectionPolicy;
use ota_updates_core::SystemClock;
use ota_updates_core::UpdateId;
use ota_updates_core::UpdatesStore;
use ota_updates_store_sqlite::SqliteUpdatesStore;
use serde_json::Value;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::render::field_to_json;
use crate::render::launch_summary;
use crate::render::update_summary;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding the log filter.
const LOG_ENV: &str = "OTA_UPDATES_LOG";
/// Log filter used when [`LOG_ENV`] is unset or invalid.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "ota-updates", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (overrides `OTA_UPDATES_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Select, verify, and mark the update to launch.
    Launch,
    /// Stored update utilities.
    Updates {
        /// Selected updates subcommand.
        #[command(subcommand)]
        command: UpdatesCommand,
    },
    /// Bytecode patch utilities.
    Patch {
        /// Selected patch subcommand.
        #[command(subcommand)]
        command: PatchCommand,
    },
    /// Structured header utilities.
    Header {
        /// Selected header subcommand.
        #[command(subcommand)]
        command: HeaderCommand,
    },
}

/// Stored update subcommands.
#[derive(Subcommand, Debug)]
enum UpdatesCommand {
    /// List stored updates of the configured scope.
    List,
    /// Record a failed launch (for example, a crash on startup).
    ReportFailure(ReportFailureCommand),
}

/// Arguments for `updates report-failure`.
#[derive(Args, Debug)]
struct ReportFailureCommand {
    /// Update id that failed to launch.
    #[arg(value_name = "UPDATE_ID")]
    update_id: String,
}

/// Bytecode patch subcommands.
#[derive(Subcommand, Debug)]
enum PatchCommand {
    /// Apply a patch to a base image.
    Apply(PatchApplyCommand),
    /// Create a patch turning one image into another.
    Create(PatchCreateCommand),
}

/// Arguments for `patch apply`.
#[derive(Args, Debug)]
struct PatchApplyCommand {
    /// Base image.
    #[arg(long, value_name = "PATH")]
    old: PathBuf,
    /// Patch file.
    #[arg(long, value_name = "PATH")]
    patch: PathBuf,
    /// Destination; defaults to a digest-named file next to the base image.
    #[arg(long, value_name = "PATH")]
    out: Option<PathBuf>,
}

/// Arguments for `patch create`.
#[derive(Args, Debug)]
struct PatchCreateCommand {
    /// Base image.
    #[arg(long, value_name = "PATH")]
    old: PathBuf,
    /// Target image.
    #[arg(long, value_name = "PATH")]
    new: PathBuf,
    /// Patch destination.
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
}

/// Structured header subcommands.
#[derive(Subcommand, Debug)]
enum HeaderCommand {
    /// Parse a header value and print it as JSON.
    Parse(HeaderParseCommand),
    /// Print the accept-signature request header for the configured key.
    AcceptSignature,
    /// Print the configured request headers as a dictionary field.
    Request,
}

/// Arguments for `header parse`.
#[derive(Args, Debug)]
struct HeaderParseCommand {
    /// Top-level field type.
    #[arg(long = "type", value_enum, default_value_t = FieldKind::Dictionary)]
    kind: FieldKind,
    /// Header value.
    #[arg(value_name = "VALUE")]
    value: String,
}

/// Field type argument.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    /// Dictionary field.
    Dictionary,
    /// List field.
    List,
    /// Item field.
    Item,
}

impl From<FieldKind> for FieldType {
    fn from(kind: FieldKind) -> Self {
        match kind {
            FieldKind::Dictionary => Self::Dictionary,
            FieldKind::List => Self::List,
            FieldKind::Item => Self::Item,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Installs the stderr log subscriber.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Launch => command_launch(config_path).await,
        Commands::Updates {
            command,
        } => command_updates(config_path, command),
        Commands::Patch {
            command,
        } => command_patch(command),
        Commands::Header {
            command,
        } => command_header(config_path, command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Loads configuration and opens the store.
fn open_store(config_path: Option<&Path>) -> CliResult<(OtaUpdatesConfig, SqliteUpdatesStore)> {
    let config = load_config(config_path)?;
    let store = SqliteUpdatesStore::new(config.database_config())
        .map_err(|err| CliError::new(format!("failed to open updates store: {err}")))?;
    Ok((config, store))
}

/// Loads configuration.
fn load_config(config_path: Option<&Path>) -> CliResult<OtaUpdatesConfig> {
    OtaUpdatesConfig::load(config_path).map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Runs a launch decision and prints the result.
async fn command_launch(config_path: Option<&Path>) -> CliResult<ExitCode> {
    let (config, store) = open_store(config_path)?;
    let launcher_config = config.launcher_config().map_err(|err| CliError::new(err.to_string()))?;
    let launcher = Arc::new(DatabaseLauncher::new(
        launcher_config,
        store,
        FilterAwareSelectionPolicy::new(),
        SystemClock,
    ));
    let launched = launcher
        .launch_in_background()
        .await
        .map_err(|err| CliError::new(format!("launch failed ({}): {err}", err.kind())))?;
    info!(update_id = %launched.update.id, path = %launched.launch_asset_path.display(), "launch selected");
    write_json(&launch_summary(&launched))?;
    Ok(ExitCode::SUCCESS)
}

/// Dispatches stored update subcommands.
fn command_updates(config_path: Option<&Path>, command: UpdatesCommand) -> CliResult<ExitCode> {
    let (config, store) = open_store(config_path)?;
    match command {
        UpdatesCommand::List => {
            let identity = config.client_identity().map_err(|err| CliError::new(err.to_string()))?;
            let updates = store
                .transaction(|session| session.query_updates(&identity.scope_key))
                .map_err(|err| CliError::new(format!("failed to query updates: {err}")))?;
            write_json(&Value::Array(updates.iter().map(update_summary).collect()))?;
        }
        UpdatesCommand::ReportFailure(command) => {
            let update_id = UpdateId::parse(&command.update_id)
                .map_err(|err| CliError::new(format!("invalid update id: {err}")))?;
            let launcher = DatabaseLauncher::new(
                config.launcher_config().map_err(|err| CliError::new(err.to_string()))?,
                store,
                FilterAwareSelectionPolicy::new(),
                SystemClock,
            );
            launcher
                .record_failed_launch(&update_id)
                .map_err(|err| CliError::new(format!("failed to record launch failure: {err}")))?;
            write_stdout_line(&format!("recorded failed launch for {update_id}"))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Dispatches bytecode patch subcommands.
fn command_patch(command: PatchCommand) -> CliResult<ExitCode> {
    match command {
        PatchCommand::Apply(command) => {
            let output = match command.out {
                Some(out) => {
                    apply_patch_to(&command.old, &command.patch, &out)
                        .map_err(|err| CliError::new(format!("patch apply failed: {err}")))?;
                    out
                }
                None => apply_patch(&command.old, &command.patch)
                    .map_err(|err| CliError::new(format!("patch apply failed: {err}")))?,
            };
            write_stdout_line(&output.display().to_string())?;
        }
        PatchCommand::Create(command) => {
            let old = read_file(&command.old)?;
            let new = read_file(&command.new)?;
            let patch = create_patch(&old, &new);
            fs::write(&command.out, &patch)
                .map_err(|err| CliError::new(format!("failed to write {}: {err}", command.out.display())))?;
            write_stdout_line(&format!("wrote {} bytes to {}", patch.len(), command.out.display()))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Dispatches structured header subcommands.
fn command_header(config_path: Option<&Path>, command: HeaderCommand) -> CliResult<ExitCode> {
    match command {
        HeaderCommand::Parse(command) => {
            let field = parse(&command.value, command.kind.into())
                .map_err(|err| CliError::new(format!("invalid structured header: {err}")))?;
            write_json(&field_to_json(&field))?;
        }
        HeaderCommand::AcceptSignature => {
            let config = load_config(config_path)?;
            let signing = config
                .code_signing_configuration()
                .map_err(|err| CliError::new(err.to_string()))?
                .ok_or_else(|| CliError::new("code signing is not configured".to_string()))?;
            let header = signing
                .create_accept_signature_header()
                .map_err(|err| CliError::new(err.to_string()))?;
            write_stdout_line(&header)?;
        }
        HeaderCommand::Request => {
            let config = load_config(config_path)?;
            let header = config.request_headers_field().map_err(|err| CliError::new(err.to_string()))?;
            write_stdout_line(&header)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Reads a whole file.
fn read_file(path: &Path) -> CliResult<Vec<u8>> {
    fs::read(path).map_err(|err| CliError::new(format!("failed to read {}: {err}", path.display())))
}

/// Writes pretty JSON to stdout.
fn write_json(value: &Value) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to serialize output: {err}")))?;
    write_stdout_line(&text)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(output_error("stdout", &err)))
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

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
