//! Govrun - integrity-checked runbooks for governance automation.
//!
//! Resolves `<id>@<version>` runbooks, verifies their checksum and runs
//! their steps through the scope-gated action registry.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::{json, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use govrun::actions::{BuiltinContext, Notifier, NullNotifier, StdoutNotifier};
use govrun::runbook::{
    compute_checksum, read_document, Inputs, IntegrityStatus, LoadedRunbook, RunbookRegistry,
    RunbookRuntime,
};
use govrun::{ActionRegistry, Config, OutputFormat, Response, RunbookError, RunbookResult};

/// Integrity-checked runbooks for governance automation
#[derive(Parser)]
#[command(name = "govrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Repository root holding `runbooks/` (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    repo_root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute something
    Run {
        #[command(subcommand)]
        target: RunTarget,
    },

    /// Resolve and verify without executing
    Resolve {
        #[command(subcommand)]
        target: ResolveTarget,
    },

    /// Inspect the runbook store
    Runbook {
        #[command(subcommand)]
        operation: RunbookOperation,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RunTarget {
    /// Run a runbook by id@version
    Runbook {
        /// Runbook specifier, e.g. ops/notify@1.0.0
        spec: Option<String>,

        /// Input assignment (key=value), repeatable
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,

        /// Run an explicit runbook file instead of resolving a spec
        #[arg(long, value_name = "PATH", conflicts_with = "spec")]
        runbook_file: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Shorthand for --format json
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ResolveTarget {
    /// Resolve a runbook by id@version
    Runbook {
        /// Runbook specifier
        spec: String,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
}

#[derive(Subcommand)]
enum RunbookOperation {
    /// List runbooks under runbooks/
    List {
        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the checksum a runbook file should carry
    Checksum {
        /// Runbook file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let mut config = Config::load()?;
    if let Some(root) = cli.repo_root {
        config.general.repo_root = Some(root);
    }

    let code = match cli.command {
        Commands::Run { target: RunTarget::Runbook { spec, inputs, runbook_file, format, json } } => {
            let format = if json { OutputFormat::Json } else { format.unwrap_or(config.output.format) };
            cmd_run_runbook(&config, spec.as_deref(), &inputs, runbook_file.as_deref(), format)?
        }
        Commands::Resolve { target: ResolveTarget::Runbook { spec, format } } => {
            cmd_resolve_runbook(&config, &spec, format.unwrap_or(config.output.format))?
        }
        Commands::Runbook { operation: RunbookOperation::List { format } } => {
            cmd_runbook_list(&config, format.unwrap_or(config.output.format))?
        }
        Commands::Runbook { operation: RunbookOperation::Checksum { file } } => {
            cmd_runbook_checksum(&file)
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
            0
        }
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// Resolve (or load) a runbook and execute it.
fn cmd_run_runbook(
    config: &Config,
    spec: Option<&str>,
    raw_inputs: &[String],
    runbook_file: Option<&Path>,
    format: OutputFormat,
) -> Result<i32> {
    let repo_root = config.repo_root()?;
    let inputs = parse_inputs(raw_inputs);

    let notifier: Arc<dyn Notifier> = if config.notify.stdout && format == OutputFormat::Human {
        Arc::new(StdoutNotifier)
    } else {
        Arc::new(NullNotifier)
    };
    let ctx = BuiltinContext::new(&repo_root)
        .with_notifier(notifier)
        .with_suite_command(config.suite_command())
        .with_cli_program(config.evals.program.clone());

    let registry = RunbookRegistry::new(&repo_root);
    let subject = runbook_file
        .map(|p| p.display().to_string())
        .or_else(|| spec.map(str::to_string))
        .unwrap_or_default();

    let outcome = load(&registry, spec, runbook_file).and_then(|loaded| {
        let runtime = RunbookRuntime::new(ActionRegistry::with_builtins(ctx));
        let trace = runtime.execute(&loaded.runbook, &inputs)?;
        Ok((loaded, trace))
    });

    match outcome {
        Ok((loaded, trace)) => {
            let response = Response::ok(&trace)?;
            let subject = if format == OutputFormat::Human {
                loaded.path.display().to_string()
            } else {
                subject
            };
            println!("{}", response.render(format, &subject));
            tracing::debug!(steps = trace.len(), "Runbook finished");
            Ok(0)
        }
        Err(e) => Ok(report_error(&e, format, &subject)),
    }
}

/// Resolve a runbook and print where it lives.
fn cmd_resolve_runbook(config: &Config, spec: &str, format: OutputFormat) -> Result<i32> {
    let registry = RunbookRegistry::new(config.repo_root()?);

    match registry.resolve(spec) {
        Ok(loaded) => {
            match format {
                OutputFormat::Human => {
                    println!("runbook resolved: {}", loaded.path.display());
                    println!("runbook id: {}", loaded.runbook.metadata.id);
                    println!("runbook version: {}", loaded.runbook.metadata.version);
                }
                _ => {
                    let response = Response::ok(json!({
                        "path": loaded.path.display().to_string(),
                        "id": loaded.runbook.metadata.id,
                        "version": loaded.runbook.metadata.version,
                        "checksum": loaded.runbook.metadata.checksum,
                        "steps": loaded.runbook.step_count(),
                    }))?;
                    println!("{}", response.render(format, spec));
                }
            }
            Ok(0)
        }
        Err(e) => Ok(report_error(&e, format, spec)),
    }
}

/// List discovered runbooks with their integrity status.
fn cmd_runbook_list(config: &Config, format: OutputFormat) -> Result<i32> {
    let registry = RunbookRegistry::new(config.repo_root()?);
    let entries = match registry.discover() {
        Ok(entries) => entries,
        Err(e) => return Ok(report_error(&e, format, "runbooks")),
    };

    match format {
        OutputFormat::Json => {
            let items: Vec<Value> = entries
                .iter()
                .map(|entry| {
                    let (verified, error_code) = match &entry.status {
                        IntegrityStatus::Verified => (true, None),
                        IntegrityStatus::Rejected { code, .. } => (false, Some(code.clone())),
                    };
                    json!({
                        "id": entry.id,
                        "version": entry.version,
                        "path": entry.path.display().to_string(),
                        "verified": verified,
                        "error_code": error_code,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        _ => {
            for entry in &entries {
                match &entry.status {
                    IntegrityStatus::Verified => println!("\u{2713} {}", entry.label()),
                    IntegrityStatus::Rejected { code, message } => {
                        println!("\u{2717} {} [{code}] {message}", entry.label());
                    }
                }
            }
            println!("\nTotal: {} runbooks", entries.len());
        }
    }

    Ok(0)
}

/// Print the canonical checksum of a runbook file.
fn cmd_runbook_checksum(file: &Path) -> i32 {
    match read_document(file) {
        Ok(document) => {
            println!("{}", compute_checksum(&document));
            0
        }
        Err(e) => {
            eprintln!("runbook error: {e}");
            e.exit_code()
        }
    }
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "govrun", &mut io::stdout());
}

fn load(
    registry: &RunbookRegistry,
    spec: Option<&str>,
    runbook_file: Option<&Path>,
) -> RunbookResult<LoadedRunbook> {
    match (runbook_file, spec) {
        (Some(path), _) => registry.load_file(path),
        (None, Some(spec)) => registry.resolve(spec),
        (None, None) => Err(RunbookError::InvalidSpec { spec: String::new() }),
    }
}

/// Parse `key=value` inputs; a bare `key` maps to an empty string.
fn parse_inputs(raw: &[String]) -> Inputs {
    raw.iter()
        .map(|item| match item.split_once('=') {
            Some((key, value)) => (key.to_string(), Value::String(value.to_string())),
            None => (item.clone(), Value::String(String::new())),
        })
        .collect()
}

fn report_error(err: &RunbookError, format: OutputFormat, subject: &str) -> i32 {
    let response = Response::error(err);
    match format {
        OutputFormat::Human => eprintln!("{}", response.render(format, subject)),
        _ => println!("{}", response.render(format, subject)),
    }
    err.exit_code()
}
