// aiact entry point.
//
// Startup sequence:
// 1. Parse arguments and resolve the base directory
// 2. Initialize tracing (log to file, not terminal)
// 3. Load config (copying defaults on first run)
// 4. Open database and build the provider chain
// 5. Run the subcommand
// Errors are rendered once at the edge; the exit code is 1 for operational
// failures and 2 for internal ones.

mod cli;
mod output;

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info};

use aiact_app::AnalysisService;
use aiact_core::config::{self, ConfigError};
use aiact_core::domain::{AiSystem, NewAiSystem};
use aiact_core::AppError;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("command failed: {err:#}");
            let (body, code) = describe_failure(&err);
            if json {
                match serde_json::to_string_pretty(&body) {
                    Ok(text) => println!("{text}"),
                    Err(_) => eprintln!("error: {err:#}"),
                }
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let base = match &cli.base_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to resolve current directory")?,
    };

    init_tracing(&base)?;
    info!("aiact {} starting in {}", env!("CARGO_PKG_VERSION"), base.display());

    let config = config::load_config(Some(&base)).context("failed to load configuration")?;
    let service = AnalysisService::from_config(config).context("failed to open database")?;
    info!("providers: {:?}", service.providers());

    match cli.command {
        Command::Register { file } => {
            let input = read_system_file(&file)?;
            let system = service.register_system(AiSystem::from(input))?;
            if cli.json {
                print_json(&system)?;
            } else {
                println!("Registered {} ({})", system.name, system.id);
            }
        }
        Command::List => {
            let systems = service.list_systems()?;
            let mut rows = Vec::with_capacity(systems.len());
            for system in &systems {
                rows.push((system, service.latest_assessment(&system.id)?));
            }
            if cli.json {
                let entries: Vec<_> = rows
                    .iter()
                    .map(|(system, latest)| {
                        serde_json::json!({ "system": system, "latest_assessment": latest })
                    })
                    .collect();
                print_json(&entries)?;
            } else if rows.is_empty() {
                println!("No AI systems registered.");
            } else {
                for (system, latest) in &rows {
                    println!("{}", output::system_row(system, latest.as_ref()));
                }
            }
        }
        Command::Show { id } => {
            let system = service.get_system(&id)?;
            let latest = service.latest_assessment(&id)?;
            if cli.json {
                print_json(&serde_json::json!({ "system": system, "latest_assessment": latest }))?;
            } else {
                print!("{}", output::system_details(&system));
                match &latest {
                    Some(a) => print!("\n{}", output::assessment(a)),
                    None => println!("\nNot assessed yet. Run `aiact analyze {id}`."),
                }
            }
        }
        Command::Analyze { id } => {
            let assessment = if cli.json {
                service.analyze(&id, None).await?
            } else {
                let (tx, mut rx) = mpsc::channel(16);
                let printer = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        eprintln!("{}", output::chain_event(&event));
                    }
                });
                let result = service.analyze(&id, Some(&tx)).await;
                drop(tx);
                let _ = printer.await;
                result?
            };
            if cli.json {
                print_json(&assessment)?;
            } else {
                print!("{}", output::assessment(&assessment));
            }
        }
        Command::Classify { file } => {
            let system = AiSystem::from(read_system_file(&file)?);
            let assessment = service.classify_only(&system);
            if cli.json {
                print_json(&assessment)?;
            } else {
                print!("{}", output::assessment(&assessment));
            }
        }
        Command::Docs { id, out } => {
            let documents = service.generate_documents(&id)?;
            fs::create_dir_all(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            let mut written = Vec::with_capacity(documents.len());
            for (kind, content) in &documents {
                let path = out.join(format!("{}.md", kind.as_str()));
                fs::write(&path, content)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                written.push(path);
            }
            if cli.json {
                print_json(&written)?;
            } else if written.is_empty() {
                println!("The latest assessment requires no documents.");
            } else {
                for path in &written {
                    println!("Wrote {}", path.display());
                }
            }
        }
        Command::Export { out } => {
            let count = match &out {
                Some(path) => {
                    let file = fs::File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    service.export_inventory_csv(io::BufWriter::new(file))?
                }
                None => service.export_inventory_csv(io::stdout().lock())?,
            };
            eprintln!("Exported {count} systems");
        }
        Command::Delete { id } => {
            service.delete_system(&id)?;
            if cli.json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted {id}");
            }
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}")?;
    Ok(())
}

/// Read a system description. `.json` files are parsed as JSON, anything
/// else as TOML.
fn read_system_file(path: &Path) -> Result<NewAiSystem, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::validation("file", format!("cannot read {}: {e}", path.display())))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&text)
            .map_err(|e| AppError::validation("file", format!("{}: {e}", path.display())))
    } else {
        toml::from_str(&text)
            .map_err(|e| AppError::validation("file", format!("{}: {e}", path.display())))
    }
}

/// Error body for `--json` output and the process exit code.
fn describe_failure(err: &anyhow::Error) -> (aiact_core::error::ErrorBody, u8) {
    if let Some(app) = err.downcast_ref::<AppError>() {
        let code = if app.is_operational() { 1 } else { 2 };
        return (app.to_body(), code);
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return (AppError::validation("config", format!("{err:#}")).to_body(), 1);
    }
    (AppError::Internal(format!("{err:#}")).to_body(), 2)
}

/// Initialize tracing to write to `logs/aiact.log` under the base directory.
fn init_tracing(base: &Path) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = base.join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("aiact.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aiact=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
