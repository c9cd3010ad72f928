#![deny(unused)]
//! Scriptbox - sandboxed test-script runner
//!
//! Runs a post-response script against a captured request/response exchange
//! and prints the JSON report. Exits non-zero when the script fails, after
//! printing whatever it collected before the failure.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use scriptbox_core::config::{AppConfig, BackendKind, ScriptingConfig};
use scriptbox_core::tracing_layer::configure_tracing;
use scriptbox_core::{ConsoleLevel, ConsoleSink, RequestSnapshot, ResponseSnapshot, Variables};
use scriptbox_sandbox::{RunRequest, TestRuntime};

#[derive(Parser)]
#[command(name = "scriptbox", version, about = "Sandboxed runner for API test scripts")]
struct Cli {
    /// Explicit configuration file, layered over config/default.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one script against an exchange.
    Run {
        /// Script source file.
        #[arg(long)]
        script: PathBuf,

        /// JSON file holding the request, response and variables.
        #[arg(long)]
        exchange: PathBuf,

        /// Collection directory. Defaults to the script's directory.
        #[arg(long)]
        collection: Option<PathBuf>,

        /// Override the configured backend.
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Isolated,
    Embedded,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Isolated => BackendKind::Isolated,
            BackendArg::Embedded => BackendKind::Embedded,
        }
    }
}

/// Contents of the `--exchange` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Exchange {
    request: RequestSnapshot,
    response: ResponseSnapshot,
    env_variables: Variables,
    runtime_variables: Variables,
    collection_name: Option<String>,
    /// Collection-level scripting options; replaces the configured default.
    scripting: Option<ScriptingConfig>,
}

/// Prints script console output to stderr so stdout stays a JSON report.
struct StderrConsole;

impl ConsoleSink for StderrConsole {
    fn log(&self, level: ConsoleLevel, args: &[serde_json::Value]) {
        let line: Vec<String> = args
            .iter()
            .map(|arg| match arg {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        eprintln!("[{}] {}", level, line.join(" "));
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    configure_tracing(&config.logging)?;

    match cli.command {
        Command::Run {
            script,
            exchange,
            collection,
            backend,
        } => run(config, script, exchange, collection, backend).await,
    }
}

async fn run(
    mut config: AppConfig,
    script_path: PathBuf,
    exchange_path: PathBuf,
    collection: Option<PathBuf>,
    backend: Option<BackendArg>,
) -> anyhow::Result<()> {
    let script = std::fs::read_to_string(&script_path)
        .with_context(|| format!("failed to read script {}", script_path.display()))?;
    let raw = std::fs::read_to_string(&exchange_path)
        .with_context(|| format!("failed to read exchange {}", exchange_path.display()))?;
    let exchange: Exchange = serde_json::from_str(&raw)
        .with_context(|| format!("invalid exchange {}", exchange_path.display()))?;

    if let Some(backend) = backend {
        config.runtime.backend = backend.into();
    }
    let collection_path = collection.unwrap_or_else(|| {
        script_path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    });
    let process_env_vars: Variables = std::env::vars()
        .map(|(key, value)| (key, serde_json::Value::String(value)))
        .collect();

    tracing::info!(
        script = %script_path.display(),
        backend = %config.runtime.backend,
        "Running script"
    );

    let runtime = TestRuntime::new(config.runtime);
    let outcome = runtime
        .run(RunRequest {
            script,
            request: exchange.request,
            response: exchange.response,
            env_variables: exchange.env_variables,
            runtime_variables: exchange.runtime_variables,
            collection_path,
            on_console_log: Some(std::sync::Arc::new(StderrConsole)),
            process_env_vars,
            scripting_config: exchange.scripting.unwrap_or(config.scripting),
            run_request_by_path: None,
            collection_name: exchange.collection_name,
        })
        .await;

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            let failed = result.results.iter().filter(|r| !r.passed).count();
            tracing::info!(tests = result.results.len(), failed, "Script finished");
            Ok(())
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure.partial_results)?);
            tracing::info!(error = %failure.error, "Script failed");
            Err(anyhow::anyhow!(failure.error)).context("script failed")
        }
    }
}
