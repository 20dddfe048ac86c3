use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use ultrai_core::cocktails::COCKTAIL_NAMES;
use ultrai_core::{Coordinator, RunRequest};
use ultrai_gateway::GatewayClient;
use ultrai_observability::{canonical_logs_dir_from_root, init_process_logging, ProcessKind};
use ultrai_server::{serve, AppState};
use ultrai_store::ArtifactStore;
use ultrai_types::{RunId, UltraRecord, ARTIFACT_ULTRAI};

#[derive(Parser, Debug)]
#[command(name = "ultrai-engine")]
#[command(about = "UltrAI multi-LLM synthesis orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP control plane.
    Serve {
        #[arg(long, alias = "host", default_value = "127.0.0.1")]
        hostname: String,
        #[arg(long, default_value_t = 8000)]
        port: u16,
        #[arg(long)]
        runs_dir: Option<String>,
    },
    /// Drive a single run to completion and print the synthesis.
    Run {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "SPEEDY")]
        cocktail: String,
        #[arg(long)]
        runs_dir: Option<String>,
    },
    /// Interactive prompt collecting the query and cocktail.
    Chat {
        #[arg(long)]
        runs_dir: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            hostname,
            port,
            runs_dir,
        } => {
            let runs_dir = resolve_runs_dir(runs_dir);
            let logs_dir = canonical_logs_dir_from_root(
                runs_dir.parent().unwrap_or_else(|| std::path::Path::new(".")),
            );
            let _log_guard = init_process_logging(ProcessKind::Engine, &logs_dir, 14)
                .map(|(guard, init)| {
                    info!(logs_dir = %init.logs_dir, "file logging initialized");
                    guard
                })
                .ok();

            let gateway = gateway_from_env()?;
            let state = AppState::new(ArtifactStore::new(&runs_dir), Arc::new(gateway));
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            info!(runs_dir = %runs_dir.display(), "starting ultrai-engine on http://{addr}");
            serve(addr, state).await?;
        }
        Command::Run {
            query,
            cocktail,
            runs_dir,
        } => {
            init_console_logging();
            let record = drive_run(resolve_runs_dir(runs_dir), query, cocktail).await?;
            println!("{}", record.text);
        }
        Command::Chat { runs_dir } => {
            init_console_logging();
            let query = prompt_line("Query: ").await?;
            let cocktail = prompt_line(&format!(
                "Cocktail [{}] (default SPEEDY): ",
                COCKTAIL_NAMES.join(", ")
            ))
            .await?;
            let cocktail = if cocktail.trim().is_empty() {
                "SPEEDY".to_string()
            } else {
                cocktail
            };
            let record = drive_run(resolve_runs_dir(runs_dir), query, cocktail).await?;
            println!("\n--- ULTRA synthesis ({}) ---\n{}", record.model, record.text);
        }
    }

    Ok(())
}

fn init_console_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

fn resolve_runs_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("ULTRAI_RUNS_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    PathBuf::from("runs")
}

fn gateway_from_env() -> anyhow::Result<GatewayClient> {
    GatewayClient::from_env()
        .context("gateway configuration failed; is OPENROUTER_API_KEY set?")
}

/// Runs one query through the full pipeline. A nonzero exit code on failure
/// falls out of the error return.
async fn drive_run(
    runs_dir: PathBuf,
    query: String,
    cocktail: String,
) -> anyhow::Result<UltraRecord> {
    let gateway = gateway_from_env()?;
    let store = ArtifactStore::new(&runs_dir);
    let coordinator = Coordinator::new(store, Arc::new(gateway));

    let request = RunRequest {
        run_id: RunId::cli_now(),
        query,
        cocktail,
    };
    let handle = coordinator.prepare_run(&request).await?;

    let cancel = handle.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    coordinator
        .execute(&request, &handle)
        .await
        .with_context(|| format!("run {} failed", request.run_id))?;

    let record: UltraRecord = coordinator
        .store()
        .read_typed(request.run_id.as_str(), ARTIFACT_ULTRAI)
        .await?;
    info!(
        run_id = %request.run_id,
        dir = %runs_dir.join(request.run_id.as_str()).display(),
        "run delivered"
    );
    Ok(record)
}

async fn prompt_line(prompt: &str) -> anyhow::Result<String> {
    let prompt = prompt.to_string();
    tokio::task::spawn_blocking(move || {
        use std::io::Write;
        print!("{prompt}");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        Ok::<String, std::io::Error>(line.trim().to_string())
    })
    .await
    .context("prompt task failed")?
    .context("failed to read input")
}
