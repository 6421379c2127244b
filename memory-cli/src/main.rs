//! Admin CLI for the living-memory engine (spec.md §6): health, stats,
//! decay/consolidate/pattern triggers, export, reconcile, stale-memory
//! resolution, reranker retraining, and user management.
//!
//! Mirrors the teacher's `memory-cli/src/main.rs` shape: parse args with
//! `clap` derive, build a `Context` once, dispatch to a `commands::*`
//! module, and translate any `do_memory_core::Error` into the exit codes
//! spec.md §6 enumerates (`0` success, `1` internal error, `2` usage
//! error, `3` backend unreachable).

mod commands;
mod config_file;
mod context;
mod ollama;
mod output;

use clap::{Parser, Subcommand};
use context::Context;
use do_memory_core::types::MemoryType;
use output::OutputFormat;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "memory-cli", about = "Admin CLI for the living-memory engine", version)]
struct Cli {
    /// Optional TOML config file layered over `MEMORY_*` environment defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Backend reachability and top-line counters.
    Health,
    /// Memory/graph/feedback statistics.
    Stats,
    /// Run one decay pass.
    Decay {
        /// Simulated additional elapsed hours (for testing the forgetting curve).
        #[arg(long, default_value_t = 0.0)]
        simulate_hours: f64,
    },
    /// Run one consolidation pass.
    Consolidate {
        #[arg(long, value_enum)]
        memory_type: Option<CliMemoryType>,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run one pattern-extraction pass.
    Patterns,
    /// Repair vector-only rows left by a half-failed two-phase write.
    Reconcile,
    /// Export every non-superseded memory as JSONL.
    Export {
        /// Output file; defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Include raw embeddings in the export (overrides the config default).
        #[arg(long)]
        include_embeddings: Option<bool>,
    },
    /// List or resolve memories whose importance has decayed below the
    /// retrieval floor.
    Stale {
        #[command(subcommand)]
        action: StaleAction,
    },
    /// Reranker training and status.
    Ml {
        #[command(subcommand)]
        action: MlAction,
    },
    /// Recent audit-log entries.
    Audit {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// User management.
    Users {
        #[command(subcommand)]
        action: UsersAction,
    },
}

#[derive(Debug, Subcommand)]
enum StaleAction {
    List,
    Resolve { id: String },
}

#[derive(Debug, Subcommand)]
enum MlAction {
    RetrainRanker,
    RerankerStatus,
}

#[derive(Debug, Subcommand)]
enum UsersAction {
    Add {
        username: String,
        #[arg(long, default_value = "")]
        display_name: String,
        #[arg(long)]
        admin: bool,
    },
    List,
    Remove {
        id: String,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliMemoryType {
    Episodic,
    Semantic,
    Procedural,
    Working,
}

impl From<CliMemoryType> for MemoryType {
    fn from(value: CliMemoryType) -> Self {
        match value {
            CliMemoryType::Episodic => MemoryType::Episodic,
            CliMemoryType::Semantic => MemoryType::Semantic,
            CliMemoryType::Procedural => MemoryType::Procedural,
            CliMemoryType::Working => MemoryType::Working,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::from(exit_code_for(&err) as u8)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<do_memory_core::Error>().map_or(1, do_memory_core::Error::exit_code)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config_file::load(cli.config.as_deref())?;
    let ctx = Context::connect(config).await?;
    let format = cli.format;

    match cli.command {
        Command::Health => commands::health::run(&ctx, format).await,
        Command::Stats => commands::stats::run(&ctx, format).await,
        Command::Decay { simulate_hours } => commands::decay::run(&ctx, simulate_hours, format).await,
        Command::Consolidate { memory_type, domain, dry_run } => {
            commands::consolidate::run(&ctx, memory_type.map(Into::into), domain, dry_run, format).await
        }
        Command::Patterns => commands::patterns::run(&ctx, format).await,
        Command::Reconcile => commands::reconcile::run(&ctx, format).await,
        Command::Export { out, include_embeddings } => {
            let count = match out {
                Some(path) => {
                    let file = std::fs::File::create(&path)?;
                    commands::export::run(&ctx, include_embeddings, std::io::BufWriter::new(file)).await?
                }
                None => commands::export::run(&ctx, include_embeddings, std::io::stdout().lock()).await?,
            };
            tracing::info!(count, "export complete");
            Ok(())
        }
        Command::Stale { action } => match action {
            StaleAction::List => commands::stale::list(&ctx, format).await,
            StaleAction::Resolve { id } => commands::stale::resolve(&ctx, &id, format).await,
        },
        Command::Ml { action } => match action {
            MlAction::RetrainRanker => commands::ml::retrain_ranker(&ctx, format).await,
            MlAction::RerankerStatus => commands::ml::reranker_status(&ctx, format).await,
        },
        Command::Audit { limit } => commands::audit::run(&ctx, limit, format).await,
        Command::Users { action } => match action {
            UsersAction::Add { username, display_name, admin } => commands::users::add(&ctx, &username, &display_name, admin, format).await,
            UsersAction::List => commands::users::list(&ctx, format).await,
            UsersAction::Remove { id } => commands::users::delete(&ctx, &id, format).await,
        },
    }
}
