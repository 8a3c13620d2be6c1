use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::engine::{self, BlockContainer, MonotonicClock, PrimitiveRegistry, RunSettings, Scheduler};
use crate::init::InitBuilder;

#[derive(Parser)]
#[command(name = "blocktick")]
#[command(about = "blocktick - run block scripts on a cooperative tick scheduler", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Press the green flag on a script bundle and tick until done
    Run {
        /// Script bundle (JSON)
        bundle: PathBuf,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,

        /// Broadcast a message after the green flag
        #[arg(short = 'b', long = "broadcast")]
        broadcast: Vec<String>,

        /// Tick at 30 per second
        #[arg(long)]
        compat: bool,
    },

    /// Validate a script bundle without running it
    Check {
        /// Script bundle (JSON)
        bundle: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    let mut init = InitBuilder::new();
    if let Some(path) = &cli.config {
        init = init.config_path(path);
    }

    match cli.command {
        Commands::Run {
            bundle,
            ticks,
            broadcast,
            compat,
        } => {
            if compat {
                init = init.compatibility_mode(true);
            }
            if let Some(ticks) = ticks {
                init = init.max_ticks(ticks);
            }
            let config = init.init()?;
            run_bundle(&bundle, &config, &broadcast).await?;
        }

        Commands::Check { bundle } => {
            let blocks = load_bundle(&bundle)?;
            let registry = PrimitiveRegistry::with_stdlib();
            let unknown: Vec<&str> = blocks
                .iter()
                .map(|b| b.opcode.as_str())
                .filter(|op| !registry.contains(op))
                .collect();

            println!(
                "✓ {}: {} blocks, {} scripts",
                bundle.display(),
                blocks.len(),
                blocks.scripts().len()
            );
            for opcode in unknown {
                println!("  warning: no built-in primitive for '{}'", opcode);
            }
        }

        Commands::Config => {
            let config = init.skip_logging(true).init()?;
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn load_bundle(path: &Path) -> Result<BlockContainer> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read bundle {}", path.display()))?;
    BlockContainer::from_json(&source)
        .with_context(|| format!("Invalid bundle {}", path.display()))
}

async fn run_bundle(path: &Path, config: &Config, broadcasts: &[String]) -> Result<()> {
    let blocks = load_bundle(path)?;
    let mut scheduler = Scheduler::new(blocks, PrimitiveRegistry::with_stdlib(), MonotonicClock::new());

    let started = scheduler.green_flag();
    for message in broadcasts {
        scheduler.broadcast(message);
    }
    tracing::debug!(threads = started.len(), "green flag");

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let settings = RunSettings::from_config(&config.scheduler);
    let summary = engine::run(&mut scheduler, &settings, cancel).await;

    for fault in scheduler.drain_faults() {
        eprintln!(
            "  fault in script {} at {} ({}): {}",
            fault.top_block, fault.block, fault.opcode, fault.message
        );
    }
    for (name, value) in scheduler.variables().iter() {
        println!("  {} = {}", name, value);
    }
    println!(
        "✓ Stopped after {} ticks ({:?}), {} faults",
        summary.ticks, summary.reason, summary.faults
    );
    Ok(())
}
