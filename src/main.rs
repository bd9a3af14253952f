// Copyright 2026 Tasa Contributors
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code, unused_imports)]

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

mod adapter;
mod cli;
mod config;
mod events;
mod extract;
mod http_client;
mod model;
mod orchestrator;
mod registry;
mod renderer;
mod rest;
mod store;

#[derive(Parser)]
#[command(
    name = "tasa",
    about = "Tasa — rate radar for Colombian savings products",
    version,
    after_help = "Run 'tasa <command> --help' for details on each command."
)]
struct Cli {
    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Data directory (default: ~/.tasa/data, or $TASA_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Entity table as a JSON file (default: built-in table)
    #[arg(long, global = true)]
    entities: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scrape of every registered source and persist the snapshot
    Scrape {
        /// Whole-run time budget in milliseconds
        #[arg(long, default_value_t = config::DEFAULT_RUN_BUDGET_MS)]
        budget: u64,
    },
    /// Serve the HTTP API (manual scrape trigger, rates, rankings, events)
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "5001")]
        port: u16,
        /// Also scrape on a schedule, every N minutes
        #[arg(long)]
        every: Option<u64>,
        /// Whole-run time budget in milliseconds for triggered runs
        #[arg(long, default_value_t = config::DEFAULT_RUN_BUDGET_MS)]
        budget: u64,
    },
    /// Show the current snapshot as a ranking table
    Show,
    /// List registered entities
    List,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    let opts = cli::RuntimeOptions {
        data_dir: args.data_dir.unwrap_or_else(config::default_data_dir),
        entities_file: args.entities,
    };

    let result = match args.command {
        Commands::Scrape { budget } => cli::scrape_cmd::run(&opts, budget).await,
        Commands::Serve {
            port,
            every,
            budget,
        } => cli::serve_cmd::run(&opts, port, every, budget).await,
        Commands::Show => cli::show_cmd::run(&opts),
        Commands::List => cli::list_cmd::run(&opts),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "tasa", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }

    result
}
