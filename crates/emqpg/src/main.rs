// SPDX-FileCopyrightText: 2026 Emqpg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! emqpg - MQTT to PostgreSQL telemetry ingestion.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod serve;
mod shutdown;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use emqpg_config::{ConfigError, EmqpgConfig};

/// emqpg - MQTT to PostgreSQL telemetry ingestion.
#[derive(Parser, Debug)]
#[command(name = "emqpg", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Replaces the standard lookup; EMQPG_* variables still apply.
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of `log.level`.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the ingestion pipeline until SIGINT or SIGTERM (default).
    Serve,
    /// Validate configuration and try the database and broker.
    Check {
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            emqpg_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let code = match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            serve::init_tracing(log_level(&config, cli.debug));
            match serve::run_serve(config).await {
                Ok(()) => 0,
                Err(e) => {
                    tracing::error!(error = %e, "emqpg stopped");
                    eprintln!("emqpg: {e}");
                    1
                }
            }
        }
        Commands::Check { plain } => {
            if cli.debug {
                serve::init_tracing("debug");
            }
            if check::run_check(&config, plain).await {
                0
            } else {
                1
            }
        }
    };

    std::process::exit(code);
}

fn load_config(path: Option<&Path>) -> Result<EmqpgConfig, Vec<ConfigError>> {
    match path {
        Some(path) => emqpg_config::load_and_validate_path(path),
        None => emqpg_config::load_and_validate(),
    }
}

fn log_level(config: &EmqpgConfig, debug: bool) -> &str {
    if debug {
        "debug"
    } else {
        config.log.level.as_str()
    }
}
