// SPDX-FileCopyrightText: 2026 Dripcast Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dripcast` operator CLI.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use dripcast::commands;
use dripcast_config::model::DripcastConfig;
use dripcast_core::HealthStatus;

#[derive(Parser, Debug)]
#[command(name = "dripcast", version, about, long_about = None)]
struct Cli {
    /// Read this file instead of the usual config locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and check the database.
    Check,
    /// Mark reservations older than the given age as failed.
    Sweep {
        #[arg(long)]
        older_than_secs: u64,
    },
    /// List campaigns of an owner on one device as JSON.
    Campaigns {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        device: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => dripcast_config::load_and_validate_path(path),
        None => dripcast_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            dripcast_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    dripcast::init_tracing(&config.service.log_level);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    command: Commands,
    config: &DripcastConfig,
) -> Result<ExitCode, dripcast_core::DripcastError> {
    match command {
        Commands::Check => {
            println!("config: ok ({})", config.service.name);
            match commands::check(config).await? {
                HealthStatus::Healthy => {
                    println!("database: ok ({})", config.storage.database_path);
                    Ok(ExitCode::SUCCESS)
                }
                HealthStatus::Degraded(reason) => {
                    println!("database: degraded ({reason})");
                    Ok(ExitCode::SUCCESS)
                }
                HealthStatus::Unhealthy(reason) => {
                    println!("database: unhealthy ({reason})");
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Sweep { older_than_secs } => {
            print_json(&commands::sweep(config, older_than_secs).await?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Campaigns {
            owner,
            device,
            page,
        } => {
            print_json(&commands::campaigns(config, owner, &device, page).await?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}
