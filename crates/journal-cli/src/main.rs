// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Journal CLI - offline-first trade journal
//!
//! Reads and writes go to the local replica first; a configured remote is
//! kept in sync through each collection's outbox.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use journal_cli_config::{load_config_with_cli, CliOverrides};

mod commands;
mod journal;

use commands::CollectionCommand;
use journal::Journal;

/// Journal - offline-first trade journal
#[derive(Parser, Debug)]
#[command(name = "journal", version, about, long_about = None)]
struct Args {
	/// Path to custom configuration file
	#[arg(short, long)]
	config: Option<PathBuf>,

	/// Directory holding local records and outboxes
	#[arg(long)]
	data_dir: Option<PathBuf>,

	/// Remote store base URL (overrides config)
	#[arg(long)]
	remote: Option<String>,

	/// Queue writes locally without contacting the remote; they are pushed
	/// by the next run that is online
	#[arg(long)]
	offline: bool,

	/// Output logs as JSON
	#[arg(long)]
	json_logs: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Work with trades
	Trades {
		#[command(subcommand)]
		command: CollectionCommand,
	},
	/// Work with analyses
	Analyses {
		#[command(subcommand)]
		command: CollectionCommand,
	},
	/// Show sync status and pending writes per collection
	Status,
	/// Push queued writes to the remote now
	Sync,
	/// Stream sync events until interrupted
	Watch,
}

impl From<&Args> for CliOverrides {
	fn from(args: &Args) -> Self {
		Self {
			data_dir: args.data_dir.clone(),
			remote_url: args.remote.clone(),
			offline: args.offline,
		}
	}
}

fn init_tracing(json_logs: bool) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

	// stdout carries command output, so logs go to stderr.
	if json_logs {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().json().with_writer(std::io::stderr))
			.init();
	} else {
		tracing_subscriber::registry()
			.with(filter)
			.with(fmt::layer().compact().with_writer(std::io::stderr))
			.init();
	}
}

fn print_json(value: &Value) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

async fn run(journal: &Journal, command: Command) -> Result<()> {
	match command {
		Command::Trades { command } => {
			print_json(&commands::run_collection(&journal.trades, command).await?)
		}
		Command::Analyses { command } => {
			print_json(&commands::run_collection(&journal.analyses, command).await?)
		}
		Command::Status => print_json(&commands::status(journal).await),
		Command::Sync => print_json(&commands::sync(journal).await?),
		Command::Watch => commands::watch(journal).await,
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	let args = Args::parse();
	init_tracing(args.json_logs);

	let cli_overrides = CliOverrides::from(&args);
	let config = load_config_with_cli(cli_overrides, args.config.clone())
		.context("failed to load configuration")?;

	info!(data_dir = %config.data_dir.display(), "starting journal");

	let journal = Journal::open(&config).await?;
	// Bootstrap and the startup flush finish before the command reads.
	journal.settle().await;

	let result = run(&journal, args.command).await;
	journal.shutdown().await;
	result
}
