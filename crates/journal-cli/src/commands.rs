// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use journal_common_sync::{SyncEngine, SyncRecord};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::journal::{Journal, JournalRecord};

#[derive(Subcommand, Debug, Clone)]
pub enum CollectionCommand {
	/// List records, optionally only those under one key
	List {
		/// Symbol for trades, trade id for analyses
		#[arg(long, short)]
		key: Option<String>,
	},
	/// Show one record
	Get { id: String },
	/// Create or replace a record from a JSON object; a missing id is generated
	Save { json: String },
	/// Delete a record by id
	Delete { id: String },
}

pub async fn run_collection<T: JournalRecord>(
	engine: &SyncEngine<T>,
	command: CollectionCommand,
) -> Result<Value> {
	match command {
		CollectionCommand::List { key } => {
			let records = match key {
				Some(key) => engine.list_by_key(&key).await?,
				None => engine.get_all().await?,
			};
			Ok(serde_json::to_value(records)?)
		}
		CollectionCommand::Get { id } => {
			let record = engine.get_by_id(&id).await?;
			Ok(serde_json::to_value(record)?)
		}
		CollectionCommand::Save { json } => {
			let record = parse_record::<T>(&json)?;
			let id = record.id().to_string();
			engine.save(record).await?;
			info!(collection = %engine.collection(), record_id = %id, "record saved");
			Ok(json!({ "id": id, "status": engine.status() }))
		}
		CollectionCommand::Delete { id } => {
			engine.delete(&id).await?;
			info!(collection = %engine.collection(), record_id = %id, "record deleted");
			Ok(json!({ "id": id, "status": engine.status() }))
		}
	}
}

/// Parses a JSON object into a record, filling in a generated id when the
/// object has none.
pub fn parse_record<T: JournalRecord>(input: &str) -> Result<T> {
	let mut value: Value = serde_json::from_str(input).context("record is not valid JSON")?;
	let Some(object) = value.as_object_mut() else {
		bail!("record must be a JSON object");
	};
	if !object.contains_key("id") {
		object.insert("id".to_string(), Value::String(T::generate_id()));
	}
	serde_json::from_value(value).context("record does not match the collection's shape")
}

async fn collection_status<T: SyncRecord>(engine: &SyncEngine<T>) -> Value {
	json!({
		"status": engine.status(),
		"pending": engine.pending_count().await,
		"remote": engine.has_remote(),
	})
}

pub async fn status(journal: &Journal) -> Value {
	json!({
		"connectivity": journal.signals.connectivity(),
		"trades": collection_status(&journal.trades).await,
		"analyses": collection_status(&journal.analyses).await,
	})
}

/// Runs a flush pass on every collection with a remote.
pub async fn sync(journal: &Journal) -> Result<Value> {
	if !journal.trades.has_remote() {
		bail!("no remote configured; set remote.base_url or pass --remote");
	}
	if journal.trades.is_offline() {
		bail!("running offline; drop --offline to push queued writes");
	}
	let (trades, analyses) = tokio::join!(journal.trades.flush(), journal.analyses.flush());
	Ok(json!({ "trades": trades, "analyses": analyses }))
}

/// Prints every sync event as a JSON line until interrupted.
pub async fn watch(journal: &Journal) -> Result<()> {
	let mut events = journal.events.subscribe();
	let interrupt = tokio::signal::ctrl_c();
	tokio::pin!(interrupt);
	info!("watching sync events, press Ctrl-C to stop");

	loop {
		tokio::select! {
			_ = &mut interrupt => return Ok(()),
			event = events.recv() => match event {
				Ok(event) => {
					let line = json!({ "topic": event.topic(), "event": event });
					println!("{line}");
				}
				Err(RecvError::Lagged(missed)) => {
					warn!(missed = missed, "event watcher fell behind");
				}
				Err(RecvError::Closed) => return Ok(()),
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use journal_common_sync::{MemoryLocalStore, SyncConfig};
	use journal_models::{Analysis, Trade};

	#[test]
	fn test_parse_record_generates_missing_id() {
		let trade: Trade = parse_record(r#"{"symbol": "aapl", "qty": 10}"#).unwrap();
		assert!(trade.id.starts_with("TR-"));
		assert_eq!(trade.fields.get("qty"), Some(&json!(10)));

		let analysis: Analysis = parse_record(r#"{"id": "AN-1", "trade_id": "TR-1"}"#).unwrap();
		assert_eq!(analysis.id, "AN-1");
	}

	#[tokio::test]
	async fn test_list_key_matches_regardless_of_case() {
		let engine = SyncEngine::builder(SyncConfig::new("trades"), MemoryLocalStore::<Trade>::new())
			.start()
			.await
			.unwrap();
		let saved = json!({"id": "TR-1", "symbol": "msft"}).to_string();
		run_collection(&engine, CollectionCommand::Save { json: saved })
			.await
			.unwrap();

		let listed = run_collection(
			&engine,
			CollectionCommand::List {
				key: Some(" msft ".to_string()),
			},
		)
		.await
		.unwrap();
		assert_eq!(listed, json!([{"id": "TR-1", "symbol": "MSFT"}]));
	}

	#[test]
	fn test_parse_record_rejects_non_objects() {
		assert!(parse_record::<Trade>("[1, 2]").is_err());
		assert!(parse_record::<Trade>("{not json").is_err());
		assert!(parse_record::<Trade>(r#"{"id": "TR-1"}"#).is_err());
	}
}
