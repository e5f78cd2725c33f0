// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::borrow::Cow;

use journal_common_sync::{validate_id, RecordError, SyncRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A written analysis, optionally linked to a trade. Listed by trade id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
	pub id: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub trade_id: Option<String>,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl Analysis {
	pub fn new() -> Self {
		Self {
			id: Self::generate_id(),
			trade_id: None,
			fields: Map::new(),
		}
	}

	pub fn generate_id() -> String {
		let uuid = uuid7::uuid7();
		format!("AN-{uuid}")
	}

	pub fn for_trade(trade_id: impl Into<String>) -> Self {
		Self {
			trade_id: Some(trade_id.into()),
			..Self::new()
		}
	}

	pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.fields.insert(key.into(), value.into());
		self
	}
}

impl Default for Analysis {
	fn default() -> Self {
		Self::new()
	}
}

impl SyncRecord for Analysis {
	fn id(&self) -> &str {
		&self.id
	}

	fn list_key(&self) -> Option<&str> {
		self.trade_id.as_deref()
	}

	fn canonical_key(key: &str) -> Cow<'_, str> {
		Cow::Borrowed(key.trim())
	}

	fn canonicalize(mut self) -> Result<Self, RecordError> {
		validate_id(&self.id)?;
		self.trade_id = self
			.trade_id
			.map(|id| id.trim().to_string())
			.filter(|id| !id.is_empty());
		Ok(self)
	}
}
