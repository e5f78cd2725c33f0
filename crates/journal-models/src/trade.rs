// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::borrow::Cow;

use journal_common_sync::{validate_id, RecordError, SyncRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A journaled trade. Listed by symbol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trade {
	pub id: String,
	pub symbol: String,
	#[serde(flatten)]
	pub fields: Map<String, Value>,
}

impl Trade {
	pub fn new(symbol: impl Into<String>) -> Self {
		Self {
			id: Self::generate_id(),
			symbol: symbol.into(),
			fields: Map::new(),
		}
	}

	/// A fresh time-ordered id with the `TR-` prefix.
	pub fn generate_id() -> String {
		let uuid = uuid7::uuid7();
		format!("TR-{uuid}")
	}

	pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
		self.fields.insert(key.into(), value.into());
		self
	}
}

impl SyncRecord for Trade {
	fn id(&self) -> &str {
		&self.id
	}

	fn list_key(&self) -> Option<&str> {
		Some(&self.symbol)
	}

	fn canonical_key(key: &str) -> Cow<'_, str> {
		Cow::Owned(key.trim().to_uppercase())
	}

	/// Symbols are stored trimmed and upper-case.
	fn canonicalize(mut self) -> Result<Self, RecordError> {
		validate_id(&self.id)?;
		let symbol = Self::canonical_key(&self.symbol).into_owned();
		if symbol.is_empty() {
			return Err(RecordError::Invalid("trade symbol is empty".to_string()));
		}
		self.symbol = symbol;
		Ok(self)
	}
}
