// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::time::Duration;

use crate::error::SyncError;
use crate::record::validate_id;

#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Collection name. Used in event topics, file names and logs.
	pub collection: String,
	/// Upper bound for each remote call. `None` leaves timeouts to the
	/// remote store.
	pub remote_timeout: Option<Duration>,
	/// Flush the outbox at startup when connectivity is online.
	pub flush_on_start: bool,
}

impl SyncConfig {
	pub fn new(collection: impl Into<String>) -> Self {
		Self {
			collection: collection.into(),
			remote_timeout: Some(Duration::from_secs(10)),
			flush_on_start: true,
		}
	}

	pub fn with_remote_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.remote_timeout = timeout;
		self
	}

	pub fn with_flush_on_start(mut self, flush: bool) -> Self {
		self.flush_on_start = flush;
		self
	}

	pub fn validate(&self) -> Result<(), SyncError> {
		validate_id(&self.collection)
			.map_err(|e| SyncError::InvalidConfig(format!("collection name: {e}")))?;
		if self.remote_timeout == Some(Duration::ZERO) {
			return Err(SyncError::InvalidConfig(
				"remote timeout must be greater than zero".to_string(),
			));
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_are_valid() {
		let config = SyncConfig::new("trades");
		assert!(config.flush_on_start);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn test_rejects_bad_collection_and_zero_timeout() {
		assert!(SyncConfig::new("").validate().is_err());
		assert!(SyncConfig::new("a/b").validate().is_err());
		assert!(SyncConfig::new("trades")
			.with_remote_timeout(Some(Duration::ZERO))
			.validate()
			.is_err());
		assert!(SyncConfig::new("trades")
			.with_remote_timeout(None)
			.validate()
			.is_ok());
	}
}
