// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors raised to callers of the engine.
///
/// Remote failures never appear here: they are absorbed into the outbox and
/// reported through [`crate::SyncStatus`].
#[derive(Debug, Error)]
pub enum SyncError {
	#[error("local store error: {0}")]
	Local(#[from] LocalStoreError),

	#[error("outbox error: {0}")]
	Outbox(#[from] OutboxError),

	#[error("invalid record: {0}")]
	Record(#[from] RecordError),

	#[error("invalid sync configuration: {0}")]
	InvalidConfig(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordError {
	#[error("record id is empty")]
	EmptyId,

	#[error("record id is too long: {0} bytes")]
	IdTooLong(usize),

	#[error("record id contains forbidden characters: {0:?}")]
	InvalidId(String),

	#[error("{0}")]
	Invalid(String),
}

#[derive(Debug, Error)]
pub enum LocalStoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("invalid record: {0}")]
	Record(#[from] RecordError),

	#[error("local store unavailable: {0}")]
	Unavailable(String),
}

#[derive(Debug, Error)]
pub enum OutboxError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	#[error("outbox storage unavailable: {0}")]
	Unavailable(String),
}

/// A failed call against the remote store.
///
/// The engine cannot tell transient failures from permanent ones, so every
/// variant is handled the same way: the write is queued and retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
	#[error("network error: {0}")]
	Network(String),

	#[error("server error: {status} - {message}")]
	Server { status: u16, message: String },

	#[error("request timeout")]
	Timeout,

	#[error("rejected by remote store: {0}")]
	Rejected(String),

	#[error("failed to decode remote response: {0}")]
	Decode(String),

	#[error("remote store unavailable")]
	Unavailable,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_display() {
		let err = RemoteError::Server {
			status: 503,
			message: "maintenance".to_string(),
		};
		assert_eq!(err.to_string(), "server error: 503 - maintenance");

		let err = SyncError::from(RecordError::EmptyId);
		assert_eq!(err.to_string(), "invalid record: record id is empty");
	}
}
