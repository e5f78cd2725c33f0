// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::borrow::Cow;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RecordError;

const MAX_ID_LEN: usize = 256;

/// A record the engine can replicate.
///
/// The engine only ever looks at [`id`](SyncRecord::id) and
/// [`list_key`](SyncRecord::list_key); everything else is opaque payload.
pub trait SyncRecord:
	Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
	fn id(&self) -> &str;

	/// Secondary key matched by `list_by_key`. Records without one are never
	/// returned from a keyed listing.
	fn list_key(&self) -> Option<&str> {
		None
	}

	/// Brings a caller-supplied key into the form `list_key` returns after
	/// [`canonicalize`](SyncRecord::canonicalize).
	fn canonical_key(key: &str) -> Cow<'_, str> {
		Cow::Borrowed(key)
	}

	/// Coerces the record into its canonical shape. Applied to every record
	/// entering through a write or from the remote store.
	fn canonicalize(self) -> Result<Self, RecordError> {
		validate_id(self.id())?;
		Ok(self)
	}
}

/// Checks that an id can be used as a primary key and as a file name.
pub fn validate_id(id: &str) -> Result<(), RecordError> {
	if id.is_empty() {
		return Err(RecordError::EmptyId);
	}
	if id.len() > MAX_ID_LEN {
		return Err(RecordError::IdTooLong(id.len()));
	}
	if id == "." || id == ".." || id.contains(['/', '\\', '\0']) {
		return Err(RecordError::InvalidId(id.to_string()));
	}
	Ok(())
}
