// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::record::SyncRecord;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Note {
	pub id: String,
	pub body: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub topic: Option<String>,
}

impl Note {
	pub fn new(id: &str, body: &str) -> Self {
		Self {
			id: id.to_string(),
			body: body.to_string(),
			topic: None,
		}
	}

	pub fn with_topic(mut self, topic: &str) -> Self {
		self.topic = Some(topic.to_string());
		self
	}
}

impl SyncRecord for Note {
	fn id(&self) -> &str {
		&self.id
	}

	fn list_key(&self) -> Option<&str> {
		self.topic.as_deref()
	}
}
