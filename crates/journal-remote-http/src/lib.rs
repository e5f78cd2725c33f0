// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP implementation of the journal's remote store.
//!
//! [`HttpRemoteStore`] talks to a REST collection endpoint with the shared
//! retry policy and exposes the server's SSE change feed as a
//! [`journal_common_sync::Subscription`].

mod client;
mod error;
mod stream;

pub use client::HttpRemoteStore;
pub use error::HttpRemoteError;
pub use stream::StreamConfig;
