// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Record types kept by the trade journal.
//!
//! Both records carry an id, the secondary key used for keyed listings, and
//! an open set of payload fields the sync engine never looks into.

mod analysis;
mod trade;

pub use analysis::Analysis;
pub use trade::Trade;

/// Collection holding [`Trade`] records.
pub const TRADES: &str = "trades";

/// Collection holding [`Analysis`] records.
pub const ANALYSES: &str = "analyses";
