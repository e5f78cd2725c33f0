// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Retry with exponential backoff for transient HTTP failures.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::{debug, warn};

/// Errors that know whether another attempt could succeed.
pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		if self.is_timeout() || self.is_connect() || self.is_request() {
			return true;
		}
		self
			.status()
			.map(|status| DEFAULT_RETRYABLE_STATUSES.contains(&status))
			.unwrap_or(false)
	}
}

const DEFAULT_RETRYABLE_STATUSES: [StatusCode; 5] = [
	StatusCode::TOO_MANY_REQUESTS,
	StatusCode::REQUEST_TIMEOUT,
	StatusCode::BAD_GATEWAY,
	StatusCode::SERVICE_UNAVAILABLE,
	StatusCode::GATEWAY_TIMEOUT,
];

/// Backoff policy for [`retry`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total attempts including the first one.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	/// Adds up to 25% random jitter to each delay.
	pub jitter: bool,
	/// Response statuses that callers should map to retryable errors.
	pub retryable_statuses: Vec<StatusCode>,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			base_delay: Duration::from_millis(200),
			max_delay: Duration::from_secs(10),
			backoff_factor: 2.0,
			jitter: true,
			retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
		}
	}
}

impl RetryConfig {
	/// A policy that makes exactly one attempt.
	pub fn no_retry() -> Self {
		Self {
			max_attempts: 1,
			..Default::default()
		}
	}

	/// Delay to wait before the given retry (1-indexed).
	pub fn delay_for_retry(&self, retry: u32) -> Duration {
		let exp = self.backoff_factor.powi(retry.saturating_sub(1) as i32);
		let base = self.base_delay.as_secs_f64() * exp;
		let capped = base.min(self.max_delay.as_secs_f64());

		if self.jitter {
			Duration::from_secs_f64(capped + capped * 0.25 * fastrand::f64())
		} else {
			Duration::from_secs_f64(capped)
		}
	}

	pub fn is_retryable_status(&self, status: StatusCode) -> bool {
		self.retryable_statuses.contains(&status)
	}
}

/// Runs `op` until it succeeds, returns a non-retryable error, or the attempt
/// budget is exhausted. The last error is returned on exhaustion.
pub async fn retry<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
	E: RetryableError + std::fmt::Display,
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
{
	let max_attempts = config.max_attempts.max(1);
	let mut attempt = 1;

	loop {
		match op().await {
			Ok(value) => return Ok(value),
			Err(e) if attempt < max_attempts && e.is_retryable() => {
				let delay = config.delay_for_retry(attempt);
				warn!(
					attempt = attempt,
					max_attempts = max_attempts,
					delay_ms = delay.as_millis() as u64,
					error = %e,
					"retryable request failure"
				);
				tokio::time::sleep(delay).await;
				attempt += 1;
			}
			Err(e) => {
				debug!(attempt = attempt, error = %e, "giving up on request");
				return Err(e);
			}
		}
	}
}
