// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use journal_common_http::RetryableError;
use journal_common_sync::RemoteError;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HttpRemoteError {
	#[error("network error: {0}")]
	Network(#[from] reqwest::Error),

	#[error("server error: {status} - {message}")]
	Server { status: StatusCode, message: String },

	#[error("invalid URL: {0}")]
	InvalidUrl(String),

	#[error("failed to decode response: {0}")]
	Decode(String),

	#[error("unexpected status: {0}")]
	UnexpectedStatus(StatusCode),

	#[error("change stream error: {0}")]
	Stream(String),
}

fn is_retryable_status(status: StatusCode) -> bool {
	matches!(
		status,
		StatusCode::TOO_MANY_REQUESTS
			| StatusCode::REQUEST_TIMEOUT
			| StatusCode::BAD_GATEWAY
			| StatusCode::SERVICE_UNAVAILABLE
			| StatusCode::GATEWAY_TIMEOUT
	)
}

impl RetryableError for HttpRemoteError {
	fn is_retryable(&self) -> bool {
		match self {
			Self::Network(e) => e.is_retryable(),
			Self::Server { status, .. } => is_retryable_status(*status),
			Self::UnexpectedStatus(status) => is_retryable_status(*status),
			Self::InvalidUrl(_) | Self::Decode(_) | Self::Stream(_) => false,
		}
	}
}

impl From<HttpRemoteError> for RemoteError {
	fn from(err: HttpRemoteError) -> Self {
		match err {
			HttpRemoteError::Network(e) if e.is_timeout() => RemoteError::Timeout,
			HttpRemoteError::Network(e) => RemoteError::Network(e.to_string()),
			HttpRemoteError::Server { status, message } => RemoteError::Server {
				status: status.as_u16(),
				message,
			},
			HttpRemoteError::UnexpectedStatus(status) if status.is_client_error() => {
				RemoteError::Rejected(status.to_string())
			}
			HttpRemoteError::UnexpectedStatus(status) => RemoteError::Server {
				status: status.as_u16(),
				message: String::new(),
			},
			HttpRemoteError::InvalidUrl(url) => RemoteError::Rejected(format!("invalid URL: {url}")),
			HttpRemoteError::Decode(message) => RemoteError::Decode(message),
			HttpRemoteError::Stream(message) => RemoteError::Network(message),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_retryable_classification() {
		let unavailable = HttpRemoteError::Server {
			status: StatusCode::SERVICE_UNAVAILABLE,
			message: String::new(),
		};
		assert!(unavailable.is_retryable());

		let internal = HttpRemoteError::Server {
			status: StatusCode::INTERNAL_SERVER_ERROR,
			message: String::new(),
		};
		assert!(!internal.is_retryable());
		assert!(HttpRemoteError::UnexpectedStatus(StatusCode::TOO_MANY_REQUESTS).is_retryable());
		assert!(!HttpRemoteError::Decode("bad".to_string()).is_retryable());
	}

	#[test]
	fn test_maps_into_remote_error() {
		let err = RemoteError::from(HttpRemoteError::Server {
			status: StatusCode::BAD_GATEWAY,
			message: "upstream".to_string(),
		});
		assert_eq!(
			err,
			RemoteError::Server {
				status: 502,
				message: "upstream".to_string()
			}
		);

		let err = RemoteError::from(HttpRemoteError::UnexpectedStatus(StatusCode::FORBIDDEN));
		assert!(matches!(err, RemoteError::Rejected(_)));

		let err = RemoteError::from(HttpRemoteError::Decode("eof".to_string()));
		assert_eq!(err, RemoteError::Decode("eof".to_string()));
	}
}
