// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

use std::marker::PhantomData;

use async_trait::async_trait;
use journal_common_http::RetryConfig;
use journal_common_sync::{RemoteError, RemoteStore, SyncRecord, Subscription};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::HttpRemoteError;
use crate::stream::{ChangeStream, StreamConfig};

/// [`RemoteStore`] backed by a JSON-over-HTTP collection endpoint.
///
/// Paths are relative to `base_url`: `{collection}` for listings,
/// `{collection}/{id}` for single records and `{collection}/stream` for the
/// server-sent change feed.
pub struct HttpRemoteStore<T> {
	base_url: Url,
	collection: String,
	http: reqwest::Client,
	retry_config: RetryConfig,
	stream_config: StreamConfig,
	auth_token: Option<String>,
	_record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord> HttpRemoteStore<T> {
	pub fn new(base_url: Url, collection: impl Into<String>, http: reqwest::Client) -> Self {
		Self {
			base_url,
			collection: collection.into(),
			http,
			retry_config: RetryConfig::default(),
			stream_config: StreamConfig::default(),
			auth_token: None,
			_record: PhantomData,
		}
	}

	pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
		self.auth_token = Some(token.into());
		self
	}

	pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
		self.retry_config = config;
		self
	}

	pub fn with_stream_config(mut self, config: StreamConfig) -> Self {
		self.stream_config = config;
		self
	}

	pub fn collection(&self) -> &str {
		&self.collection
	}

	fn url_for(&self, segments: &[&str]) -> Result<Url, HttpRemoteError> {
		let mut url = self.base_url.clone();
		url
			.path_segments_mut()
			.map_err(|_| HttpRemoteError::InvalidUrl(self.base_url.to_string()))?
			.pop_if_empty()
			.push(&self.collection)
			.extend(segments);
		Ok(url)
	}

	fn collection_url(&self) -> Result<Url, HttpRemoteError> {
		self.url_for(&[])
	}

	fn record_url(&self, id: &str) -> Result<Url, HttpRemoteError> {
		self.url_for(&[id])
	}

	fn stream_url(&self) -> Result<Url, HttpRemoteError> {
		self.url_for(&["stream"])
	}

	/// Sends the request built by `build`, retrying transport failures and
	/// retryable statuses under the configured policy.
	async fn send<F>(&self, build: F) -> Result<Response, HttpRemoteError>
	where
		F: Fn() -> RequestBuilder,
	{
		journal_common_http::retry(&self.retry_config, || async {
			let response = apply_auth(build(), self.auth_token.as_deref())
				.send()
				.await?;
			let status = response.status();
			if self.retry_config.is_retryable_status(status) {
				let message = response.text().await.unwrap_or_default();
				return Err(HttpRemoteError::Server { status, message });
			}
			Ok::<_, HttpRemoteError>(response)
		})
		.await
	}

	async fn put_record(&self, record: &T) -> Result<(), HttpRemoteError> {
		let url = self.record_url(record.id())?;

		debug!(record_id = %record.id(), url = %url, "saving record to remote");

		let response = self.send(|| self.http.put(url.clone()).json(record)).await?;

		match response.status() {
			StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT => {
				info!(
					collection = %self.collection,
					record_id = %record.id(),
					"record saved to remote"
				);
				Ok(())
			}
			status => Err(status_error(status, response).await),
		}
	}

	async fn delete_record(&self, id: &str) -> Result<(), HttpRemoteError> {
		let url = self.record_url(id)?;

		debug!(record_id = %id, url = %url, "deleting record from remote");

		let response = self.send(|| self.http.delete(url.clone())).await?;

		match response.status() {
			StatusCode::OK | StatusCode::NO_CONTENT => {
				info!(collection = %self.collection, record_id = %id, "record deleted from remote");
				Ok(())
			}
			StatusCode::NOT_FOUND => {
				debug!(record_id = %id, "record already absent on remote");
				Ok(())
			}
			status => Err(status_error(status, response).await),
		}
	}

	async fn fetch_record(&self, id: &str) -> Result<Option<T>, HttpRemoteError> {
		let url = self.record_url(id)?;

		debug!(record_id = %id, url = %url, "fetching record from remote");

		let response = self.send(|| self.http.get(url.clone())).await?;

		match response.status() {
			StatusCode::OK => {
				let record: T = response
					.json()
					.await
					.map_err(|e| HttpRemoteError::Decode(e.to_string()))?;
				Ok(Some(record))
			}
			StatusCode::NOT_FOUND => {
				debug!(record_id = %id, "record not found on remote");
				Ok(None)
			}
			status => Err(status_error(status, response).await),
		}
	}

	async fn fetch_list(&self, key: Option<&str>) -> Result<Vec<T>, HttpRemoteError> {
		let mut url = self.collection_url()?;
		if let Some(key) = key {
			url.query_pairs_mut().append_pair("key", key);
		}

		debug!(url = %url, "listing records from remote");

		let response = self.send(|| self.http.get(url.clone())).await?;

		match response.status() {
			StatusCode::OK => {
				let records: Vec<T> = response
					.json()
					.await
					.map_err(|e| HttpRemoteError::Decode(e.to_string()))?;
				debug!(count = records.len(), "listed records from remote");
				Ok(records)
			}
			status => Err(status_error(status, response).await),
		}
	}
}

pub(crate) fn apply_auth(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
	if let Some(token) = token {
		req.header("Authorization", format!("Bearer {token}"))
	} else {
		req
	}
}

pub(crate) async fn status_error(status: StatusCode, response: Response) -> HttpRemoteError {
	if status.is_server_error() {
		let message = response.text().await.unwrap_or_default();
		HttpRemoteError::Server { status, message }
	} else {
		HttpRemoteError::UnexpectedStatus(status)
	}
}

#[async_trait]
impl<T: SyncRecord> RemoteStore<T> for HttpRemoteStore<T> {
	async fn save(&self, record: &T) -> Result<(), RemoteError> {
		Ok(self.put_record(record).await?)
	}

	async fn delete(&self, id: &str) -> Result<(), RemoteError> {
		Ok(self.delete_record(id).await?)
	}

	async fn get_by_id(&self, id: &str) -> Result<Option<T>, RemoteError> {
		Ok(self.fetch_record(id).await?)
	}

	async fn list_all(&self) -> Result<Vec<T>, RemoteError> {
		Ok(self.fetch_list(None).await?)
	}

	async fn list_by_key(&self, key: &str) -> Result<Vec<T>, RemoteError> {
		Ok(self.fetch_list(Some(key)).await?)
	}

	async fn subscribe(&self) -> Result<Option<Subscription<T>>, RemoteError> {
		let url = self.stream_url()?;
		// The feed is long-lived, so it must not inherit a request timeout.
		let http = journal_common_http::builder()
			.build()
			.map_err(HttpRemoteError::from)?;

		let (sender, subscription) = Subscription::channel(self.stream_config.buffer);
		let cancel = CancellationToken::new();

		let stream = ChangeStream {
			url,
			http,
			auth_token: self.auth_token.clone(),
			config: self.stream_config.clone(),
			sender,
			cancel: cancel.clone(),
		};
		tokio::spawn(stream.run());

		info!(collection = %self.collection, "subscribed to remote change stream");
		Ok(Some(subscription.on_unsubscribe(move || cancel.cancel())))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use journal_models::Trade;

	fn store(base: &str) -> HttpRemoteStore<Trade> {
		HttpRemoteStore::new(Url::parse(base).unwrap(), "trades", reqwest::Client::new())
	}

	#[test]
	fn test_urls_with_and_without_trailing_slash() {
		let store_a = store("http://localhost:8080/api/");
		let store_b = store("http://localhost:8080/api");

		assert_eq!(
			store_a.record_url("TR-1").unwrap().as_str(),
			"http://localhost:8080/api/trades/TR-1"
		);
		assert_eq!(
			store_b.collection_url().unwrap().as_str(),
			"http://localhost:8080/api/trades"
		);
		assert_eq!(
			store_b.stream_url().unwrap().as_str(),
			"http://localhost:8080/api/trades/stream"
		);
	}

	#[test]
	fn test_ids_are_percent_encoded() {
		let store = store("http://localhost:8080/");
		assert_eq!(
			store.record_url("a b?c").unwrap().as_str(),
			"http://localhost:8080/trades/a%20b%3Fc"
		);
	}

	#[test]
	fn test_cannot_be_base_url_is_rejected() {
		let store = store("mailto:journal@example.com");
		assert!(matches!(
			store.collection_url(),
			Err(HttpRemoteError::InvalidUrl(_))
		));
	}
}
