// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delivery of event and session payloads to the collector.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use loom_common_http::{is_retryable_status, retry, RetryConfig};
use loom_crash_core::{Report, SessionPayload, EVENT_PAYLOAD_VERSION, SESSION_PAYLOAD_VERSION};
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::error::{DeliveryError, LegacyDeliveryError};

pub const HEADER_API_KEY: &str = "Bugsnag-Api-Key";
pub const HEADER_SENT_AT: &str = "Bugsnag-Sent-At";
pub const HEADER_PAYLOAD_VERSION: &str = "Bugsnag-Payload-Version";

/// Outcome of one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
	/// Accepted. The stored copy can be deleted.
	Delivered,
	/// Not sent for a transient reason. The stored copy is kept for retry.
	Undelivered,
	/// Rejected. The stored copy is deleted without retry.
	Failure,
}

impl DeliveryStatus {
	pub fn for_http_status(status: StatusCode) -> Self {
		if status.is_success() {
			DeliveryStatus::Delivered
		} else if is_retryable_status(status) {
			DeliveryStatus::Undelivered
		} else {
			DeliveryStatus::Failure
		}
	}

	fn for_error(error: &DeliveryError) -> Self {
		match error {
			DeliveryError::Network(_) => DeliveryStatus::Undelivered,
			DeliveryError::Status(status) => Self::for_http_status(*status),
			DeliveryError::Serialization(_) => DeliveryStatus::Failure,
		}
	}
}

/// Where a payload goes and the headers it is sent with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryParams {
	pub endpoint: String,
	pub headers: Vec<(String, String)>,
}

impl DeliveryParams {
	pub fn for_events(endpoint: &str, api_key: &str) -> Self {
		Self::new(endpoint, api_key, EVENT_PAYLOAD_VERSION)
	}

	pub fn for_sessions(endpoint: &str, api_key: &str) -> Self {
		Self::new(endpoint, api_key, SESSION_PAYLOAD_VERSION)
	}

	fn new(endpoint: &str, api_key: &str, payload_version: &str) -> Self {
		let sent_at = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
		Self {
			endpoint: endpoint.to_string(),
			headers: vec![
				(HEADER_API_KEY.to_string(), api_key.to_string()),
				(HEADER_SENT_AT.to_string(), sent_at),
				(HEADER_PAYLOAD_VERSION.to_string(), payload_version.to_string()),
				("Content-Type".to_string(), "application/json".to_string()),
			],
		}
	}

	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers
			.iter()
			.find(|(key, _)| key.eq_ignore_ascii_case(name))
			.map(|(_, value)| value.as_str())
	}
}

/// Sends payloads to the collector.
#[async_trait]
pub trait Delivery: Send + Sync {
	async fn deliver_report(&self, report: &Report, params: &DeliveryParams) -> DeliveryStatus;

	async fn deliver_sessions(
		&self,
		payload: &SessionPayload,
		params: &DeliveryParams,
	) -> DeliveryStatus;
}

/// Delivery over HTTP, retrying transient failures with backoff.
pub struct HttpDelivery {
	client: Client,
	retry_config: RetryConfig,
}

impl HttpDelivery {
	pub fn new(client: Client, retry_config: RetryConfig) -> Self {
		Self {
			client,
			retry_config,
		}
	}

	async fn post(&self, body: Vec<u8>, params: &DeliveryParams) -> DeliveryStatus {
		let result = retry(&self.retry_config, || async {
			let mut request = self.client.post(&params.endpoint).body(body.clone());
			for (name, value) in &params.headers {
				request = request.header(name.as_str(), value.as_str());
			}
			let response = request.send().await?;
			let status = response.status();
			if status.is_success() {
				Ok::<StatusCode, DeliveryError>(status)
			} else {
				Err(DeliveryError::Status(status))
			}
		})
		.await;

		match result {
			Ok(status) => {
				debug!(endpoint = %params.endpoint, status = status.as_u16(), "payload delivered");
				DeliveryStatus::Delivered
			}
			Err(e) => {
				let status = DeliveryStatus::for_error(&e);
				warn!(endpoint = %params.endpoint, error = %e, ?status, "payload not delivered");
				status
			}
		}
	}
}

#[async_trait]
impl Delivery for HttpDelivery {
	async fn deliver_report(&self, report: &Report, params: &DeliveryParams) -> DeliveryStatus {
		match report.to_json_vec() {
			Ok(body) => self.post(body, params).await,
			Err(e) => {
				warn!(error = %e, "failed to serialize report");
				DeliveryStatus::Failure
			}
		}
	}

	async fn deliver_sessions(
		&self,
		payload: &SessionPayload,
		params: &DeliveryParams,
	) -> DeliveryStatus {
		match payload.to_json_vec() {
			Ok(body) => {
				let status = self.post(body, params).await;
				if status == DeliveryStatus::Delivered {
					info!(sessions = payload.sessions.len(), "sessions delivered");
				}
				status
			}
			Err(e) => {
				warn!(error = %e, "failed to serialize session payload");
				DeliveryStatus::Failure
			}
		}
	}
}

/// A blocking, single-request delivery implementation that reports failure
/// through [`LegacyDeliveryError`].
pub trait LegacyDelivery: Send + Sync + 'static {
	fn deliver(
		&self,
		endpoint: &str,
		headers: &[(String, String)],
		body: &[u8],
	) -> Result<(), LegacyDeliveryError>;
}

/// Runs a [`LegacyDelivery`] on the blocking pool and maps its errors onto
/// [`DeliveryStatus`]: network errors are retried later, bad responses are
/// dropped.
pub struct LegacyDeliveryAdapter<D> {
	inner: Arc<D>,
}

impl<D: LegacyDelivery> LegacyDeliveryAdapter<D> {
	pub fn new(inner: D) -> Self {
		Self {
			inner: Arc::new(inner),
		}
	}

	async fn send(&self, body: Vec<u8>, params: &DeliveryParams) -> DeliveryStatus {
		let inner = Arc::clone(&self.inner);
		let params = params.clone();
		let result = tokio::task::spawn_blocking(move || {
			inner.deliver(&params.endpoint, &params.headers, &body)
		})
		.await;

		match result {
			Ok(Ok(())) => DeliveryStatus::Delivered,
			Ok(Err(LegacyDeliveryError::Network(message))) => {
				warn!(%message, "legacy delivery network error");
				DeliveryStatus::Undelivered
			}
			Ok(Err(LegacyDeliveryError::BadResponse(message))) => {
				warn!(%message, "legacy delivery rejected");
				DeliveryStatus::Failure
			}
			Err(e) => {
				warn!(error = %e, "legacy delivery task failed");
				DeliveryStatus::Undelivered
			}
		}
	}
}

#[async_trait]
impl<D: LegacyDelivery> Delivery for LegacyDeliveryAdapter<D> {
	async fn deliver_report(&self, report: &Report, params: &DeliveryParams) -> DeliveryStatus {
		match report.to_json_vec() {
			Ok(body) => self.send(body, params).await,
			Err(_) => DeliveryStatus::Failure,
		}
	}

	async fn deliver_sessions(
		&self,
		payload: &SessionPayload,
		params: &DeliveryParams,
	) -> DeliveryStatus {
		match payload.to_json_vec() {
			Ok(body) => self.send(body, params).await,
			Err(_) => DeliveryStatus::Failure,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_crash_core::{
		AppWithState, DeviceWithState, Event, EventData, Exception, Notifier, Redactor,
		SeverityReason, SeverityReasonType,
	};
	use std::time::Duration;
	use wiremock::matchers::{header, header_exists, method, path};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const KEY: &str = "0123456789abcdef0123456789abcdef";

	fn report() -> Report {
		let event = Event::from_data(
			EventData::new(
				vec![Exception::new("Boom", None)],
				SeverityReason::new(SeverityReasonType::HandledException),
			),
			Arc::new(Redactor::none()),
		);
		Report::for_event(KEY, Notifier::default(), event)
	}

	fn fast_retry() -> RetryConfig {
		RetryConfig {
			max_attempts: 3,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
			backoff_factor: 2.0,
			jitter: false,
		}
	}

	async fn deliver_with_status(code: u16) -> DeliveryStatus {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(code))
			.mount(&server)
			.await;
		let delivery = HttpDelivery::new(Client::new(), RetryConfig::no_retry());
		let params = DeliveryParams::for_events(&server.uri(), KEY);
		delivery.deliver_report(&report(), &params).await
	}

	#[test]
	fn status_table() {
		assert_eq!(DeliveryStatus::for_http_status(StatusCode::OK), DeliveryStatus::Delivered);
		assert_eq!(DeliveryStatus::for_http_status(StatusCode::ACCEPTED), DeliveryStatus::Delivered);
		assert_eq!(
			DeliveryStatus::for_http_status(StatusCode::SERVICE_UNAVAILABLE),
			DeliveryStatus::Undelivered
		);
		assert_eq!(
			DeliveryStatus::for_http_status(StatusCode::TOO_MANY_REQUESTS),
			DeliveryStatus::Undelivered
		);
		assert_eq!(
			DeliveryStatus::for_http_status(StatusCode::REQUEST_TIMEOUT),
			DeliveryStatus::Undelivered
		);
		assert_eq!(
			DeliveryStatus::for_http_status(StatusCode::BAD_REQUEST),
			DeliveryStatus::Failure
		);
		assert_eq!(
			DeliveryStatus::for_http_status(StatusCode::UNAUTHORIZED),
			DeliveryStatus::Failure
		);
	}

	#[test]
	fn params_carry_required_headers() {
		let params = DeliveryParams::for_sessions("https://sessions.example.com", KEY);
		assert_eq!(params.header("bugsnag-api-key"), Some(KEY));
		assert_eq!(params.header(HEADER_PAYLOAD_VERSION), Some(SESSION_PAYLOAD_VERSION));
		let sent_at = params.header(HEADER_SENT_AT).unwrap();
		assert!(chrono::DateTime::parse_from_rfc3339(sent_at).is_ok());
		assert!(sent_at.ends_with('Z'));
	}

	#[tokio::test]
	async fn delivered_on_success_with_headers() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(path("/"))
			.and(header(HEADER_API_KEY, KEY))
			.and(header(HEADER_PAYLOAD_VERSION, EVENT_PAYLOAD_VERSION))
			.and(header_exists(HEADER_SENT_AT))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let delivery = HttpDelivery::new(Client::new(), RetryConfig::no_retry());
		let params = DeliveryParams::for_events(&format!("{}/", server.uri()), KEY);
		assert_eq!(
			delivery.deliver_report(&report(), &params).await,
			DeliveryStatus::Delivered
		);
	}

	#[tokio::test]
	async fn server_errors_are_undelivered() {
		assert_eq!(deliver_with_status(503).await, DeliveryStatus::Undelivered);
		assert_eq!(deliver_with_status(429).await, DeliveryStatus::Undelivered);
	}

	#[tokio::test]
	async fn client_errors_are_failures() {
		assert_eq!(deliver_with_status(400).await, DeliveryStatus::Failure);
		assert_eq!(deliver_with_status(422).await, DeliveryStatus::Failure);
	}

	#[tokio::test]
	async fn unreachable_collector_is_undelivered() {
		let delivery = HttpDelivery::new(Client::new(), RetryConfig::no_retry());
		let params = DeliveryParams::for_events("http://127.0.0.1:1", KEY);
		assert_eq!(
			delivery.deliver_report(&report(), &params).await,
			DeliveryStatus::Undelivered
		);
	}

	#[tokio::test]
	async fn transient_failures_are_retried() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(503))
			.up_to_n_times(1)
			.expect(1)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.respond_with(ResponseTemplate::new(200))
			.expect(1)
			.mount(&server)
			.await;

		let delivery = HttpDelivery::new(Client::new(), fast_retry());
		let params = DeliveryParams::for_events(&server.uri(), KEY);
		assert_eq!(
			delivery.deliver_report(&report(), &params).await,
			DeliveryStatus::Delivered
		);
	}

	#[tokio::test]
	async fn sessions_are_posted() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(header(HEADER_PAYLOAD_VERSION, SESSION_PAYLOAD_VERSION))
			.respond_with(ResponseTemplate::new(202))
			.expect(1)
			.mount(&server)
			.await;

		let payload = SessionPayload {
			notifier: Notifier::default(),
			app: AppWithState::default(),
			device: DeviceWithState::default(),
			sessions: Vec::new(),
		};
		let delivery = HttpDelivery::new(Client::new(), RetryConfig::no_retry());
		let params = DeliveryParams::for_sessions(&server.uri(), KEY);
		assert_eq!(
			delivery.deliver_sessions(&payload, &params).await,
			DeliveryStatus::Delivered
		);
	}

	struct Scripted(Option<fn() -> LegacyDeliveryError>);

	impl LegacyDelivery for Scripted {
		fn deliver(
			&self,
			_endpoint: &str,
			headers: &[(String, String)],
			_body: &[u8],
		) -> Result<(), LegacyDeliveryError> {
			assert!(headers.iter().any(|(k, _)| k == HEADER_API_KEY));
			match self.0 {
				Some(make) => Err(make()),
				None => Ok(()),
			}
		}
	}

	#[tokio::test]
	async fn legacy_errors_map_to_status() {
		let params = DeliveryParams::for_events("https://notify.example.com", KEY);

		let ok = LegacyDeliveryAdapter::new(Scripted(None));
		assert_eq!(ok.deliver_report(&report(), &params).await, DeliveryStatus::Delivered);

		let network = LegacyDeliveryAdapter::new(Scripted(Some(|| {
			LegacyDeliveryError::Network("offline".to_string())
		})));
		assert_eq!(
			network.deliver_report(&report(), &params).await,
			DeliveryStatus::Undelivered
		);

		let rejected = LegacyDeliveryAdapter::new(Scripted(Some(|| {
			LegacyDeliveryError::BadResponse("400".to_string())
		})));
		assert_eq!(
			rejected.deliver_report(&report(), &params).await,
			DeliveryStatus::Failure
		);
	}
}
