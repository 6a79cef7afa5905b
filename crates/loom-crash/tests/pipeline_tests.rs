// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end tests for capture, persistence and delivery against a mock
//! collector.
//!
//! Tests cover:
//! - Handled errors delivered with the expected headers and body
//! - Undelivered events kept on disk and replayed by the next client
//! - Rejected events dropped without retry
//! - On-send callbacks applied to replayed events
//! - Session delivery with app and device
//! - Concurrent capture and flush delivering each event exactly once

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loom_crash::{
	CrashClient, CrashClientBuilder, RetryConfig, Severity, HEADER_API_KEY, HEADER_PAYLOAD_VERSION,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const KEY: &str = "0123456789abcdef0123456789abcdef";

#[derive(Debug)]
struct CheckoutError;

impl fmt::Display for CheckoutError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "card declined")
	}
}

impl std::error::Error for CheckoutError {}

fn fast_retry() -> RetryConfig {
	RetryConfig {
		max_attempts: 2,
		base_delay: Duration::from_millis(1),
		max_delay: Duration::from_millis(5),
		backoff_factor: 2.0,
		jitter: false,
	}
}

fn builder(server: &MockServer, dir: &Path) -> CrashClientBuilder {
	CrashClient::builder()
		.api_key(KEY)
		.notify_endpoint(format!("{}/notify", server.uri()))
		.sessions_endpoint(format!("{}/sessions", server.uri()))
		.persistence_dir(dir)
		.auto_track_sessions(false)
		.retry_config(fast_retry())
}

async fn mount(server: &MockServer, route: &str, status: u16) {
	Mock::given(method("POST"))
		.and(path(route))
		.respond_with(ResponseTemplate::new(status))
		.mount(server)
		.await;
}

async fn requests_to(server: &MockServer, route: &str) -> Vec<Request> {
	server
		.received_requests()
		.await
		.unwrap_or_default()
		.into_iter()
		.filter(|r| r.url.path() == route)
		.collect()
}

fn body(request: &Request) -> Value {
	serde_json::from_slice(&request.body).unwrap()
}

fn stored_count(dir: &Path, kind: &str) -> usize {
	std::fs::read_dir(dir.join(kind))
		.map(|entries| {
			entries
				.filter_map(|e| e.ok())
				.filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
				.count()
		})
		.unwrap_or(0)
}

#[tokio::test]
async fn handled_error_is_delivered_and_removed() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/notify"))
		.and(header(HEADER_API_KEY, KEY))
		.and(header(HEADER_PAYLOAD_VERSION, "4.0"))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;
	let tmp = TempDir::new().unwrap();

	let client = builder(&server, tmp.path()).app_version("2.0.1").build().unwrap();
	client.set_user(Some("u-1".into()), Some("u@example.com".into()), None);
	client.add_metadata("account", "password", json!("hunter2"));
	client.leave_breadcrumb("opened checkout");
	assert!(client.notify(&CheckoutError));
	client.shutdown().await.unwrap();

	let requests = requests_to(&server, "/notify").await;
	assert_eq!(requests.len(), 1);
	let report = body(&requests[0]);
	assert_eq!(report["apiKey"], KEY);
	assert_eq!(report["notifier"]["name"], "Loom Crash Rust");

	let event = &report["events"][0];
	assert_eq!(event["exceptions"][0]["errorClass"], "CheckoutError");
	assert_eq!(event["exceptions"][0]["message"], "card declined");
	assert_eq!(event["severity"], "warning");
	assert_eq!(event["unhandled"], false);
	assert_eq!(event["severityReason"]["type"], "handledException");
	assert_eq!(event["user"]["id"], "u-1");
	assert_eq!(event["app"]["version"], "2.0.1");
	assert_eq!(event["metaData"]["account"]["password"], "[REDACTED]");
	assert_eq!(event["breadcrumbs"][0]["name"], "opened checkout");

	assert_eq!(stored_count(tmp.path(), "events"), 0);
}

#[tokio::test]
async fn undelivered_event_is_replayed_by_next_client() {
	let server = MockServer::start().await;
	mount(&server, "/notify", 503).await;
	let tmp = TempDir::new().unwrap();

	let first = builder(&server, tmp.path()).build().unwrap();
	first.notify(&CheckoutError);
	first.shutdown().await.unwrap();
	assert_eq!(requests_to(&server, "/notify").await.len(), 2);
	assert_eq!(stored_count(tmp.path(), "events"), 1);

	server.reset().await;
	mount(&server, "/notify", 200).await;

	let second = builder(&server, tmp.path()).build().unwrap();
	second.shutdown().await.unwrap();

	let requests = requests_to(&server, "/notify").await;
	assert_eq!(requests.len(), 1);
	assert_eq!(body(&requests[0])["events"][0]["exceptions"][0]["errorClass"], "CheckoutError");
	assert_eq!(stored_count(tmp.path(), "events"), 0);
}

#[tokio::test]
async fn rejected_event_is_dropped_without_retry() {
	let server = MockServer::start().await;
	mount(&server, "/notify", 400).await;
	let tmp = TempDir::new().unwrap();

	let client = builder(&server, tmp.path()).build().unwrap();
	client.notify(&CheckoutError);
	client.shutdown().await.unwrap();

	assert_eq!(requests_to(&server, "/notify").await.len(), 1);
	assert_eq!(stored_count(tmp.path(), "events"), 0);
}

#[tokio::test]
async fn flush_delivers_events_left_by_an_offline_run() {
	let server = MockServer::start().await;
	mount(&server, "/notify", 200).await;
	let tmp = TempDir::new().unwrap();

	// Built outside a runtime, so nothing is sent and both events stay stored
	let offline = {
		let server_uri = server.uri();
		let dir = tmp.path().to_path_buf();
		std::thread::spawn(move || {
			let client = CrashClient::builder()
				.api_key(KEY)
				.notify_endpoint(format!("{server_uri}/notify"))
				.persistence_dir(dir)
				.auto_track_sessions(false)
				.build()
				.unwrap();
			client.notify(&CheckoutError);
			client.notify_message("InventoryError", "stale cache");
			client
		})
		.join()
		.unwrap()
	};
	assert_eq!(stored_count(tmp.path(), "events"), 2);
	assert!(requests_to(&server, "/notify").await.is_empty());

	let summary = offline.flush().await;
	assert_eq!(summary.delivered, 2);
	assert_eq!(requests_to(&server, "/notify").await.len(), 2);
	assert_eq!(stored_count(tmp.path(), "events"), 0);
}

#[tokio::test]
async fn on_send_applies_to_replayed_events() {
	let server = MockServer::start().await;
	mount(&server, "/notify", 500).await;
	let tmp = TempDir::new().unwrap();

	let first = builder(&server, tmp.path()).build().unwrap();
	first.notify(&CheckoutError);
	first.notify_message("NoiseError", "ignore me");
	first.shutdown().await.unwrap();
	assert_eq!(stored_count(tmp.path(), "events"), 2);

	server.reset().await;
	mount(&server, "/notify", 200).await;

	let seen = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&seen);
	let second = builder(&server, tmp.path())
		.on_send(move |event| {
			counter.fetch_add(1, Ordering::SeqCst);
			if event.error_class() == "NoiseError" {
				return false;
			}
			event.set_severity(Some(Severity::Error));
			event.add_metadata("replay", "attempt", json!(2));
			true
		})
		.build()
		.unwrap();
	second.shutdown().await.unwrap();

	assert_eq!(seen.load(Ordering::SeqCst), 2);
	let requests = requests_to(&server, "/notify").await;
	assert_eq!(requests.len(), 1);
	let event = &body(&requests[0])["events"][0];
	assert_eq!(event["exceptions"][0]["errorClass"], "CheckoutError");
	assert_eq!(event["severity"], "error");
	assert_eq!(event["metaData"]["replay"]["attempt"], 2);
	assert_eq!(stored_count(tmp.path(), "events"), 0);
}

#[tokio::test]
async fn sessions_are_delivered_with_app_and_device() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/sessions"))
		.and(header(HEADER_PAYLOAD_VERSION, "1.0"))
		.respond_with(ResponseTemplate::new(202))
		.mount(&server)
		.await;
	let tmp = TempDir::new().unwrap();

	let client = builder(&server, tmp.path())
		.auto_track_sessions(true)
		.app_version("3.1.0")
		.build()
		.unwrap();
	let session_id = client.current_session().unwrap().id;
	client.shutdown().await.unwrap();

	let requests = requests_to(&server, "/sessions").await;
	assert_eq!(requests.len(), 1);
	let payload = body(&requests[0]);
	assert_eq!(payload["sessions"][0]["id"], session_id.to_string());
	assert!(payload["device"]["osName"].is_string());
	assert!(payload["notifier"].is_object());
	assert_eq!(stored_count(tmp.path(), "sessions"), 0);
}

#[tokio::test]
async fn vetoed_session_is_not_sent() {
	let server = MockServer::start().await;
	mount(&server, "/sessions", 202).await;
	let tmp = TempDir::new().unwrap();

	let client = builder(&server, tmp.path())
		.auto_track_sessions(true)
		.on_session(|_| false)
		.build()
		.unwrap();
	assert!(client.current_session().is_some());
	client.shutdown().await.unwrap();

	assert!(requests_to(&server, "/sessions").await.is_empty());
}

#[tokio::test]
async fn disabled_release_stage_sends_nothing() {
	let server = MockServer::start().await;
	mount(&server, "/notify", 200).await;
	mount(&server, "/sessions", 202).await;
	let tmp = TempDir::new().unwrap();

	let client = builder(&server, tmp.path())
		.release_stage("development")
		.enabled_release_stages(["production"])
		.auto_track_sessions(true)
		.build()
		.unwrap();
	assert!(!client.notify(&CheckoutError));
	client.shutdown().await.unwrap();

	assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_notify_and_flush_deliver_each_event_once() {
	const THREADS: usize = 4;
	const PER_THREAD: usize = 25;
	const TOTAL: usize = THREADS * PER_THREAD;

	let server = MockServer::start().await;
	mount(&server, "/notify", 200).await;
	let tmp = TempDir::new().unwrap();

	let client = builder(&server, tmp.path())
		.max_persisted_events(TOTAL)
		.build()
		.unwrap();

	let writers: Vec<_> = (0..THREADS)
		.map(|t| {
			let client = client.clone();
			std::thread::spawn(move || {
				for i in 0..PER_THREAD {
					assert!(client.notify_message("ConcurrentError", format!("{t}-{i}")));
				}
			})
		})
		.collect();

	// Flushes race the queued per-event jobs for the same files
	while !writers.iter().all(|w| w.is_finished()) {
		client.flush().await;
	}
	for writer in writers {
		writer.join().unwrap();
	}
	client.flush().await;
	client.shutdown().await.unwrap();

	let messages: Vec<String> = requests_to(&server, "/notify")
		.await
		.iter()
		.map(|r| {
			body(r)["events"][0]["exceptions"][0]["message"]
				.as_str()
				.unwrap()
				.to_string()
		})
		.collect();
	assert_eq!(messages.len(), TOTAL);
	let distinct: HashSet<&String> = messages.iter().collect();
	assert_eq!(distinct.len(), TOTAL);

	assert_eq!(stored_count(tmp.path(), "events"), 0);
	let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("events"))
		.unwrap()
		.filter_map(|e| e.ok())
		.filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
		.collect();
	assert!(leftovers.is_empty());
}
