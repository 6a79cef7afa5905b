// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The panic hook is process-global, so it gets a test binary of its own.

use loom_crash::CrashClient;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "0123456789abcdef0123456789abcdef";

#[tokio::test]
async fn panic_is_stored_then_delivered_on_flush() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/notify"))
		.respond_with(ResponseTemplate::new(200))
		.mount(&server)
		.await;
	let tmp = TempDir::new().unwrap();

	let client = CrashClient::builder()
		.api_key(KEY)
		.notify_endpoint(format!("{}/notify", server.uri()))
		.sessions_endpoint(format!("{}/sessions", server.uri()))
		.persistence_dir(tmp.path())
		.auto_track_sessions(false)
		.build()
		.unwrap();
	client.start_session();
	client.install_panic_hook();

	let result = std::thread::Builder::new()
		.name("worker-7".to_string())
		.spawn(|| panic!("index out of bounds"))
		.unwrap()
		.join();
	assert!(result.is_err());

	assert_eq!(client.current_session().unwrap().events.unhandled, 1);
	let stored = std::fs::read_dir(tmp.path().join("events")).unwrap().count();
	assert_eq!(stored, 1);

	let summary = client.flush().await;
	assert_eq!(summary.delivered, 1);

	let requests: Vec<_> = server
		.received_requests()
		.await
		.unwrap()
		.into_iter()
		.filter(|r| r.url.path() == "/notify")
		.collect();
	assert_eq!(requests.len(), 1);
	let report: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
	let event = &report["events"][0];
	assert_eq!(event["exceptions"][0]["errorClass"], "panic");
	assert_eq!(event["exceptions"][0]["message"], "index out of bounds");
	assert_eq!(event["unhandled"], true);
	assert_eq!(event["severity"], "error");
	assert_eq!(event["severityReason"]["type"], "unhandledException");
	assert_eq!(event["metaData"]["panic"]["thread"], "worker-7");
	assert!(event["metaData"]["panic"]["location"]
		.as_str()
		.unwrap()
		.contains("panic_hook_tests.rs"));

	client.shutdown().await.unwrap();
}
