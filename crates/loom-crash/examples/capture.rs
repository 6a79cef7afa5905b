// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Example: Capture a crash event using the loom-crash SDK.
//!
//! Run with:
//!   LOOM_CRASH_API_KEY=<key> cargo run --example capture -p loom-crash
//!
//! `LOOM_CRASH_NOTIFY_ENDPOINT` and `LOOM_CRASH_SESSIONS_ENDPOINT` point it at
//! a local collector. Set `RUST_LOG=loom_crash=debug` for delivery details.

use std::fmt;

use loom_crash::{BreadcrumbType, CrashClientBuilder, CrashConfig, MetadataMap, Severity};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct PaymentError {
	order_id: u64,
}

impl fmt::Display for PaymentError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "payment for order {} was declined", self.order_id)
	}
}

impl std::error::Error for PaymentError {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("loom_crash=info")),
		)
		.init();

	let mut config = CrashConfig::default();
	config.apply_env_overrides()?;
	config.release_stage = "development".to_string();
	config.app_version = Some("0.1.0-example".to_string());

	println!("Initializing crash client...");
	println!("  Notify endpoint: {}", config.notify_endpoint);
	println!("  Sessions endpoint: {}", config.sessions_endpoint);

	let client = CrashClientBuilder::from_config(config).build()?;
	client.install_panic_hook();

	client.set_user(
		Some("user_example_123".to_string()),
		Some("example@example.com".to_string()),
		Some("Example User".to_string()),
	);
	client.set_context(Some("checkout".to_string()));
	client.add_metadata("account", "plan", json!("pro"));
	client.add_feature_flag("new-checkout", Some("treatment"));

	client.leave_breadcrumb("Application started");
	let mut request = MetadataMap::new();
	request.insert("method".to_string(), json!("POST"));
	request.insert("path".to_string(), json!("/api/orders/42/pay"));
	client.leave_breadcrumb_with("Payment request", BreadcrumbType::Request, request);

	client.add_on_error(|event| {
		event.add_metadata("example", "handled_by", json!("capture example"));
		true
	});

	println!("\nReporting a handled error...");
	let kept = client.notify_with(&PaymentError { order_id: 42 }, |event| {
		event.set_severity(Some(Severity::Error));
		true
	});
	println!("  Kept for delivery: {kept}");

	println!("\nReporting a log message...");
	client.notify_log("warn", "inventory cache is stale");

	client.mark_launch_completed();

	let summary = client.flush().await;
	println!(
		"\nFlushed: {} delivered, {} retained, {} dropped",
		summary.delivered, summary.retained, summary.dropped
	);

	client.shutdown().await?;
	println!("Client shutdown complete");

	Ok(())
}
