// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panicking user code with the panic hook installed.
//!
//! The hook is process-global, so these checks share one test in a binary of
//! their own.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use loom_crash::CrashClient;
use tempfile::TempDir;

const KEY: &str = "0123456789abcdef0123456789abcdef";

#[derive(Debug)]
struct LookupError;

impl fmt::Display for LookupError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "missing key")
	}
}

impl std::error::Error for LookupError {}

fn stored_events(dir: &Path) -> usize {
	std::fs::read_dir(dir.join("events"))
		.map(|entries| {
			entries
				.filter_map(|e| e.ok())
				.filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
				.count()
		})
		.unwrap_or(0)
}

#[test]
fn panicking_user_code_does_not_abort_or_hang() {
	let tmp = TempDir::new().unwrap();
	let client = CrashClient::builder()
		.api_key(KEY)
		.persistence_dir(tmp.path())
		.auto_track_sessions(false)
		.build()
		.unwrap();
	client.install_panic_hook();

	let on_error_calls = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&on_error_calls);
	client.add_on_error(move |_| {
		counter.fetch_add(1, Ordering::SeqCst);
		panic!("on_error bug")
	});
	client.add_on_breadcrumb(|_| panic!("on_breadcrumb bug"));
	client.add_observer(|_| panic!("observer bug"));

	// Callback panics are caught and the hook leaves them alone
	assert!(client.notify(&LookupError));
	assert_eq!(on_error_calls.load(Ordering::SeqCst), 1);
	client.leave_breadcrumb("still running");
	assert_eq!(
		client.breadcrumbs().last().map(|b| b.message.as_str()),
		Some("still running")
	);
	assert_eq!(stored_events(tmp.path()), 1);

	// A panic inside update_app must not leave the app snapshot locked
	let (tx, rx) = mpsc::channel();
	let updater = client.clone();
	std::thread::spawn(move || {
		let result = catch_unwind(AssertUnwindSafe(|| {
			updater.update_app(|_| panic!("bad app update"));
		}));
		let _ = tx.send(result.is_err());
	});
	assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(true));

	// That panic was the app's own, so it is recorded without running callbacks
	assert_eq!(stored_events(tmp.path()), 2);
	assert_eq!(on_error_calls.load(Ordering::SeqCst), 1);
}
