// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Panic hook integration for automatic crash reporting.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe, PanicHookInfo};
use std::sync::Arc;

use tracing::{debug, error};

use crate::backtrace::parse_backtrace;
use crate::client::CrashClientInner;

thread_local! {
	static IN_HOOK: Cell<bool> = const { Cell::new(false) };
	static USER_CODE_DEPTH: Cell<u32> = const { Cell::new(0) };
}

/// Whether this thread is recording a panic from inside the hook.
///
/// A panic raised while the hook runs aborts the process, so callbacks and
/// observers are skipped on this path.
pub(crate) fn recording_panic() -> bool {
	IN_HOOK.with(Cell::get)
}

/// Runs user code and catches a panic from it.
///
/// The hook does not record panics raised here: they are already handled,
/// and recording them would run the same callbacks again mid-panic.
pub(crate) fn catch_user_panic<R>(f: impl FnOnce() -> R) -> std::thread::Result<R> {
	struct Depth;

	impl Drop for Depth {
		fn drop(&mut self) {
			USER_CODE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
		}
	}

	USER_CODE_DEPTH.with(|depth| depth.set(depth.get() + 1));
	let _depth = Depth;
	catch_unwind(AssertUnwindSafe(f))
}

fn in_user_code() -> bool {
	USER_CODE_DEPTH.with(Cell::get) > 0
}

/// Install a panic hook that records crashes for delivery.
///
/// This function wraps the existing panic hook and records panic information
/// before calling the original hook. The event is only written to disk: the
/// process may be about to abort, so delivery is left to the next flush.
pub fn install_panic_hook(client: Arc<CrashClientInner>) {
	let default_hook = std::panic::take_hook();

	std::panic::set_hook(Box::new(move |info| {
		// Capture backtrace immediately
		let backtrace = Backtrace::force_capture();

		if in_user_code() {
			debug!("panic in user callback, leaving it to the SDK to catch");
		} else if !IN_HOOK.with(|flag| flag.replace(true)) {
			// A panic while recording must not recurse into the hook
			report_panic(&client, info, &backtrace);
			IN_HOOK.with(|flag| flag.set(false));
		}

		default_hook(info);
	}));
}

fn report_panic(client: &CrashClientInner, info: &PanicHookInfo<'_>, backtrace: &Backtrace) {
	if client.is_closed() {
		return;
	}

	let message = payload_message(info.payload());
	let location = info
		.location()
		.map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
	let stacktrace = parse_backtrace(backtrace, &client.config().project_packages);

	if client.record_panic(message, location, stacktrace).is_none() {
		error!("failed to record panic");
	}
}

/// Extract the panic message from a panic payload.
fn payload_message(payload: &(dyn Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s.to_string()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"Box<dyn Any>".to_string()
	}
}
