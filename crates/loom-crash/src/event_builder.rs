// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns errors and panics into populated events.

use std::error::Error as StdError;

use chrono::Utc;
use loom_crash_core::{
	AppWithState, Breadcrumb, DeviceWithState, ErrorType, Event, EventData, Exception,
	FeatureFlags, Metadata, SeverityReason, Stacktrace, Thread, ThreadSendPolicy, User,
};
use tracing::debug;

use crate::backtrace::capture_stacktrace;
use crate::config::RuntimeConfig;

/// Client state copied into an event when it is built.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
	pub breadcrumbs: Vec<Breadcrumb>,
	pub metadata: Metadata,
	pub feature_flags: FeatureFlags,
	pub user: User,
	pub app: AppWithState,
	pub device: DeviceWithState,
	pub context: Option<String>,
}

/// Builds the error chain for `error`, outermost first.
///
/// The outermost entry is named `class` and carries `stacktrace`. Each
/// `source()` below it is named after the leading identifier of its `Debug`
/// output, since a trait object does not expose its concrete type name.
pub fn exceptions_from_error(
	error: &(dyn StdError + 'static),
	class: &str,
	stacktrace: Stacktrace,
) -> Vec<Exception> {
	let mut exceptions = vec![Exception::new(class, Some(error.to_string())).with_stacktrace(stacktrace)];

	let mut source = error.source();
	while let Some(cause) = source {
		exceptions.push(Exception::new(class_from_debug(cause), Some(cause.to_string())));
		source = cause.source();
	}

	exceptions
}

/// The short type name of `T`, without its module path or generics.
pub fn short_type_name<T: ?Sized>() -> String {
	let full = std::any::type_name::<T>();
	let base = full.split('<').next().unwrap_or(full);
	base.rsplit("::").next().unwrap_or(base).to_string()
}

fn class_from_debug(error: &dyn StdError) -> String {
	let debug = format!("{error:?}");
	let ident: String = debug
		.chars()
		.take_while(|c| c.is_alphanumeric() || *c == '_')
		.collect();
	if ident.is_empty() || ident.chars().next().is_some_and(|c| c.is_ascii_digit()) {
		"Error".to_string()
	} else {
		ident
	}
}

/// The threads to send with an event under `policy`.
///
/// Only the reporting thread's stack can be captured from safe Rust, so the
/// list holds that thread. Under `UnhandledOnly` a handled event keeps the
/// thread entry without its stack.
pub fn capture_threads(
	policy: ThreadSendPolicy,
	unhandled: bool,
	stacktrace: &Stacktrace,
) -> Option<Vec<Thread>> {
	let include_stack = match policy {
		ThreadSendPolicy::Never => return None,
		ThreadSendPolicy::UnhandledOnly => unhandled,
		ThreadSendPolicy::Always => true,
	};

	let current = std::thread::current();
	let id = format!("{:?}", current.id())
		.chars()
		.filter(char::is_ascii_digit)
		.collect::<String>();

	Some(vec![Thread {
		id,
		name: current.name().unwrap_or("unnamed").to_string(),
		thread_type: ErrorType::Rust,
		state: Some("RUNNABLE".to_string()),
		error_reporting_thread: true,
		stacktrace: if include_stack {
			stacktrace.clone()
		} else {
			Stacktrace::default()
		},
	}])
}

/// Assembles an event. Returns `None` when the outermost error class matches
/// a discard pattern.
pub fn build_event(
	config: &RuntimeConfig,
	exceptions: Vec<Exception>,
	reason: SeverityReason,
	context: EventContext,
	launching: bool,
) -> Option<Event> {
	let unhandled = reason.unhandled();
	let thread_stack = exceptions
		.first()
		.map(|e| e.stacktrace.clone())
		.unwrap_or_default();

	let mut data = EventData::new(exceptions, reason);
	data.threads = capture_threads(config.send_threads, unhandled, &thread_stack);
	data.breadcrumbs = context.breadcrumbs;
	data.metadata = context.metadata;
	data.feature_flags = context.feature_flags;
	data.user = context.user;
	data.context = context.context;
	data.project_packages = config.project_packages.clone();

	data.app = context.app;
	data.app.release_stage.get_or_insert_with(|| config.release_stage.clone());
	data.app.app_type.get_or_insert_with(|| config.app_type.clone());
	if data.app.version.is_none() {
		data.app.version = config.app_version.clone();
	}
	data.app.is_launching = Some(launching);

	data.device = context.device;
	data.device.time = Some(Utc::now());

	let event = Event::from_data(data, config.redactor.clone());
	if event.should_discard_class(&config.discard_classes) {
		debug!(error_class = event.error_class(), "discarding event by class");
		return None;
	}
	Some(event)
}

/// Captures a stacktrace for the caller using the configured packages.
pub fn stacktrace_here(config: &RuntimeConfig) -> Stacktrace {
	capture_stacktrace(&config.project_packages)
}
