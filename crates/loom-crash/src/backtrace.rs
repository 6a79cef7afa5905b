// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Backtrace capture and parsing for Rust errors and panics.

use loom_crash_core::{Frame, Stacktrace};
use rustc_demangle::demangle;
use std::backtrace::Backtrace;

/// Frames from the capture machinery itself, dropped from the top of a trace.
const CAPTURE_PREFIXES: &[&str] = &[
	"std::backtrace",
	"<std::backtrace",
	"loom_crash::backtrace::",
	"loom_crash::event_builder::",
	"loom_crash::client::",
	"loom_crash::panic_hook::",
	"<alloc::boxed::Box<F,A> as core::ops::function::Fn",
	"std::panicking::",
	"core::panicking::",
	"rust_begin_unwind",
	"__rustc::rust_begin_unwind",
	"std::sys::backtrace::",
];

/// Parse a Rust backtrace into a Stacktrace.
///
/// Frames whose method starts with one of `project_packages` are marked
/// in-project. With no packages configured, anything outside the standard
/// library and common runtime crates is.
pub fn parse_backtrace(backtrace: &Backtrace, project_packages: &[String]) -> Stacktrace {
	let bt_string = format!("{:#}", backtrace);
	let mut frames = parse_backtrace_string(&bt_string);

	let skip = frames
		.iter()
		.take_while(|frame| {
			frame
				.method
				.as_deref()
				.is_some_and(|m| CAPTURE_PREFIXES.iter().any(|p| m.starts_with(p)))
		})
		.count();
	frames.drain(..skip);

	let mut stacktrace = Stacktrace::new(frames);
	mark_in_project(&mut stacktrace, project_packages);
	stacktrace
}

/// Capture a fresh backtrace and parse it.
pub fn capture_stacktrace(project_packages: &[String]) -> Stacktrace {
	let backtrace = Backtrace::force_capture();
	parse_backtrace(&backtrace, project_packages)
}

pub(crate) fn mark_in_project(stacktrace: &mut Stacktrace, project_packages: &[String]) {
	if !project_packages.is_empty() {
		stacktrace.mark_in_project(project_packages);
		return;
	}
	for frame in &mut stacktrace.frames {
		let in_app = frame.method.as_deref().is_some_and(is_in_app_frame);
		frame.in_project = in_app.then_some(true);
	}
}

/// Parse backtrace string output into frames.
///
/// The expected shape is the alternate `Display` of [`Backtrace`]:
///
/// ```text
///    3: my_app::main
///              at ./src/main.rs:10:5
/// ```
fn parse_backtrace_string(bt_string: &str) -> Vec<Frame> {
	let mut frames: Vec<Frame> = Vec::new();

	for line in bt_string.lines() {
		let line = line.trim();
		if line.is_empty() {
			continue;
		}

		// Location info for the previous frame
		if let Some(location) = line.strip_prefix("at ") {
			if let Some(frame) = frames.last_mut() {
				apply_location(frame, location);
			}
			continue;
		}

		if let Some(frame) = parse_frame_line(line) {
			frames.push(frame);
		}
	}

	frames
}

/// Parse a single backtrace line into a Frame.
fn parse_frame_line(line: &str) -> Option<Frame> {
	let line = line.trim();

	// Backtrace format is typically: "   N: function_name"
	// or "function_name"
	let function_part = match line.split_once(':') {
		Some((prefix, rest)) if prefix.trim().parse::<u32>().is_ok() => rest.trim(),
		_ => line,
	};

	if function_part.is_empty() {
		return None;
	}

	// Alternate formatting drops the trailing hash
	let demangled = format!("{:#}", demangle(function_part));
	Some(Frame::new(demangled))
}

/// Fill file, line and column from `path:line:col`. Missing numbers are left
/// unset.
fn apply_location(frame: &mut Frame, location: &str) {
	let location = location.trim();
	let mut parts = location.rsplitn(3, ':');
	let last = parts.next();
	let middle = parts.next();
	let rest = parts.next();

	match (rest, middle, last) {
		(Some(file), Some(line), Some(col)) if line.parse::<u32>().is_ok() => {
			frame.file = Some(file.to_string());
			frame.line_number = line.parse().ok();
			frame.column_number = col.parse().ok();
		}
		(_, Some(file), Some(line)) if line.parse::<u32>().is_ok() => {
			let file = match rest {
				Some(head) => format!("{head}:{file}"),
				None => file.to_string(),
			};
			frame.file = Some(file);
			frame.line_number = line.parse().ok();
		}
		_ => frame.file = Some(location.to_string()),
	}
}

/// Determine if a frame is from user application code vs standard library.
fn is_in_app_frame(function: &str) -> bool {
	// System/std library prefixes to exclude
	const SYSTEM_PREFIXES: &[&str] = &[
		"std::",
		"core::",
		"alloc::",
		"<std::",
		"<core::",
		"<alloc::",
		"tokio::",
		"<tokio::",
		"futures::",
		"<futures::",
		"async_trait::",
		"tracing::",
		"<tracing::",
		"backtrace::",
		"<backtrace::",
		"panic_unwind::",
		"<panic_unwind::",
		"loom_crash::",
		"<loom_crash::",
		"rust_begin_unwind",
		"rust_panic",
		"__rust_",
		"_rust_",
	];

	// Also exclude common runtime functions
	const SYSTEM_CONTAINS: &[&str] = &[
		"::panic::",
		"::panicking::",
		"::thread::",
		"::rt::",
		"::runtime::",
		"::sys_common::",
	];

	if SYSTEM_PREFIXES.iter().any(|p| function.starts_with(p)) {
		return false;
	}
	!SYSTEM_CONTAINS.iter().any(|c| function.contains(c))
}
