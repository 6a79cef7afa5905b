// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The event aggregate and its parts.
//!
//! [`EventData`] is the plain state of one captured incident. [`Event`] wraps
//! it with validated accessors: invalid input is logged and ignored rather
//! than returned as an error, so user callbacks can never break capture.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::breadcrumb::Breadcrumb;
use crate::context::{AppWithState, DeviceWithState, User};
use crate::error::CrashError;
use crate::feature_flag::FeatureFlags;
use crate::metadata::{Metadata, MetadataMap};
use crate::redaction::{PatternSet, Redactor};
use crate::session::SessionRef;
use crate::severity::{Severity, SeverityReason};

/// The most frames a single stacktrace keeps.
pub const MAX_STACKTRACE_FRAMES: usize = 200;

/// The runtime a stacktrace came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
	#[default]
	Rust,
	/// Native frames, as written by a native crash handler.
	C,
	#[serde(rename = "reactnativejs")]
	ReactNativeJs,
}

impl fmt::Display for ErrorType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Rust => write!(f, "rust"),
			Self::C => write!(f, "c"),
			Self::ReactNativeJs => write!(f, "reactnativejs"),
		}
	}
}

impl FromStr for ErrorType {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"rust" => Ok(Self::Rust),
			"c" => Ok(Self::C),
			"reactnativejs" => Ok(Self::ReactNativeJs),
			_ => Err(CrashError::InvalidErrorType(s.to_string())),
		}
	}
}

/// Which threads are captured alongside an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSendPolicy {
	#[default]
	Always,
	UnhandledOnly,
	Never,
}

impl fmt::Display for ThreadSendPolicy {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Always => write!(f, "always"),
			Self::UnhandledOnly => write!(f, "unhandled_only"),
			Self::Never => write!(f, "never"),
		}
	}
}

impl FromStr for ThreadSendPolicy {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"always" => Ok(Self::Always),
			"unhandled_only" | "unhandledonly" => Ok(Self::UnhandledOnly),
			"never" => Ok(Self::Never),
			_ => Err(CrashError::InvalidThreadSendPolicy(s.to_string())),
		}
	}
}

/// A single stack frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub method: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub line_number: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column_number: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub in_project: Option<bool>,
	/// Instruction address for native frames, hex encoded.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub frame_address: Option<String>,
}

impl Frame {
	pub fn new(method: impl Into<String>) -> Self {
		Self {
			method: Some(method.into()),
			..Default::default()
		}
	}

	pub fn is_in_project(&self) -> bool {
		self.in_project.unwrap_or(false)
	}
}

/// An ordered list of frames, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stacktrace {
	pub frames: Vec<Frame>,
}

impl Stacktrace {
	/// Builds a stacktrace, trimming it to [`MAX_STACKTRACE_FRAMES`].
	pub fn new(frames: Vec<Frame>) -> Self {
		let mut stacktrace = Self { frames };
		stacktrace.trim(MAX_STACKTRACE_FRAMES);
		stacktrace
	}

	/// Drops frames from the middle until at most `max_frames` remain. The
	/// innermost and outermost frames are both kept.
	pub fn trim(&mut self, max_frames: usize) {
		let len = self.frames.len();
		if len <= max_frames {
			return;
		}
		let head = max_frames.div_ceil(2);
		let tail = max_frames - head;
		self.frames.drain(head..len - tail);
	}

	/// Sets `in_project` on every frame whose method starts with one of the
	/// given module prefixes.
	pub fn mark_in_project(&mut self, project_packages: &[String]) {
		for frame in &mut self.frames {
			let in_project = frame.method.as_deref().is_some_and(|method| {
				project_packages
					.iter()
					.any(|prefix| !prefix.is_empty() && method.starts_with(prefix.as_str()))
			});
			frame.in_project = in_project.then_some(true);
		}
	}

	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}

	pub fn len(&self) -> usize {
		self.frames.len()
	}
}

/// One entry of an event's error chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Exception {
	pub error_class: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default)]
	pub stacktrace: Stacktrace,
	#[serde(rename = "type", default)]
	pub error_type: ErrorType,
}

impl Exception {
	pub fn new(error_class: impl Into<String>, message: Option<String>) -> Self {
		Self {
			error_class: error_class.into(),
			message,
			stacktrace: Stacktrace::default(),
			error_type: ErrorType::Rust,
		}
	}

	pub fn with_stacktrace(mut self, stacktrace: Stacktrace) -> Self {
		self.stacktrace = stacktrace;
		self
	}
}

/// A thread captured alongside an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
	pub id: String,
	pub name: String,
	#[serde(rename = "type", default)]
	pub thread_type: ErrorType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub state: Option<String>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub error_reporting_thread: bool,
	#[serde(default)]
	pub stacktrace: Stacktrace,
}

/// The plain state of one captured incident.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData {
	pub api_key: Option<String>,
	pub exceptions: Vec<Exception>,
	/// `None` when threads are not sent for this event.
	pub threads: Option<Vec<Thread>>,
	pub breadcrumbs: Vec<Breadcrumb>,
	pub metadata: Metadata,
	pub feature_flags: FeatureFlags,
	pub user: User,
	pub app: AppWithState,
	pub device: DeviceWithState,
	pub session: Option<SessionRef>,
	pub severity_reason: SeverityReason,
	pub grouping_hash: Option<String>,
	pub context: Option<String>,
	pub project_packages: Vec<String>,
}

impl EventData {
	pub fn new(exceptions: Vec<Exception>, severity_reason: SeverityReason) -> Self {
		Self {
			api_key: None,
			exceptions,
			threads: None,
			breadcrumbs: Vec::new(),
			metadata: Metadata::new(),
			feature_flags: FeatureFlags::new(),
			user: User::default(),
			app: AppWithState::default(),
			device: DeviceWithState::default(),
			session: None,
			severity_reason,
			grouping_hash: None,
			context: None,
			project_packages: Vec::new(),
		}
	}
}

/// A captured incident, as seen by callbacks and the delivery pipeline.
///
/// The redactor travels with the event so that serialization masks the same
/// keys wherever the event is written. It is not part of the stored form.
#[derive(Debug, Clone)]
pub struct Event {
	data: EventData,
	redactor: Arc<Redactor>,
}

impl Event {
	/// Wraps event state. An empty error chain gets one placeholder entry so
	/// every event has at least one exception.
	pub fn from_data(mut data: EventData, redactor: Arc<Redactor>) -> Self {
		if data.exceptions.is_empty() {
			warn!("event created without exceptions, adding placeholder");
			data.exceptions.push(Exception::new("Error", None));
		}
		Self { data, redactor }
	}

	pub fn data(&self) -> &EventData {
		&self.data
	}

	pub fn into_data(self) -> EventData {
		self.data
	}

	pub fn redactor(&self) -> &Redactor {
		&self.redactor
	}

	pub fn set_redactor(&mut self, redactor: Arc<Redactor>) {
		self.redactor = redactor;
	}

	pub fn api_key(&self) -> Option<&str> {
		self.data.api_key.as_deref()
	}

	pub fn set_api_key(&mut self, api_key: &str) {
		if api_key.trim().is_empty() {
			warn!("ignoring empty api key on event");
			return;
		}
		self.data.api_key = Some(api_key.to_string());
	}

	pub fn exceptions(&self) -> &[Exception] {
		&self.data.exceptions
	}

	pub fn exceptions_mut(&mut self) -> &mut Vec<Exception> {
		&mut self.data.exceptions
	}

	/// The class of the outermost exception.
	pub fn error_class(&self) -> &str {
		self.data
			.exceptions
			.first()
			.map(|e| e.error_class.as_str())
			.unwrap_or("")
	}

	pub fn error_message(&self) -> Option<&str> {
		self.data.exceptions.first().and_then(|e| e.message.as_deref())
	}

	pub fn threads(&self) -> Option<&[Thread]> {
		self.data.threads.as_deref()
	}

	pub fn threads_mut(&mut self) -> Option<&mut Vec<Thread>> {
		self.data.threads.as_mut()
	}

	pub fn breadcrumbs(&self) -> &[Breadcrumb] {
		&self.data.breadcrumbs
	}

	pub fn breadcrumbs_mut(&mut self) -> &mut Vec<Breadcrumb> {
		&mut self.data.breadcrumbs
	}

	pub fn severity(&self) -> Severity {
		self.data.severity_reason.severity()
	}

	/// Sets the severity. `None` is not a valid severity and falls back to
	/// [`Severity::Warning`].
	pub fn set_severity(&mut self, severity: Option<Severity>) {
		let severity = severity.unwrap_or_else(|| {
			warn!("invalid null severity, using warning");
			Severity::Warning
		});
		self.data.severity_reason.set_severity(severity);
	}

	pub fn severity_reason(&self) -> &SeverityReason {
		&self.data.severity_reason
	}

	pub fn is_unhandled(&self) -> bool {
		self.data.severity_reason.unhandled()
	}

	pub fn set_unhandled(&mut self, unhandled: bool) {
		self.data.severity_reason.set_unhandled(unhandled);
	}

	/// Switches the reason to `userCallbackSetSeverity`, keeping the handled
	/// state as it is.
	pub fn mark_severity_set_by_callback(&mut self) {
		self.data.severity_reason.mark_callback_set_severity();
	}

	pub fn metadata(&self) -> &Metadata {
		&self.data.metadata
	}

	pub fn add_metadata(&mut self, tab: &str, key: &str, value: Value) {
		self.data.metadata.add_value(tab, key, value);
	}

	pub fn add_metadata_map(&mut self, tab: &str, values: MetadataMap) {
		self.data.metadata.add_map(tab, values);
	}

	pub fn get_metadata(&self, tab: &str, key: &str) -> Option<&Value> {
		self.data.metadata.get_value(tab, key)
	}

	pub fn get_metadata_tab(&self, tab: &str) -> Option<&MetadataMap> {
		self.data.metadata.get_tab(tab)
	}

	pub fn clear_metadata(&mut self, tab: &str, key: Option<&str>) {
		match key {
			Some(key) => self.data.metadata.clear_value(tab, key),
			None => self.data.metadata.clear_tab(tab),
		}
	}

	pub(crate) fn metadata_mut(&mut self) -> &mut Metadata {
		&mut self.data.metadata
	}

	pub fn feature_flags(&self) -> &FeatureFlags {
		&self.data.feature_flags
	}

	pub fn add_feature_flag(&mut self, name: &str, variant: Option<String>) {
		if name.is_empty() {
			warn!("ignoring feature flag with empty name");
			return;
		}
		self.data.feature_flags.add(name, variant);
	}

	pub fn clear_feature_flag(&mut self, name: &str) {
		self.data.feature_flags.clear(name);
	}

	pub fn clear_feature_flags(&mut self) {
		self.data.feature_flags.clear_all();
	}

	pub fn user(&self) -> &User {
		&self.data.user
	}

	pub fn set_user(&mut self, id: Option<String>, email: Option<String>, name: Option<String>) {
		self.data.user = User::new(id, email, name);
	}

	pub fn app(&self) -> &AppWithState {
		&self.data.app
	}

	pub fn app_mut(&mut self) -> &mut AppWithState {
		&mut self.data.app
	}

	pub fn device(&self) -> &DeviceWithState {
		&self.data.device
	}

	pub fn device_mut(&mut self) -> &mut DeviceWithState {
		&mut self.data.device
	}

	pub fn session(&self) -> Option<&SessionRef> {
		self.data.session.as_ref()
	}

	/// Attaches the session this event counts against.
	pub fn set_session(&mut self, session: Option<SessionRef>) {
		self.data.session = session;
	}

	pub fn grouping_hash(&self) -> Option<&str> {
		self.data.grouping_hash.as_deref()
	}

	pub fn set_grouping_hash(&mut self, hash: Option<String>) {
		self.data.grouping_hash = hash;
	}

	pub fn context(&self) -> Option<&str> {
		self.data.context.as_deref()
	}

	pub fn set_context(&mut self, context: Option<String>) {
		self.data.context = context;
	}

	/// True when the outermost exception's class matches one of `patterns`.
	pub fn should_discard_class(&self, patterns: &PatternSet) -> bool {
		!patterns.is_empty() && patterns.matches(self.error_class())
	}

	/// Truncates long metadata strings and breadcrumb metadata strings.
	pub fn trim_metadata_strings(&mut self, max_len: usize) -> crate::metadata::TrimMetrics {
		let mut metrics = self.metadata_mut().trim_strings(max_len);
		for crumb in &mut self.data.breadcrumbs {
			if let Some(entries) = crumb.metadata.take() {
				let mut scratch = Metadata::new();
				scratch.add_map("crumb", entries);
				let crumb_metrics = scratch.trim_strings(max_len);
				metrics.items_trimmed += crumb_metrics.items_trimmed;
				metrics.chars_trimmed += crumb_metrics.chars_trimmed;
				crumb.metadata = scratch.get_tab("crumb").cloned();
			}
		}
		metrics
	}
}

impl PartialEq for Event {
	fn eq(&self, other: &Self) -> bool {
		self.data == other.data
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::severity::SeverityReasonType;
	use proptest::prelude::*;
	use serde_json::json;

	fn event() -> Event {
		Event::from_data(
			EventData::new(
				vec![Exception::new("IoError", Some("disk".to_string()))],
				SeverityReason::new(SeverityReasonType::HandledException),
			),
			Arc::new(Redactor::none()),
		)
	}

	fn frames(n: usize) -> Vec<Frame> {
		(0..n).map(|i| Frame::new(format!("f{i}"))).collect()
	}

	#[test]
	fn empty_chain_gets_placeholder() {
		let event = Event::from_data(
			EventData::new(
				Vec::new(),
				SeverityReason::new(SeverityReasonType::HandledError),
			),
			Arc::new(Redactor::none()),
		);
		assert_eq!(event.exceptions().len(), 1);
	}

	#[test]
	fn null_severity_falls_back_to_warning() {
		let mut event = event();
		event.set_severity(Some(Severity::Error));
		assert_eq!(event.severity(), Severity::Error);
		event.set_severity(None);
		assert_eq!(event.severity(), Severity::Warning);
	}

	#[test]
	fn unhandled_override() {
		let mut event = event();
		assert!(!event.is_unhandled());
		event.set_unhandled(true);
		assert!(event.is_unhandled());
		assert!(event.severity_reason().unhandled_overridden());
	}

	#[test]
	fn stacktrace_trim_keeps_both_ends() {
		let stacktrace = Stacktrace::new(frames(250));
		assert_eq!(stacktrace.len(), MAX_STACKTRACE_FRAMES);
		assert_eq!(stacktrace.frames[0].method.as_deref(), Some("f0"));
		assert_eq!(stacktrace.frames[99].method.as_deref(), Some("f99"));
		assert_eq!(stacktrace.frames[100].method.as_deref(), Some("f150"));
		assert_eq!(stacktrace.frames[199].method.as_deref(), Some("f249"));
	}

	#[test]
	fn mark_in_project_by_prefix() {
		let mut stacktrace = Stacktrace::new(vec![
			Frame::new("my_app::handlers::login"),
			Frame::new("tokio::runtime::park"),
		]);
		stacktrace.mark_in_project(&["my_app".to_string()]);
		assert_eq!(stacktrace.frames[0].in_project, Some(true));
		assert_eq!(stacktrace.frames[1].in_project, None);
	}

	#[test]
	fn discard_class_matches_outermost_only() {
		let mut event = event();
		event
			.exceptions_mut()
			.push(Exception::new("Timeout", None));
		let patterns = PatternSet::from_globs(["io*"]).unwrap();
		assert!(event.should_discard_class(&patterns));
		let patterns = PatternSet::from_globs(["Timeout"]).unwrap();
		assert!(!event.should_discard_class(&patterns));
		assert!(!event.should_discard_class(&PatternSet::new()));
	}

	#[test]
	fn trim_strings_reaches_breadcrumbs() {
		let mut event = event();
		event.add_metadata("t", "k", json!("0123456789"));
		let mut crumb_meta = MetadataMap::new();
		crumb_meta.insert("m".to_string(), json!("0123456789"));
		event
			.breadcrumbs_mut()
			.push(Breadcrumb::manual("c").with_metadata(crumb_meta));

		let metrics = event.trim_metadata_strings(5);
		assert_eq!(metrics.items_trimmed, 2);
		assert_eq!(metrics.chars_trimmed, 10);
		assert_eq!(
			event.breadcrumbs()[0].metadata.as_ref().unwrap()["m"],
			json!("01234***5 CHARS TRUNCATED***")
		);
	}

	#[test]
	fn empty_feature_flag_name_ignored() {
		let mut event = event();
		event.add_feature_flag("", None);
		assert!(event.feature_flags().is_empty());
	}

	proptest! {
		#[test]
		fn trim_never_exceeds_limit(len in 0usize..600, max in 1usize..300) {
			let mut stacktrace = Stacktrace { frames: frames(len) };
			stacktrace.trim(max);
			prop_assert_eq!(stacktrace.len(), len.min(max));
			if len > 0 {
				prop_assert_eq!(stacktrace.frames[0].method.as_deref(), Some("f0"));
			}
		}

		#[test]
		fn thread_send_policy_roundtrip(policy in prop_oneof![
			Just(ThreadSendPolicy::Always),
			Just(ThreadSendPolicy::UnhandledOnly),
			Just(ThreadSendPolicy::Never),
		]) {
			let parsed: ThreadSendPolicy = policy.to_string().parse().unwrap();
			prop_assert_eq!(policy, parsed);
		}
	}
}
