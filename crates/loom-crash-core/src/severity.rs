// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Severity and the reason an event was captured.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CrashError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	Error,
	Warning,
	Info,
}

impl Severity {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Error => "error",
			Self::Warning => "warning",
			Self::Info => "info",
		}
	}

	/// Maps a log level name onto a severity. Unknown levels map to `Warning`.
	pub fn from_log_level(level: &str) -> Self {
		match level.to_ascii_lowercase().as_str() {
			"error" | "fatal" | "critical" => Self::Error,
			"info" | "debug" | "trace" | "verbose" => Self::Info,
			_ => Self::Warning,
		}
	}
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Severity {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"error" => Ok(Self::Error),
			"warning" => Ok(Self::Warning),
			"info" => Ok(Self::Info),
			_ => Err(CrashError::InvalidSeverity(s.to_string())),
		}
	}
}

/// Why an event was captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityReasonType {
	#[serde(rename = "unhandledException")]
	UnhandledException,
	#[serde(rename = "strictMode")]
	StrictMode,
	#[serde(rename = "handledException")]
	HandledException,
	#[serde(rename = "handledError")]
	HandledError,
	#[serde(rename = "userSpecifiedSeverity")]
	UserSpecifiedSeverity,
	#[serde(rename = "userCallbackSetSeverity")]
	UserCallbackSetSeverity,
	#[serde(rename = "unhandledPromiseRejection")]
	PromiseRejection,
	#[serde(rename = "signal")]
	Signal,
	#[serde(rename = "log")]
	Log,
	#[serde(rename = "anrError")]
	AnrError,
}

impl SeverityReasonType {
	pub const ALL: [SeverityReasonType; 10] = [
		Self::UnhandledException,
		Self::StrictMode,
		Self::HandledException,
		Self::HandledError,
		Self::UserSpecifiedSeverity,
		Self::UserCallbackSetSeverity,
		Self::PromiseRejection,
		Self::Signal,
		Self::Log,
		Self::AnrError,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::UnhandledException => "unhandledException",
			Self::StrictMode => "strictMode",
			Self::HandledException => "handledException",
			Self::HandledError => "handledError",
			Self::UserSpecifiedSeverity => "userSpecifiedSeverity",
			Self::UserCallbackSetSeverity => "userCallbackSetSeverity",
			Self::PromiseRejection => "unhandledPromiseRejection",
			Self::Signal => "signal",
			Self::Log => "log",
			Self::AnrError => "anrError",
		}
	}

	pub fn is_unhandled(&self) -> bool {
		matches!(
			self,
			Self::UnhandledException
				| Self::StrictMode
				| Self::PromiseRejection
				| Self::Signal
				| Self::AnrError
		)
	}

	pub fn default_severity(&self) -> Severity {
		match self {
			Self::UnhandledException | Self::PromiseRejection | Self::Signal | Self::AnrError => {
				Severity::Error
			}
			Self::StrictMode
			| Self::HandledException
			| Self::HandledError
			| Self::UserSpecifiedSeverity
			| Self::UserCallbackSetSeverity
			| Self::Log => Severity::Warning,
		}
	}

	/// The name of the single attribute this reason carries, if any.
	pub fn attribute_key(&self) -> Option<&'static str> {
		match self {
			Self::StrictMode => Some("violationType"),
			Self::Log => Some("level"),
			Self::Signal => Some("signalType"),
			_ => None,
		}
	}
}

impl fmt::Display for SeverityReasonType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SeverityReasonType {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|t| t.as_str() == s)
			.ok_or_else(|| CrashError::InvalidSeverityReason(s.to_string()))
	}
}

/// The reason an event was captured together with the severity and handled
/// state it implies.
///
/// `unhandled` starts out as the value the reason type dictates. It can be
/// overridden afterwards, in which case the override is reported alongside the
/// event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityReason {
	reason_type: SeverityReasonType,
	attribute_value: Option<String>,
	severity: Severity,
	unhandled: bool,
	original_unhandled: bool,
}

impl SeverityReason {
	pub fn new(reason_type: SeverityReasonType) -> Self {
		Self::with_severity(reason_type, reason_type.default_severity())
	}

	pub fn with_severity(reason_type: SeverityReasonType, severity: Severity) -> Self {
		let unhandled = reason_type.is_unhandled();
		Self {
			reason_type,
			attribute_value: None,
			severity,
			unhandled,
			original_unhandled: unhandled,
		}
	}

	/// A handled log event whose severity follows the log level.
	pub fn log(level: &str) -> Self {
		Self::with_severity(SeverityReasonType::Log, Severity::from_log_level(level))
			.attribute(level)
	}

	pub fn strict_mode(violation_type: &str) -> Self {
		Self::new(SeverityReasonType::StrictMode).attribute(violation_type)
	}

	pub fn signal(signal_type: &str) -> Self {
		Self::new(SeverityReasonType::Signal).attribute(signal_type)
	}

	/// Sets the attribute value. Ignored for reason types that carry none.
	pub fn attribute(mut self, value: impl Into<String>) -> Self {
		if self.reason_type.attribute_key().is_some() {
			self.attribute_value = Some(value.into());
		}
		self
	}

	/// Restores a reason read back from a stored payload.
	pub fn restore(
		reason_type: SeverityReasonType,
		attribute_value: Option<String>,
		severity: Severity,
		unhandled: bool,
		unhandled_overridden: bool,
	) -> Self {
		let original_unhandled = if unhandled_overridden {
			!unhandled
		} else {
			unhandled
		};
		Self {
			reason_type,
			attribute_value: reason_type.attribute_key().and(attribute_value),
			severity,
			unhandled,
			original_unhandled,
		}
	}

	pub fn reason_type(&self) -> SeverityReasonType {
		self.reason_type
	}

	pub fn attribute_key(&self) -> Option<&'static str> {
		self.reason_type.attribute_key()
	}

	pub fn attribute_value(&self) -> Option<&str> {
		self.attribute_value.as_deref()
	}

	pub fn severity(&self) -> Severity {
		self.severity
	}

	pub fn unhandled(&self) -> bool {
		self.unhandled
	}

	pub fn unhandled_overridden(&self) -> bool {
		self.unhandled != self.original_unhandled
	}

	pub(crate) fn set_severity(&mut self, severity: Severity) {
		self.severity = severity;
	}

	pub(crate) fn set_unhandled(&mut self, unhandled: bool) {
		self.unhandled = unhandled;
	}

	/// Records that a user callback picked the severity. The handled state and
	/// its override survive the change of reason.
	pub(crate) fn mark_callback_set_severity(&mut self) {
		self.reason_type = SeverityReasonType::UserCallbackSetSeverity;
		self.attribute_value = None;
	}
}
