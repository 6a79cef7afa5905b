// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wire JSON for events.
//!
//! The same JSON is sent to the collector and written to disk, so anything
//! serialized here must read back through [`EventData::from_json_slice`].
//!
//! Omission rules:
//! - `threads` is absent when threads are not sent for the event.
//! - `errorReportingThread` is only written when true.
//! - `session` is absent when no session is attached.
//! - `severityReason.attributes` is absent when the reason has no attribute.
//! - every metadata tab that exists is written, even when empty.

use serde::de::DeserializeOwned;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::breadcrumb::Breadcrumb;
use crate::context::{AppWithState, DeviceWithState, User};
use crate::error::{CrashError, Result};
use crate::event::{Event, EventData, Exception, Thread};
use crate::feature_flag::FeatureFlags;
use crate::metadata::Metadata;
use crate::redaction::Redactor;
use crate::session::SessionRef;
use crate::severity::{Severity, SeverityReason, SeverityReasonType};

impl Serialize for Event {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let data = self.data();
		let redactor = self.redactor();
		let mut map = serializer.serialize_map(None)?;

		if let Some(api_key) = &data.api_key {
			map.serialize_entry("apiKey", api_key)?;
		}
		if let Some(context) = &data.context {
			map.serialize_entry("context", context)?;
		}
		map.serialize_entry("metaData", &data.metadata.redacted(redactor))?;
		map.serialize_entry("severity", &data.severity_reason.severity())?;
		map.serialize_entry("severityReason", &SeverityReasonWire(&data.severity_reason))?;
		map.serialize_entry("unhandled", &data.severity_reason.unhandled())?;
		map.serialize_entry("exceptions", &data.exceptions)?;
		if !data.project_packages.is_empty() {
			map.serialize_entry("projectPackages", &data.project_packages)?;
		}
		map.serialize_entry("user", &data.user)?;
		map.serialize_entry("app", &data.app)?;
		map.serialize_entry("device", &data.device)?;
		map.serialize_entry(
			"breadcrumbs",
			&RedactedBreadcrumbs {
				breadcrumbs: &data.breadcrumbs,
				redactor,
			},
		)?;
		if let Some(grouping_hash) = &data.grouping_hash {
			map.serialize_entry("groupingHash", grouping_hash)?;
		}
		if let Some(threads) = &data.threads {
			map.serialize_entry("threads", threads)?;
		}
		map.serialize_entry("featureFlags", &data.feature_flags)?;
		if let Some(session) = &data.session {
			map.serialize_entry("session", session)?;
		}
		map.end()
	}
}

struct SeverityReasonWire<'a>(&'a SeverityReason);

impl Serialize for SeverityReasonWire<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let reason = self.0;
		let mut map = serializer.serialize_map(None)?;
		map.serialize_entry("type", &reason.reason_type())?;
		if let (Some(key), Some(value)) = (reason.attribute_key(), reason.attribute_value()) {
			let mut attributes = BTreeMap::new();
			attributes.insert(key, value);
			map.serialize_entry("attributes", &attributes)?;
		}
		if reason.unhandled_overridden() {
			map.serialize_entry("unhandledOverridden", &true)?;
		}
		map.end()
	}
}

struct RedactedBreadcrumbs<'a> {
	breadcrumbs: &'a [Breadcrumb],
	redactor: &'a Redactor,
}

impl Serialize for RedactedBreadcrumbs<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut seq = serializer.serialize_seq(Some(self.breadcrumbs.len()))?;
		for crumb in self.breadcrumbs {
			seq.serialize_element(&crumb.redacted(self.redactor))?;
		}
		seq.end()
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeverityReasonRecord {
	#[serde(rename = "type")]
	reason_type: SeverityReasonType,
	#[serde(default)]
	attributes: BTreeMap<String, String>,
	#[serde(default)]
	unhandled_overridden: bool,
}

/// The stored form of an event, as read back from disk.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventRecord {
	api_key: Option<String>,
	context: Option<String>,
	#[serde(default, rename = "metaData")]
	metadata: Metadata,
	severity: Option<Severity>,
	severity_reason: Option<SeverityReasonRecord>,
	unhandled: Option<bool>,
	#[serde(default)]
	exceptions: Vec<Exception>,
	#[serde(default)]
	project_packages: Vec<String>,
	#[serde(default)]
	user: User,
	#[serde(default)]
	app: AppWithState,
	#[serde(default)]
	device: DeviceWithState,
	#[serde(default)]
	breadcrumbs: Vec<Breadcrumb>,
	grouping_hash: Option<String>,
	threads: Option<Vec<Thread>>,
	#[serde(default)]
	feature_flags: FeatureFlags,
	session: Option<SessionRef>,
}

impl TryFrom<EventRecord> for EventData {
	type Error = CrashError;

	fn try_from(record: EventRecord) -> Result<Self> {
		let reason = match record.severity_reason {
			Some(reason) if !record.exceptions.is_empty() => reason,
			_ => return Err(CrashError::EmptyPayload),
		};
		let unhandled = record
			.unhandled
			.unwrap_or_else(|| reason.reason_type.is_unhandled());
		let severity = record
			.severity
			.unwrap_or_else(|| reason.reason_type.default_severity());
		let attribute_value = reason
			.reason_type
			.attribute_key()
			.and_then(|key| reason.attributes.get(key).cloned());

		Ok(Self {
			api_key: record.api_key,
			exceptions: record.exceptions,
			threads: record.threads,
			breadcrumbs: record.breadcrumbs,
			metadata: record.metadata,
			feature_flags: record.feature_flags,
			user: record.user,
			app: record.app,
			device: record.device,
			session: record.session,
			severity_reason: SeverityReason::restore(
				reason.reason_type,
				attribute_value,
				severity,
				unhandled,
				reason.unhandled_overridden,
			),
			grouping_hash: record.grouping_hash,
			context: record.context,
			project_packages: record.project_packages,
		})
	}
}

impl EventData {
	/// Parses a stored event. Truncated JSON and objects without an error
	/// chain or severity reason are both rejected.
	pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
		if bytes.iter().all(u8::is_ascii_whitespace) {
			return Err(CrashError::EmptyPayload);
		}
		let record: EventRecord = parse(bytes)?;
		Self::try_from(record)
	}
}

impl Event {
	pub fn from_json_slice(bytes: &[u8], redactor: Arc<Redactor>) -> Result<Self> {
		Ok(Self::from_data(EventData::from_json_slice(bytes)?, redactor))
	}

	pub fn to_json_vec(&self) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
	Ok(serde_json::from_slice(bytes)?)
}
