// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request bodies sent to the collector.

use serde::ser::SerializeSeq;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::context::{AppWithState, DeviceWithState, User};
use crate::error::Result;
use crate::event::Event;
use crate::session::{Session, SessionId};

/// Payload version sent with event reports.
pub const EVENT_PAYLOAD_VERSION: &str = "4.0";
/// Payload version sent with session reports.
pub const SESSION_PAYLOAD_VERSION: &str = "1.0";

/// Identifies the library that produced a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notifier {
	pub name: String,
	pub version: String,
	pub url: String,
	/// Libraries this notifier is layered on, for bridges that wrap it.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub dependencies: Vec<Notifier>,
}

impl Default for Notifier {
	fn default() -> Self {
		Self {
			name: "Loom Crash Rust".to_string(),
			version: env!("CARGO_PKG_VERSION").to_string(),
			url: "https://github.com/ghuntley/loom".to_string(),
			dependencies: Vec::new(),
		}
	}
}

/// One entry of a report: an event in memory or a stored event file.
#[derive(Debug, Clone)]
pub enum ReportEvent {
	Event(Box<Event>),
	File(PathBuf),
}

/// An event report: `{apiKey, payloadVersion, notifier, events}`.
///
/// Stored files are read when the report is serialized. A file that is
/// missing, unreadable or not JSON is left out of `events`.
#[derive(Debug, Clone)]
pub struct Report {
	pub api_key: String,
	pub notifier: Notifier,
	pub events: Vec<ReportEvent>,
}

impl Report {
	pub fn for_event(api_key: impl Into<String>, notifier: Notifier, event: Event) -> Self {
		Self {
			api_key: api_key.into(),
			notifier,
			events: vec![ReportEvent::Event(Box::new(event))],
		}
	}

	pub fn for_file(api_key: impl Into<String>, notifier: Notifier, path: PathBuf) -> Self {
		Self {
			api_key: api_key.into(),
			notifier,
			events: vec![ReportEvent::File(path)],
		}
	}

	pub fn to_json_vec(&self) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}
}

impl Serialize for Report {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		#[derive(Serialize)]
		#[serde(rename_all = "camelCase")]
		struct Wire<'a> {
			api_key: &'a str,
			payload_version: &'static str,
			notifier: &'a Notifier,
			events: ReportEvents<'a>,
		}

		Wire {
			api_key: &self.api_key,
			payload_version: EVENT_PAYLOAD_VERSION,
			notifier: &self.notifier,
			events: ReportEvents(&self.events),
		}
		.serialize(serializer)
	}
}

struct ReportEvents<'a>(&'a [ReportEvent]);

impl Serialize for ReportEvents<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut seq = serializer.serialize_seq(None)?;
		for entry in self.0 {
			match entry {
				ReportEvent::Event(event) => seq.serialize_element(event.as_ref())?,
				ReportEvent::File(path) => {
					if let Some(raw) = read_raw(path) {
						seq.serialize_element(&raw)?;
					}
				}
			}
		}
		seq.end()
	}
}

fn read_raw(path: &Path) -> Option<Box<RawValue>> {
	let contents = match std::fs::read_to_string(path) {
		Ok(contents) => contents,
		Err(e) => {
			debug!(path = %path.display(), error = %e, "skipping unreadable event file");
			return None;
		}
	};
	match RawValue::from_string(contents) {
		Ok(raw) => Some(raw),
		Err(e) => {
			debug!(path = %path.display(), error = %e, "skipping malformed event file");
			None
		}
	}
}

/// A session report: `{notifier, app, device, sessions}`.
#[derive(Debug, Clone)]
pub struct SessionPayload {
	pub notifier: Notifier,
	pub app: AppWithState,
	pub device: DeviceWithState,
	pub sessions: Vec<Session>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionWire<'a> {
	id: SessionId,
	started_at: chrono::DateTime<chrono::Utc>,
	#[serde(skip_serializing_if = "no_user")]
	user: &'a User,
}

fn no_user(user: &&User) -> bool {
	user.is_empty()
}

impl Serialize for SessionPayload {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		#[derive(Serialize)]
		struct Wire<'a> {
			notifier: &'a Notifier,
			app: &'a AppWithState,
			device: &'a DeviceWithState,
			sessions: Vec<SessionWire<'a>>,
		}

		Wire {
			notifier: &self.notifier,
			app: &self.app,
			device: &self.device,
			sessions: self
				.sessions
				.iter()
				.map(|s| SessionWire {
					id: s.id,
					started_at: s.started_at,
					user: &s.user,
				})
				.collect(),
		}
		.serialize(serializer)
	}
}

impl SessionPayload {
	pub fn to_json_vec(&self) -> Result<Vec<u8>> {
		Ok(serde_json::to_vec(self)?)
	}
}
