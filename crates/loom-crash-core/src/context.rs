// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Context snapshots attached to events and sessions (user, app, device).
//!
//! These are plain values. They are populated by the host integration and
//! copied into each event when it is captured.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The user an event or session is attributed to. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

impl User {
	pub fn new(id: Option<String>, email: Option<String>, name: Option<String>) -> Self {
		Self { id, email, name }
	}

	pub fn is_empty(&self) -> bool {
		self.id.is_none() && self.email.is_none() && self.name.is_none()
	}
}

/// App state at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppWithState {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub release_stage: Option<String>,
	#[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
	pub app_type: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub version_code: Option<u64>,
	#[serde(default, rename = "buildUUID", skip_serializing_if = "Option::is_none")]
	pub build_uuid: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code_bundle_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub binary_arch: Option<String>,
	/// Milliseconds since the client started.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub duration_in_foreground: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub in_foreground: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub is_launching: Option<bool>,
}

/// Device state at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceWithState {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub manufacturer: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub model: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub os_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub os_version: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub locale: Option<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub cpu_abi: Vec<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub runtime_versions: BTreeMap<String, String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub jailbroken: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_memory: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub free_memory: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub free_disk: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub orientation: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub time: Option<DateTime<Utc>>,
}
