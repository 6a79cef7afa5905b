// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session snapshots.
//!
//! A [`Session`] is an immutable copy of one app-usage period. The live,
//! counting session is owned by the client's session tracker, which hands out
//! these snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::context::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for SessionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl FromStr for SessionId {
	type Err = uuid::Error;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Ok(Self(Uuid::parse_str(s)?))
	}
}

/// Handled and unhandled event counts for a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
	pub handled: u32,
	pub unhandled: u32,
}

/// A point-in-time copy of a session. This is also the stored form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub id: SessionId,
	pub started_at: DateTime<Utc>,
	#[serde(default)]
	pub user: User,
	#[serde(default)]
	pub events: SessionCounts,
	#[serde(default)]
	pub auto_captured: bool,
}

impl Session {
	pub fn new(started_at: DateTime<Utc>, user: User, auto_captured: bool) -> Self {
		Self {
			id: SessionId::new(),
			started_at,
			user,
			events: SessionCounts::default(),
			auto_captured,
		}
	}

	pub fn handled_count(&self) -> u32 {
		self.events.handled
	}

	pub fn unhandled_count(&self) -> u32 {
		self.events.unhandled
	}

	/// The reduced form attached to an event.
	pub fn event_ref(&self) -> SessionRef {
		SessionRef {
			id: self.id,
			started_at: self.started_at,
			events: self.events,
		}
	}
}

/// The session fields carried inside an event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
	pub id: SessionId,
	pub started_at: DateTime<Utc>,
	pub events: SessionCounts,
}
