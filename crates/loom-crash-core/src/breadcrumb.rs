// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Breadcrumbs: small timestamped records of what the app did before an event.

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CrashError;
use crate::metadata::{MetadataMap, RedactedMap};
use crate::redaction::Redactor;

/// A breadcrumb left before an event was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
	pub timestamp: DateTime<Utc>,
	#[serde(rename = "name")]
	pub message: String,
	#[serde(rename = "type")]
	pub breadcrumb_type: BreadcrumbType,
	#[serde(rename = "metaData", default, skip_serializing_if = "Option::is_none")]
	pub metadata: Option<MetadataMap>,
}

impl Breadcrumb {
	pub fn new(message: impl Into<String>, breadcrumb_type: BreadcrumbType) -> Self {
		Self {
			timestamp: Utc::now(),
			message: message.into(),
			breadcrumb_type,
			metadata: None,
		}
	}

	/// A `Manual` breadcrumb, as left by a plain string.
	pub fn manual(message: impl Into<String>) -> Self {
		Self::new(message, BreadcrumbType::Manual)
	}

	pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
		self.metadata = Some(metadata);
		self
	}

	pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
		self.timestamp = timestamp;
		self
	}

	pub fn redacted<'a>(&'a self, redactor: &'a Redactor) -> RedactedBreadcrumb<'a> {
		RedactedBreadcrumb {
			breadcrumb: self,
			redactor,
		}
	}
}

/// Serializes a breadcrumb with its metadata redacted.
pub struct RedactedBreadcrumb<'a> {
	breadcrumb: &'a Breadcrumb,
	redactor: &'a Redactor,
}

impl Serialize for RedactedBreadcrumb<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let crumb = self.breadcrumb;
		let len = if crumb.metadata.is_some() { 4 } else { 3 };
		let mut state = serializer.serialize_struct("Breadcrumb", len)?;
		state.serialize_field("timestamp", &crumb.timestamp)?;
		state.serialize_field("name", &crumb.message)?;
		state.serialize_field("type", &crumb.breadcrumb_type)?;
		if let Some(metadata) = &crumb.metadata {
			state.serialize_field("metaData", &RedactedMap::new(metadata, self.redactor))?;
		}
		state.end()
	}
}

/// The kind of activity a breadcrumb records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreadcrumbType {
	Navigation,
	Request,
	Process,
	Log,
	User,
	State,
	Error,
	Manual,
}

impl BreadcrumbType {
	pub const ALL: [BreadcrumbType; 8] = [
		Self::Navigation,
		Self::Request,
		Self::Process,
		Self::Log,
		Self::User,
		Self::State,
		Self::Error,
		Self::Manual,
	];
}

impl fmt::Display for BreadcrumbType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Navigation => write!(f, "navigation"),
			Self::Request => write!(f, "request"),
			Self::Process => write!(f, "process"),
			Self::Log => write!(f, "log"),
			Self::User => write!(f, "user"),
			Self::State => write!(f, "state"),
			Self::Error => write!(f, "error"),
			Self::Manual => write!(f, "manual"),
		}
	}
}

impl FromStr for BreadcrumbType {
	type Err = CrashError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"navigation" => Ok(Self::Navigation),
			"request" => Ok(Self::Request),
			"process" => Ok(Self::Process),
			"log" => Ok(Self::Log),
			"user" => Ok(Self::User),
			"state" => Ok(Self::State),
			"error" => Ok(Self::Error),
			"manual" => Ok(Self::Manual),
			_ => Err(CrashError::InvalidBreadcrumbType(s.to_string())),
		}
	}
}
