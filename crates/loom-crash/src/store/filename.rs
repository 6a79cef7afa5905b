// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stored payload file names.
//!
//! A name is `<timestamp ms, 13 digits>_<uuid>[-startupcrash].json`. The name
//! alone orders files for replay, so contents never need to be read to sort.

use std::cmp::Ordering;
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

pub const STARTUP_SUFFIX: &str = "-startupcrash";
pub const EXTENSION: &str = ".json";
pub const TMP_EXTENSION: &str = ".json.tmp";

/// The parts encoded in a stored file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFileName {
	pub timestamp_ms: Option<i64>,
	pub id: String,
	pub startup: bool,
}

impl StoredFileName {
	pub fn new(timestamp: DateTime<Utc>, startup: bool) -> Self {
		Self {
			timestamp_ms: Some(timestamp.timestamp_millis()),
			id: Uuid::new_v4().to_string(),
			startup,
		}
	}

	pub fn parse(name: &str) -> Self {
		let stem = name.strip_suffix(EXTENSION).unwrap_or(name);
		let (stem, startup) = match stem.strip_suffix(STARTUP_SUFFIX) {
			Some(stem) => (stem, true),
			None => (stem, false),
		};
		let (timestamp, id) = stem.split_once('_').unwrap_or((stem, ""));
		Self {
			timestamp_ms: timestamp.parse().ok(),
			id: id.to_string(),
			startup,
		}
	}

	pub fn from_path(path: &Path) -> Option<Self> {
		path.file_name()
			.and_then(|name| name.to_str())
			.map(Self::parse)
	}

	pub fn timestamp(&self) -> Option<DateTime<Utc>> {
		self.timestamp_ms
			.and_then(|ms| Utc.timestamp_millis_opt(ms).single())
	}

	pub fn file_name(&self) -> String {
		let timestamp = self.timestamp_ms.unwrap_or_default();
		let suffix = if self.startup { STARTUP_SUFFIX } else { "" };
		format!("{timestamp:013}_{}{suffix}{EXTENSION}", self.id)
	}
}

/// Orders file names for replay: oldest first, startup files before others
/// with the same timestamp, then by name. `None` sorts after every name, and
/// an unparseable timestamp sorts after every parseable one.
pub fn compare_file_names(a: Option<&str>, b: Option<&str>) -> Ordering {
	match (a, b) {
		(None, None) => Ordering::Equal,
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(Some(a), Some(b)) => {
			let pa = StoredFileName::parse(a);
			let pb = StoredFileName::parse(b);
			let ta = pa.timestamp_ms.unwrap_or(i64::MAX);
			let tb = pb.timestamp_ms.unwrap_or(i64::MAX);
			ta.cmp(&tb)
				.then_with(|| pb.startup.cmp(&pa.startup))
				.then_with(|| a.cmp(b))
		}
	}
}

pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
	compare_file_names(
		a.file_name().and_then(|n| n.to_str()),
		b.file_name().and_then(|n| n.to_str()),
	)
}
