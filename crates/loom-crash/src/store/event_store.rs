// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted events awaiting delivery.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use loom_crash_core::{Event, Redactor};
use tracing::error;

use super::file_store::FileStore;
use super::filename::StoredFileName;
use crate::error::StoreError;

pub struct EventStore {
	files: FileStore,
}

impl EventStore {
	pub fn new(dir: PathBuf, max_events: usize) -> Result<Self, StoreError> {
		Ok(Self {
			files: FileStore::new(dir, max_events, "event")?,
		})
	}

	pub fn files(&self) -> &FileStore {
		&self.files
	}

	/// Persists `event`. Failures are logged and yield `None`; the caller
	/// still holds the event in memory.
	pub fn write_event(&self, event: &Event, startup: bool) -> Option<PathBuf> {
		let bytes = match event.to_json_vec() {
			Ok(bytes) => bytes,
			Err(e) => {
				error!(error = %e, "failed to serialize event for storage");
				return None;
			}
		};
		let name = StoredFileName::new(Utc::now(), startup).file_name();
		match self.files.write(&name, &bytes) {
			Ok(path) => Some(path),
			Err(e) => {
				error!(error = %e, "failed to persist event");
				None
			}
		}
	}

	/// Reads a stored event back.
	///
	/// Empty, truncated or semantically empty files fail with
	/// [`StoreError::Corrupt`] so the caller can decide what to do with them.
	pub fn read_event(&self, path: &Path, redactor: Arc<Redactor>) -> Result<Event, StoreError> {
		let bytes = std::fs::read(path)?;
		Event::from_json_slice(&bytes, redactor).map_err(|source| StoreError::Corrupt {
			path: path.to_path_buf(),
			source,
		})
	}

	/// Reads every file, skipping the ones that fail.
	#[cfg(test)]
	pub fn read_all(&self, files: &[PathBuf], redactor: &Arc<Redactor>) -> Vec<(PathBuf, Event)> {
		files
			.iter()
			.filter_map(|path| match self.read_event(path, Arc::clone(redactor)) {
				Ok(event) => Some((path.clone(), event)),
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "skipping unreadable stored event");
					None
				}
			})
			.collect()
	}
}

/// True when the file name's timestamp is older than `max_age`. Names without
/// a timestamp are never stale.
pub fn is_stale(path: &Path, max_age: chrono::Duration, now: DateTime<Utc>) -> bool {
	StoredFileName::from_path(path)
		.and_then(|name| name.timestamp())
		.is_some_and(|written| now - written > max_age)
}

#[cfg(test)]
pub fn is_startup(path: &Path) -> bool {
	StoredFileName::from_path(path).is_some_and(|name| name.startup)
}
