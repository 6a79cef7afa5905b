// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted sessions awaiting delivery.

use std::path::{Path, PathBuf};

use loom_crash_core::{CrashError, Session};
use tracing::error;

use super::file_store::FileStore;
use super::filename::StoredFileName;
use crate::error::StoreError;

pub struct SessionStore {
	files: FileStore,
}

impl SessionStore {
	pub fn new(dir: PathBuf, max_sessions: usize) -> Result<Self, StoreError> {
		Ok(Self {
			files: FileStore::new(dir, max_sessions, "session")?,
		})
	}

	pub fn files(&self) -> &FileStore {
		&self.files
	}

	pub fn write_session(&self, session: &Session) -> Option<PathBuf> {
		let bytes = match serde_json::to_vec(session) {
			Ok(bytes) => bytes,
			Err(e) => {
				error!(error = %e, "failed to serialize session for storage");
				return None;
			}
		};
		let name = StoredFileName::new(session.started_at, false).file_name();
		match self.files.write(&name, &bytes) {
			Ok(path) => Some(path),
			Err(e) => {
				error!(error = %e, session_id = %session.id, "failed to persist session");
				None
			}
		}
	}

	pub fn read_session(&self, path: &Path) -> Result<Session, StoreError> {
		let bytes = std::fs::read(path)?;
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
			path: path.to_path_buf(),
			source: CrashError::Serialization(e),
		})
	}

	#[cfg(test)]
	pub fn read_all(&self, files: &[PathBuf]) -> Vec<(PathBuf, Session)> {
		files
			.iter()
			.filter_map(|path| match self.read_session(path) {
				Ok(session) => Some((path.clone(), session)),
				Err(e) => {
					tracing::warn!(path = %path.display(), error = %e, "skipping unreadable stored session");
					None
				}
			})
			.collect()
	}
}
