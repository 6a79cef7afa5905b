// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! A directory of payload files with atomic writes and capacity eviction.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::filename::{compare_paths, EXTENSION, TMP_EXTENSION};
use crate::error::StoreError;

/// One file per payload in a single directory.
///
/// Files returned by [`FileStore::find_stored_files`] are tracked as in
/// flight until they are deleted or released, and are not returned again in
/// the meantime.
pub struct FileStore {
	dir: PathBuf,
	max_files: usize,
	kind: &'static str,
	in_flight: Mutex<HashSet<PathBuf>>,
}

impl FileStore {
	pub fn new(dir: PathBuf, max_files: usize, kind: &'static str) -> Result<Self, StoreError> {
		fs::create_dir_all(&dir)?;
		Ok(Self {
			dir,
			max_files: max_files.max(1),
			kind,
			in_flight: Mutex::new(HashSet::new()),
		})
	}

	#[cfg(test)]
	pub fn dir(&self) -> &Path {
		&self.dir
	}

	/// Writes `bytes` as `name`, going through a temporary file so a crash
	/// mid-write never leaves a partial payload behind.
	pub fn write(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
		self.evict_for_write();

		let path = self.dir.join(name);
		let tmp_path = self.dir.join(format!(
			"{}{TMP_EXTENSION}",
			name.strip_suffix(EXTENSION).unwrap_or(name)
		));

		if let Err(e) = fs::write(&tmp_path, bytes) {
			let _ = fs::remove_file(&tmp_path);
			return Err(e.into());
		}
		fs::rename(&tmp_path, &path)?;

		debug!(kind = self.kind, path = %path.display(), "stored payload");
		Ok(path)
	}

	/// All stored payload files, in replay order.
	pub fn stored_files(&self) -> Vec<PathBuf> {
		let entries = match fs::read_dir(&self.dir) {
			Ok(entries) => entries,
			Err(e) => {
				warn!(kind = self.kind, dir = %self.dir.display(), error = %e, "failed to list store");
				return Vec::new();
			}
		};

		let mut files: Vec<PathBuf> = entries
			.filter_map(|entry| entry.ok())
			.map(|entry| entry.path())
			.filter(|path| {
				path.is_file()
					&& path
						.file_name()
						.and_then(|n| n.to_str())
						.is_some_and(|n| n.ends_with(EXTENSION) && !n.ends_with(TMP_EXTENSION))
			})
			.collect();
		files.sort_by(|a, b| compare_paths(a, b));
		files
	}

	/// Stored files not already in flight, in replay order. The returned files
	/// are marked in flight.
	pub fn find_stored_files(&self) -> Vec<PathBuf> {
		let mut in_flight = self.in_flight.lock();
		let files: Vec<PathBuf> = self
			.stored_files()
			.into_iter()
			.filter(|path| !in_flight.contains(path))
			.collect();
		in_flight.extend(files.iter().cloned());
		files
	}

	/// Releases files so a later [`find_stored_files`](Self::find_stored_files)
	/// returns them again.
	pub fn cancel_queued_files(&self, files: &[PathBuf]) {
		let mut in_flight = self.in_flight.lock();
		for file in files {
			in_flight.remove(file);
		}
	}

	/// Deletes files and releases them.
	pub fn delete_stored_files(&self, files: &[PathBuf]) {
		for file in files {
			match fs::remove_file(file) {
				Ok(()) => debug!(kind = self.kind, path = %file.display(), "deleted payload"),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => {
					warn!(kind = self.kind, path = %file.display(), error = %e, "failed to delete payload")
				}
			}
		}
		self.cancel_queued_files(files);
	}

	/// Marks a single stored file in flight. Returns false if it already was
	/// or has been delivered and deleted in the meantime.
	pub fn claim(&self, path: &Path) -> bool {
		let mut in_flight = self.in_flight.lock();
		path.is_file() && in_flight.insert(path.to_path_buf())
	}

	#[cfg(test)]
	pub fn is_in_flight(&self, path: &Path) -> bool {
		self.in_flight.lock().contains(path)
	}

	/// Deletes the oldest files until there is room for one more. Files in
	/// flight are left alone.
	fn evict_for_write(&self) {
		let files = self.stored_files();
		if files.len() < self.max_files {
			return;
		}
		let excess = files.len() + 1 - self.max_files;
		let in_flight = self.in_flight.lock();
		let victims: Vec<&PathBuf> = files
			.iter()
			.filter(|path| !in_flight.contains(*path))
			.take(excess)
			.collect();
		for path in victims {
			warn!(kind = self.kind, path = %path.display(), "store full, discarding oldest payload");
			if let Err(e) = fs::remove_file(path) {
				warn!(kind = self.kind, path = %path.display(), error = %e, "failed to evict payload");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::store::filename::StoredFileName;
	use chrono::{TimeZone, Utc};
	use tempfile::TempDir;

	fn store(max: usize) -> (FileStore, TempDir) {
		let tmp = TempDir::new().unwrap();
		let store = FileStore::new(tmp.path().join("events"), max, "event").unwrap();
		(store, tmp)
	}

	fn name(ms: i64, startup: bool) -> String {
		StoredFileName::new(Utc.timestamp_millis_opt(ms).unwrap(), startup).file_name()
	}

	#[test]
	fn write_leaves_no_tmp_files() {
		let (store, _tmp) = store(10);
		let path = store.write(&name(1, false), b"{}").unwrap();
		assert_eq!(fs::read(&path).unwrap(), b"{}");

		let names: Vec<_> = fs::read_dir(store.dir())
			.unwrap()
			.map(|e| e.unwrap().file_name().into_string().unwrap())
			.collect();
		assert_eq!(names.len(), 1);
		assert!(!names[0].ends_with(".tmp"));
	}

	#[test]
	fn stale_tmp_files_are_not_listed() {
		let (store, _tmp) = store(10);
		fs::write(store.dir().join("0000000000001_x.json.tmp"), b"{").unwrap();
		store.write(&name(2, false), b"{}").unwrap();
		assert_eq!(store.stored_files().len(), 1);
	}

	#[test]
	fn files_are_listed_in_replay_order() {
		let (store, _tmp) = store(10);
		let late = store.write(&name(300, false), b"{}").unwrap();
		let early = store.write(&name(100, false), b"{}").unwrap();
		let startup = store.write(&name(300, true), b"{}").unwrap();
		assert_eq!(store.stored_files(), vec![early, startup, late]);
	}

	#[test]
	fn oldest_files_are_evicted() {
		let (store, _tmp) = store(2);
		let first = store.write(&name(1, false), b"{}").unwrap();
		let second = store.write(&name(2, false), b"{}").unwrap();
		let third = store.write(&name(3, false), b"{}").unwrap();

		assert!(!first.exists());
		assert_eq!(store.stored_files(), vec![second, third]);
	}

	#[test]
	fn in_flight_files_are_not_handed_out_twice() {
		let (store, _tmp) = store(10);
		let a = store.write(&name(1, false), b"{}").unwrap();
		let b = store.write(&name(2, false), b"{}").unwrap();

		let first = store.find_stored_files();
		assert_eq!(first, vec![a.clone(), b.clone()]);
		assert!(store.find_stored_files().is_empty());

		store.cancel_queued_files(&[a.clone()]);
		assert_eq!(store.find_stored_files(), vec![a.clone()]);

		store.delete_stored_files(&[a.clone(), b.clone()]);
		assert!(!a.exists());
		assert!(!b.exists());
		assert!(!store.is_in_flight(&a));
		assert!(store.find_stored_files().is_empty());
	}

	#[test]
	fn claimed_files_are_skipped_by_find() {
		let (store, _tmp) = store(10);
		let a = store.write(&name(1, false), b"{}").unwrap();
		assert!(store.claim(&a));
		assert!(!store.claim(&a));
		assert!(store.find_stored_files().is_empty());
	}

	#[test]
	fn deleted_files_cannot_be_claimed() {
		let (store, _tmp) = store(10);
		let a = store.write(&name(1, false), b"{}").unwrap();
		let found = store.find_stored_files();
		store.delete_stored_files(&found);
		assert!(!store.claim(&a));
		assert!(!store.is_in_flight(&a));
	}

	#[test]
	fn eviction_skips_in_flight_files() {
		let (store, _tmp) = store(1);
		let a = store.write(&name(1, false), b"{}").unwrap();
		store.find_stored_files();
		let b = store.write(&name(2, false), b"{}").unwrap();
		assert!(a.exists());
		assert!(b.exists());
	}

	#[test]
	fn deleting_missing_file_is_quiet() {
		let (store, _tmp) = store(1);
		store.delete_stored_files(&[store.dir().join("missing.json")]);
	}
}
