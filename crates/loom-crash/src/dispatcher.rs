// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sends stored payload files and settles them according to the outcome.
//!
//! Every file passed in here must already be claimed in its store (through
//! `find_stored_files` or `claim`). Each path ends either deleted or released
//! back to the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use loom_crash_core::{Report, SessionPayload};
use tracing::{debug, info, warn};

use crate::callbacks::CallbackState;
use crate::config::RuntimeConfig;
use crate::context_state::ContextState;
use crate::delivery::{Delivery, DeliveryParams, DeliveryStatus};
use crate::error::StoreError;
use crate::store::{is_stale, EventStore, SessionStore};

/// How a single stored file was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
	/// Delivered, then deleted.
	Delivered,
	/// Kept for a later attempt.
	Retained,
	/// Deleted without being delivered: rejected, stale or vetoed.
	Dropped,
	/// Could not be read. Left on disk.
	Skipped,
}

/// Totals from one [`Pipeline::flush`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
	pub delivered: usize,
	pub retained: usize,
	pub dropped: usize,
	pub skipped: usize,
}

impl FlushSummary {
	fn record(&mut self, outcome: FileOutcome) {
		match outcome {
			FileOutcome::Delivered => self.delivered += 1,
			FileOutcome::Retained => self.retained += 1,
			FileOutcome::Dropped => self.dropped += 1,
			FileOutcome::Skipped => self.skipped += 1,
		}
	}

	pub fn total(&self) -> usize {
		self.delivered + self.retained + self.dropped + self.skipped
	}
}

/// The stores plus everything needed to turn a stored file into a request.
pub struct Pipeline {
	config: Arc<RuntimeConfig>,
	events: EventStore,
	sessions: SessionStore,
	delivery: Arc<dyn Delivery>,
	callbacks: Arc<CallbackState>,
	context: Arc<ContextState>,
}

impl Pipeline {
	pub fn new(
		config: Arc<RuntimeConfig>,
		delivery: Arc<dyn Delivery>,
		callbacks: Arc<CallbackState>,
		context: Arc<ContextState>,
	) -> Result<Self, StoreError> {
		let events = EventStore::new(config.events_dir(), config.max_persisted_events)?;
		let sessions = SessionStore::new(config.sessions_dir(), config.max_persisted_sessions)?;
		Ok(Self {
			config,
			events,
			sessions,
			delivery,
			callbacks,
			context,
		})
	}

	pub fn events(&self) -> &EventStore {
		&self.events
	}

	pub fn sessions(&self) -> &SessionStore {
		&self.sessions
	}

	/// Delivers one claimed event file.
	pub async fn deliver_event_file(&self, path: &Path) -> FileOutcome {
		let files = self.events.files();

		if is_stale(path, self.config.max_stored_event_age, Utc::now()) {
			info!(path = %path.display(), "discarding stale stored event");
			files.delete_stored_files(&[path.to_path_buf()]);
			return FileOutcome::Dropped;
		}

		let mut event = match self.events.read_event(path, Arc::clone(&self.config.redactor)) {
			Ok(event) => event,
			Err(e) => {
				warn!(path = %path.display(), error = %e, "skipping unreadable stored event");
				files.cancel_queued_files(&[path.to_path_buf()]);
				return FileOutcome::Skipped;
			}
		};

		let api_key = event
			.api_key()
			.unwrap_or(&self.config.api_key)
			.to_string();
		let notifier = self.config.notifier.clone();

		// Without on-send callbacks the file is streamed as written.
		let report = if self.callbacks.on_send.is_empty() {
			Report::for_file(api_key.as_str(), notifier, path.to_path_buf())
		} else {
			if !self.callbacks.on_send.run(&mut event) {
				debug!(path = %path.display(), "stored event vetoed by on-send callback");
				files.delete_stored_files(&[path.to_path_buf()]);
				return FileOutcome::Dropped;
			}
			Report::for_event(api_key.as_str(), notifier, event)
		};

		let params = DeliveryParams::for_events(&self.config.notify_endpoint, &api_key);
		let status = self.delivery.deliver_report(&report, &params).await;
		self.settle(files, path, status)
	}

	/// Delivers one claimed session file.
	pub async fn deliver_session_file(&self, path: &Path) -> FileOutcome {
		let files = self.sessions.files();

		let session = match self.sessions.read_session(path) {
			Ok(session) => session,
			Err(e) => {
				warn!(path = %path.display(), error = %e, "skipping unreadable stored session");
				files.cancel_queued_files(&[path.to_path_buf()]);
				return FileOutcome::Skipped;
			}
		};

		let payload = SessionPayload {
			notifier: self.config.notifier.clone(),
			app: self.context.app(),
			device: self.context.device(),
			sessions: vec![session],
		};
		let params = DeliveryParams::for_sessions(&self.config.sessions_endpoint, &self.config.api_key);
		let status = self.delivery.deliver_sessions(&payload, &params).await;
		self.settle(files, path, status)
	}

	/// Delivers every stored file not already in flight: events first, in
	/// replay order, then sessions.
	pub async fn flush(&self) -> FlushSummary {
		let mut summary = FlushSummary::default();

		let event_files = self.events.files().find_stored_files();
		for path in &event_files {
			summary.record(self.deliver_event_file(path).await);
		}

		let session_files = self.sessions.files().find_stored_files();
		for path in &session_files {
			summary.record(self.deliver_session_file(path).await);
		}

		if summary.total() > 0 {
			info!(
				delivered = summary.delivered,
				retained = summary.retained,
				dropped = summary.dropped,
				skipped = summary.skipped,
				"Flushed stored payloads"
			);
		}
		summary
	}

	/// Releases a claimed file without attempting it.
	pub fn release_event_file(&self, path: PathBuf) {
		self.events.files().cancel_queued_files(&[path]);
	}

	pub fn release_session_file(&self, path: PathBuf) {
		self.sessions.files().cancel_queued_files(&[path]);
	}

	fn settle(
		&self,
		files: &crate::store::FileStore,
		path: &Path,
		status: DeliveryStatus,
	) -> FileOutcome {
		let owned = [path.to_path_buf()];
		match status {
			DeliveryStatus::Delivered => {
				files.delete_stored_files(&owned);
				FileOutcome::Delivered
			}
			DeliveryStatus::Failure => {
				warn!(path = %path.display(), "payload rejected, deleting");
				files.delete_stored_files(&owned);
				FileOutcome::Dropped
			}
			DeliveryStatus::Undelivered => {
				files.cancel_queued_files(&owned);
				FileOutcome::Retained
			}
		}
	}
}
