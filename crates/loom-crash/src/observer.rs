// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! State-change notifications for bridges that mirror client state.
//!
//! Observers run synchronously on the thread that made the change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loom_crash_core::{BreadcrumbType, MetadataMap, SessionId, User};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::error;

use crate::panic_hook::{catch_user_panic, recording_panic};

/// One externally visible change to client state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateEvent {
	AddMetadata {
		section: String,
		key: Option<String>,
		value: Option<Value>,
	},
	ClearMetadataSection {
		section: String,
	},
	ClearMetadataValue {
		section: String,
		key: String,
	},
	AddBreadcrumb {
		message: String,
		breadcrumb_type: BreadcrumbType,
		timestamp: DateTime<Utc>,
		metadata: Option<MetadataMap>,
	},
	ClearBreadcrumbs,
	StartSession {
		id: SessionId,
		started_at: DateTime<Utc>,
		handled_count: u32,
		unhandled_count: u32,
	},
	PauseSession,
	UpdateContext {
		context: Option<String>,
	},
	UpdateUser {
		user: User,
	},
	UpdateInForeground {
		in_foreground: bool,
		context: Option<String>,
	},
	AddFeatureFlag {
		name: String,
		variant: Option<String>,
	},
	ClearFeatureFlag {
		name: String,
	},
	ClearFeatureFlags,
	NotifyHandled,
	NotifyUnhandled,
}

pub type Observer = dyn Fn(&StateEvent) + Send + Sync;

/// Registered observers, held as a copy-on-write list.
#[derive(Default)]
pub struct ObserverRegistry {
	observers: RwLock<Arc<Vec<Arc<Observer>>>>,
}

impl ObserverRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&self, observer: Arc<Observer>) {
		let mut guard = self.observers.write();
		if guard
			.iter()
			.any(|existing| std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&observer)))
		{
			return;
		}
		let mut next: Vec<_> = guard.iter().cloned().collect();
		next.push(observer);
		*guard = Arc::new(next);
	}

	pub fn remove(&self, observer: &Arc<Observer>) {
		let mut guard = self.observers.write();
		let next: Vec<_> = guard
			.iter()
			.filter(|existing| !std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(observer)))
			.cloned()
			.collect();
		if next.len() != guard.len() {
			*guard = Arc::new(next);
		}
	}

	pub fn has_observers(&self) -> bool {
		!self.observers.read().is_empty()
	}

	/// Delivers `event` to every observer. `make` is only called when at
	/// least one observer is registered.
	pub fn notify_with(&self, make: impl FnOnce() -> StateEvent) {
		if recording_panic() {
			return;
		}
		let snapshot = Arc::clone(&self.observers.read());
		if snapshot.is_empty() {
			return;
		}
		let event = make();
		for observer in snapshot.iter() {
			if catch_user_panic(|| observer(&event)).is_err() {
				error!("state observer panicked");
			}
		}
	}

	pub fn notify(&self, event: StateEvent) {
		self.notify_with(|| event);
	}
}
