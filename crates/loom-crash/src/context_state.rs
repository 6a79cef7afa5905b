// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User, context, feature flags and app/device snapshots held by the client.

use std::sync::Arc;

use loom_crash_core::{AppWithState, DeviceWithState, FeatureFlags, User};
use parking_lot::RwLock;
use tracing::warn;

use crate::observer::{ObserverRegistry, StateEvent};

pub struct ContextState {
	user: RwLock<User>,
	context: RwLock<Option<String>>,
	feature_flags: RwLock<FeatureFlags>,
	app: RwLock<AppWithState>,
	device: RwLock<DeviceWithState>,
	observers: Arc<ObserverRegistry>,
}

impl ContextState {
	pub fn new(app: AppWithState, device: DeviceWithState, observers: Arc<ObserverRegistry>) -> Self {
		Self {
			user: RwLock::new(User::default()),
			context: RwLock::new(None),
			feature_flags: RwLock::new(FeatureFlags::new()),
			app: RwLock::new(app),
			device: RwLock::new(device),
			observers,
		}
	}

	pub fn user(&self) -> User {
		self.user.read().clone()
	}

	pub fn set_user(&self, user: User) {
		*self.user.write() = user.clone();
		self.observers.notify_with(|| StateEvent::UpdateUser { user });
	}

	pub fn context(&self) -> Option<String> {
		self.context.read().clone()
	}

	pub fn set_context(&self, context: Option<String>) {
		*self.context.write() = context.clone();
		self.observers.notify_with(|| StateEvent::UpdateContext { context });
	}

	pub fn add_feature_flag(&self, name: &str, variant: Option<String>) {
		if name.is_empty() {
			warn!("ignoring feature flag with an empty name");
			return;
		}
		self.feature_flags.write().add(name, variant.clone());
		self.observers.notify_with(|| StateEvent::AddFeatureFlag {
			name: name.to_string(),
			variant,
		});
	}

	pub fn clear_feature_flag(&self, name: &str) {
		self.feature_flags.write().clear(name);
		self.observers.notify_with(|| StateEvent::ClearFeatureFlag {
			name: name.to_string(),
		});
	}

	pub fn clear_feature_flags(&self) {
		self.feature_flags.write().clear_all();
		self.observers.notify(StateEvent::ClearFeatureFlags);
	}

	pub fn feature_flags(&self) -> FeatureFlags {
		self.feature_flags.read().clone()
	}

	pub fn app(&self) -> AppWithState {
		self.app.read().clone()
	}

	/// Applies `update` to a copy and stores it. No lock is held while
	/// `update` runs.
	pub fn update_app(&self, update: impl FnOnce(&mut AppWithState)) {
		let mut app = self.app();
		update(&mut app);
		*self.app.write() = app;
	}

	pub fn device(&self) -> DeviceWithState {
		self.device.read().clone()
	}

	pub fn update_device(&self, update: impl FnOnce(&mut DeviceWithState)) {
		let mut device = self.device();
		update(&mut device);
		*self.device.write() = device;
	}

	/// Records a foreground change on the app snapshot.
	pub fn set_in_foreground(&self, in_foreground: bool, context: Option<String>) {
		self.app.write().in_foreground = Some(in_foreground);
		if context.is_some() {
			*self.context.write() = context.clone();
		}
		self.observers.notify_with(|| StateEvent::UpdateInForeground {
			in_foreground,
			context,
		});
	}
}
