// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-global metadata.

use std::sync::Arc;

use loom_crash_core::{Metadata, MetadataMap};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::warn;

use crate::observer::{ObserverRegistry, StateEvent};

/// Metadata shared by every event a client captures.
///
/// Readers receive copies, so they never see a tab half way through an update.
pub struct MetadataState {
	metadata: RwLock<Metadata>,
	observers: Arc<ObserverRegistry>,
}

impl MetadataState {
	pub fn new(observers: Arc<ObserverRegistry>) -> Self {
		Self {
			metadata: RwLock::new(Metadata::new()),
			observers,
		}
	}

	/// Adds one value. A `null` value removes the key.
	pub fn add_value(&self, section: &str, key: &str, value: Value) {
		if section.is_empty() || key.is_empty() {
			warn!(section, key, "ignoring metadata with an empty section or key");
			return;
		}
		let removed = value.is_null();
		self.metadata.write().add_value(section, key, value.clone());

		if removed {
			self.observers.notify_with(|| StateEvent::ClearMetadataValue {
				section: section.to_string(),
				key: key.to_string(),
			});
		} else {
			self.observers.notify_with(|| StateEvent::AddMetadata {
				section: section.to_string(),
				key: Some(key.to_string()),
				value: Some(value),
			});
		}
	}

	/// Adds every entry of `values`. Explicit nulls are stored.
	pub fn add_map(&self, section: &str, values: MetadataMap) {
		if section.is_empty() {
			warn!("ignoring metadata map with an empty section");
			return;
		}
		let event_values = self.observers.has_observers().then(|| values.clone());
		self.metadata.write().add_map(section, values);
		self.observers.notify_with(|| StateEvent::AddMetadata {
			section: section.to_string(),
			key: None,
			value: event_values.map(Value::Object),
		});
	}

	pub fn clear_section(&self, section: &str) {
		self.metadata.write().clear_tab(section);
		self.observers.notify_with(|| StateEvent::ClearMetadataSection {
			section: section.to_string(),
		});
	}

	pub fn clear_value(&self, section: &str, key: &str) {
		self.metadata.write().clear_value(section, key);
		self.observers.notify_with(|| StateEvent::ClearMetadataValue {
			section: section.to_string(),
			key: key.to_string(),
		});
	}

	pub fn get_section(&self, section: &str) -> Option<MetadataMap> {
		self.metadata.read().get_tab(section).cloned()
	}

	pub fn get_value(&self, section: &str, key: &str) -> Option<Value> {
		self.metadata.read().get_value(section, key).cloned()
	}

	pub fn copy(&self) -> Metadata {
		self.metadata.read().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use parking_lot::Mutex;
	use serde_json::json;

	fn state_with_recorder() -> (MetadataState, Arc<Mutex<Vec<StateEvent>>>) {
		let observers = Arc::new(ObserverRegistry::new());
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		observers.add(Arc::new(move |event: &StateEvent| sink.lock().push(event.clone())));
		(MetadataState::new(observers), seen)
	}

	#[test]
	fn add_get_clear() {
		let (state, seen) = state_with_recorder();
		state.add_value("account", "plan", json!("pro"));
		assert_eq!(state.get_value("account", "plan"), Some(json!("pro")));

		state.clear_value("account", "plan");
		assert_eq!(state.get_section("account"), None);
		assert_eq!(seen.lock().len(), 2);
	}

	#[test]
	fn null_value_removes_key() {
		let (state, seen) = state_with_recorder();
		state.add_value("account", "plan", json!("pro"));
		state.add_value("account", "seats", json!(4));
		state.add_value("account", "plan", Value::Null);

		assert_eq!(state.get_value("account", "plan"), None);
		assert_eq!(state.get_value("account", "seats"), Some(json!(4)));
		assert!(matches!(
			seen.lock().last(),
			Some(StateEvent::ClearMetadataValue { key, .. }) if key == "plan"
		));
	}

	#[test]
	fn map_nulls_are_stored() {
		let (state, _) = state_with_recorder();
		let mut values = MetadataMap::new();
		values.insert("token".to_string(), Value::Null);
		state.add_map("auth", values);
		assert_eq!(state.get_value("auth", "token"), Some(Value::Null));
	}

	#[test]
	fn empty_section_is_ignored() {
		let (state, seen) = state_with_recorder();
		state.add_value("", "k", json!(1));
		assert!(state.copy().is_empty());
		assert!(seen.lock().is_empty());
	}

	#[test]
	fn concurrent_writers() {
		let (state, _) = state_with_recorder();
		let state = Arc::new(state);
		let handles: Vec<_> = (0..8)
			.map(|t| {
				let state = Arc::clone(&state);
				std::thread::spawn(move || {
					for i in 0..100 {
						state.add_value("load", &format!("{t}-{i}"), json!(i));
					}
				})
			})
			.collect();
		for handle in handles {
			handle.join().unwrap();
		}
		assert_eq!(state.get_section("load").map(|s| s.len()), Some(800));
	}
}
