// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tiered diagnostic metadata: tab name -> key -> value.
//!
//! Values are JSON values, so they are always trees (a value is copied when it
//! is added and can never refer back to its container). Integers are held by
//! `serde_json::Number` as `i64`/`u64`, which makes a value added as `i32` and
//! the same value read back from disk compare equal.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::redaction::{Redactor, REDACTED};

/// The key/value pairs of a single metadata tab.
pub type MetadataMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
	tabs: BTreeMap<String, MetadataMap>,
}

/// Counts of what [`Metadata::trim_strings`] shortened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimMetrics {
	pub items_trimmed: usize,
	pub chars_trimmed: usize,
}

impl Metadata {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a single value. A JSON `null` removes the key instead of storing it.
	///
	/// When both the stored and the new value are objects they are merged key
	/// by key rather than replaced.
	pub fn add_value(&mut self, tab: &str, key: &str, value: Value) {
		if value.is_null() {
			self.clear_value(tab, key);
			return;
		}
		let entries = self.tabs.entry(tab.to_string()).or_default();
		insert_merging(entries, key, value);
	}

	/// Adds every entry of `values` to `tab`. Explicit `null` entries are stored
	/// as `null`, and an empty map still creates the tab.
	pub fn add_map(&mut self, tab: &str, values: MetadataMap) {
		let entries = self.tabs.entry(tab.to_string()).or_default();
		for (key, value) in values {
			insert_merging(entries, &key, value);
		}
	}

	pub fn get_tab(&self, tab: &str) -> Option<&MetadataMap> {
		self.tabs.get(tab)
	}

	pub fn get_value(&self, tab: &str, key: &str) -> Option<&Value> {
		self.tabs.get(tab).and_then(|entries| entries.get(key))
	}

	pub fn clear_tab(&mut self, tab: &str) {
		self.tabs.remove(tab);
	}

	/// Removes one key. A tab left without keys is removed with it.
	pub fn clear_value(&mut self, tab: &str, key: &str) {
		if let Some(entries) = self.tabs.get_mut(tab) {
			entries.remove(key);
			if entries.is_empty() {
				self.tabs.remove(tab);
			}
		}
	}

	pub fn is_empty(&self) -> bool {
		self.tabs.is_empty()
	}

	pub fn tab_names(&self) -> impl Iterator<Item = &str> {
		self.tabs.keys().map(String::as_str)
	}

	pub fn tabs(&self) -> impl Iterator<Item = (&str, &MetadataMap)> {
		self.tabs.iter().map(|(name, entries)| (name.as_str(), entries))
	}

	/// Deep-merges `overrides` on top of `base`.
	///
	/// Scalars in `overrides` replace those in `base`, nested objects merge
	/// key-wise and arrays replace wholesale. A missing side counts as empty.
	pub fn merge(base: Option<&Metadata>, overrides: Option<&Metadata>) -> Metadata {
		let mut merged = base.cloned().unwrap_or_default();
		if let Some(overrides) = overrides {
			for (tab, entries) in &overrides.tabs {
				let target = merged.tabs.entry(tab.clone()).or_default();
				for (key, value) in entries {
					insert_merging(target, key, value.clone());
				}
			}
		}
		merged
	}

	/// Shortens every string leaf longer than `max_len` characters.
	pub fn trim_strings(&mut self, max_len: usize) -> TrimMetrics {
		let mut metrics = TrimMetrics::default();
		for entries in self.tabs.values_mut() {
			for value in entries.values_mut() {
				trim_value(value, max_len, &mut metrics);
			}
		}
		metrics
	}

	/// A serializable view that writes redacted keys as [`REDACTED`] without
	/// touching the stored values.
	pub fn redacted<'a>(&'a self, redactor: &'a Redactor) -> RedactedMetadata<'a> {
		RedactedMetadata {
			metadata: self,
			redactor,
		}
	}
}

fn insert_merging(entries: &mut MetadataMap, key: &str, value: Value) {
	match (entries.get_mut(key), value) {
		(Some(Value::Object(existing)), Value::Object(incoming)) => {
			for (nested_key, nested_value) in incoming {
				insert_merging(existing, &nested_key, nested_value);
			}
		}
		(_, value) => {
			entries.insert(key.to_string(), value);
		}
	}
}

/// Truncates one string to `max_len` characters, appending a marker that
/// records how many were dropped. Returns `None` when nothing was cut.
pub fn truncate_string(value: &str, max_len: usize) -> Option<(String, usize)> {
	let char_count = value.chars().count();
	if char_count <= max_len {
		return None;
	}
	let dropped = char_count - max_len;
	let mut truncated: String = value.chars().take(max_len).collect();
	truncated.push_str(&format!("***{dropped} CHARS TRUNCATED***"));
	Some((truncated, dropped))
}

fn trim_value(value: &mut Value, max_len: usize, metrics: &mut TrimMetrics) {
	match value {
		Value::String(s) => {
			if let Some((truncated, dropped)) = truncate_string(s, max_len) {
				*s = truncated;
				metrics.items_trimmed += 1;
				metrics.chars_trimmed += dropped;
			}
		}
		Value::Array(items) => {
			for item in items {
				trim_value(item, max_len, metrics);
			}
		}
		Value::Object(map) => {
			for item in map.values_mut() {
				trim_value(item, max_len, metrics);
			}
		}
		_ => {}
	}
}

/// See [`Metadata::redacted`].
pub struct RedactedMetadata<'a> {
	metadata: &'a Metadata,
	redactor: &'a Redactor,
}

impl Serialize for RedactedMetadata<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.metadata.tabs.len()))?;
		for (tab, entries) in &self.metadata.tabs {
			map.serialize_entry(tab, &RedactedMap::new(entries, self.redactor))?;
		}
		map.end()
	}
}

/// A JSON object written with redacted keys replaced by [`REDACTED`].
pub struct RedactedMap<'a> {
	entries: &'a MetadataMap,
	redactor: &'a Redactor,
}

impl<'a> RedactedMap<'a> {
	pub fn new(entries: &'a MetadataMap, redactor: &'a Redactor) -> Self {
		Self { entries, redactor }
	}
}

impl Serialize for RedactedMap<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.entries.len()))?;
		for (key, value) in self.entries {
			if self.redactor.should_redact(key) {
				map.serialize_entry(key, REDACTED)?;
			} else {
				map.serialize_entry(key, &RedactedValue(value, self.redactor))?;
			}
		}
		map.end()
	}
}

struct RedactedValue<'a>(&'a Value, &'a Redactor);

impl Serialize for RedactedValue<'_> {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.0 {
			Value::Object(entries) => RedactedMap::new(entries, self.1).serialize(serializer),
			Value::Array(items) => {
				let mut seq = serializer.serialize_seq(Some(items.len()))?;
				for item in items {
					seq.serialize_element(&RedactedValue(item, self.1))?;
				}
				seq.end()
			}
			other => other.serialize(serializer),
		}
	}
}
