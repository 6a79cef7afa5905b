// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Feature flags active when an event was captured.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
	#[serde(rename = "featureFlag")]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub variant: Option<String>,
}

impl FeatureFlag {
	pub fn new(name: impl Into<String>, variant: Option<String>) -> Self {
		Self {
			name: name.into(),
			variant,
		}
	}
}

/// Flags keyed by name, kept in the order they were first added.
///
/// Adding a flag that already exists replaces its variant in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureFlags {
	flags: Vec<FeatureFlag>,
}

impl FeatureFlags {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, name: &str, variant: Option<String>) {
		match self.flags.iter_mut().find(|f| f.name == name) {
			Some(existing) => existing.variant = variant,
			None => self.flags.push(FeatureFlag::new(name, variant)),
		}
	}

	pub fn add_all<I>(&mut self, flags: I)
	where
		I: IntoIterator<Item = FeatureFlag>,
	{
		for flag in flags {
			self.add(&flag.name, flag.variant);
		}
	}

	pub fn clear(&mut self, name: &str) {
		self.flags.retain(|f| f.name != name);
	}

	pub fn clear_all(&mut self) {
		self.flags.clear();
	}

	pub fn get(&self, name: &str) -> Option<&FeatureFlag> {
		self.flags.iter().find(|f| f.name == name)
	}

	pub fn is_empty(&self) -> bool {
		self.flags.is_empty()
	}

	pub fn len(&self) -> usize {
		self.flags.len()
	}

	pub fn iter(&self) -> impl Iterator<Item = &FeatureFlag> {
		self.flags.iter()
	}
}
