// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Thread-safe ring buffer of breadcrumbs.

use std::collections::VecDeque;

use loom_crash_core::Breadcrumb;
use parking_lot::RwLock;

struct Ring {
	entries: VecDeque<Breadcrumb>,
	capacity: usize,
}

/// Holds the most recent breadcrumbs, oldest first.
///
/// When full, the oldest entry is evicted. A capacity of zero stores nothing.
pub struct BreadcrumbState {
	ring: RwLock<Ring>,
}

impl BreadcrumbState {
	pub fn new(capacity: usize) -> Self {
		Self {
			ring: RwLock::new(Ring {
				entries: VecDeque::with_capacity(capacity),
				capacity,
			}),
		}
	}

	pub fn add(&self, breadcrumb: Breadcrumb) {
		let mut ring = self.ring.write();
		if ring.capacity == 0 {
			return;
		}
		while ring.entries.len() >= ring.capacity {
			ring.entries.pop_front();
		}
		ring.entries.push_back(breadcrumb);
	}

	/// Changes the capacity, keeping the newest `capacity` entries.
	pub fn set_capacity(&self, capacity: usize) {
		let mut ring = self.ring.write();
		ring.capacity = capacity;
		let excess = ring.entries.len().saturating_sub(capacity);
		ring.entries.drain(..excess);
	}

	#[cfg(test)]
	pub fn capacity(&self) -> usize {
		self.ring.read().capacity
	}

	pub fn clear(&self) {
		self.ring.write().entries.clear();
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.ring.read().entries.len()
	}

	#[cfg(test)]
	pub fn is_empty(&self) -> bool {
		self.ring.read().entries.is_empty()
	}

	/// A point-in-time copy of the buffer.
	pub fn copy(&self) -> Vec<Breadcrumb> {
		self.ring.read().entries.iter().cloned().collect()
	}
}
