// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User callback chains.
//!
//! Each hook keeps a copy-on-write list: `run` iterates a snapshot, so a
//! callback may add or remove callbacks (including itself) while the chain
//! is running. Changes apply to the next run.

use std::sync::Arc;

use loom_crash_core::{Breadcrumb, Event, Session};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::panic_hook::{catch_user_panic, recording_panic};

/// A callback that may mutate its argument. Returning `false` vetoes it.
pub type Callback<A> = dyn Fn(&mut A) -> bool + Send + Sync;

pub type OnErrorCallback = Arc<Callback<Event>>;
pub type OnBreadcrumbCallback = Arc<Callback<Breadcrumb>>;
pub type OnSessionCallback = Arc<Callback<Session>>;
pub type OnSendCallback = Arc<Callback<Event>>;

/// How a chain treats a `false` result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPolicy {
	/// Stop at the first veto.
	Halt,
	/// Run every callback and AND the results.
	RunAll,
}

/// An ordered, duplicate-free list of callbacks for one hook.
pub struct CallbackChain<A: 'static> {
	name: &'static str,
	policy: ChainPolicy,
	callbacks: RwLock<Arc<Vec<Arc<Callback<A>>>>>,
}

impl<A: 'static> CallbackChain<A> {
	pub fn new(name: &'static str, policy: ChainPolicy) -> Self {
		Self {
			name,
			policy,
			callbacks: RwLock::new(Arc::new(Vec::new())),
		}
	}

	/// Appends `callback` unless that same callback is already registered.
	pub fn add(&self, callback: Arc<Callback<A>>) {
		let mut guard = self.callbacks.write();
		if guard.iter().any(|existing| same_callback(existing, &callback)) {
			debug!(hook = self.name, "ignoring duplicate callback");
			return;
		}
		let mut next = Vec::with_capacity(guard.len() + 1);
		next.extend(guard.iter().cloned());
		next.push(callback);
		*guard = Arc::new(next);
	}

	/// Removes `callback`. Removing an unknown callback does nothing.
	pub fn remove(&self, callback: &Arc<Callback<A>>) {
		let mut guard = self.callbacks.write();
		if !guard.iter().any(|existing| same_callback(existing, callback)) {
			return;
		}
		let next = guard
			.iter()
			.filter(|existing| !same_callback(existing, callback))
			.cloned()
			.collect();
		*guard = Arc::new(next);
	}

	#[cfg(test)]
	pub fn len(&self) -> usize {
		self.callbacks.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.callbacks.read().is_empty()
	}

	/// Runs the chain in registration order. A callback that panics is
	/// logged and treated as having returned `true`. Nothing runs while the
	/// panic hook is recording.
	pub fn run(&self, value: &mut A) -> bool {
		if recording_panic() {
			debug!(hook = self.name, "recording a panic, skipping callbacks");
			return true;
		}
		let snapshot = Arc::clone(&self.callbacks.read());
		let mut keep = true;

		for (index, callback) in snapshot.iter().enumerate() {
			let result = match catch_user_panic(|| callback(value)) {
				Ok(result) => result,
				Err(_) => {
					error!(hook = self.name, index, "callback panicked, continuing");
					true
				}
			};

			if !result {
				debug!(hook = self.name, index, "callback vetoed");
				keep = false;
				if self.policy == ChainPolicy::Halt {
					break;
				}
			}
		}

		keep
	}
}

fn same_callback<A>(a: &Arc<Callback<A>>, b: &Arc<Callback<A>>) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// The callback chains of one client.
pub struct CallbackState {
	pub on_error: CallbackChain<Event>,
	pub on_breadcrumb: CallbackChain<Breadcrumb>,
	pub on_session: CallbackChain<Session>,
	pub on_send: CallbackChain<Event>,
}

impl Default for CallbackState {
	fn default() -> Self {
		Self {
			on_error: CallbackChain::new("on_error", ChainPolicy::Halt),
			on_breadcrumb: CallbackChain::new("on_breadcrumb", ChainPolicy::Halt),
			on_session: CallbackChain::new("on_session", ChainPolicy::Halt),
			on_send: CallbackChain::new("on_send", ChainPolicy::RunAll),
		}
	}
}

impl CallbackState {
	/// Registers a read-only `before_notify` callback on the on-error chain.
	pub fn add_before_notify<F>(&self, callback: F) -> OnErrorCallback
	where
		F: Fn(&Event) -> bool + Send + Sync + 'static,
	{
		let adapted: OnErrorCallback = Arc::new(move |event: &mut Event| callback(event));
		self.on_error.add(Arc::clone(&adapted));
		adapted
	}

	/// Registers a read-only `before_send` callback on the on-send chain.
	pub fn add_before_send<F>(&self, callback: F) -> OnSendCallback
	where
		F: Fn(&Event) -> bool + Send + Sync + 'static,
	{
		let adapted: OnSendCallback = Arc::new(move |event: &mut Event| callback(event));
		self.on_send.add(Arc::clone(&adapted));
		adapted
	}
}
