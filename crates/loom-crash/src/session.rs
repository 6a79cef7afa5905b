// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session tracking for crash-rate metrics.
//!
//! A session starts when the app comes to the foreground after being in the
//! background for at least the session timeout, or when started explicitly.
//! Events captured while a session is current count towards its handled or
//! unhandled totals.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use loom_crash_core::{Session, User};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::callbacks::CallbackChain;
use crate::context_state::ContextState;
use crate::observer::{ObserverRegistry, StateEvent};

/// The session events are currently attributed to.
pub struct ActiveSession {
	session: Mutex<Session>,
	paused: AtomicBool,
}

impl ActiveSession {
	fn new(session: Session) -> Self {
		Self {
			session: Mutex::new(session),
			paused: AtomicBool::new(false),
		}
	}

	pub fn is_paused(&self) -> bool {
		self.paused.load(Ordering::SeqCst)
	}

	pub fn snapshot(&self) -> Session {
		self.session.lock().clone()
	}
}

/// A session that was just installed as current.
#[derive(Debug, Clone)]
pub struct StartedSession {
	pub session: Session,
	/// False when an on-session callback vetoed delivery.
	pub deliver: bool,
}

#[derive(Default)]
struct ForegroundState {
	activities: HashSet<String>,
	last_left_ms: Option<i64>,
}

pub struct SessionTracker {
	current: RwLock<Option<Arc<ActiveSession>>>,
	foreground: Mutex<ForegroundState>,
	auto_track: bool,
	timeout: Duration,
	context: Arc<ContextState>,
	observers: Arc<ObserverRegistry>,
}

impl SessionTracker {
	pub fn new(
		auto_track: bool,
		timeout: Duration,
		context: Arc<ContextState>,
		observers: Arc<ObserverRegistry>,
	) -> Self {
		Self {
			current: RwLock::new(None),
			foreground: Mutex::new(ForegroundState::default()),
			auto_track,
			timeout,
			context,
			observers,
		}
	}

	/// Replaces the current session with a new one.
	///
	/// Automatic starts are ignored when automatic tracking is disabled. A veto
	/// from `on_session` still installs the session but marks it as not to be
	/// delivered.
	pub fn start_new_session(
		&self,
		started_at: DateTime<Utc>,
		user: User,
		auto_captured: bool,
		on_session: &CallbackChain<Session>,
	) -> Option<StartedSession> {
		if auto_captured && !self.auto_track {
			debug!("automatic session tracking disabled, not starting session");
			return None;
		}

		let mut session = Session::new(started_at, user, auto_captured);
		let deliver = on_session.run(&mut session);

		*self.current.write() = Some(Arc::new(ActiveSession::new(session.clone())));
		info!(session_id = %session.id, auto_captured, deliver, "session started");

		self.notify_started(&session);
		Some(StartedSession { session, deliver })
	}

	/// The current session, or `None` when there is none or it is paused.
	pub fn current_session(&self) -> Option<Session> {
		let active = self.current.read().clone()?;
		(!active.is_paused()).then(|| active.snapshot())
	}

	pub fn pause_session(&self) {
		if let Some(active) = self.current.read().as_ref() {
			active.paused.store(true, Ordering::SeqCst);
			debug!("session paused");
		}
		self.observers.notify(StateEvent::PauseSession);
	}

	/// Resumes a paused session. Starts a new one when there is none. Returns
	/// the session started, if any.
	pub fn resume_session(
		&self,
		now: DateTime<Utc>,
		user: User,
		on_session: &CallbackChain<Session>,
	) -> Option<StartedSession> {
		let existing = self.current.read().clone();
		match existing {
			Some(active) => {
				if active.paused.swap(false, Ordering::SeqCst) {
					debug!("session resumed");
					self.notify_started(&active.snapshot());
				}
				None
			}
			None => self.start_new_session(now, user, false, on_session),
		}
	}

	/// Counts a handled event against the current session and returns a
	/// copy of that session.
	pub fn increment_handled_and_copy(&self) -> Option<Session> {
		self.increment_and_copy(|session| session.events.handled += 1)
	}

	pub fn increment_unhandled_and_copy(&self) -> Option<Session> {
		self.increment_and_copy(|session| session.events.unhandled += 1)
	}

	fn increment_and_copy(&self, increment: impl FnOnce(&mut Session)) -> Option<Session> {
		// The session is captured before locking, so the increment and the
		// copy both belong to the session that was current at call time.
		let active = self.current.read().clone()?;
		if active.is_paused() {
			return None;
		}
		let mut session = active.session.lock();
		increment(&mut session);
		Some(session.clone())
	}

	/// Records an activity entering or leaving the foreground.
	///
	/// Returning to the foreground at least `timeout` after the app last left
	/// it starts a new automatic session.
	pub fn update_foreground_tracker(
		&self,
		activity: &str,
		entering: bool,
		now_ms: i64,
		on_session: &CallbackChain<Session>,
	) -> Option<StartedSession> {
		let timeout_ms = i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX);

		let start = {
			let mut state = self.foreground.lock();
			if entering {
				let was_background = state.activities.is_empty();
				state.activities.insert(activity.to_string());
				// The first entry only starts a session if none was started yet
				was_background
					&& match state.last_left_ms {
						Some(left) => now_ms.saturating_sub(left) >= timeout_ms,
						None => self.current.read().is_none(),
					}
			} else {
				state.activities.remove(activity);
				if state.activities.is_empty() {
					state.last_left_ms = Some(now_ms);
				}
				false
			}
		};

		let in_foreground = self.is_in_foreground();
		self.context
			.set_in_foreground(in_foreground, entering.then(|| activity.to_string()));

		if !start {
			return None;
		}
		let started_at = Utc
			.timestamp_millis_opt(now_ms)
			.single()
			.unwrap_or_else(Utc::now);
		self.start_new_session(started_at, self.context.user(), true, on_session)
	}

	pub fn is_in_foreground(&self) -> bool {
		!self.foreground.lock().activities.is_empty()
	}

	fn notify_started(&self, session: &Session) {
		self.observers.notify_with(|| StateEvent::StartSession {
			id: session.id,
			started_at: session.started_at,
			handled_count: session.handled_count(),
			unhandled_count: session.unhandled_count(),
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::ChainPolicy;
	use loom_crash_core::{AppWithState, DeviceWithState};
	use proptest::prelude::*;

	fn tracker(auto_track: bool, timeout_ms: u64) -> SessionTracker {
		let observers = Arc::new(ObserverRegistry::new());
		let context = Arc::new(ContextState::new(
			AppWithState::default(),
			DeviceWithState::default(),
			Arc::clone(&observers),
		));
		SessionTracker::new(
			auto_track,
			Duration::from_millis(timeout_ms),
			context,
			observers,
		)
	}

	fn chain() -> CallbackChain<Session> {
		CallbackChain::new("on_session", ChainPolicy::Halt)
	}

	#[test]
	fn no_session_is_valid() {
		let tracker = tracker(true, 30_000);
		assert!(tracker.current_session().is_none());
		assert!(tracker.increment_handled_and_copy().is_none());
	}

	#[test]
	fn new_session_resets_counts() {
		let tracker = tracker(true, 30_000);
		let callbacks = chain();
		let first = tracker
			.start_new_session(Utc::now(), User::default(), false, &callbacks)
			.unwrap();
		tracker.increment_handled_and_copy();
		tracker.increment_unhandled_and_copy();

		let second = tracker
			.start_new_session(Utc::now(), User::default(), false, &callbacks)
			.unwrap();
		assert_ne!(first.session.id, second.session.id);
		let current = tracker.current_session().unwrap();
		assert_eq!(current.id, second.session.id);
		assert_eq!(current.handled_count(), 0);
		assert_eq!(current.unhandled_count(), 0);
	}

	#[test]
	fn auto_start_ignored_when_tracking_disabled() {
		let tracker = tracker(false, 30_000);
		let callbacks = chain();
		assert!(tracker
			.start_new_session(Utc::now(), User::default(), true, &callbacks)
			.is_none());
		assert!(tracker
			.start_new_session(Utc::now(), User::default(), false, &callbacks)
			.is_some());
	}

	#[test]
	fn veto_installs_but_skips_delivery() {
		let tracker = tracker(true, 30_000);
		let callbacks = chain();
		callbacks.add(Arc::new(|_: &mut Session| false));
		let started = tracker
			.start_new_session(Utc::now(), User::default(), false, &callbacks)
			.unwrap();
		assert!(!started.deliver);
		assert_eq!(tracker.current_session().map(|s| s.id), Some(started.session.id));
	}

	#[test]
	fn callbacks_can_change_session_user() {
		let tracker = tracker(true, 30_000);
		let callbacks = chain();
		callbacks.add(Arc::new(|session: &mut Session| {
			session.user.id = Some("from-callback".to_string());
			true
		}));
		tracker.start_new_session(Utc::now(), User::default(), false, &callbacks);
		assert_eq!(
			tracker.current_session().and_then(|s| s.user.id),
			Some("from-callback".to_string())
		);
	}

	#[test]
	fn pause_and_resume() {
		let tracker = tracker(true, 30_000);
		let callbacks = chain();
		let started = tracker
			.start_new_session(Utc::now(), User::default(), false, &callbacks)
			.unwrap();

		tracker.pause_session();
		assert!(tracker.current_session().is_none());
		assert!(tracker.increment_handled_and_copy().is_none());

		assert!(tracker
			.resume_session(Utc::now(), User::default(), &callbacks)
			.is_none());
		assert_eq!(tracker.current_session().map(|s| s.id), Some(started.session.id));
	}

	#[test]
	fn resume_without_session_starts_one() {
		let tracker = tracker(true, 30_000);
		let started = tracker.resume_session(Utc::now(), User::default(), &chain());
		assert!(started.is_some());
		assert!(!started.unwrap().session.auto_captured);
	}

	#[test]
	fn timeout_boundary_is_inclusive() {
		let timeout = 30_000;
		let callbacks = chain();

		let at_boundary = tracker(true, timeout);
		assert!(at_boundary
			.update_foreground_tracker("Main", true, 1_000, &callbacks)
			.is_some());
		at_boundary.update_foreground_tracker("Main", false, 2_000, &callbacks);
		assert!(at_boundary
			.update_foreground_tracker("Main", true, 2_000 + timeout as i64, &callbacks)
			.is_some());

		let before_boundary = tracker(true, timeout);
		before_boundary.update_foreground_tracker("Main", true, 1_000, &callbacks);
		before_boundary.update_foreground_tracker("Main", false, 2_000, &callbacks);
		assert!(before_boundary
			.update_foreground_tracker("Main", true, 2_000 + timeout as i64 - 1, &callbacks)
			.is_none());
	}

	#[test]
	fn zero_timeout_starts_on_every_foreground() {
		let tracker = tracker(true, 0);
		let callbacks = chain();
		assert!(tracker.update_foreground_tracker("A", true, 10, &callbacks).is_some());
		tracker.update_foreground_tracker("A", false, 20, &callbacks);
		assert!(tracker.update_foreground_tracker("A", true, 20, &callbacks).is_some());
	}

	#[test]
	fn first_foreground_keeps_existing_session() {
		let tracker = tracker(true, 0);
		let callbacks = chain();
		let started = tracker
			.start_new_session(Utc::now(), User::default(), true, &callbacks)
			.unwrap();
		assert!(tracker.update_foreground_tracker("A", true, 10, &callbacks).is_none());
		assert_eq!(tracker.current_session().unwrap().id, started.session.id);
	}

	#[test]
	fn switching_activities_keeps_session() {
		let tracker = tracker(true, 0);
		let callbacks = chain();
		tracker.update_foreground_tracker("A", true, 10, &callbacks);
		assert!(tracker.update_foreground_tracker("B", true, 20, &callbacks).is_none());
		tracker.update_foreground_tracker("A", false, 30, &callbacks);
		assert!(tracker.is_in_foreground());
		assert_eq!(tracker.context.context().as_deref(), Some("B"));
	}

	proptest! {
		#![proptest_config(ProptestConfig::with_cases(16))]

		#[test]
		fn concurrent_increments_are_not_lost(
			threads in 1usize..8,
			handled in 0u32..200,
			unhandled in 0u32..200,
		) {
			let tracker = Arc::new(tracker(true, 30_000));
			tracker.start_new_session(Utc::now(), User::default(), false, &chain());

			let workers: Vec<_> = (0..threads)
				.map(|_| {
					let tracker = Arc::clone(&tracker);
					std::thread::spawn(move || {
						for _ in 0..handled {
							tracker.increment_handled_and_copy();
						}
						for _ in 0..unhandled {
							tracker.increment_unhandled_and_copy();
						}
					})
				})
				.collect();
			for worker in workers {
				worker.join().unwrap();
			}

			let session = tracker.current_session().unwrap();
			prop_assert_eq!(session.handled_count(), handled * threads as u32);
			prop_assert_eq!(session.unhandled_count(), unhandled * threads as u32);
		}
	}
}
