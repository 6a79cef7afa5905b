// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash client for capturing errors, tracking sessions and delivering both.

use std::error::Error as StdError;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use loom_common_http::RetryConfig;
use loom_crash_core::{
	compute_fingerprint, AppWithState, Breadcrumb, BreadcrumbType, DeviceWithState, Event,
	Exception, FeatureFlags, MetadataMap, Notifier, Session, SeverityReason, SeverityReasonType,
	ThreadSendPolicy, User,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::breadcrumb_state::BreadcrumbState;
use crate::callbacks::{
	CallbackState, OnBreadcrumbCallback, OnErrorCallback, OnSendCallback, OnSessionCallback,
};
use crate::config::{CrashConfig, RuntimeConfig, MAX_BREADCRUMBS_LIMIT};
use crate::context_state::ContextState;
use crate::delivery::{Delivery, HttpDelivery, LegacyDelivery, LegacyDeliveryAdapter};
use crate::dispatcher::{FlushSummary, Pipeline};
use crate::error::{CrashSdkError, Result};
use crate::event_builder::{
	build_event, exceptions_from_error, short_type_name, stacktrace_here, EventContext,
};
use crate::metadata_state::MetadataState;
use crate::observer::{Observer, ObserverRegistry, StateEvent};
use crate::panic_hook::{catch_user_panic, install_panic_hook};
use crate::session::{SessionTracker, StartedSession};
use crate::worker::{DeliveryJob, DeliveryWorker};

/// SDK version for identification.
const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");
/// SDK name for identification.
const SDK_NAME: &str = "loom-crash-rust";

/// Builder for constructing a CrashClient.
///
/// Starts from [`CrashConfig::default`]; every setter mirrors a config field.
pub struct CrashClientBuilder {
	config: CrashConfig,
	retry_config: Option<RetryConfig>,
	delivery: Option<Arc<dyn Delivery>>,
	callbacks: CallbackState,
	app: AppWithState,
	device: DeviceWithState,
}

impl CrashClientBuilder {
	/// Creates a new builder with default settings.
	pub fn new() -> Self {
		Self::from_config(CrashConfig::default())
	}

	/// Starts from a loaded configuration, e.g. from
	/// [`CrashConfig::from_toml_file`].
	pub fn from_config(config: CrashConfig) -> Self {
		Self {
			config,
			retry_config: None,
			delivery: None,
			callbacks: CallbackState::default(),
			app: AppWithState::default(),
			device: default_device(),
		}
	}

	/// Sets the project API key (32 hex characters).
	pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
		self.config.api_key = api_key.into();
		self
	}

	pub fn notify_endpoint(mut self, url: impl Into<String>) -> Self {
		self.config.notify_endpoint = url.into();
		self
	}

	pub fn sessions_endpoint(mut self, url: impl Into<String>) -> Self {
		self.config.sessions_endpoint = url.into();
		self
	}

	/// Sets the app version reported with every event.
	///
	/// Example: `1.2.3` or `git commit SHA`
	pub fn app_version(mut self, version: impl Into<String>) -> Self {
		self.config.app_version = Some(version.into());
		self
	}

	pub fn app_type(mut self, app_type: impl Into<String>) -> Self {
		self.config.app_type = app_type.into();
		self
	}

	/// Sets the release stage.
	///
	/// Example: `production`, `staging`, `development`
	pub fn release_stage(mut self, stage: impl Into<String>) -> Self {
		self.config.release_stage = stage.into();
		self
	}

	/// Limits reporting to these release stages.
	pub fn enabled_release_stages<I, S>(mut self, stages: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.enabled_release_stages = Some(stages.into_iter().map(Into::into).collect());
		self
	}

	/// Whether [`CrashClient::install_panic_hook`] installs the hook.
	pub fn auto_detect_errors(mut self, enabled: bool) -> Self {
		self.config.auto_detect_errors = enabled;
		self
	}

	/// Enables or disables automatic session tracking.
	///
	/// When enabled (default), a session is started when the client is built
	/// and whenever the app returns to the foreground after the session
	/// timeout.
	pub fn auto_track_sessions(mut self, enabled: bool) -> Self {
		self.config.auto_track_sessions = enabled;
		self
	}

	pub fn session_timeout(mut self, timeout: Duration) -> Self {
		self.config.session_timeout_ms = duration_ms(timeout);
		self
	}

	pub fn send_threads(mut self, policy: ThreadSendPolicy) -> Self {
		self.config.send_threads = policy;
		self
	}

	/// Sets the maximum number of breadcrumbs to keep.
	pub fn max_breadcrumbs(mut self, max: usize) -> Self {
		self.config.max_breadcrumbs = max;
		self
	}

	pub fn enabled_breadcrumb_types<I>(mut self, types: I) -> Self
	where
		I: IntoIterator<Item = BreadcrumbType>,
	{
		self.config.enabled_breadcrumb_types = Some(types.into_iter().collect());
		self
	}

	/// Replaces the redacted key globs. The default redacts `password`.
	pub fn redacted_keys<I, S>(mut self, keys: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.redacted_keys = keys.into_iter().map(Into::into).collect();
		self
	}

	pub fn discard_classes<I, S>(mut self, classes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.discard_classes = classes.into_iter().map(Into::into).collect();
		self
	}

	/// Module path prefixes whose frames are marked in-project.
	pub fn project_packages<I, S>(mut self, packages: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.config.project_packages = packages.into_iter().map(Into::into).collect();
		self
	}

	pub fn max_persisted_events(mut self, max: usize) -> Self {
		self.config.max_persisted_events = max;
		self
	}

	pub fn max_persisted_sessions(mut self, max: usize) -> Self {
		self.config.max_persisted_sessions = max;
		self
	}

	pub fn max_string_value_length(mut self, max: usize) -> Self {
		self.config.max_string_value_length = max;
		self
	}

	/// How long after start events count as launch crashes. Zero keeps the
	/// launch window open until [`CrashClient::mark_launch_completed`].
	pub fn launch_duration(mut self, duration: Duration) -> Self {
		self.config.launch_duration_ms = duration_ms(duration);
		self
	}

	pub fn max_stored_event_age_days(mut self, days: u32) -> Self {
		self.config.max_stored_event_age_days = days;
		self
	}

	/// Sets the HTTP request timeout.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.config.request_timeout_ms = duration_ms(timeout);
		self
	}

	pub fn delivery_queue_capacity(mut self, capacity: usize) -> Self {
		self.config.delivery_queue_capacity = capacity;
		self
	}

	pub fn persistence_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.persistence_dir = Some(dir.into());
		self
	}

	pub fn auto_grouping_hash(mut self, enabled: bool) -> Self {
		self.config.auto_grouping_hash = enabled;
		self
	}

	pub fn notifier(mut self, notifier: Notifier) -> Self {
		self.config.notifier = notifier;
		self
	}

	/// Sets the retry configuration.
	pub fn retry_config(mut self, config: RetryConfig) -> Self {
		self.retry_config = Some(config);
		self
	}

	/// Replaces HTTP delivery.
	pub fn delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
		self.delivery = Some(delivery);
		self
	}

	/// Replaces HTTP delivery with a blocking [`LegacyDelivery`].
	pub fn legacy_delivery<D: LegacyDelivery>(self, delivery: D) -> Self {
		self.delivery(Arc::new(LegacyDeliveryAdapter::new(delivery)))
	}

	/// Registers an on-error callback before the client starts.
	pub fn on_error<F>(self, callback: F) -> Self
	where
		F: Fn(&mut Event) -> bool + Send + Sync + 'static,
	{
		self.callbacks.on_error.add(Arc::new(callback));
		self
	}

	pub fn on_breadcrumb<F>(self, callback: F) -> Self
	where
		F: Fn(&mut Breadcrumb) -> bool + Send + Sync + 'static,
	{
		self.callbacks.on_breadcrumb.add(Arc::new(callback));
		self
	}

	/// Registers an on-session callback. It also sees the session started
	/// automatically by [`Self::build`].
	pub fn on_session<F>(self, callback: F) -> Self
	where
		F: Fn(&mut Session) -> bool + Send + Sync + 'static,
	{
		self.callbacks.on_session.add(Arc::new(callback));
		self
	}

	/// Registers an on-send callback. It also sees events replayed from the
	/// previous run when the client starts.
	pub fn on_send<F>(self, callback: F) -> Self
	where
		F: Fn(&mut Event) -> bool + Send + Sync + 'static,
	{
		self.callbacks.on_send.add(Arc::new(callback));
		self
	}

	/// Initial app snapshot. Fields left empty are filled from the config.
	pub fn app(mut self, app: AppWithState) -> Self {
		self.app = app;
		self
	}

	pub fn device(mut self, device: DeviceWithState) -> Self {
		self.device = device;
		self
	}

	/// Builds the CrashClient.
	///
	/// Inside a tokio runtime this starts the delivery worker and queues a
	/// flush of whatever the previous run left on disk.
	pub fn build(self) -> Result<CrashClient> {
		let mut runtime_config = self.config.validate()?;
		if let Some(retry) = self.retry_config {
			runtime_config.retry = retry;
		}
		let config = Arc::new(runtime_config);

		let delivery = match self.delivery {
			Some(delivery) => delivery,
			None => {
				let http_client = loom_common_http::builder(SDK_NAME, SDK_VERSION)
					.timeout(config.request_timeout)
					.build()?;
				Arc::new(HttpDelivery::new(http_client, config.retry.clone())) as Arc<dyn Delivery>
			}
		};

		let observers = Arc::new(ObserverRegistry::new());
		let context = Arc::new(ContextState::new(
			self.app,
			self.device,
			Arc::clone(&observers),
		));
		let callbacks = Arc::new(self.callbacks);
		let pipeline = Arc::new(Pipeline::new(
			Arc::clone(&config),
			delivery,
			Arc::clone(&callbacks),
			Arc::clone(&context),
		)?);
		let worker = DeliveryWorker::spawn(Arc::clone(&pipeline), config.delivery_queue_capacity);
		worker.enqueue(DeliveryJob::Flush(None));

		let inner = Arc::new(CrashClientInner {
			metadata: MetadataState::new(Arc::clone(&observers)),
			breadcrumbs: BreadcrumbState::new(config.max_breadcrumbs),
			sessions: SessionTracker::new(
				config.auto_track_sessions,
				config.session_timeout,
				Arc::clone(&context),
				Arc::clone(&observers),
			),
			config,
			observers,
			context,
			callbacks,
			pipeline,
			worker,
			started: Instant::now(),
			launch_completed: AtomicBool::new(false),
			closed: AtomicBool::new(false),
		});

		info!(
			release_stage = %inner.config.release_stage,
			persistence_dir = %inner.config.persistence_dir.display(),
			background_delivery = inner.worker.is_running(),
			"Crash client initialized"
		);

		let client = CrashClient { inner };
		if client.inner.config.auto_track_sessions {
			let started = client.inner.sessions.start_new_session(
				Utc::now(),
				client.inner.context.user(),
				true,
				&client.inner.callbacks.on_session,
			);
			client.inner.track_session(started);
		}
		Ok(client)
	}
}

impl Default for CrashClientBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn duration_ms(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn default_device() -> DeviceWithState {
	let mut device = DeviceWithState {
		os_name: Some(std::env::consts::OS.to_string()),
		cpu_abi: vec![std::env::consts::ARCH.to_string()],
		..DeviceWithState::default()
	};
	device
		.runtime_versions
		.insert("loomCrash".to_string(), SDK_VERSION.to_string());
	device
}

/// Internal client state.
pub struct CrashClientInner {
	config: Arc<RuntimeConfig>,
	observers: Arc<ObserverRegistry>,
	context: Arc<ContextState>,
	metadata: MetadataState,
	breadcrumbs: BreadcrumbState,
	callbacks: Arc<CallbackState>,
	sessions: SessionTracker,
	pipeline: Arc<Pipeline>,
	worker: DeliveryWorker,
	started: Instant,
	launch_completed: AtomicBool,
	closed: AtomicBool,
}

impl CrashClientInner {
	pub(crate) fn config(&self) -> &RuntimeConfig {
		&self.config
	}

	pub(crate) fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn is_launching(&self) -> bool {
		if self.launch_completed.load(Ordering::SeqCst) {
			return false;
		}
		self.config.launch_duration.is_zero() || self.started.elapsed() < self.config.launch_duration
	}

	fn event_context(&self) -> EventContext {
		let mut app = self.context.app();
		app.duration = Some(duration_ms(self.started.elapsed()));
		EventContext {
			breadcrumbs: self.breadcrumbs.copy(),
			metadata: self.metadata.copy(),
			feature_flags: self.context.feature_flags(),
			user: self.context.user(),
			app,
			device: self.context.device(),
			context: self.context.context(),
		}
	}

	/// Runs an error through the capture pipeline and persists it.
	///
	/// Returns the stored file, or `None` when the event was gated, discarded,
	/// vetoed or could not be written.
	pub(crate) fn record_event(
		&self,
		exceptions: Vec<Exception>,
		reason: SeverityReason,
		on_error: impl FnOnce(&mut Event) -> bool,
	) -> Option<PathBuf> {
		if self.is_closed() {
			debug!("crash client closed, ignoring event");
			return None;
		}
		if !self.config.should_notify_for_release_stage() {
			debug!(release_stage = %self.config.release_stage, "release stage disabled, ignoring event");
			return None;
		}

		let launching = self.is_launching();
		let mut event = build_event(&self.config, exceptions, reason, self.event_context(), launching)?;
		let original_severity = event.severity();

		if !self.callbacks.on_error.run(&mut event) {
			debug!(error_class = event.error_class(), "event vetoed by on-error callback");
			return None;
		}
		let keep = catch_user_panic(|| on_error(&mut event)).unwrap_or_else(|_| {
			error!("on-error callback panicked");
			true
		});
		if !keep {
			debug!(error_class = event.error_class(), "event vetoed by callback");
			return None;
		}
		if event.severity() != original_severity {
			event.mark_severity_set_by_callback();
		}

		let unhandled = event.is_unhandled();
		let session = if unhandled {
			self.sessions.increment_unhandled_and_copy()
		} else {
			self.sessions.increment_handled_and_copy()
		};
		event.set_session(session.as_ref().map(Session::event_ref));
		self.observers.notify(if unhandled {
			StateEvent::NotifyUnhandled
		} else {
			StateEvent::NotifyHandled
		});

		self.leave_error_breadcrumb(&event);

		if self.config.auto_grouping_hash && event.grouping_hash().is_none() {
			event.set_grouping_hash(Some(compute_fingerprint(&event)));
		}
		let trimmed = event.trim_metadata_strings(self.config.max_string_value_length);
		if trimmed.items_trimmed > 0 {
			debug!(
				items = trimmed.items_trimmed,
				chars = trimmed.chars_trimmed,
				"trimmed long metadata strings"
			);
		}

		let path = self.pipeline.events().write_event(&event, launching)?;
		info!(
			error_class = event.error_class(),
			unhandled,
			severity = %event.severity().as_str(),
			"Crash event captured"
		);
		Some(path)
	}

	fn notify(
		&self,
		exceptions: Vec<Exception>,
		reason: SeverityReason,
		on_error: impl FnOnce(&mut Event) -> bool,
	) -> bool {
		match self.record_event(exceptions, reason, on_error) {
			Some(path) => {
				if self.pipeline.events().files().claim(&path) {
					self.worker.enqueue(DeliveryJob::Event(path));
				}
				true
			}
			None => false,
		}
	}

	fn leave_error_breadcrumb(&self, event: &Event) {
		let mut metadata = MetadataMap::new();
		metadata.insert("errorClass".to_string(), json!(event.error_class()));
		if let Some(message) = event.error_message() {
			metadata.insert("message".to_string(), json!(message));
		}
		metadata.insert("unhandled".to_string(), json!(event.is_unhandled()));
		metadata.insert("severity".to_string(), json!(event.severity().as_str()));
		self.add_breadcrumb(
			Breadcrumb::new(event.error_class(), BreadcrumbType::Error).with_metadata(metadata),
		);
	}

	fn add_breadcrumb(&self, mut breadcrumb: Breadcrumb) {
		if !self.config.should_record_breadcrumb_type(breadcrumb.breadcrumb_type) {
			debug!(breadcrumb_type = %breadcrumb.breadcrumb_type, "breadcrumb type disabled");
			return;
		}
		if !self.callbacks.on_breadcrumb.run(&mut breadcrumb) {
			debug!("breadcrumb vetoed by callback");
			return;
		}
		self.observers.notify_with(|| StateEvent::AddBreadcrumb {
			message: breadcrumb.message.clone(),
			breadcrumb_type: breadcrumb.breadcrumb_type,
			timestamp: breadcrumb.timestamp,
			metadata: breadcrumb.metadata.clone(),
		});
		self.breadcrumbs.add(breadcrumb);
	}

	/// Persists and queues a newly started session unless it was vetoed or the
	/// release stage is disabled.
	fn track_session(&self, started: Option<StartedSession>) {
		let Some(started) = started else {
			return;
		};
		if !started.deliver {
			debug!(session_id = %started.session.id, "session vetoed, tracking locally only");
			return;
		}
		if !self.config.should_notify_for_release_stage() {
			return;
		}
		if let Some(path) = self.pipeline.sessions().write_session(&started.session) {
			if self.pipeline.sessions().files().claim(&path) {
				self.worker.enqueue(DeliveryJob::Session(path));
			}
		}
	}

	/// Records an unhandled panic. The event is persisted and left for the
	/// next flush; the process may be about to exit.
	pub(crate) fn record_panic(
		&self,
		message: String,
		location: Option<String>,
		stacktrace: loom_crash_core::Stacktrace,
	) -> Option<PathBuf> {
		let exceptions = vec![Exception::new("panic", Some(message)).with_stacktrace(stacktrace)];
		let thread = std::thread::current().name().map(str::to_string);
		self.record_event(
			exceptions,
			SeverityReason::new(SeverityReasonType::UnhandledException),
			move |event| {
				if let Some(location) = location {
					event.add_metadata("panic", "location", json!(location));
				}
				if let Some(thread) = thread {
					event.add_metadata("panic", "thread", json!(thread));
				}
				true
			},
		)
	}
}

/// Client for capturing crash events and reporting them.
///
/// Capture and state APIs are synchronous and never fail: invalid input is
/// logged and ignored. Events are written to disk before they are handed to
/// the background delivery worker, so an undelivered event survives a
/// restart.
///
/// # Example
///
/// ```ignore
/// use loom_crash::CrashClient;
///
/// let client = CrashClient::builder()
///     .api_key("0123456789abcdef0123456789abcdef")
///     .app_version(env!("CARGO_PKG_VERSION"))
///     .release_stage("production")
///     .build()?;
///
/// // Install panic hook for automatic crash reporting
/// client.install_panic_hook();
///
/// client.set_user(Some(user.id.to_string()), Some(user.email.clone()), None);
/// client.leave_breadcrumb("GET /api/users");
///
/// // Manual capture
/// if let Err(e) = do_something() {
///     client.notify(&e);
/// }
///
/// client.shutdown().await?;
/// ```
#[derive(Clone)]
pub struct CrashClient {
	inner: Arc<CrashClientInner>,
}

impl CrashClient {
	/// Creates a new builder for constructing a CrashClient.
	pub fn builder() -> CrashClientBuilder {
		CrashClientBuilder::new()
	}

	/// The validated configuration in use.
	pub fn config(&self) -> &RuntimeConfig {
		&self.inner.config
	}

	/// Installs a panic hook for automatic crash reporting.
	///
	/// This should be called early in your application's startup. Panics are
	/// stored and delivered on the next flush, which runs when the next client
	/// is built. Does nothing when `auto_detect_errors` is off.
	pub fn install_panic_hook(&self) {
		if !self.inner.config.auto_detect_errors {
			info!("auto_detect_errors disabled, panic hook not installed");
			return;
		}
		install_panic_hook(Arc::clone(&self.inner));
		info!("Panic hook installed");
	}

	// Capture

	/// Reports a handled error. The error class is the error's type name.
	///
	/// Returns true when the event was kept for delivery.
	pub fn notify<E>(&self, error: &E) -> bool
	where
		E: StdError + 'static,
	{
		self.notify_with(error, |_| true)
	}

	/// Reports a handled error, running `on_error` after the global on-error
	/// callbacks. Returning false from `on_error` discards the event.
	pub fn notify_with<E, F>(&self, error: &E, on_error: F) -> bool
	where
		E: StdError + 'static,
		F: FnOnce(&mut Event) -> bool,
	{
		let class = short_type_name::<E>();
		let exceptions = exceptions_from_error(error, &class, stacktrace_here(&self.inner.config));
		self.inner.notify(
			exceptions,
			SeverityReason::new(SeverityReasonType::HandledException),
			on_error,
		)
	}

	/// Reports a handled error given by class and message.
	pub fn notify_message(&self, error_class: &str, message: impl Into<String>) -> bool {
		let exceptions = vec![Exception::new(error_class, Some(message.into()))
			.with_stacktrace(stacktrace_here(&self.inner.config))];
		self.inner.notify(
			exceptions,
			SeverityReason::new(SeverityReasonType::HandledException),
			|_| true,
		)
	}

	/// Reports a log message at `level` (`error`, `warn`, `info`, ...). The
	/// severity follows the level.
	pub fn notify_log(&self, level: &str, message: impl Into<String>) -> bool {
		let exceptions = vec![Exception::new("Log", Some(message.into()))
			.with_stacktrace(stacktrace_here(&self.inner.config))];
		self.inner.notify(exceptions, SeverityReason::log(level), |_| true)
	}

	/// Reports a prepared error chain with an explicit reason, e.g. one
	/// forwarded from another runtime.
	pub fn notify_exceptions<F>(
		&self,
		exceptions: Vec<Exception>,
		reason: SeverityReason,
		on_error: F,
	) -> bool
	where
		F: FnOnce(&mut Event) -> bool,
	{
		self.inner.notify(exceptions, reason, on_error)
	}

	// Breadcrumbs

	/// Leaves a manual breadcrumb.
	pub fn leave_breadcrumb(&self, message: impl Into<String>) {
		self.inner.add_breadcrumb(Breadcrumb::manual(message));
	}

	pub fn leave_breadcrumb_with(
		&self,
		message: impl Into<String>,
		breadcrumb_type: BreadcrumbType,
		metadata: MetadataMap,
	) {
		self.inner
			.add_breadcrumb(Breadcrumb::new(message, breadcrumb_type).with_metadata(metadata));
	}

	/// A copy of the current breadcrumbs, oldest first.
	pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
		self.inner.breadcrumbs.copy()
	}

	/// Clears all breadcrumbs.
	pub fn clear_breadcrumbs(&self) {
		self.inner.breadcrumbs.clear();
		self.inner.observers.notify(StateEvent::ClearBreadcrumbs);
	}

	/// Changes the breadcrumb capacity, dropping the oldest if it shrinks.
	pub fn set_max_breadcrumbs(&self, max: usize) {
		if max > MAX_BREADCRUMBS_LIMIT {
			warn!(max, limit = MAX_BREADCRUMBS_LIMIT, "ignoring max_breadcrumbs out of range");
			return;
		}
		self.inner.breadcrumbs.set_capacity(max);
	}

	// Metadata

	/// Adds a metadata value. A `null` value removes the key.
	pub fn add_metadata(&self, section: &str, key: &str, value: Value) {
		self.inner.metadata.add_value(section, key, value);
	}

	/// Merges a map into a section. `null` entries are stored as null.
	pub fn add_metadata_map(&self, section: &str, values: MetadataMap) {
		self.inner.metadata.add_map(section, values);
	}

	pub fn clear_metadata_section(&self, section: &str) {
		self.inner.metadata.clear_section(section);
	}

	pub fn clear_metadata(&self, section: &str, key: &str) {
		self.inner.metadata.clear_value(section, key);
	}

	pub fn metadata_section(&self, section: &str) -> Option<MetadataMap> {
		self.inner.metadata.get_section(section)
	}

	pub fn metadata(&self, section: &str, key: &str) -> Option<Value> {
		self.inner.metadata.get_value(section, key)
	}

	// Feature flags

	pub fn add_feature_flag(&self, name: &str, variant: Option<&str>) {
		self.inner
			.context
			.add_feature_flag(name, variant.map(str::to_string));
	}

	pub fn add_feature_flags<'a, I>(&self, flags: I)
	where
		I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
	{
		for (name, variant) in flags {
			self.add_feature_flag(name, variant);
		}
	}

	pub fn clear_feature_flag(&self, name: &str) {
		self.inner.context.clear_feature_flag(name);
	}

	pub fn clear_feature_flags(&self) {
		self.inner.context.clear_feature_flags();
	}

	pub fn feature_flags(&self) -> FeatureFlags {
		self.inner.context.feature_flags()
	}

	// User, context, app and device

	/// Sets the user attached to events and new sessions.
	pub fn set_user(&self, id: Option<String>, email: Option<String>, name: Option<String>) {
		self.inner.context.set_user(User::new(id, email, name));
	}

	pub fn user(&self) -> User {
		self.inner.context.user()
	}

	pub fn set_context(&self, context: Option<String>) {
		self.inner.context.set_context(context);
	}

	pub fn context(&self) -> Option<String> {
		self.inner.context.context()
	}

	pub fn update_app(&self, update: impl FnOnce(&mut AppWithState)) {
		self.inner.context.update_app(update);
	}

	pub fn update_device(&self, update: impl FnOnce(&mut DeviceWithState)) {
		self.inner.context.update_device(update);
	}

	// Callbacks

	/// Adds a callback run on every event before it is stored. Returning false
	/// discards the event. Returns the handle for [`Self::remove_on_error`].
	pub fn add_on_error<F>(&self, callback: F) -> OnErrorCallback
	where
		F: Fn(&mut Event) -> bool + Send + Sync + 'static,
	{
		let callback: OnErrorCallback = Arc::new(callback);
		self.inner.callbacks.on_error.add(Arc::clone(&callback));
		callback
	}

	pub fn remove_on_error(&self, callback: &OnErrorCallback) {
		self.inner.callbacks.on_error.remove(callback);
	}

	/// Read-only form of [`Self::add_on_error`].
	pub fn add_before_notify<F>(&self, callback: F) -> OnErrorCallback
	where
		F: Fn(&Event) -> bool + Send + Sync + 'static,
	{
		self.inner.callbacks.add_before_notify(callback)
	}

	pub fn add_on_breadcrumb<F>(&self, callback: F) -> OnBreadcrumbCallback
	where
		F: Fn(&mut Breadcrumb) -> bool + Send + Sync + 'static,
	{
		let callback: OnBreadcrumbCallback = Arc::new(callback);
		self.inner.callbacks.on_breadcrumb.add(Arc::clone(&callback));
		callback
	}

	pub fn remove_on_breadcrumb(&self, callback: &OnBreadcrumbCallback) {
		self.inner.callbacks.on_breadcrumb.remove(callback);
	}

	/// Adds a callback run when a session starts. Returning false keeps the
	/// session for local counts but does not send it.
	pub fn add_on_session<F>(&self, callback: F) -> OnSessionCallback
	where
		F: Fn(&mut Session) -> bool + Send + Sync + 'static,
	{
		let callback: OnSessionCallback = Arc::new(callback);
		self.inner.callbacks.on_session.add(Arc::clone(&callback));
		callback
	}

	pub fn remove_on_session(&self, callback: &OnSessionCallback) {
		self.inner.callbacks.on_session.remove(callback);
	}

	/// Adds a callback run on each stored event right before it is sent,
	/// including events from a previous run. Returning false deletes it.
	pub fn add_on_send<F>(&self, callback: F) -> OnSendCallback
	where
		F: Fn(&mut Event) -> bool + Send + Sync + 'static,
	{
		let callback: OnSendCallback = Arc::new(callback);
		self.inner.callbacks.on_send.add(Arc::clone(&callback));
		callback
	}

	pub fn remove_on_send(&self, callback: &OnSendCallback) {
		self.inner.callbacks.on_send.remove(callback);
	}

	/// Read-only form of [`Self::add_on_send`].
	pub fn add_before_send<F>(&self, callback: F) -> OnSendCallback
	where
		F: Fn(&Event) -> bool + Send + Sync + 'static,
	{
		self.inner.callbacks.add_before_send(callback)
	}

	/// Registers an observer of state changes.
	pub fn add_observer<F>(&self, observer: F) -> Arc<Observer>
	where
		F: Fn(&StateEvent) + Send + Sync + 'static,
	{
		let observer: Arc<Observer> = Arc::new(observer);
		self.inner.observers.add(Arc::clone(&observer));
		observer
	}

	pub fn remove_observer(&self, observer: &Arc<Observer>) {
		self.inner.observers.remove(observer);
	}

	// Sessions

	/// Starts a new session, replacing the current one.
	pub fn start_session(&self) {
		let started = self.inner.sessions.start_new_session(
			Utc::now(),
			self.inner.context.user(),
			false,
			&self.inner.callbacks.on_session,
		);
		self.inner.track_session(started);
	}

	/// Stops attaching the current session to events.
	pub fn pause_session(&self) {
		self.inner.sessions.pause_session();
	}

	/// Resumes the paused session, or starts one if there is none.
	pub fn resume_session(&self) {
		let started = self.inner.sessions.resume_session(
			Utc::now(),
			self.inner.context.user(),
			&self.inner.callbacks.on_session,
		);
		self.inner.track_session(started);
	}

	/// A snapshot of the current session. `None` when there is none or it is
	/// paused.
	pub fn current_session(&self) -> Option<Session> {
		self.inner.sessions.current_session()
	}

	/// Records a screen or window entering or leaving the foreground.
	pub fn update_foreground(&self, activity: &str, entering: bool) {
		let started = self.inner.sessions.update_foreground_tracker(
			activity,
			entering,
			Utc::now().timestamp_millis(),
			&self.inner.callbacks.on_session,
		);
		self.inner.track_session(started);
	}

	pub fn is_in_foreground(&self) -> bool {
		self.inner.sessions.is_in_foreground()
	}

	// Lifecycle

	/// Ends the launch window early.
	pub fn mark_launch_completed(&self) {
		self.inner.launch_completed.store(true, Ordering::SeqCst);
		debug!("launch marked completed");
	}

	pub fn is_launching(&self) -> bool {
		self.inner.is_launching()
	}

	/// Delivers every stored event and session now.
	pub async fn flush(&self) -> FlushSummary {
		self.inner.worker.flush().await
	}

	/// Shuts down the client after the queued deliveries finish.
	///
	/// Events and sessions still on disk are delivered by the next client.
	pub async fn shutdown(&self) -> Result<()> {
		if self.inner.closed.swap(true, Ordering::SeqCst) {
			return Ok(());
		}

		self.inner.worker.shutdown().await;

		info!("Crash client shutdown");
		Ok(())
	}

	/// Returns true if the client has been shut down.
	pub fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	/// Fails with [`CrashSdkError::ClientShutdown`] once the client is closed.
	pub fn check_closed(&self) -> Result<()> {
		if self.inner.is_closed() {
			return Err(CrashSdkError::ClientShutdown);
		}
		Ok(())
	}
}
