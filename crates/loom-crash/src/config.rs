// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client configuration.
//!
//! [`CrashConfig`] is the user-facing form. It can be loaded from TOML,
//! overridden from `LOOM_CRASH_*` environment variables and is validated into
//! an immutable [`RuntimeConfig`] when the client is built.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use loom_common_http::RetryConfig;
use loom_crash_core::{BreadcrumbType, Notifier, PatternSet, Redactor, ThreadSendPolicy};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ConfigError;

pub const DEFAULT_NOTIFY_ENDPOINT: &str = "https://notify.bugsnag.com";
pub const DEFAULT_SESSIONS_ENDPOINT: &str = "https://sessions.bugsnag.com";
pub const DEFAULT_MAX_BREADCRUMBS: usize = 100;
pub const MAX_BREADCRUMBS_LIMIT: usize = 500;

const ENV_PREFIX: &str = "LOOM_CRASH_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
	pub api_key: String,
	pub notify_endpoint: String,
	pub sessions_endpoint: String,
	pub app_version: Option<String>,
	pub app_type: String,
	pub release_stage: String,
	/// Release stages that report. `None` reports from every stage.
	pub enabled_release_stages: Option<Vec<String>>,
	pub auto_detect_errors: bool,
	pub auto_track_sessions: bool,
	pub session_timeout_ms: u64,
	pub send_threads: ThreadSendPolicy,
	pub max_breadcrumbs: usize,
	/// Breadcrumb types that are recorded. `None` records every type.
	pub enabled_breadcrumb_types: Option<Vec<BreadcrumbType>>,
	/// Case-insensitive globs of metadata keys to redact.
	pub redacted_keys: Vec<String>,
	/// Case-insensitive globs of error classes that are never reported.
	pub discard_classes: Vec<String>,
	/// Module path prefixes whose frames are marked in-project.
	pub project_packages: Vec<String>,
	pub max_persisted_events: usize,
	pub max_persisted_sessions: usize,
	pub max_string_value_length: usize,
	pub launch_duration_ms: u64,
	pub max_stored_event_age_days: u32,
	pub request_timeout_ms: u64,
	pub delivery_queue_capacity: usize,
	pub persistence_dir: Option<PathBuf>,
	pub auto_grouping_hash: bool,
	pub notifier: Notifier,
}

impl Default for CrashConfig {
	fn default() -> Self {
		Self {
			api_key: String::new(),
			notify_endpoint: DEFAULT_NOTIFY_ENDPOINT.to_string(),
			sessions_endpoint: DEFAULT_SESSIONS_ENDPOINT.to_string(),
			app_version: None,
			app_type: "rust".to_string(),
			release_stage: "production".to_string(),
			enabled_release_stages: None,
			auto_detect_errors: true,
			auto_track_sessions: true,
			session_timeout_ms: 30_000,
			send_threads: ThreadSendPolicy::Always,
			max_breadcrumbs: DEFAULT_MAX_BREADCRUMBS,
			enabled_breadcrumb_types: None,
			redacted_keys: vec!["password".to_string()],
			discard_classes: Vec::new(),
			project_packages: Vec::new(),
			max_persisted_events: 32,
			max_persisted_sessions: 128,
			max_string_value_length: 10_000,
			launch_duration_ms: 5_000,
			max_stored_event_age_days: 60,
			request_timeout_ms: 30_000,
			delivery_queue_capacity: 128,
			persistence_dir: None,
			auto_grouping_hash: false,
			notifier: Notifier::default(),
		}
	}
}

impl CrashConfig {
	pub fn new(api_key: impl Into<String>) -> Self {
		Self {
			api_key: api_key.into(),
			..Self::default()
		}
	}

	pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(contents)?)
	}

	pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
		let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		debug!(path = %path.display(), "loaded crash config file");
		Self::from_toml_str(&contents)
	}

	/// Applies `LOOM_CRASH_*` environment variables on top of this config.
	pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
		self.apply_overrides_from(|name| std::env::var(name).ok())
	}

	/// Applies overrides read through `lookup`, which receives full variable
	/// names such as `LOOM_CRASH_API_KEY`. Empty values are ignored.
	pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let get = |key: &str| lookup(&format!("{ENV_PREFIX}{key}")).filter(|v| !v.is_empty());

		if let Some(v) = get("API_KEY") {
			self.api_key = v;
		}
		if let Some(v) = get("NOTIFY_ENDPOINT") {
			self.notify_endpoint = v;
		}
		if let Some(v) = get("SESSIONS_ENDPOINT") {
			self.sessions_endpoint = v;
		}
		if let Some(v) = get("APP_VERSION") {
			self.app_version = Some(v);
		}
		if let Some(v) = get("RELEASE_STAGE") {
			self.release_stage = v;
		}
		if let Some(v) = get("ENABLED_RELEASE_STAGES") {
			self.enabled_release_stages = Some(split_list(&v));
		}
		if let Some(v) = get("AUTO_DETECT_ERRORS") {
			self.auto_detect_errors = parse_bool("AUTO_DETECT_ERRORS", &v)?;
		}
		if let Some(v) = get("AUTO_TRACK_SESSIONS") {
			self.auto_track_sessions = parse_bool("AUTO_TRACK_SESSIONS", &v)?;
		}
		if let Some(v) = get("SESSION_TIMEOUT_MS") {
			self.session_timeout_ms = parse_num("SESSION_TIMEOUT_MS", &v)?;
		}
		if let Some(v) = get("SEND_THREADS") {
			self.send_threads = v.parse().map_err(|_| ConfigError::InvalidValue {
				field: "send_threads".to_string(),
				message: format!("unknown policy '{v}'"),
			})?;
		}
		if let Some(v) = get("MAX_BREADCRUMBS") {
			self.max_breadcrumbs = parse_num("MAX_BREADCRUMBS", &v)?;
		}
		if let Some(v) = get("REDACTED_KEYS") {
			self.redacted_keys = split_list(&v);
		}
		if let Some(v) = get("PERSISTENCE_DIR") {
			self.persistence_dir = Some(PathBuf::from(v));
		}
		if let Some(v) = get("REQUEST_TIMEOUT_MS") {
			self.request_timeout_ms = parse_num("REQUEST_TIMEOUT_MS", &v)?;
		}
		Ok(())
	}

	/// Checks the configuration and resolves it into its runtime form.
	pub fn validate(&self) -> Result<RuntimeConfig, ConfigError> {
		let api_key = self.api_key.trim();
		if api_key.is_empty() {
			return Err(ConfigError::MissingField("api_key".to_string()));
		}
		if api_key.len() != 32 || !api_key.chars().all(|c| c.is_ascii_hexdigit()) {
			warn!("api key is not a 32 character hex string, events may be rejected");
		}

		for (field, url) in [
			("notify_endpoint", &self.notify_endpoint),
			("sessions_endpoint", &self.sessions_endpoint),
		] {
			if !(url.starts_with("http://") || url.starts_with("https://")) {
				return Err(ConfigError::InvalidValue {
					field: field.to_string(),
					message: format!("'{url}' is not an http(s) URL"),
				});
			}
		}

		let max_breadcrumbs = if self.max_breadcrumbs > MAX_BREADCRUMBS_LIMIT {
			warn!(
				max_breadcrumbs = self.max_breadcrumbs,
				limit = MAX_BREADCRUMBS_LIMIT,
				"max_breadcrumbs out of range, using default"
			);
			DEFAULT_MAX_BREADCRUMBS
		} else {
			self.max_breadcrumbs
		};

		let redacted_keys =
			PatternSet::from_globs(&self.redacted_keys).map_err(|source| ConfigError::InvalidPattern {
				field: "redacted_keys".to_string(),
				source,
			})?;
		let discard_classes = PatternSet::from_globs(&self.discard_classes).map_err(|source| {
			ConfigError::InvalidPattern {
				field: "discard_classes".to_string(),
				source,
			}
		})?;

		let persistence_dir = self
			.persistence_dir
			.clone()
			.or_else(|| dirs::cache_dir().map(|dir| dir.join("loom").join("crash")))
			.unwrap_or_else(|| std::env::temp_dir().join("loom-crash"));

		Ok(RuntimeConfig {
			api_key: api_key.to_string(),
			notify_endpoint: self.notify_endpoint.trim_end_matches('/').to_string(),
			sessions_endpoint: self.sessions_endpoint.trim_end_matches('/').to_string(),
			app_version: self.app_version.clone(),
			app_type: self.app_type.clone(),
			release_stage: self.release_stage.clone(),
			enabled_release_stages: self
				.enabled_release_stages
				.as_ref()
				.map(|stages| stages.iter().cloned().collect()),
			auto_detect_errors: self.auto_detect_errors,
			auto_track_sessions: self.auto_track_sessions,
			session_timeout: Duration::from_millis(self.session_timeout_ms),
			send_threads: self.send_threads,
			max_breadcrumbs,
			enabled_breadcrumb_types: self
				.enabled_breadcrumb_types
				.as_ref()
				.map(|types| types.iter().copied().collect()),
			redactor: Arc::new(Redactor::new(redacted_keys)),
			discard_classes,
			project_packages: self.project_packages.clone(),
			max_persisted_events: self.max_persisted_events.max(1),
			max_persisted_sessions: self.max_persisted_sessions.max(1),
			max_string_value_length: self.max_string_value_length,
			launch_duration: Duration::from_millis(self.launch_duration_ms),
			max_stored_event_age: chrono::Duration::days(i64::from(self.max_stored_event_age_days)),
			request_timeout: Duration::from_millis(self.request_timeout_ms),
			delivery_queue_capacity: self.delivery_queue_capacity.max(1),
			persistence_dir,
			auto_grouping_hash: self.auto_grouping_hash,
			notifier: self.notifier.clone(),
			retry: RetryConfig::default(),
		})
	}
}

fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" => Ok(true),
		"0" | "false" | "no" => Ok(false),
		_ => Err(ConfigError::InvalidValue {
			field: format!("{ENV_PREFIX}{key}"),
			message: format!("invalid boolean '{value}'"),
		}),
	}
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
	value.parse().map_err(|_| ConfigError::InvalidValue {
		field: format!("{ENV_PREFIX}{key}"),
		message: format!("invalid number '{value}'"),
	})
}

/// Validated, immutable configuration shared by every part of the client.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
	pub api_key: String,
	pub notify_endpoint: String,
	pub sessions_endpoint: String,
	pub app_version: Option<String>,
	pub app_type: String,
	pub release_stage: String,
	pub enabled_release_stages: Option<HashSet<String>>,
	pub auto_detect_errors: bool,
	pub auto_track_sessions: bool,
	pub session_timeout: Duration,
	pub send_threads: ThreadSendPolicy,
	pub max_breadcrumbs: usize,
	pub enabled_breadcrumb_types: Option<HashSet<BreadcrumbType>>,
	pub redactor: Arc<Redactor>,
	pub discard_classes: PatternSet,
	pub project_packages: Vec<String>,
	pub max_persisted_events: usize,
	pub max_persisted_sessions: usize,
	pub max_string_value_length: usize,
	pub launch_duration: Duration,
	pub max_stored_event_age: chrono::Duration,
	pub request_timeout: Duration,
	pub delivery_queue_capacity: usize,
	pub persistence_dir: PathBuf,
	pub auto_grouping_hash: bool,
	pub notifier: Notifier,
	pub retry: RetryConfig,
}

impl RuntimeConfig {
	/// False when the current release stage is excluded from reporting.
	pub fn should_notify_for_release_stage(&self) -> bool {
		self.enabled_release_stages
			.as_ref()
			.is_none_or(|stages| stages.contains(&self.release_stage))
	}

	pub fn should_record_breadcrumb_type(&self, breadcrumb_type: BreadcrumbType) -> bool {
		self.enabled_breadcrumb_types
			.as_ref()
			.is_none_or(|types| types.contains(&breadcrumb_type))
	}

	pub fn events_dir(&self) -> PathBuf {
		self.persistence_dir.join("events")
	}

	pub fn sessions_dir(&self) -> PathBuf {
		self.persistence_dir.join("sessions")
	}
}
