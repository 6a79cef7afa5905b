// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash reporting SDK for Rust applications.
//!
//! This crate captures handled errors and panics, enriches them with
//! breadcrumbs, metadata, feature flags and session counts, stores them on
//! disk and delivers them to a Bugsnag-compatible collector.
//!
//! # Quick Start
//!
//! ```ignore
//! use loom_crash::{BreadcrumbType, CrashClient, MetadataMap};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Initialize the crash client
//!     let crash = CrashClient::builder()
//!         .api_key("0123456789abcdef0123456789abcdef")
//!         .app_version(env!("CARGO_PKG_VERSION"))
//!         .release_stage("production")
//!         .build()?;
//!
//!     // Install panic hook for automatic crash reporting
//!     crash.install_panic_hook();
//!
//!     crash.set_user(Some("user_123".into()), Some("user@example.com".into()), None);
//!     crash.add_metadata("server", "name", "web-01".into());
//!     crash.leave_breadcrumb_with("Application started", BreadcrumbType::State, MetadataMap::new());
//!
//!     // Manual capture (for recoverable errors)
//!     if let Err(e) = risky_operation() {
//!         crash.notify(&e);
//!     }
//!
//!     crash.mark_launch_completed();
//!
//!     // Shutdown gracefully
//!     crash.shutdown().await?;
//!     Ok(())
//! }
//!
//! fn risky_operation() -> Result<(), std::io::Error> {
//!     Ok(())
//! }
//! ```
//!
//! # Delivery
//!
//! Every event is written to the persistence directory before delivery is
//! attempted. A background task started by [`CrashClientBuilder::build`]
//! sends queued files; files that could not be sent stay on disk and are
//! replayed by the next [`CrashClient::flush`] or the next client. Events
//! recorded by the panic hook are only written, never sent from the hook.
//!
//! # Configuration
//!
//! [`CrashConfig`] can be built in code, loaded from TOML with
//! [`CrashConfig::from_toml_file`], and overridden from `LOOM_CRASH_*`
//! environment variables with [`CrashConfig::apply_env_overrides`].

mod backtrace;
mod breadcrumb_state;
mod callbacks;
mod client;
mod config;
mod context_state;
mod delivery;
mod dispatcher;
mod error;
mod event_builder;
mod metadata_state;
mod observer;
mod panic_hook;
mod session;
mod store;
mod worker;

pub use backtrace::{capture_stacktrace, parse_backtrace};
pub use callbacks::{
	Callback, OnBreadcrumbCallback, OnErrorCallback, OnSendCallback, OnSessionCallback,
};
pub use client::{CrashClient, CrashClientBuilder};
pub use config::{
	CrashConfig, RuntimeConfig, DEFAULT_MAX_BREADCRUMBS, DEFAULT_NOTIFY_ENDPOINT,
	DEFAULT_SESSIONS_ENDPOINT, MAX_BREADCRUMBS_LIMIT,
};
pub use delivery::{
	Delivery, DeliveryParams, DeliveryStatus, HttpDelivery, LegacyDelivery,
	LegacyDeliveryAdapter, HEADER_API_KEY, HEADER_PAYLOAD_VERSION, HEADER_SENT_AT,
};
pub use dispatcher::FlushSummary;
pub use error::{
	ConfigError, CrashSdkError, DeliveryError, LegacyDeliveryError, Result, StoreError,
};
pub use event_builder::short_type_name;
pub use observer::{Observer, StateEvent};
pub use store::STARTUP_SUFFIX;

pub use loom_common_http::RetryConfig;

// Re-export core types for convenience
pub use loom_crash_core::{
	AppWithState, Breadcrumb, BreadcrumbType, DeviceWithState, Event, Exception, FeatureFlag,
	FeatureFlags, Frame, MetadataMap, Notifier, Session, SessionId, Severity, SeverityReason,
	SeverityReasonType, Stacktrace, Thread, ThreadSendPolicy, User,
};
