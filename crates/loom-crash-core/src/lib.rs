// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Loom crash reporting SDK.
//!
//! This crate holds the event model shared by the client pipeline and by
//! anything that reads its stored files: events and their error chains,
//! threads, breadcrumbs, metadata, sessions, and the wire JSON they are sent
//! and persisted as.
//!
//! # Overview
//!
//! - [`Event`] wraps [`EventData`] with validated setters for callbacks
//! - [`Metadata`] is a tab -> key -> value tree with deep [`Metadata::merge`]
//! - [`Redactor`] masks matching keys when an event is serialized
//! - [`Report`] and [`SessionPayload`] are the request bodies
//! - [`compute_fingerprint`] derives an optional client-side grouping hash

pub mod breadcrumb;
pub mod context;
pub mod error;
pub mod event;
pub mod feature_flag;
pub mod fingerprint;
pub mod metadata;
pub mod payload;
pub mod redaction;
pub mod serialize;
pub mod session;
pub mod severity;

pub use breadcrumb::{Breadcrumb, BreadcrumbType};
pub use context::{AppWithState, DeviceWithState, User};
pub use error::{CrashError, Result};
pub use event::{
	ErrorType, Event, EventData, Exception, Frame, Stacktrace, Thread, ThreadSendPolicy,
	MAX_STACKTRACE_FRAMES,
};
pub use feature_flag::{FeatureFlag, FeatureFlags};
pub use fingerprint::compute_fingerprint;
pub use metadata::{Metadata, MetadataMap, TrimMetrics};
pub use payload::{
	Notifier, Report, ReportEvent, SessionPayload, EVENT_PAYLOAD_VERSION, SESSION_PAYLOAD_VERSION,
};
pub use redaction::{KeyPattern, PatternSet, Redactor, REDACTED};
pub use session::{Session, SessionCounts, SessionId, SessionRef};
pub use severity::{Severity, SeverityReason, SeverityReasonType};
