// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the crash event model.

use thiserror::Error;

/// Errors that can occur while building, parsing or serializing crash data.
#[derive(Debug, Error)]
pub enum CrashError {
	#[error("invalid severity: {0}")]
	InvalidSeverity(String),

	#[error("invalid severity reason: {0}")]
	InvalidSeverityReason(String),

	#[error("invalid breadcrumb type: {0}")]
	InvalidBreadcrumbType(String),

	#[error("invalid thread send policy: {0}")]
	InvalidThreadSendPolicy(String),

	#[error("invalid error type: {0}")]
	InvalidErrorType(String),

	#[error("invalid key pattern {pattern:?}: {source}")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("payload is empty or has no event fields")]
	EmptyPayload,

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type for crash model operations.
pub type Result<T> = std::result::Result<T, CrashError>;
