// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the crash SDK.

use std::path::PathBuf;

use loom_common_http::{is_retryable_status, RetryableError};
use loom_crash_core::CrashError;
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for crash operations.
pub type Result<T> = std::result::Result<T, CrashSdkError>;

/// Errors returned by the client's setup and lifecycle APIs.
///
/// Capture and mutation APIs never return these: invalid input there is
/// logged and ignored.
#[derive(Debug, Error)]
pub enum CrashSdkError {
	/// The client has been shut down.
	#[error("crash client has been shut down")]
	ClientShutdown,

	/// The configuration was rejected.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// The HTTP client could not be constructed.
	#[error("failed to build HTTP client: {0}")]
	HttpClient(#[from] reqwest::Error),

	/// The persistence directory could not be prepared.
	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("I/O error reading {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("TOML parse error: {0}")]
	TomlParse(#[from] toml::de::Error),

	#[error("missing required field: {0}")]
	MissingField(String),

	#[error("invalid value for {field}: {message}")]
	InvalidValue { field: String, message: String },

	#[error("invalid pattern in {field}: {source}")]
	InvalidPattern {
		field: String,
		#[source]
		source: CrashError,
	},
}

/// Errors reading or writing stored payload files.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// The file exists but does not hold a usable payload. Callers decide
	/// whether to skip or remove it.
	#[error("corrupt payload file {path}: {source}")]
	Corrupt {
		path: PathBuf,
		#[source]
		source: CrashError,
	},

	#[error("serialization error: {0}")]
	Serialization(#[from] CrashError),
}

/// A failed delivery attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("request failed: {0}")]
	Network(#[from] reqwest::Error),

	#[error("collector responded with {0}")]
	Status(StatusCode),

	#[error("payload could not be serialized: {0}")]
	Serialization(#[from] CrashError),
}

/// Errors raised by a [`LegacyDelivery`](crate::delivery::LegacyDelivery)
/// implementation.
#[derive(Debug, Error)]
pub enum LegacyDeliveryError {
	/// The collector could not be reached. The payload is kept for retry.
	#[error("network error: {0}")]
	Network(String),

	/// The collector rejected the payload. The payload is dropped.
	#[error("bad response: {0}")]
	BadResponse(String),
}

impl RetryableError for DeliveryError {
	fn is_retryable(&self) -> bool {
		match self {
			DeliveryError::Network(e) => e.is_retryable(),
			DeliveryError::Status(status) => is_retryable_status(*status),
			DeliveryError::Serialization(_) => false,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_errors_follow_retry_table() {
		assert!(DeliveryError::Status(StatusCode::BAD_GATEWAY).is_retryable());
		assert!(DeliveryError::Status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
		assert!(!DeliveryError::Status(StatusCode::BAD_REQUEST).is_retryable());
		assert!(!DeliveryError::Status(StatusCode::FORBIDDEN).is_retryable());
	}

	#[test]
	fn serialization_errors_are_permanent() {
		assert!(!DeliveryError::Serialization(CrashError::EmptyPayload).is_retryable());
	}
}
