// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for the Loom crash SDK.
//!
//! This crate provides:
//! - A pre-configured HTTP client builder with a product User-Agent header
//! - Retry logic with exponential backoff for transient failures
//! - The status-code table that decides which responses are worth retrying

mod client;
mod retry;

pub use client::{builder, platform, user_agent};
pub use retry::{is_retryable_status, retry, RetryConfig, RetryableError};
