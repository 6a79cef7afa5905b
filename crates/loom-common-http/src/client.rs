// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client builder with a consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Creates a new HTTP client builder whose User-Agent identifies the product.
///
/// Use this when you need to customize the client (e.g., set timeout).
///
/// # Example
/// ```ignore
/// let client = loom_common_http::builder("loom-crash-rust", "0.1.0")
///     .timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub fn builder(product: &str, version: &str) -> ClientBuilder {
	Client::builder().user_agent(user_agent(product, version))
}

/// Returns the User-Agent string for a product.
///
/// Format: `{product}/{version} ({platform})`
/// Example: `loom-crash-rust/0.1.0 (linux-x86_64)`
pub fn user_agent(product: &str, version: &str) -> String {
	format!("{product}/{version} ({})", platform())
}

/// Platform string in `{os}-{arch}` format, e.g. "linux-x86_64".
pub fn platform() -> String {
	format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}
