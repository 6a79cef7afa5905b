// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Case-insensitive key patterns used for metadata redaction and for
//! discarding error classes.

use regex::{Regex, RegexBuilder};

use crate::error::{CrashError, Result};

/// The placeholder written in place of a redacted metadata value.
pub const REDACTED: &str = "[REDACTED]";

/// A single compiled pattern, matched against the whole key.
#[derive(Debug, Clone)]
pub struct KeyPattern {
	source: String,
	regex: Regex,
}

impl KeyPattern {
	/// Compiles a glob where `*` matches any run of characters and `?` matches
	/// exactly one. Every other character matches itself.
	pub fn glob(pattern: &str) -> Result<Self> {
		let mut expr = String::with_capacity(pattern.len() + 8);
		expr.push('^');
		for c in pattern.chars() {
			match c {
				'*' => expr.push_str(".*"),
				'?' => expr.push('.'),
				other => expr.push_str(&regex::escape(&other.to_string())),
			}
		}
		expr.push('$');
		Self::compile(pattern, &expr)
	}

	/// Compiles a regular expression. The expression must match the whole key.
	pub fn regex(pattern: &str) -> Result<Self> {
		Self::compile(pattern, &format!("^(?:{pattern})$"))
	}

	fn compile(source: &str, expr: &str) -> Result<Self> {
		let regex = RegexBuilder::new(expr)
			.case_insensitive(true)
			.build()
			.map_err(|source_err| CrashError::InvalidPattern {
				pattern: source.to_string(),
				source: source_err,
			})?;
		Ok(Self {
			source: source.to_string(),
			regex,
		})
	}

	pub fn as_str(&self) -> &str {
		&self.source
	}

	pub fn matches(&self, key: &str) -> bool {
		self.regex.is_match(key)
	}
}

/// An ordered set of key patterns.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
	patterns: Vec<KeyPattern>,
}

impl PatternSet {
	pub fn new() -> Self {
		Self::default()
	}

	/// Compiles every entry as a glob.
	pub fn from_globs<I, S>(globs: I) -> Result<Self>
	where
		I: IntoIterator<Item = S>,
		S: AsRef<str>,
	{
		let patterns = globs
			.into_iter()
			.map(|g| KeyPattern::glob(g.as_ref()))
			.collect::<Result<Vec<_>>>()?;
		Ok(Self { patterns })
	}

	pub fn push(&mut self, pattern: KeyPattern) {
		self.patterns.push(pattern);
	}

	pub fn is_empty(&self) -> bool {
		self.patterns.is_empty()
	}

	pub fn len(&self) -> usize {
		self.patterns.len()
	}

	pub fn matches(&self, key: &str) -> bool {
		self.patterns.iter().any(|p| p.matches(key))
	}

	pub fn iter(&self) -> impl Iterator<Item = &KeyPattern> {
		self.patterns.iter()
	}
}

/// Decides which metadata keys are written as [`REDACTED`].
///
/// Keys are matched by name at every nesting depth, never by full path.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
	keys: PatternSet,
}

impl Redactor {
	pub fn new(keys: PatternSet) -> Self {
		Self { keys }
	}

	/// A redactor that never redacts.
	pub fn none() -> Self {
		Self::default()
	}

	pub fn should_redact(&self, key: &str) -> bool {
		self.keys.matches(key)
	}

	pub fn patterns(&self) -> &PatternSet {
		&self.keys
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn glob_matches_whole_key_case_insensitively() {
		let pattern = KeyPattern::glob("password").unwrap();
		assert!(pattern.matches("password"));
		assert!(pattern.matches("PassWord"));
		assert!(!pattern.matches("password_hint"));
		assert!(!pattern.matches("old_password"));
	}

	#[test]
	fn glob_wildcards() {
		let pattern = KeyPattern::glob("*token*").unwrap();
		assert!(pattern.matches("token"));
		assert!(pattern.matches("AuthTokenValue"));
		assert!(!pattern.matches("toke"));

		let single = KeyPattern::glob("key?").unwrap();
		assert!(single.matches("key1"));
		assert!(!single.matches("key12"));
	}

	#[test]
	fn glob_escapes_regex_metacharacters() {
		let pattern = KeyPattern::glob("a.b+c").unwrap();
		assert!(pattern.matches("a.b+c"));
		assert!(!pattern.matches("aXb+c"));
	}

	#[test]
	fn regex_is_anchored() {
		let pattern = KeyPattern::regex("secret_\\d+").unwrap();
		assert!(pattern.matches("SECRET_42"));
		assert!(!pattern.matches("my_secret_42"));
	}

	#[test]
	fn invalid_regex_is_reported() {
		let err = KeyPattern::regex("(unclosed").unwrap_err();
		assert!(matches!(err, CrashError::InvalidPattern { .. }));
	}

	#[test]
	fn empty_redactor_redacts_nothing() {
		let redactor = Redactor::none();
		assert!(!redactor.should_redact("password"));
	}

	proptest! {
		#[test]
		fn literal_glob_matches_itself(key in "[a-zA-Z0-9_.+()\\[\\]-]{1,24}") {
			let pattern = KeyPattern::glob(&key).unwrap();
			prop_assert!(pattern.matches(&key));
			prop_assert!(pattern.matches(&key.to_uppercase()));
		}
	}
}
