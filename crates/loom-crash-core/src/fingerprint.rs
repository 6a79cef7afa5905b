// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Client-side grouping hash for events.

use sha2::{Digest, Sha256};

use crate::event::Event;

const GROUPING_FRAMES: usize = 5;

/// Compute a grouping hash for an event.
///
/// The hash is a SHA256 over:
/// 1. The outermost error class
/// 2. The top in-project frames of the outermost exception (method + file)
/// 3. If no frame is in-project, the top frames regardless
pub fn compute_fingerprint(event: &Event) -> String {
	let mut hasher = Sha256::new();

	hasher.update(event.error_class().as_bytes());
	hasher.update(b"|");

	let frames = event
		.exceptions()
		.first()
		.map(|e| e.stacktrace.frames.as_slice())
		.unwrap_or_default();

	let in_project: Vec<_> = frames
		.iter()
		.filter(|f| f.is_in_project())
		.take(GROUPING_FRAMES)
		.collect();

	for frame in &in_project {
		if let Some(method) = &frame.method {
			hasher.update(method.as_bytes());
		}
		hasher.update(b"@");
		if let Some(file) = &frame.file {
			hasher.update(file.as_bytes());
		}
		hasher.update(b"|");
	}

	if in_project.is_empty() {
		for frame in frames.iter().take(GROUPING_FRAMES) {
			if let Some(method) = &frame.method {
				hasher.update(method.as_bytes());
			}
			hasher.update(b"|");
		}
	}

	hex::encode(hasher.finalize())
}
