// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! On-disk queues of events and sessions.

mod event_store;
mod file_store;
mod filename;
mod session_store;

pub use event_store::{is_stale, EventStore};
pub use file_store::FileStore;
pub use filename::STARTUP_SUFFIX;
pub use session_store::SessionStore;

#[cfg(test)]
pub use event_store::is_startup;
#[cfg(test)]
pub use filename::StoredFileName;
