// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background delivery on a single task fed by a bounded queue.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::dispatcher::{FlushSummary, Pipeline};

/// Work for the delivery task.
#[derive(Debug)]
pub enum DeliveryJob {
	/// Deliver one claimed event file.
	Event(PathBuf),
	/// Deliver one claimed session file.
	Session(PathBuf),
	/// Deliver everything stored, replying with the totals.
	Flush(Option<oneshot::Sender<FlushSummary>>),
}

/// Handle to the delivery task.
///
/// Jobs are handed over with `try_send` so capture never waits on the
/// network. A full queue drops the job and releases its file, which stays on
/// disk for the next flush.
pub struct DeliveryWorker {
	pipeline: Arc<Pipeline>,
	tx: Mutex<Option<mpsc::Sender<DeliveryJob>>>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

impl DeliveryWorker {
	/// Spawns the task on the current tokio runtime. Outside a runtime no task
	/// is started and stored files wait for an explicit flush.
	pub fn spawn(pipeline: Arc<Pipeline>, capacity: usize) -> Self {
		let runtime = match tokio::runtime::Handle::try_current() {
			Ok(runtime) => runtime,
			Err(_) => {
				warn!("no tokio runtime, crash delivery runs only on flush");
				return Self {
					pipeline,
					tx: Mutex::new(None),
					handle: Mutex::new(None),
				};
			}
		};

		let (tx, rx) = mpsc::channel(capacity.max(1));
		let handle = runtime.spawn(run(Arc::clone(&pipeline), rx));
		Self {
			pipeline,
			tx: Mutex::new(Some(tx)),
			handle: Mutex::new(Some(handle)),
		}
	}

	pub fn is_running(&self) -> bool {
		self.tx.lock().is_some()
	}

	/// Queues a job without blocking. Returns false when the job was dropped.
	pub fn enqueue(&self, job: DeliveryJob) -> bool {
		let result = match self.tx.lock().as_ref() {
			Some(tx) => tx.try_send(job),
			None => Err(mpsc::error::TrySendError::Closed(job)),
		};

		match result {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(job)) => {
				warn!(job = ?job, "delivery queue full, dropping job");
				self.release(job);
				false
			}
			Err(mpsc::error::TrySendError::Closed(job)) => {
				debug!(job = ?job, "delivery worker stopped, dropping job");
				self.release(job);
				false
			}
		}
	}

	/// Delivers every stored file. Runs on the worker task when there is one
	/// so it is ordered after jobs already queued.
	pub async fn flush(&self) -> FlushSummary {
		let tx = self.tx.lock().clone();
		if let Some(tx) = tx {
			let (reply_tx, reply_rx) = oneshot::channel();
			if tx.send(DeliveryJob::Flush(Some(reply_tx))).await.is_ok() {
				if let Ok(summary) = reply_rx.await {
					return summary;
				}
			}
		}
		self.pipeline.flush().await
	}

	/// Stops accepting jobs and waits for queued ones to finish.
	pub async fn shutdown(&self) {
		let tx = self.tx.lock().take();
		drop(tx);
		let handle = self.handle.lock().take();
		if let Some(handle) = handle {
			if let Err(e) = handle.await {
				warn!(error = %e, "delivery worker ended abnormally");
			}
		}
	}

	fn release(&self, job: DeliveryJob) {
		match job {
			DeliveryJob::Event(path) => self.pipeline.release_event_file(path),
			DeliveryJob::Session(path) => self.pipeline.release_session_file(path),
			DeliveryJob::Flush(_) => {}
		}
	}
}

async fn run(pipeline: Arc<Pipeline>, mut rx: mpsc::Receiver<DeliveryJob>) {
	info!("Starting crash delivery worker");

	while let Some(job) = rx.recv().await {
		match job {
			DeliveryJob::Event(path) => {
				let outcome = pipeline.deliver_event_file(&path).await;
				debug!(path = %path.display(), ?outcome, "event job done");
			}
			DeliveryJob::Session(path) => {
				let outcome = pipeline.deliver_session_file(&path).await;
				debug!(path = %path.display(), ?outcome, "session job done");
			}
			DeliveryJob::Flush(reply) => {
				let summary = pipeline.flush().await;
				if let Some(reply) = reply {
					let _ = reply.send(summary);
				}
			}
		}
	}

	info!("Crash delivery worker stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::callbacks::CallbackState;
	use crate::config::CrashConfig;
	use crate::context_state::ContextState;
	use crate::delivery::DeliveryStatus;
	use crate::dispatcher::tests::{RecordingDelivery, KEY};
	use crate::observer::ObserverRegistry;
	use loom_crash_core::{
		AppWithState, DeviceWithState, Event, EventData, Exception, Redactor, SeverityReason,
		SeverityReasonType,
	};
	use tempfile::TempDir;

	fn pipeline(delivery: Arc<RecordingDelivery>, capacity: usize) -> (Arc<Pipeline>, TempDir) {
		let tmp = TempDir::new().unwrap();
		let mut config = CrashConfig::new(KEY);
		config.persistence_dir = Some(tmp.path().to_path_buf());
		config.delivery_queue_capacity = capacity;
		let config = Arc::new(config.validate().unwrap());
		let context = Arc::new(ContextState::new(
			AppWithState::default(),
			DeviceWithState::default(),
			Arc::new(ObserverRegistry::new()),
		));
		let pipeline =
			Pipeline::new(config, delivery, Arc::new(CallbackState::default()), context).unwrap();
		(Arc::new(pipeline), tmp)
	}

	fn stored_event(pipeline: &Pipeline, class: &str) -> PathBuf {
		let event = Event::from_data(
			EventData::new(
				vec![Exception::new(class, None)],
				SeverityReason::new(SeverityReasonType::HandledException),
			),
			Arc::new(Redactor::none()),
		);
		let path = pipeline.events().write_event(&event, false).unwrap();
		assert!(pipeline.events().files().claim(&path));
		path
	}

	#[tokio::test]
	async fn queued_jobs_are_delivered_in_order() {
		let delivery = RecordingDelivery::new(DeliveryStatus::Delivered);
		let (pipeline, _tmp) = pipeline(Arc::clone(&delivery), 8);
		let worker = DeliveryWorker::spawn(Arc::clone(&pipeline), 8);
		assert!(worker.is_running());

		for class in ["A", "B", "C"] {
			let path = stored_event(&pipeline, class);
			assert!(worker.enqueue(DeliveryJob::Event(path)));
		}
		worker.shutdown().await;

		assert_eq!(delivery.error_classes(), vec!["A", "B", "C"]);
		assert!(pipeline.events().files().stored_files().is_empty());
	}

	#[tokio::test(flavor = "current_thread")]
	async fn full_queue_drops_and_releases() {
		let delivery = RecordingDelivery::new(DeliveryStatus::Delivered);
		let (pipeline, _tmp) = pipeline(Arc::clone(&delivery), 1);
		let worker = DeliveryWorker::spawn(Arc::clone(&pipeline), 1);

		// The worker cannot run until this task yields, so the second job
		// finds the queue full.
		let first = stored_event(&pipeline, "First");
		let second = stored_event(&pipeline, "Second");
		assert!(worker.enqueue(DeliveryJob::Event(first)));
		assert!(!worker.enqueue(DeliveryJob::Event(second.clone())));
		assert!(second.exists());
		assert!(!pipeline.events().files().is_in_flight(&second));

		let summary = worker.flush().await;
		assert_eq!(summary.delivered, 1);
		worker.shutdown().await;
		assert_eq!(delivery.error_classes(), vec!["First", "Second"]);
	}

	#[tokio::test]
	async fn jobs_after_shutdown_are_released() {
		let delivery = RecordingDelivery::new(DeliveryStatus::Delivered);
		let (pipeline, _tmp) = pipeline(Arc::clone(&delivery), 4);
		let worker = DeliveryWorker::spawn(Arc::clone(&pipeline), 4);
		worker.shutdown().await;

		let path = stored_event(&pipeline, "Late");
		assert!(!worker.enqueue(DeliveryJob::Event(path.clone())));
		assert!(path.exists());
		assert!(!pipeline.events().files().is_in_flight(&path));

		assert_eq!(worker.flush().await.delivered, 1);
	}

	#[test]
	fn without_runtime_flush_is_the_only_path() {
		let delivery = RecordingDelivery::new(DeliveryStatus::Delivered);
		let (pipeline, _tmp) = pipeline(Arc::clone(&delivery), 4);
		let worker = DeliveryWorker::spawn(Arc::clone(&pipeline), 4);
		assert!(!worker.is_running());

		let path = stored_event(&pipeline, "Offline");
		assert!(!worker.enqueue(DeliveryJob::Event(path.clone())));

		let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
		let summary = runtime.block_on(worker.flush());
		assert_eq!(summary.delivered, 1);
		assert!(!path.exists());
	}
}
