//! Bounded-concurrency queue for background embedding and index work.
//!
//! At most `max_concurrency` jobs run at once; admission is FIFO through a fair
//! semaphore. Every job carries a timeout and is forcibly aborted when it
//! elapses. A job's handle resolves exactly once: completion travels over a
//! oneshot channel whose sender is consumed by the send, so a timed-out job can
//! never also resolve with a value.

use std::{
	future::Future,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use tokio::sync::{Semaphore, oneshot};
use uuid::Uuid;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Queue saturated at depth {depth} (high-water mark {high_water_mark}).")]
	Saturated { depth: usize, high_water_mark: usize },
	#[error("Job {label} timed out after {timeout_ms} ms.")]
	TimedOut { label: &'static str, timeout_ms: u64 },
	#[error("Job {label} failed: {message}")]
	Failed { label: &'static str, message: String },
	#[error("Job was dropped before completion.")]
	Canceled,
}

#[derive(Clone)]
pub struct JobQueue {
	semaphore: Arc<Semaphore>,
	depth: Arc<AtomicUsize>,
	high_water_mark: usize,
	job_timeout: Duration,
}
impl JobQueue {
	pub fn new(cfg: &engram_config::Queue) -> Self {
		Self {
			semaphore: Arc::new(Semaphore::new(cfg.max_concurrency as usize)),
			depth: Arc::new(AtomicUsize::new(0)),
			high_water_mark: cfg.high_water_mark as usize,
			job_timeout: Duration::from_millis(cfg.job_timeout_ms),
		}
	}

	/// Jobs waiting or running. The write manager consults this for backpressure.
	pub fn depth(&self) -> usize {
		self.depth.load(Ordering::SeqCst)
	}

	/// Admits a job or fails fast with [`Error::Saturated`] once the high-water
	/// mark is reached. The returned handle resolves exactly once.
	pub fn enqueue<T, F>(&self, label: &'static str, work: F) -> Result<JobHandle<T>>
	where
		T: Send + 'static,
		F: Future<Output = T> + Send + 'static,
	{
		let high_water_mark = self.high_water_mark;
		let admitted = self.depth.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |depth| {
			(depth < high_water_mark).then_some(depth + 1)
		});

		if let Err(depth) = admitted {
			return Err(Error::Saturated { depth, high_water_mark });
		}

		let job_id = Uuid::new_v4();
		let (tx, rx) = oneshot::channel();
		let semaphore = self.semaphore.clone();
		let depth = self.depth.clone();
		let timeout = self.job_timeout;

		tokio::spawn(async move {
			let outcome = run_job(label, job_id, &semaphore, timeout, work).await;

			depth.fetch_sub(1, Ordering::SeqCst);

			// The caller may have dropped its handle; the job still ran to term.
			let _ = tx.send(outcome);
		});

		Ok(JobHandle { job_id, rx })
	}
}

async fn run_job<T, F>(
	label: &'static str,
	job_id: Uuid,
	semaphore: &Semaphore,
	timeout: Duration,
	work: F,
) -> Result<T>
where
	T: Send + 'static,
	F: Future<Output = T> + Send + 'static,
{
	let Ok(_permit) = semaphore.acquire().await else {
		return Err(Error::Canceled);
	};
	// The work runs in its own task so a timeout can abort it; an execution must
	// never outlive its deadline.
	let mut worker = tokio::spawn(work);

	match tokio::time::timeout(timeout, &mut worker).await {
		Ok(Ok(value)) => Ok(value),
		Ok(Err(join_err)) => {
			let message = if join_err.is_panic() {
				"Job panicked.".to_string()
			} else {
				"Job was aborted.".to_string()
			};

			tracing::warn!(job_id = %job_id, label, "Job failed at the queue boundary.");

			Err(Error::Failed { label, message })
		},
		Err(_) => {
			worker.abort();
			tracing::warn!(
				job_id = %job_id,
				label,
				timeout_ms = timeout.as_millis() as u64,
				"Job exceeded its timeout and was aborted.",
			);

			Err(Error::TimedOut { label, timeout_ms: timeout.as_millis() as u64 })
		},
	}
}

pub struct JobHandle<T> {
	job_id: Uuid,
	rx: oneshot::Receiver<Result<T>>,
}
impl<T> JobHandle<T> {
	pub fn job_id(&self) -> Uuid {
		self.job_id
	}

	pub async fn wait(self) -> Result<T> {
		match self.rx.await {
			Ok(outcome) => outcome,
			Err(_) => Err(Error::Canceled),
		}
	}
}
