//! The write path: persist raw text synchronously, embed asynchronously.
//!
//! A record is durable before its embedding exists. The embedding job runs
//! detached from the caller with bounded retries; permanent failure leaves the
//! record pending and retrievable by recency.

use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Engine, EngineInner, Error, Result};
use engram_domain::{MemoryKind, MemoryRecord, MemoryScope};

impl Engine {
	/// Stores a memory with the configured default importance.
	pub async fn record(
		&self,
		owner_id: &str,
		agent_id: &str,
		content: &str,
		kind: MemoryKind,
	) -> Result<Uuid> {
		let importance = self.inner.cfg.memory.default_importance;

		self.record_with_importance(owner_id, agent_id, content, kind, importance).await
	}

	pub async fn record_with_importance(
		&self,
		owner_id: &str,
		agent_id: &str,
		content: &str,
		kind: MemoryKind,
		importance: f32,
	) -> Result<Uuid> {
		let content = content.trim();

		if content.is_empty() {
			return Err(Error::invalid_request("Memory content must be non-empty."));
		}

		let scope = MemoryScope::new(owner_id, agent_id);
		let content =
			truncate_chars(content, self.inner.cfg.memory.max_content_chars as usize).to_string();
		let record =
			MemoryRecord::new(&scope, content.clone(), kind, importance, OffsetDateTime::now_utc());
		let record_id = record.record_id;

		self.inner.store.insert_record(&record).await?;
		// The scope's cached rankings are stale the moment the write lands, even
		// though the new record is not yet searchable by similarity.
		self.inner.cache.invalidate(&scope).await;

		let inner = self.inner.clone();
		let job = self
			.inner
			.queue
			.enqueue("embed-memory", async move { embed_and_index(inner, scope, record_id, content).await });

		match job {
			Ok(handle) => {
				tracing::debug!(
					record_id = %record_id,
					job_id = %handle.job_id(),
					"Queued embedding job.",
				);
			},
			Err(err) => {
				// The record is durable and reachable by recency; similarity
				// search picks it up once a later write re-embeds the backlog.
				tracing::warn!(
					error = %err,
					record_id = %record_id,
					"Embedding queue is saturated; record stays pending.",
				);
			},
		}

		Ok(record_id)
	}
}

/// One embedding attempt: embed, persist, index. Each step may fail
/// independently, so the whole sequence is retried as a unit.
async fn embed_once(
	inner: &Arc<EngineInner>,
	scope: &MemoryScope,
	record_id: Uuid,
	content: &str,
) -> Result<()> {
	let vector = inner.embedder.embed(content).await?;

	inner.store.set_embedding(record_id, &vector).await?;

	match inner.active.insert(scope, record_id, vector) {
		// A retry after a partial failure can find the record already indexed.
		Ok(()) | Err(engram_index::Error::DuplicateRecord { .. }) => Ok(()),
		Err(err) => Err(err.into()),
	}
}

async fn embed_and_index(
	inner: Arc<EngineInner>,
	scope: MemoryScope,
	record_id: Uuid,
	content: String,
) {
	let max_attempts = inner.cfg.memory.max_embed_attempts;

	for attempt in 1..=max_attempts {
		match embed_once(&inner, &scope, record_id, &content).await {
			Ok(()) => {
				inner.cache.invalidate(&scope).await;

				return;
			},
			Err(err) if attempt < max_attempts => {
				let backoff = backoff_for_attempt(
					attempt,
					inner.cfg.memory.retry_base_backoff_ms,
					inner.cfg.memory.retry_max_backoff_ms,
				);

				tracing::warn!(
					error = %err,
					record_id = %record_id,
					attempt,
					backoff_ms = backoff.as_millis() as u64,
					"Embedding attempt failed; retrying.",
				);
				tokio::time::sleep(backoff).await;
			},
			Err(err) => {
				tracing::warn!(
					error = %err,
					record_id = %record_id,
					attempts = max_attempts,
					"Embedding failed permanently; record stays pending.",
				);
			},
		}
	}
}

/// Exponential backoff doubling from `base_ms`, capped at `max_ms`.
fn backoff_for_attempt(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
	let factor = 1_u64 << attempt.saturating_sub(1).min(16);

	Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
	match text.char_indices().nth(max_chars) {
		Some((byte_index, _)) => &text[..byte_index],
		None => text,
	}
}
