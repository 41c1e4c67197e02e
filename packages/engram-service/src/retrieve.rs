//! The read path: embed, search, score, re-rank, truncate.
//!
//! Retrieval is infallible by contract. Every failure class has a defined
//! degradation: embedding failures fall back to recency, storage failures fall
//! back to an empty block, and the whole call is bounded by a deadline.

use std::{collections::HashMap, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::Engine;
use engram_cache::{CachedItem, CachedResult};
use engram_domain::{
	MemoryKind, MemoryRecord, MemoryScope, composite_score, lexical_overlap_ratio,
	query_fingerprint, recency_decay, tokenize_query,
};

const MAX_QUERY_TERMS: usize = 16;
const MAX_TEXT_TERMS: usize = 64;

/// Ranked memories ready for prompt assembly.
#[derive(Clone, Debug)]
pub struct ContextBlock {
	pub scope: MemoryScope,
	pub items: Vec<ContextItem>,
}
impl ContextBlock {
	fn empty(scope: MemoryScope) -> Self {
		Self { scope, items: Vec::new() }
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}
}

#[derive(Clone, Debug)]
pub struct ContextItem {
	pub record_id: Uuid,
	pub content: String,
	pub kind: MemoryKind,
	pub similarity: f32,
	pub score: f32,
}

impl Engine {
	/// Returns the `k` most relevant memories for the scope, best effort within
	/// the configured deadline.
	pub async fn retrieve(
		&self,
		owner_id: &str,
		agent_id: &str,
		query: &str,
		k: usize,
	) -> ContextBlock {
		let scope = MemoryScope::new(owner_id, agent_id);
		let k = k.min(self.inner.cfg.retrieval.max_k as usize);

		if k == 0 || query.trim().is_empty() {
			return ContextBlock::empty(scope);
		}

		let deadline = Duration::from_millis(self.inner.cfg.retrieval.deadline_ms);

		match tokio::time::timeout(deadline, self.retrieve_inner(&scope, query, k)).await {
			Ok(block) => block,
			Err(_) => {
				tracing::warn!(
					owner_id,
					agent_id,
					deadline_ms = self.inner.cfg.retrieval.deadline_ms,
					"Retrieval exceeded its deadline; returning an empty context block.",
				);

				ContextBlock::empty(scope)
			},
		}
	}

	async fn retrieve_inner(&self, scope: &MemoryScope, query: &str, k: usize) -> ContextBlock {
		let now = OffsetDateTime::now_utc();
		let fingerprint = query_fingerprint(scope, query, k);

		// Checked before embedding: a hit answers without a provider call.
		if let Some(cached) = self.inner.cache.get(&fingerprint, now).await {
			if let Some(block) = self.hydrate_cached(scope, &cached, now).await {
				return block;
			}
		}

		let query_vector = match self.inner.embedder.embed(query).await {
			Ok(vector) => vector,
			Err(err) => {
				tracing::warn!(
					error = %err,
					owner_id = %scope.owner_id,
					agent_id = %scope.agent_id,
					"Query embedding failed; falling back to recency.",
				);

				return self.recency_fallback(scope, k, now).await;
			},
		};

		if let Err(err) = self.hydrate_partition(scope).await {
			tracing::warn!(
				error = %err,
				owner_id = %scope.owner_id,
				agent_id = %scope.agent_id,
				"Partition hydration failed; returning an empty context block.",
			);

			return ContextBlock::empty(scope.clone());
		}

		let overfetch = k.saturating_mul(self.inner.cfg.retrieval.overfetch_factor as usize);
		let neighbors = self.inner.active.search(scope, &query_vector, overfetch);

		if neighbors.is_empty() {
			return ContextBlock::empty(scope.clone());
		}

		let ids: Vec<Uuid> = neighbors.iter().map(|neighbor| neighbor.record_id).collect();
		let records = match self.inner.store.records_by_ids(&ids).await {
			Ok(records) => records,
			Err(err) => {
				tracing::warn!(
					error = %err,
					owner_id = %scope.owner_id,
					agent_id = %scope.agent_id,
					"Candidate hydration failed; returning an empty context block.",
				);

				return ContextBlock::empty(scope.clone());
			},
		};
		let by_id: HashMap<Uuid, MemoryRecord> =
			records.into_iter().map(|record| (record.record_id, record)).collect();
		let mut items = Vec::with_capacity(neighbors.len());

		for neighbor in &neighbors {
			let Some(record) = by_id.get(&neighbor.record_id) else {
				continue;
			};
			let decay = recency_decay(
				record.last_accessed_at,
				now,
				self.inner.cfg.retrieval.decay_half_life_days,
			);

			items.push(ContextItem {
				record_id: record.record_id,
				content: record.content.clone(),
				kind: record.kind,
				similarity: neighbor.similarity,
				score: composite_score(neighbor.similarity, record.importance, decay),
			});
		}

		self.rerank(query, &mut items).await;

		items.sort_by(|a, b| b.score.total_cmp(&a.score));
		items.truncate(k);

		self.touch(&items, now).await;
		self.inner
			.cache
			.insert(fingerprint, CachedResult {
				scope: scope.clone(),
				items: items
					.iter()
					.map(|item| CachedItem {
						record_id: item.record_id,
						similarity: item.similarity,
						score: item.score,
					})
					.collect(),
				expires_at: now + self.inner.cache.ttl(),
			})
			.await;

		ContextBlock { scope: scope.clone(), items }
	}

	/// Blends the composite score with a secondary relevance signal: the
	/// configured cross-encoder when present, lexical term overlap otherwise.
	async fn rerank(&self, query: &str, items: &mut [ContextItem]) {
		if items.is_empty() {
			return;
		}

		let weight = self.inner.cfg.retrieval.rerank_weight;

		if weight == 0.0 {
			return;
		}

		let signals = match self.inner.reranker.as_ref() {
			Some(reranker) => {
				let docs: Vec<String> = items.iter().map(|item| item.content.clone()).collect();

				match reranker.rerank(query, &docs).await {
					Ok(scores) if scores.len() == items.len() => scores,
					Ok(_) => {
						tracing::warn!("Reranker returned a misaligned score list; skipping re-rank.");

						return;
					},
					Err(err) => {
						tracing::warn!(error = %err, "Rerank call failed; keeping composite order.");

						return;
					},
				}
			},
			None => {
				let query_tokens = tokenize_query(query, MAX_QUERY_TERMS);

				items
					.iter()
					.map(|item| lexical_overlap_ratio(&query_tokens, &item.content, MAX_TEXT_TERMS))
					.collect()
			},
		};

		for (item, signal) in items.iter_mut().zip(signals) {
			item.score = (1.0 - weight) * item.score + weight * signal;
		}
	}

	/// Serves cached ranks with freshly hydrated contents. `None` means the
	/// cached ids could not be hydrated and the full path should run instead.
	async fn hydrate_cached(
		&self,
		scope: &MemoryScope,
		cached: &CachedResult,
		now: OffsetDateTime,
	) -> Option<ContextBlock> {
		let ids: Vec<Uuid> = cached.items.iter().map(|item| item.record_id).collect();
		let records = match self.inner.store.records_by_ids(&ids).await {
			Ok(records) => records,
			Err(err) => {
				tracing::warn!(error = %err, "Cached result hydration failed; treating as a miss.");

				return None;
			},
		};
		let by_id: HashMap<Uuid, MemoryRecord> =
			records.into_iter().map(|record| (record.record_id, record)).collect();
		let items: Vec<ContextItem> = cached
			.items
			.iter()
			.filter_map(|item| {
				by_id.get(&item.record_id).map(|record| ContextItem {
					record_id: record.record_id,
					content: record.content.clone(),
					kind: record.kind,
					similarity: item.similarity,
					score: item.score,
				})
			})
			.collect();

		if items.is_empty() && !cached.items.is_empty() {
			return None;
		}

		self.touch(&items, now).await;

		Some(ContextBlock { scope: scope.clone(), items })
	}

	/// Most-recently-accessed records, used when the query cannot be embedded.
	/// Similarity is unknown, so ranking is recency-weighted importance.
	async fn recency_fallback(
		&self,
		scope: &MemoryScope,
		k: usize,
		now: OffsetDateTime,
	) -> ContextBlock {
		let records = match self.inner.store.recent_records(scope, k as u32).await {
			Ok(records) => records,
			Err(err) => {
				tracing::warn!(
					error = %err,
					owner_id = %scope.owner_id,
					agent_id = %scope.agent_id,
					"Recency fallback failed; returning an empty context block.",
				);

				return ContextBlock::empty(scope.clone());
			},
		};
		let items: Vec<ContextItem> = records
			.into_iter()
			.map(|record| {
				let decay = recency_decay(
					record.last_accessed_at,
					now,
					self.inner.cfg.retrieval.decay_half_life_days,
				);

				ContextItem {
					record_id: record.record_id,
					content: record.content,
					kind: record.kind,
					similarity: 0.0,
					score: record.importance * decay,
				}
			})
			.collect();

		self.touch(&items, now).await;

		ContextBlock { scope: scope.clone(), items }
	}

	/// Backfills the scope's stored embedded records into the active engine on
	/// the scope's first read.
	///
	/// Partition existence is not the signal here: the write path and snapshot
	/// restore both create partitions that can lack older stored records, so
	/// hydration is tracked per scope and tolerates records already present.
	async fn hydrate_partition(&self, scope: &MemoryScope) -> crate::Result<()> {
		{
			let hydrated = self.inner.hydrated.lock().unwrap_or_else(|err| err.into_inner());

			if hydrated.contains(scope) {
				return Ok(());
			}
		}

		let records = self.inner.store.embedded_records(scope).await?;

		self.inner.active.ensure_partition(scope);

		for record in records {
			let Some(vector) = record.embedding else {
				continue;
			};

			match self.inner.active.insert(scope, record.record_id, vector) {
				Ok(()) | Err(engram_index::Error::DuplicateRecord { .. }) => {},
				Err(err) => {
					tracing::warn!(
						error = %err,
						record_id = %record.record_id,
						"Skipping record during partition hydration.",
					);
				},
			}
		}

		let mut hydrated = self.inner.hydrated.lock().unwrap_or_else(|err| err.into_inner());

		hydrated.insert(scope.clone());

		Ok(())
	}

	/// The only path that increments `access_count`. Failures are logged and
	/// swallowed; retrieval results are already in hand.
	async fn touch(&self, items: &[ContextItem], now: OffsetDateTime) {
		if items.is_empty() {
			return;
		}

		let ids: Vec<Uuid> = items.iter().map(|item| item.record_id).collect();

		if let Err(err) = self.inner.store.touch_access(&ids, now).await {
			tracing::warn!(error = %err, "Failed to record memory accesses.");
		}
	}
}
