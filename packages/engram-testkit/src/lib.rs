//! In-process doubles for the engine's external seams.
//!
//! [`MemoryStore`] replaces Postgres and [`SeededEmbedder`] replaces the
//! embedding service, so integration tests run hermetically while exercising
//! the same trait surfaces the real backends implement.

use std::{
	collections::HashMap,
	sync::{
		Mutex,
		atomic::{AtomicBool, AtomicUsize, Ordering},
	},
};

use time::OffsetDateTime;
use uuid::Uuid;

use engram_domain::{BoxFuture, MemoryRecord, MemoryScope, normalize};
use engram_providers::Embedder;
use engram_storage::{Error as StorageError, RecordStore, models::IndexSnapshotRow};

/// Deterministic token-bucket embedder.
///
/// Each token hashes to one signed bucket, so identical texts embed
/// identically and texts sharing tokens land near each other. Good enough for
/// ranking assertions without a model service.
pub struct SeededEmbedder {
	dimensions: usize,
	calls: AtomicUsize,
	fail: AtomicBool,
}
impl SeededEmbedder {
	pub fn new(dimensions: usize) -> Self {
		Self { dimensions, calls: AtomicUsize::new(0), fail: AtomicBool::new(false) }
	}

	/// Number of [`Embedder::embed`] calls so far; lets tests prove a cache hit
	/// skipped the provider.
	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	/// Makes every subsequent embed call fail as unavailable.
	pub fn set_failing(&self, failing: bool) {
		self.fail.store(failing, Ordering::SeqCst);
	}

	pub fn embed_text(&self, text: &str) -> Vec<f32> {
		let mut vector = vec![0.0_f32; self.dimensions];

		for token in text.to_lowercase().split_whitespace() {
			let digest = blake3::hash(token.as_bytes());
			let bytes = digest.as_bytes();
			let bucket =
				u64::from_le_bytes(bytes[..8].try_into().unwrap()) as usize % self.dimensions;
			let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

			vector[bucket] += sign;
		}

		// All-whitespace input would embed to the zero vector otherwise.
		if vector.iter().all(|value| *value == 0.0) {
			vector[0] = 1.0;
		}

		normalize(&mut vector);

		vector
	}
}
impl Embedder for SeededEmbedder {
	fn embed<'a>(&'a self, text: &'a str) -> BoxFuture<'a, engram_providers::Result<Vec<f32>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if self.fail.load(Ordering::SeqCst) {
				return Err(engram_providers::Error::Unavailable {
					message: "Embedder is configured to fail.".to_string(),
				});
			}

			Ok(self.embed_text(text))
		})
	}

	fn dimensions(&self) -> usize {
		self.dimensions
	}
}

#[derive(Default)]
struct StoreState {
	records: HashMap<Uuid, MemoryRecord>,
	snapshots: HashMap<MemoryScope, (Vec<u8>, i32, OffsetDateTime)>,
}

/// In-memory [`RecordStore`] with the same observable semantics as the
/// Postgres store.
#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<StoreState>,
	fail_verify: AtomicBool,
	touch_calls: AtomicUsize,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes [`RecordStore::verify`] report a schema mismatch, for degradation
	/// tests.
	pub fn set_verify_failing(&self, failing: bool) {
		self.fail_verify.store(failing, Ordering::SeqCst);
	}

	pub fn touch_calls(&self) -> usize {
		self.touch_calls.load(Ordering::SeqCst)
	}

	pub fn record(&self, record_id: Uuid) -> Option<MemoryRecord> {
		let state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.records.get(&record_id).cloned()
	}

	pub fn record_count(&self) -> usize {
		let state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.records.len()
	}

	pub fn snapshot_blob(&self, scope: &MemoryScope) -> Option<Vec<u8>> {
		let state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.snapshots.get(scope).map(|(blob, _, _)| blob.clone())
	}

	/// Seeds a stored snapshot directly, bypassing the engine.
	pub fn put_snapshot(&self, scope: &MemoryScope, blob: Vec<u8>, schema_version: i32) {
		let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

		state.snapshots.insert(scope.clone(), (blob, schema_version, OffsetDateTime::now_utc()));
	}

	fn scoped<'a>(
		state: &'a StoreState,
		scope: &'a MemoryScope,
	) -> impl Iterator<Item = &'a MemoryRecord> {
		state
			.records
			.values()
			.filter(move |record| record.owner_id == scope.owner_id && record.agent_id == scope.agent_id)
	}
}
impl RecordStore for MemoryStore {
	fn verify(&self) -> BoxFuture<'_, engram_storage::Result<()>> {
		Box::pin(async move {
			if self.fail_verify.load(Ordering::SeqCst) {
				return Err(StorageError::Schema {
					message: "Table memory_records is missing expected column embedding.".to_string(),
				});
			}

			Ok(())
		})
	}

	fn insert_record<'a>(
		&'a self,
		record: &'a MemoryRecord,
	) -> BoxFuture<'a, engram_storage::Result<()>> {
		Box::pin(async move {
			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			state.records.insert(record.record_id, record.clone());

			Ok(())
		})
	}

	fn set_embedding<'a>(
		&'a self,
		record_id: Uuid,
		embedding: &'a [f32],
	) -> BoxFuture<'a, engram_storage::Result<()>> {
		Box::pin(async move {
			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
			let Some(record) = state.records.get_mut(&record_id) else {
				return Err(StorageError::NotFound(format!("Record {record_id} does not exist.")));
			};

			record.embedding = Some(embedding.to_vec());
			record.pending = false;

			Ok(())
		})
	}

	fn records_by_ids<'a>(
		&'a self,
		ids: &'a [Uuid],
	) -> BoxFuture<'a, engram_storage::Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			Ok(ids.iter().filter_map(|id| state.records.get(id).cloned()).collect())
		})
	}

	fn embedded_records<'a>(
		&'a self,
		scope: &'a MemoryScope,
	) -> BoxFuture<'a, engram_storage::Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			Ok(Self::scoped(&state, scope)
				.filter(|record| record.embedding.is_some() && !record.pending)
				.cloned()
				.collect())
		})
	}

	fn recent_records<'a>(
		&'a self,
		scope: &'a MemoryScope,
		limit: u32,
	) -> BoxFuture<'a, engram_storage::Result<Vec<MemoryRecord>>> {
		Box::pin(async move {
			let state = self.state.lock().unwrap_or_else(|err| err.into_inner());
			let mut records: Vec<MemoryRecord> = Self::scoped(&state, scope).cloned().collect();

			records.sort_by(|a, b| b.last_accessed_at.cmp(&a.last_accessed_at));
			records.truncate(limit as usize);

			Ok(records)
		})
	}

	fn touch_access<'a>(
		&'a self,
		ids: &'a [Uuid],
		now: OffsetDateTime,
	) -> BoxFuture<'a, engram_storage::Result<()>> {
		Box::pin(async move {
			self.touch_calls.fetch_add(1, Ordering::SeqCst);

			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			for id in ids {
				if let Some(record) = state.records.get_mut(id) {
					record.access_count += 1;
					record.last_accessed_at = now;
				}
			}

			Ok(())
		})
	}

	fn load_snapshots(&self) -> BoxFuture<'_, engram_storage::Result<Vec<IndexSnapshotRow>>> {
		Box::pin(async move {
			let state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			Ok(state
				.snapshots
				.iter()
				.map(|(scope, (blob, schema_version, updated_at))| IndexSnapshotRow {
					owner_id: scope.owner_id.clone(),
					agent_id: scope.agent_id.clone(),
					blob: blob.clone(),
					schema_version: *schema_version,
					updated_at: *updated_at,
				})
				.collect())
		})
	}

	fn save_snapshot<'a>(
		&'a self,
		scope: &'a MemoryScope,
		blob: &'a [u8],
		schema_version: i32,
		now: OffsetDateTime,
	) -> BoxFuture<'a, engram_storage::Result<()>> {
		Box::pin(async move {
			let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());

			state.snapshots.insert(scope.clone(), (blob.to_vec(), schema_version, now));

			Ok(())
		})
	}
}

/// A small, fast configuration suitable for most integration tests.
pub fn test_config() -> engram_config::Config {
	engram_config::Config {
		storage: engram_config::Storage {
			postgres: engram_config::Postgres {
				dsn: "postgres://localhost/engram_test".to_string(),
				pool_max_conns: 2,
			},
		},
		providers: engram_config::Providers {
			embedding: engram_config::EmbeddingProviderConfig {
				api_base: "http://127.0.0.1:0".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/embeddings".to_string(),
				model: "test-embedder".to_string(),
				dimensions: 32,
				timeout_ms: 1_000,
				max_input_chars: 2_048,
				default_headers: serde_json::Map::new(),
			},
			rerank: None,
		},
		memory: engram_config::Memory {
			max_content_chars: 2_048,
			default_importance: 0.5,
			max_embed_attempts: 3,
			retry_base_backoff_ms: 1,
			retry_max_backoff_ms: 5,
		},
		index: engram_config::Index { max_links: 8, ef_construction: 64, ef_search: 32, max_layers: 8 },
		cache: engram_config::Cache { capacity: 64, ttl_seconds: 60 },
		queue: engram_config::Queue { max_concurrency: 4, high_water_mark: 64, job_timeout_ms: 2_000 },
		retrieval: engram_config::Retrieval {
			max_k: 16,
			overfetch_factor: 3,
			decay_half_life_days: 30.0,
			rerank_weight: 0.3,
			deadline_ms: 1_000,
		},
	}
}

#[cfg(test)]
mod tests {
	use engram_domain::cosine_similarity;

	use super::*;

	#[test]
	fn embedder_is_deterministic_and_normalized() {
		let embedder = SeededEmbedder::new(32);
		let a = embedder.embed_text("likes green tea");
		let b = embedder.embed_text("likes green tea");
		let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();

		assert_eq!(a, b);
		assert!((norm - 1.0).abs() < 1e-5);
	}

	#[test]
	fn shared_tokens_raise_similarity() {
		let embedder = SeededEmbedder::new(64);
		let base = embedder.embed_text("likes green tea in the morning");
		let near = embedder.embed_text("green tea in the morning");
		let far = embedder.embed_text("quarterly revenue projections spreadsheet");

		assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
	}

	#[tokio::test]
	async fn set_embedding_clears_pending() {
		let store = MemoryStore::new();
		let scope = MemoryScope::new("owner-1", "agent-1");
		let record = MemoryRecord::new(
			&scope,
			"Prefers tea.",
			engram_domain::MemoryKind::Preference,
			0.5,
			OffsetDateTime::now_utc(),
		);

		store.insert_record(&record).await.unwrap();
		store.set_embedding(record.record_id, &[1.0, 0.0]).await.unwrap();

		let stored = store.record(record.record_id).unwrap();

		assert!(!stored.pending);
		assert_eq!(stored.embedding.as_deref(), Some([1.0, 0.0].as_slice()));
	}
}
