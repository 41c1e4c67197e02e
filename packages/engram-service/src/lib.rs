//! Retrieval and write orchestration over the storage, index, cache, queue,
//! and provider seams.

mod engine;
mod error;
mod record;
mod retrieve;

pub use engine::EngineMode;
pub use error::{Error, Result};
pub use retrieve::{ContextBlock, ContextItem};

use std::{
	collections::HashSet,
	sync::{Arc, Mutex},
};

use engine::ActiveEngine;
use engram_cache::{CacheBackend, RetrievalCache};
use engram_config::Config;
use engram_domain::MemoryScope;
use engram_index::SNAPSHOT_VERSION;
use engram_providers::{Embedder, HttpEmbedder, HttpReranker, Reranker};
use engram_queue::JobQueue;
use engram_storage::{PgStore, RecordStore};

/// The memory engine. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct Engine {
	inner: Arc<EngineInner>,
}
pub(crate) struct EngineInner {
	pub(crate) cfg: Config,
	pub(crate) store: Arc<dyn RecordStore>,
	pub(crate) embedder: Arc<dyn Embedder>,
	pub(crate) reranker: Option<Arc<dyn Reranker>>,
	pub(crate) queue: JobQueue,
	pub(crate) cache: RetrievalCache,
	pub(crate) active: ActiveEngine,
	/// Scopes whose stored embedded records have been backfilled into the
	/// active engine. A partition can exist without this — the write path and
	/// snapshot restore both create partitions that may lack older records.
	pub(crate) hydrated: Mutex<HashSet<MemoryScope>>,
}
impl Engine {
	/// Wires the engine onto explicit backends. Schema or snapshot failures
	/// select the degraded linear engine instead of failing construction.
	pub async fn init(
		cfg: Config,
		store: Arc<dyn RecordStore>,
		embedder: Arc<dyn Embedder>,
		reranker: Option<Arc<dyn Reranker>>,
		cache_tier2: Option<Arc<dyn CacheBackend>>,
	) -> Self {
		let active = ActiveEngine::init(&cfg, &store).await;

		tracing::info!(mode = ?active.mode(), "Memory engine initialized.");

		Self {
			inner: Arc::new(EngineInner {
				queue: JobQueue::new(&cfg.queue),
				cache: RetrievalCache::new(&cfg.cache, cache_tier2),
				hydrated: Mutex::new(HashSet::new()),
				active,
				store,
				embedder,
				reranker,
				cfg,
			}),
		}
	}

	/// Production wiring: Postgres storage plus the configured HTTP providers.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let store = PgStore::connect(&cfg.storage.postgres).await?;

		store.ensure_schema().await?;

		let embedder = HttpEmbedder::new(cfg.providers.embedding.clone())?;
		let reranker = match cfg.providers.rerank.clone() {
			Some(rerank_cfg) => Some(Arc::new(HttpReranker::new(rerank_cfg)?) as Arc<dyn Reranker>),
			None => None,
		};

		Ok(Self::init(cfg, Arc::new(store), Arc::new(embedder), reranker, None).await)
	}

	pub fn mode(&self) -> EngineMode {
		self.inner.active.mode()
	}

	/// Embedding jobs waiting or running.
	pub fn queue_depth(&self) -> usize {
		self.inner.queue.depth()
	}

	/// Writes one snapshot blob per indexed scope. A no-op in degraded mode,
	/// which has nothing worth restoring.
	pub async fn persist_index(&self) -> Result<()> {
		let now = time::OffsetDateTime::now_utc();

		for scope in self.inner.active.snapshot_scopes() {
			let Some(blob) = self.inner.active.snapshot_partition(&scope)? else {
				continue;
			};

			self.inner.store.save_snapshot(&scope, &blob, SNAPSHOT_VERSION as i32, now).await?;

			tracing::debug!(
				owner_id = %scope.owner_id,
				agent_id = %scope.agent_id,
				bytes = blob.len(),
				"Persisted index partition snapshot.",
			);
		}

		Ok(())
	}
}
