use std::sync::Arc;

use uuid::Uuid;

use crate::Result;
use engram_config::Config;
use engram_domain::MemoryScope;
use engram_index::{HnswParams, LinearScanPool, Neighbor, VectorIndex};
use engram_storage::RecordStore;

/// Which engine answers similarity queries for this process.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EngineMode {
	/// Graph-based approximate search.
	Approximate,
	/// Exact linear scan, entered when schema or snapshot validation failed at
	/// initialization. Permanent until restart.
	Degraded,
}

/// The similarity engine behind retrieval. Both variants expose the same
/// insert/search shape, so callers never branch on the mode.
pub(crate) enum ActiveEngine {
	Approximate { index: VectorIndex, ef_search: usize },
	Degraded(LinearScanPool),
}
impl ActiveEngine {
	/// Builds the approximate engine from the verified schema and any stored
	/// snapshots, or falls back to the linear scan when either step fails.
	pub(crate) async fn init(cfg: &Config, store: &Arc<dyn RecordStore>) -> Self {
		let dim = cfg.providers.embedding.dimensions as usize;

		match Self::init_approximate(cfg, store, dim).await {
			Ok(engine) => engine,
			Err(err) => {
				tracing::warn!(
					error = %err,
					"Approximate index initialization failed; serving exact linear scans until restart.",
				);

				Self::Degraded(LinearScanPool::new(dim))
			},
		}
	}

	async fn init_approximate(
		cfg: &Config,
		store: &Arc<dyn RecordStore>,
		dim: usize,
	) -> Result<Self> {
		store.verify().await?;

		let index = VectorIndex::new(dim, HnswParams::from(&cfg.index));

		for snapshot in store.load_snapshots().await? {
			let scope = snapshot.scope();

			index.restore_partition(&scope, &snapshot.blob)?;

			tracing::debug!(
				owner_id = %scope.owner_id,
				agent_id = %scope.agent_id,
				records = index.len(&scope),
				"Restored index partition from its stored snapshot.",
			);
		}

		Ok(Self::Approximate { index, ef_search: cfg.index.ef_search as usize })
	}

	pub(crate) fn mode(&self) -> EngineMode {
		match self {
			Self::Approximate { .. } => EngineMode::Approximate,
			Self::Degraded(_) => EngineMode::Degraded,
		}
	}

	pub(crate) fn has_partition(&self, scope: &MemoryScope) -> bool {
		match self {
			Self::Approximate { index, .. } => index.has_partition(scope),
			Self::Degraded(pool) => pool.has_partition(scope),
		}
	}

	pub(crate) fn ensure_partition(&self, scope: &MemoryScope) {
		match self {
			Self::Approximate { index, .. } => index.ensure_partition(scope),
			Self::Degraded(pool) => pool.ensure_partition(scope),
		}
	}

	pub(crate) fn insert(
		&self,
		scope: &MemoryScope,
		record_id: Uuid,
		vector: Vec<f32>,
	) -> engram_index::Result<()> {
		match self {
			Self::Approximate { index, .. } => index.insert(scope, record_id, vector),
			Self::Degraded(pool) => pool.insert(scope, record_id, vector),
		}
	}

	pub(crate) fn search(&self, scope: &MemoryScope, query: &[f32], k: usize) -> Vec<Neighbor> {
		match self {
			Self::Approximate { index, ef_search } =>
				index.search(scope, query, k, (*ef_search).max(k)),
			Self::Degraded(pool) => pool.search(scope, query, k),
		}
	}

	pub(crate) fn snapshot_scopes(&self) -> Vec<MemoryScope> {
		match self {
			Self::Approximate { index, .. } => index.scopes(),
			Self::Degraded(_) => Vec::new(),
		}
	}

	pub(crate) fn snapshot_partition(
		&self,
		scope: &MemoryScope,
	) -> engram_index::Result<Option<Vec<u8>>> {
		match self {
			Self::Approximate { index, .. } => index.snapshot_partition(scope),
			Self::Degraded(_) => Ok(None),
		}
	}
}
