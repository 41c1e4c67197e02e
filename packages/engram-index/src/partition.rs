use std::{
	collections::HashMap,
	sync::{Arc, RwLock},
};

use uuid::Uuid;

use crate::{HnswParams, Neighbor, Result, hnsw::HnswIndex, snapshot};
use engram_domain::MemoryScope;

/// Approximate index partitioned by owner+agent scope.
///
/// Searches of one partition run concurrently; structural mutation (insert,
/// restore) takes that partition's write lock. The outer map is only locked to
/// look up or create a partition.
pub struct VectorIndex {
	dim: usize,
	params: HnswParams,
	partitions: RwLock<HashMap<MemoryScope, Arc<RwLock<HnswIndex>>>>,
}
impl VectorIndex {
	pub fn new(dim: usize, params: HnswParams) -> Self {
		Self { dim, partitions: RwLock::new(HashMap::new()), params }
	}

	pub fn dim(&self) -> usize {
		self.dim
	}

	pub fn has_partition(&self, scope: &MemoryScope) -> bool {
		let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

		partitions.contains_key(scope)
	}

	pub fn len(&self, scope: &MemoryScope) -> usize {
		let Some(partition) = self.partition(scope) else {
			return 0;
		};
		let index = partition.read().unwrap_or_else(|err| err.into_inner());

		index.len()
	}

	pub fn contains(&self, scope: &MemoryScope, record_id: Uuid) -> bool {
		let Some(partition) = self.partition(scope) else {
			return false;
		};
		let index = partition.read().unwrap_or_else(|err| err.into_inner());

		index.contains(record_id)
	}

	pub fn ensure_partition(&self, scope: &MemoryScope) {
		self.partition_or_create(scope);
	}

	pub fn insert(&self, scope: &MemoryScope, record_id: Uuid, vector: Vec<f32>) -> Result<()> {
		let partition = self.partition_or_create(scope);
		let mut index = partition.write().unwrap_or_else(|err| err.into_inner());

		index.insert(record_id, vector)
	}

	pub fn search(&self, scope: &MemoryScope, query: &[f32], k: usize, ef: usize) -> Vec<Neighbor> {
		let Some(partition) = self.partition(scope) else {
			return Vec::new();
		};
		let index = partition.read().unwrap_or_else(|err| err.into_inner());

		index.search(query, k, ef)
	}

	/// Replaces the scope's partition with a decoded snapshot; validation
	/// failures reject the blob without touching the current partition.
	pub fn restore_partition(&self, scope: &MemoryScope, bytes: &[u8]) -> Result<()> {
		let restored = snapshot::decode_snapshot(bytes, self.dim)?;
		let mut partitions = self.partitions.write().unwrap_or_else(|err| err.into_inner());

		partitions.insert(scope.clone(), Arc::new(RwLock::new(restored)));

		Ok(())
	}

	pub fn snapshot_partition(&self, scope: &MemoryScope) -> Result<Option<Vec<u8>>> {
		let Some(partition) = self.partition(scope) else {
			return Ok(None);
		};
		let index = partition.read().unwrap_or_else(|err| err.into_inner());

		snapshot::encode_snapshot(&index).map(Some)
	}

	pub fn scopes(&self) -> Vec<MemoryScope> {
		let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

		partitions.keys().cloned().collect()
	}

	fn partition(&self, scope: &MemoryScope) -> Option<Arc<RwLock<HnswIndex>>> {
		let partitions = self.partitions.read().unwrap_or_else(|err| err.into_inner());

		partitions.get(scope).cloned()
	}

	fn partition_or_create(&self, scope: &MemoryScope) -> Arc<RwLock<HnswIndex>> {
		if let Some(partition) = self.partition(scope) {
			return partition;
		}

		let mut partitions = self.partitions.write().unwrap_or_else(|err| err.into_inner());

		partitions
			.entry(scope.clone())
			.or_insert_with(|| Arc::new(RwLock::new(HnswIndex::new(self.dim, self.params))))
			.clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn params() -> HnswParams {
		HnswParams { max_links: 8, ef_construction: 32, max_layers: 6 }
	}

	fn scope() -> MemoryScope {
		MemoryScope::new("owner-1", "agent-1")
	}

	#[test]
	fn partitions_are_isolated_by_scope() {
		let index = VectorIndex::new(2, params());
		let other = MemoryScope::new("owner-2", "agent-1");

		index.insert(&scope(), Uuid::new_v4(), vec![1.0, 0.0]).expect("insert failed");

		assert_eq!(index.len(&scope()), 1);
		assert_eq!(index.len(&other), 0);
		assert!(index.search(&other, &[1.0, 0.0], 3, 16).is_empty());
	}

	#[test]
	fn restore_round_trips_a_partition() {
		let index = VectorIndex::new(2, params());
		let id = Uuid::new_v4();

		index.insert(&scope(), id, vec![1.0, 0.0]).expect("insert failed");

		let bytes =
			index.snapshot_partition(&scope()).expect("snapshot failed").expect("partition missing");
		let restored = VectorIndex::new(2, params());

		restored.restore_partition(&scope(), &bytes).expect("restore failed");

		let results = restored.search(&scope(), &[1.0, 0.0], 1, 16);

		assert_eq!(results[0].record_id, id);
	}

	#[test]
	fn restore_rejects_garbage_without_creating_a_partition() {
		let index = VectorIndex::new(2, params());

		assert!(index.restore_partition(&scope(), b"not a snapshot").is_err());
		assert!(!index.has_partition(&scope()));
	}
}
